pub mod accounts;
pub mod budgets;
pub mod categories;
pub mod import;
pub mod init;
pub mod report;
pub mod status;
pub mod submissions;
pub mod transactions;

use clap::{Parser, Subcommand};

use crate::db::SqliteStore;
use crate::error::{CashbookError, Result};
use crate::normalize::parse_minor_units;
use crate::settings::{load_settings, Settings};

/// Load settings and open the configured database, which must already exist.
pub(crate) fn open_store() -> Result<(Settings, SqliteStore)> {
    let settings = load_settings()?;
    let db_path = settings.db_path();
    if !db_path.exists() {
        return Err(CashbookError::Other(format!(
            "No database at {}. Run `cashbook init` first.",
            db_path.display()
        )));
    }
    let store = SqliteStore::open(&db_path)?;
    Ok((settings, store))
}

pub(crate) fn parse_amount_arg(raw: &str) -> Result<i64> {
    parse_minor_units(raw).ok_or_else(|| CashbookError::Other(format!("Invalid amount: {raw}")))
}

#[derive(Parser)]
#[command(name = "cashbook", about = "Import bank statements, categorize spending, and track net worth.")]
pub struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for cashbook data (default: ~/Documents/cashbook)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Manage accounts.
    Accounts {
        #[command(subcommand)]
        command: AccountsCommands,
    },
    /// Import a statement CSV into an account.
    Import {
        /// Path to the statement file
        file: String,
        /// Account id to import into
        #[arg(long)]
        account: i64,
    },
    /// Show recent import submissions and their status.
    Submissions {
        #[command(subcommand)]
        command: Option<SubmissionsCommands>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// List statement layouts available to accounts.
    Institutions,
    /// List or add categories.
    Categories {
        #[command(subcommand)]
        command: Option<CategoriesCommands>,
    },
    /// List recent transactions.
    Transactions {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Assign a category to a transaction (and learn from it).
    Categorize {
        /// Transaction id
        id: i64,
        /// Category name
        category: String,
        /// Do not use this transaction to train the categorizer
        #[arg(long = "no-train")]
        no_train: bool,
    },
    /// Exclude a transaction from cash flow and budgets.
    Exclude {
        /// Transaction id
        id: i64,
        /// Include it again
        #[arg(long)]
        undo: bool,
    },
    /// Manage monthly budgets.
    Budgets {
        #[command(subcommand)]
        command: BudgetsCommands,
    },
    /// Generate reports.
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
    /// Show current database and summary statistics.
    Status,
}

#[derive(Subcommand)]
pub enum AccountsCommands {
    /// Add a new account.
    Add {
        /// Account name
        name: String,
        /// Ledger type: asset or liability
        #[arg(long = "type", default_value = "asset")]
        ledger_type: String,
        /// Account category (checking, savings, credit_card, ...)
        #[arg(long, default_value = "checking")]
        category: String,
        /// Statement layout key (see `cashbook institutions`)
        #[arg(long, default_value = "generic")]
        institution: String,
    },
    /// List all accounts.
    List,
}

#[derive(Subcommand)]
pub enum SubmissionsCommands {
    /// Show one submission in full.
    Show {
        /// Submission id
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum CategoriesCommands {
    /// List all categories.
    List,
    /// Add a category.
    Add { name: String },
}

#[derive(Subcommand)]
pub enum BudgetsCommands {
    /// Add a monthly budget for a category.
    Add {
        /// Category name
        category: String,
        /// Monthly amount, e.g. 400.00
        amount: String,
    },
    /// Show this month's spend against every budget.
    List,
    /// Show this month's spend against one budget.
    Show {
        /// Budget id
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Net worth by month.
    Networth {
        /// 3, 6, 12 or all
        #[arg(long, default_value = "12")]
        window: String,
    },
    /// Income, spending by category, and savings.
    Cashflow {
        /// 3, 6, 12 or all
        #[arg(long, default_value = "3")]
        window: String,
    },
    /// This month's spend against budgets.
    Budgets,
}
