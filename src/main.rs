mod categorizer;
mod cli;
mod db;
mod error;
mod fingerprint;
mod fmt;
mod importer;
mod logging;
mod models;
mod normalize;
mod parser;
mod reports;
mod settings;
mod store;
mod submission;

use clap::Parser;

use cli::{
    AccountsCommands, BudgetsCommands, CategoriesCommands, Cli, Commands, ReportCommands,
    SubmissionsCommands,
};

fn main() {
    let cli = Cli::parse();

    // A broken settings file is reported by the command itself.
    let level = settings::load_settings()
        .map(|s| s.log_level)
        .unwrap_or_else(|_| "info".to_string());
    logging::init(&level, cli.verbose);

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Accounts { command } => match command {
            AccountsCommands::Add {
                name,
                ledger_type,
                category,
                institution,
            } => cli::accounts::add(&name, &ledger_type, &category, &institution),
            AccountsCommands::List => cli::accounts::list(),
        },
        Commands::Import { file, account } => cli::import::run(&file, account),
        Commands::Submissions { command, limit } => match command {
            None => cli::submissions::list(limit),
            Some(SubmissionsCommands::Show { id }) => cli::submissions::show(id),
        },
        Commands::Institutions => cli::import::institutions(),
        Commands::Categories { command } => match command {
            None | Some(CategoriesCommands::List) => cli::categories::list(),
            Some(CategoriesCommands::Add { name }) => cli::categories::add(&name),
        },
        Commands::Transactions { limit } => cli::transactions::list(limit),
        Commands::Categorize {
            id,
            category,
            no_train,
        } => cli::transactions::categorize(id, &category, no_train),
        Commands::Exclude { id, undo } => cli::transactions::exclude(id, undo),
        Commands::Budgets { command } => match command {
            BudgetsCommands::Add { category, amount } => cli::budgets::add(&category, &amount),
            BudgetsCommands::List => cli::budgets::list(),
            BudgetsCommands::Show { id } => cli::budgets::show(id),
        },
        Commands::Report { command } => match command {
            ReportCommands::Networth { window } => cli::report::networth(&window),
            ReportCommands::Cashflow { window } => cli::report::cashflow(&window),
            ReportCommands::Budgets => cli::report::budgets(),
        },
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
