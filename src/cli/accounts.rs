use comfy_table::{Cell, Table};

use crate::cli::open_store;
use crate::error::{CashbookError, Result};
use crate::models::LedgerType;
use crate::store::AccountRepository;

pub fn add(name: &str, ledger_type: &str, category: &str, institution: &str) -> Result<()> {
    let ledger_type: LedgerType = ledger_type.parse().map_err(CashbookError::Other)?;
    let (settings, store) = open_store()?;
    // Fail early rather than on the first import.
    settings.parser_registry().get(institution)?;

    let id = store.add_account(name, ledger_type, category, Some(institution))?;
    println!("Added account {id}: {name}");
    Ok(())
}

pub fn list() -> Result<()> {
    let (_, store) = open_store()?;
    let accounts = store.list_accounts()?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Ledger", "Category", "Institution"]);
    for account in accounts {
        table.add_row(vec![
            Cell::new(account.id),
            Cell::new(account.name),
            Cell::new(account.ledger_type),
            Cell::new(account.account_category),
            Cell::new(account.institution.unwrap_or_default()),
        ]);
    }
    println!("Accounts\n{table}");
    Ok(())
}
