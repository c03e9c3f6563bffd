use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::open_store;
use crate::error::{CashbookError, Result};
use crate::store::SubmissionRepository;
use crate::submission::SubmissionStatus;

fn colored_status(status: SubmissionStatus) -> String {
    match status {
        SubmissionStatus::Completed => status.as_str().green().to_string(),
        SubmissionStatus::Failed => status.as_str().red().to_string(),
        _ => status.as_str().yellow().to_string(),
    }
}

pub fn list(limit: usize) -> Result<()> {
    let (_, store) = open_store()?;
    let submissions = store.list_submissions(limit)?;

    let mut table = Table::new();
    table.set_header(vec![
        "ID", "File", "Submitted", "Account", "Status", "Imported", "Skipped", "Balances", "Error",
    ]);
    for s in submissions {
        let status = colored_status(s.status);
        table.add_row(vec![
            Cell::new(s.id.unwrap_or_default()),
            Cell::new(&s.filename),
            Cell::new(&s.submitted_at),
            Cell::new(s.account_id),
            Cell::new(status),
            Cell::new(s.transactions_imported),
            Cell::new(s.transactions_skipped),
            Cell::new(format!("{}/{}", s.balances_imported, s.balances_skipped)),
            Cell::new(s.error.unwrap_or_default()),
        ]);
    }
    println!("Import submissions\n{table}");
    Ok(())
}

pub fn show(id: i64) -> Result<()> {
    let (_, store) = open_store()?;
    let s = store
        .get_submission(id)?
        .ok_or_else(|| CashbookError::Other(format!("Unknown submission: {id}")))?;

    let mut table = Table::new();
    table.add_row(vec![Cell::new("File"), Cell::new(&s.filename)]);
    table.add_row(vec![Cell::new("Submitted"), Cell::new(&s.submitted_at)]);
    table.add_row(vec![Cell::new("Account"), Cell::new(s.account_id)]);
    table.add_row(vec![Cell::new("Status"), Cell::new(colored_status(s.status))]);
    table.add_row(vec![Cell::new("Transactions imported"), Cell::new(s.transactions_imported)]);
    table.add_row(vec![Cell::new("Transactions skipped"), Cell::new(s.transactions_skipped)]);
    table.add_row(vec![Cell::new("Balances imported"), Cell::new(s.balances_imported)]);
    table.add_row(vec![Cell::new("Balances skipped"), Cell::new(s.balances_skipped)]);
    if let Some(error) = &s.error {
        table.add_row(vec![Cell::new("Error"), Cell::new(error.as_str().red())]);
    }
    println!("Submission {id}\n{table}");
    Ok(())
}
