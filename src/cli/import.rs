use std::path::PathBuf;

use comfy_table::{Cell, Table};
use tracing::warn;

use crate::categorizer::SharedModel;
use crate::cli::open_store;
use crate::error::Result;
use crate::importer::{AccountLocks, CancelToken, ImportOrchestrator};
use crate::settings::load_settings;

/// Flip `cancel` on the first Ctrl-C so the import stops after the row in
/// flight and the submission is recorded as failed.
fn cancel_on_interrupt(cancel: CancelToken) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                warn!(error = %e, "no interrupt handler; Ctrl-C will stop the import abruptly");
                return;
            }
        };
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupted, stopping after the current row...");
                cancel.cancel();
            }
        });
    });
}

pub fn run(file: &str, account: i64) -> Result<()> {
    let (settings, store) = open_store()?;
    let parsers = settings.parser_registry();
    let model = SharedModel::new()?;
    // Serializes imports within this process; the store's atomic
    // insert covers other processes.
    let locks = AccountLocks::new();
    let cancel = CancelToken::new();
    cancel_on_interrupt(cancel.clone());

    let orchestrator = ImportOrchestrator::new(&store, &parsers, &model, &locks).with_cancel(cancel);
    let submission = orchestrator.import_file(&PathBuf::from(file), account)?;

    println!(
        "{} imported, {} skipped (duplicates)",
        submission.transactions_imported, submission.transactions_skipped
    );
    if submission.balances_imported + submission.balances_skipped > 0 {
        println!(
            "{} balances recorded, {} skipped",
            submission.balances_imported, submission.balances_skipped
        );
    }
    Ok(())
}

pub fn institutions() -> Result<()> {
    let registry = load_settings()?.parser_registry();

    let mut table = Table::new();
    table.set_header(vec!["Key", "Name", "Balances"]);
    for (key, layout) in registry.iter() {
        table.add_row(vec![
            Cell::new(key),
            Cell::new(&layout.name),
            Cell::new(if layout.balance_column.is_some() { "yes" } else { "" }),
        ]);
    }
    println!("Institutions\n{table}");
    Ok(())
}
