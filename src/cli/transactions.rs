use std::collections::HashMap;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::open_store;
use crate::error::{CashbookError, Result};
use crate::fmt::money;
use crate::store::CategoryRepository;

pub fn list(limit: usize) -> Result<()> {
    let (_, store) = open_store()?;
    let names: HashMap<i64, String> = store
        .list_categories()?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();

    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Account", "Description", "Amount", "Category", ""]);
    for t in store.recent_transactions(limit)? {
        let amount = if t.amount < 0 {
            money(t.amount).red().to_string()
        } else {
            money(t.amount).green().to_string()
        };
        table.add_row(vec![
            Cell::new(t.id.unwrap_or_default()),
            Cell::new(&t.date),
            Cell::new(t.account_id),
            Cell::new(&t.description),
            Cell::new(amount),
            Cell::new(names.get(&t.category_id).map(String::as_str).unwrap_or("?")),
            Cell::new(if t.is_excluded { "excluded" } else { "" }),
        ]);
    }
    println!("Transactions\n{table}");
    Ok(())
}

pub fn categorize(id: i64, category: &str, no_train: bool) -> Result<()> {
    let (_, store) = open_store()?;
    let found = store
        .category_by_name(category)?
        .ok_or_else(|| CashbookError::Other(format!("Unknown category: {category}")))?;
    store.set_transaction_category(id, found.id, !no_train)?;
    println!("Transaction {id} → {}", found.name);
    Ok(())
}

pub fn exclude(id: i64, undo: bool) -> Result<()> {
    let (_, store) = open_store()?;
    store.set_transaction_excluded(id, !undo)?;
    if undo {
        println!("Transaction {id} included");
    } else {
        println!("Transaction {id} excluded");
    }
    Ok(())
}
