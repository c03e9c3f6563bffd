use chrono::Local;

use crate::cli::{open_store, parse_amount_arg, report};
use crate::error::{CashbookError, Result};
use crate::fmt::money;
use crate::store::CategoryRepository;

pub fn add(category: &str, amount: &str) -> Result<()> {
    let amount = parse_amount_arg(amount)?;
    let (_, store) = open_store()?;
    let found = store
        .category_by_name(category)?
        .ok_or_else(|| CashbookError::Other(format!("Unknown category: {category}")))?;
    let id = store.add_budget(found.id, amount)?;
    println!("Added budget {id}: {} {} per month", found.name, money(amount));
    Ok(())
}

pub fn list() -> Result<()> {
    let (_, store) = open_store()?;
    report::print_budgets(&store, Local::now().date_naive())
}

pub fn show(id: i64) -> Result<()> {
    let (_, store) = open_store()?;
    report::print_budget(&store, id, Local::now().date_naive())
}
