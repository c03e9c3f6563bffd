use chrono::{Local, NaiveDate};
use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::open_store;
use crate::db::SqliteStore;
use crate::error::{CashbookError, Result};
use crate::fmt::{money, percent};
use crate::normalize::parse_iso;
use crate::reports::{self, BudgetStatus, RelativeWindow};

fn resolve_window(store: &SqliteStore, window: &str) -> Result<(NaiveDate, NaiveDate)> {
    let window: RelativeWindow = window.parse().map_err(CashbookError::Other)?;
    let earliest = store
        .earliest_activity_date()?
        .and_then(|d| parse_iso(&d));
    Ok(window.resolve(Local::now().date_naive(), earliest))
}

fn signed(amount: i64) -> String {
    if amount < 0 {
        money(amount).red().to_string()
    } else {
        money(amount).green().to_string()
    }
}

pub fn networth(window: &str) -> Result<()> {
    let (_, store) = open_store()?;
    let (start, end) = resolve_window(&store, window)?;
    let months = reports::get_net_worth_by_month(&store, start, end)?;

    let mut table = Table::new();
    table.set_header(vec!["Month", "Assets", "Liabilities", "Net Worth"]);
    for (month, row) in &months {
        table.add_row(vec![
            Cell::new(month),
            Cell::new(money(row.assets)),
            Cell::new(money(row.liabilities)),
            Cell::new(signed(row.net_worth)),
        ]);
    }
    println!("Net Worth ({start} to {end})\n{table}");
    Ok(())
}

pub fn cashflow(window: &str) -> Result<()> {
    let (_, store) = open_store()?;
    let (start, end) = resolve_window(&store, window)?;
    let flow = reports::get_cash_flow(&store, start, end)?;

    let mut table = Table::new();
    table.set_header(vec!["Category", "Amount"]);
    table.add_row(vec![Cell::new("INCOME".green().bold()), Cell::new(money(flow.total_income))]);
    table.add_row(vec![Cell::new(""), Cell::new("")]);
    table.add_row(vec![Cell::new("EXPENSES".red().bold()), Cell::new("")]);
    let mut by_size: Vec<(&String, &i64)> = flow.expenses_by_category.iter().collect();
    by_size.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (name, amount) in by_size {
        table.add_row(vec![Cell::new(format!("  {name}")), Cell::new(money(*amount))]);
    }
    table.add_row(vec![
        Cell::new("Total Expenses".bold()),
        Cell::new(money(flow.total_expenses)),
    ]);
    table.add_row(vec![Cell::new(""), Cell::new("")]);
    table.add_row(vec![Cell::new("SAVINGS".bold()), Cell::new(signed(flow.savings))]);

    println!("Cash Flow ({start} to {end})\n{table}");
    Ok(())
}

pub fn budgets() -> Result<()> {
    let (_, store) = open_store()?;
    print_budgets(&store, Local::now().date_naive())
}

pub(crate) fn print_budgets(store: &SqliteStore, today: NaiveDate) -> Result<()> {
    let statuses = reports::get_budgets_with_spend(store, today)?;
    print_budget_table(&statuses, today);
    Ok(())
}

pub(crate) fn print_budget(store: &SqliteStore, budget_id: i64, today: NaiveDate) -> Result<()> {
    let status = reports::get_budget_with_spend(store, budget_id, today)?
        .ok_or_else(|| CashbookError::Other(format!("Unknown budget: {budget_id}")))?;
    print_budget_table(&[status], today);
    Ok(())
}

fn print_budget_table(statuses: &[BudgetStatus], today: NaiveDate) {
    let mut table = Table::new();
    table.set_header(vec!["ID", "Category", "Budget", "Spent", "Used"]);
    for b in statuses {
        let used = percent(b.percent_used);
        let used = match b.percent_used {
            Some(p) if p >= 100 => used.red().to_string(),
            Some(p) if p >= 80 => used.yellow().to_string(),
            _ => used,
        };
        table.add_row(vec![
            Cell::new(b.budget_id),
            Cell::new(&b.category),
            Cell::new(money(b.budget_amount)),
            Cell::new(money(b.spend)),
            Cell::new(used),
        ]);
    }
    println!("Budgets ({})\n{table}", today.format("%B %Y"));
}
