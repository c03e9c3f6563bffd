use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, Months, NaiveDate};

use crate::error::Result;
use crate::models::{LedgerType, INCOME_CATEGORY, UNKNOWN_CATEGORY};
use crate::normalize::to_iso;
use crate::store::ReportStore;

// ---------------------------------------------------------------------------
// Date helpers
// ---------------------------------------------------------------------------

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.day0()))
}

pub fn last_of_month(date: NaiveDate) -> NaiveDate {
    first_of_month(date)
        .checked_add_months(Months::new(1))
        .and_then(|d| d.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}

/// Month-end dates for every calendar month touched by `[start, end]`.
fn month_ends(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut cursor = first_of_month(start);
    while cursor <= end {
        out.push(last_of_month(cursor));
        match cursor.checked_add_months(Months::new(1)) {
            Some(next) => cursor = next,
            None => break,
        }
    }
    out
}

/// Report window relative to today: the last N calendar months (the current
/// one included), or everything on record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeWindow {
    Months(u32),
    All,
}

impl RelativeWindow {
    /// `earliest` is the oldest activity on record; `All` starts there.
    pub fn resolve(&self, today: NaiveDate, earliest: Option<NaiveDate>) -> (NaiveDate, NaiveDate) {
        let start = match self {
            Self::Months(n) => first_of_month(today)
                .checked_sub_months(Months::new(n.saturating_sub(1)))
                .unwrap_or(NaiveDate::MIN),
            Self::All => earliest.map_or_else(|| first_of_month(today), |d| d.min(today)),
        };
        (start, today)
    }
}

impl FromStr for RelativeWindow {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "3" => Ok(Self::Months(3)),
            "6" => Ok(Self::Months(6)),
            "12" => Ok(Self::Months(12)),
            "all" => Ok(Self::All),
            other => Err(format!("Unknown window: {other} (expected 3, 6, 12 or all)")),
        }
    }
}

impl fmt::Display for RelativeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Months(n) => write!(f, "{n} months"),
            Self::All => f.write_str("all time"),
        }
    }
}

// ---------------------------------------------------------------------------
// Net worth
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetWorthMonth {
    pub assets: i64,
    pub liabilities: i64,
    pub net_worth: i64,
}

/// Per-month totals for one ledger type. Each account contributes its latest
/// snapshot at or before the month end, so quiet months carry forward.
fn ledger_totals<S: ReportStore + ?Sized>(
    store: &S,
    ledger_type: LedgerType,
    ends: &[NaiveDate],
) -> Result<Vec<i64>> {
    let Some(last) = ends.last() else {
        return Ok(Vec::new());
    };
    let balances = store.balances_through(ledger_type, &to_iso(*last))?;

    let mut latest: HashMap<i64, i64> = HashMap::new();
    let mut next = 0;
    let mut totals = Vec::with_capacity(ends.len());
    for end in ends {
        let end = to_iso(*end);
        while next < balances.len() && balances[next].effective_date <= end {
            latest.insert(balances[next].account_id, balances[next].amount);
            next += 1;
        }
        totals.push(latest.values().sum::<i64>());
    }
    Ok(totals)
}

/// Net worth keyed by `YYYY-MM` for every month in `[start, end]`.
/// Liability balances are positive magnitudes subtracted from assets.
pub fn get_net_worth_by_month<S: ReportStore + ?Sized>(
    store: &S,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<BTreeMap<String, NetWorthMonth>> {
    let ends = month_ends(start, end);
    let assets = ledger_totals(store, LedgerType::Asset, &ends)?;
    let liabilities = ledger_totals(store, LedgerType::Liability, &ends)?;

    Ok(ends
        .iter()
        .zip(assets.into_iter().zip(liabilities))
        .map(|(end, (assets, liabilities))| {
            (
                end.format("%Y-%m").to_string(),
                NetWorthMonth {
                    assets,
                    liabilities,
                    net_worth: assets - liabilities,
                },
            )
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Cash flow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CashFlow {
    pub total_income: i64,
    pub total_expenses: i64,
    /// Outflow per category as a positive number; refunds on asset
    /// accounts reduce it.
    pub expenses_by_category: BTreeMap<String, i64>,
    pub savings: i64,
}

/// Income and spending over `[start, end]`. A positive amount on a
/// liability account pays the balance down and is neither income nor
/// expense.
pub fn get_cash_flow<S: ReportStore + ?Sized>(store: &S, start: NaiveDate, end: NaiveDate) -> Result<CashFlow> {
    let names: HashMap<i64, String> = store
        .list_categories()?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();
    let liabilities: HashSet<i64> = store
        .list_accounts()?
        .into_iter()
        .filter(|a| a.ledger_type == LedgerType::Liability)
        .map(|a| a.id)
        .collect();

    let mut report = CashFlow::default();
    for txn in store.transactions_between(&to_iso(start), &to_iso(end))? {
        if txn.is_excluded {
            continue;
        }
        let name = names
            .get(&txn.category_id)
            .map_or(UNKNOWN_CATEGORY, String::as_str);
        if name == INCOME_CATEGORY {
            report.total_income += txn.amount;
        } else if txn.amount > 0 && liabilities.contains(&txn.account_id) {
            continue;
        } else {
            *report.expenses_by_category.entry(name.to_string()).or_default() -= txn.amount;
        }
    }
    report.total_expenses = report.expenses_by_category.values().sum();
    report.savings = (report.total_income - report.total_expenses).max(0);
    Ok(report)
}

// ---------------------------------------------------------------------------
// Budgets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetStatus {
    pub budget_id: i64,
    pub category: String,
    pub budget_amount: i64,
    pub spend: i64,
    /// `None` when the budget amount is zero or negative.
    pub percent_used: Option<i64>,
}

/// Whole percent of `budget` consumed by `spend`, rounded down.
pub fn percent_used(spend: i64, budget: i64) -> Option<i64> {
    if budget <= 0 {
        return None;
    }
    let pct = i128::from(spend.max(0)) * 100 / i128::from(budget);
    Some(i64::try_from(pct).unwrap_or(i64::MAX))
}

/// Spend for every budget over the calendar month containing `today`.
pub fn get_budgets_with_spend<S: ReportStore + ?Sized>(store: &S, today: NaiveDate) -> Result<Vec<BudgetStatus>> {
    let flow = get_cash_flow(store, first_of_month(today), today)?;
    let names: HashMap<i64, String> = store
        .list_categories()?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();

    Ok(store
        .list_budgets()?
        .into_iter()
        .map(|budget| {
            let category = names
                .get(&budget.category_id)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
            let spend = flow.expenses_by_category.get(&category).copied().unwrap_or(0);
            BudgetStatus {
                budget_id: budget.id,
                percent_used: percent_used(spend, budget.amount),
                category,
                budget_amount: budget.amount,
                spend,
            }
        })
        .collect())
}

pub fn get_budget_with_spend<S: ReportStore + ?Sized>(
    store: &S,
    budget_id: i64,
    today: NaiveDate,
) -> Result<Option<BudgetStatus>> {
    if store.get_budget(budget_id)?.is_none() {
        return Ok(None);
    }
    Ok(get_budgets_with_spend(store, today)?
        .into_iter()
        .find(|b| b.budget_id == budget_id))
}
