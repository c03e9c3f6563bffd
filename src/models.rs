use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Sentinel category every uncategorizable transaction falls back to.
pub const UNKNOWN_CATEGORY: &str = "Unknown";
/// Category whose transactions count as income in cash flow.
pub const INCOME_CATEGORY: &str = "Income";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerType {
    Asset,
    Liability,
}

impl LedgerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Liability => "liability",
        }
    }
}

impl FromStr for LedgerType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asset" => Ok(Self::Asset),
            "liability" => Ok(Self::Liability),
            _ => Err(format!("Unknown ledger type: {s}")),
        }
    }
}

impl fmt::Display for LedgerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub ledger_type: LedgerType,
    /// checking, savings, brokerage, credit_card, loan, ...
    pub account_category: String,
    /// Parser key used to read this account's statements.
    pub institution: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: Option<i64>,
    pub account_id: i64,
    pub date: String,
    pub description: String,
    /// Signed minor units.
    pub amount: i64,
    pub category_id: i64,
    pub is_excluded: bool,
    pub fingerprint: String,
    pub use_for_training: bool,
    pub submission_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Balance {
    pub id: Option<i64>,
    pub account_id: i64,
    /// Day the snapshot was recorded.
    pub date: String,
    /// Day the snapshot describes.
    pub effective_date: String,
    pub amount: i64,
    pub submission_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct Budget {
    pub id: i64,
    pub category_id: i64,
    pub amount: i64,
}

/// A labeled description from the transaction history.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub description: String,
    pub category: String,
}

/// Intermediate representation from a statement parser before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTransaction {
    pub date: String,
    pub description: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBalance {
    pub date: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedStatement {
    pub transactions: Vec<ParsedTransaction>,
    pub balances: Vec<ParsedBalance>,
}
