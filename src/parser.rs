use std::collections::BTreeMap;

use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CashbookError, Result};
use crate::models::{ParsedBalance, ParsedStatement, ParsedTransaction};
use crate::normalize::{parse_date, parse_minor_units, DateFormat};

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Where the money lives in a row, and which way it points.
///
/// Every layout emits negative amounts for outflows and positive amounts for
/// inflows, so nothing downstream needs to know about institution quirks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AmountColumns {
    /// One signed column. `negate` is for exports that report charges as positive.
    Signed {
        column: usize,
        #[serde(default)]
        negate: bool,
    },
    /// Separate unsigned debit (outflow) and credit (inflow) columns.
    DebitCredit { debit: usize, credit: usize },
}

impl AmountColumns {
    fn max_column(&self) -> usize {
        match self {
            Self::Signed { column, .. } => *column,
            Self::DebitCredit { debit, credit } => (*debit).max(*credit),
        }
    }

    fn read(&self, record: &StringRecord, line: usize) -> Result<i64> {
        match self {
            Self::Signed { column, negate } => {
                let raw = field(record, *column);
                let value = parse_minor_units(raw)
                    .ok_or_else(|| CashbookError::parse(line, format!("unparsable amount '{raw}'")))?;
                Ok(if *negate { -value } else { value })
            }
            Self::DebitCredit { debit, credit } => {
                let debit = optional_amount(field(record, *debit), line)?;
                let credit = optional_amount(field(record, *credit), line)?;
                if debit.is_none() && credit.is_none() {
                    return Err(CashbookError::parse(line, "row has neither a debit nor a credit"));
                }
                Ok(credit.unwrap_or(0).abs() - debit.unwrap_or(0).abs())
            }
        }
    }
}

/// Column layout and tolerance flags for one institution's CSV export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementLayout {
    pub name: String,
    /// Non-blank rows before the first data row, header included.
    #[serde(default = "default_header_rows")]
    pub header_rows: usize,
    pub date_column: usize,
    pub description_column: usize,
    pub amount: AmountColumns,
    pub date_format: DateFormat,
    /// Running balance column. Rows are newest-first, so the first data row
    /// carries the current balance.
    #[serde(default)]
    pub balance_column: Option<usize>,
    /// Exact column count every data row must have.
    #[serde(default)]
    pub expected_columns: Option<usize>,
    /// Allow data rows whose width differs from the header row.
    #[serde(default)]
    pub flexible: bool,
    /// Treat `"` as an ordinary character instead of a quote.
    #[serde(default)]
    pub lenient_quotes: bool,
    /// Most disclaimer rows the file may end with. Only rows whose date
    /// field does not parse are dropped.
    #[serde(default)]
    pub trailing_rows: usize,
    /// Rows whose description starts with one of these are not transactions.
    #[serde(default)]
    pub ignore_prefixes: Vec<String>,
}

fn default_header_rows() -> usize {
    1
}

fn field(record: &StringRecord, idx: usize) -> &str {
    record.get(idx).unwrap_or("").trim().trim_matches('"').trim()
}

fn optional_amount(raw: &str, line: usize) -> Result<Option<i64>> {
    if raw.is_empty() {
        return Ok(None);
    }
    parse_minor_units(raw)
        .map(Some)
        .ok_or_else(|| CashbookError::parse(line, format!("unparsable amount '{raw}'")))
}

fn line_of(record: &StringRecord) -> usize {
    record.position().map(|p| p.line() as usize).unwrap_or(0)
}

impl StatementLayout {
    fn max_column(&self) -> usize {
        let mut max = self.date_column.max(self.description_column).max(self.amount.max_column());
        if let Some(col) = self.balance_column {
            max = max.max(col);
        }
        max
    }

    fn check_width(&self, record: &StringRecord, header_width: Option<usize>, line: usize) -> Result<()> {
        if let Some(expected) = self.expected_columns {
            if record.len() != expected {
                return Err(CashbookError::parse(
                    line,
                    format!("expected {expected} columns, found {}", record.len()),
                ));
            }
        } else if let (false, Some(width)) = (self.flexible, header_width) {
            if record.len() != width {
                return Err(CashbookError::parse(
                    line,
                    format!("expected {width} columns like the header, found {}", record.len()),
                ));
            }
        }
        let needed = self.max_column() + 1;
        if record.len() < needed {
            return Err(CashbookError::parse(
                line,
                format!("row has {} columns, layout needs {needed}", record.len()),
            ));
        }
        Ok(())
    }

    /// End of the data rows once any disclaimer footer is cut off.
    fn data_end(&self, records: &[StringRecord]) -> usize {
        let mut end = records.len();
        for _ in 0..self.trailing_rows {
            if end <= self.header_rows {
                break;
            }
            if parse_date(field(&records[end - 1], self.date_column), self.date_format).is_some() {
                break;
            }
            end -= 1;
        }
        end
    }

    fn read_records(&self, raw: &str) -> Result<Vec<StringRecord>> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .quoting(!self.lenient_quotes)
            .from_reader(raw.as_bytes());
        let mut records = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| {
                let line = e.position().map(|p| p.line() as usize).unwrap_or(0);
                CashbookError::parse(line, e.to_string())
            })?;
            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Parse raw statement text into transactions and at most one balance.
    ///
    /// Any malformed row aborts the whole parse.
    pub fn parse(&self, raw: &str) -> Result<ParsedStatement> {
        let records = self.read_records(raw)?;
        if records.len() < self.header_rows {
            return Err(CashbookError::parse(
                0,
                format!(
                    "{}: expected {} header rows, found {}",
                    self.name,
                    self.header_rows,
                    records.len()
                ),
            ));
        }

        let header_width = self.header_rows.checked_sub(1).map(|i| records[i].len());
        let data = &records[self.header_rows..self.data_end(&records)];

        let mut statement = ParsedStatement::default();
        for record in data {
            let line = line_of(record);
            self.check_width(record, header_width, line)?;

            let description = field(record, self.description_column);
            if self
                .ignore_prefixes
                .iter()
                .any(|p| description.starts_with(p.as_str()))
            {
                continue;
            }

            let date_raw = field(record, self.date_column);
            let date = parse_date(date_raw, self.date_format)
                .ok_or_else(|| CashbookError::parse(line, format!("unparsable date '{date_raw}'")))?;
            let amount = self.amount.read(record, line)?;

            if statement.transactions.is_empty() {
                if let Some(col) = self.balance_column {
                    let raw_balance = field(record, col);
                    let balance = parse_minor_units(raw_balance).ok_or_else(|| {
                        CashbookError::parse(line, format!("unparsable balance '{raw_balance}'"))
                    })?;
                    statement.balances.push(ParsedBalance {
                        date: date.clone(),
                        amount: balance,
                    });
                }
            }

            statement.transactions.push(ParsedTransaction {
                date,
                description: description.to_string(),
                amount,
            });
        }

        debug!(
            layout = %self.name,
            transactions = statement.transactions.len(),
            balances = statement.balances.len(),
            "parsed statement"
        );
        Ok(statement)
    }
}

// ---------------------------------------------------------------------------
// Built-in institutions: enum dispatch, one layout each
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Institution {
    Generic,
    BofaChecking,
    ChaseCreditCard,
    CapitalOne,
    Amex,
    VanguardBrokerage,
    AllySavings,
}

impl Institution {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::BofaChecking => "bofa_checking",
            Self::ChaseCreditCard => "chase_credit_card",
            Self::CapitalOne => "capital_one",
            Self::Amex => "amex",
            Self::VanguardBrokerage => "vanguard_brokerage",
            Self::AllySavings => "ally_savings",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Generic => "Generic (Date, Description, Amount)",
            Self::BofaChecking => "Bank of America Checking",
            Self::ChaseCreditCard => "Chase Credit Card",
            Self::CapitalOne => "Capital One",
            Self::Amex => "American Express",
            Self::VanguardBrokerage => "Vanguard Brokerage",
            Self::AllySavings => "Ally Savings",
        }
    }

    pub fn layout(&self) -> StatementLayout {
        let base = StatementLayout {
            name: self.name().to_string(),
            header_rows: 1,
            date_column: 0,
            description_column: 1,
            amount: AmountColumns::Signed { column: 2, negate: false },
            date_format: DateFormat::Mdy,
            balance_column: None,
            expected_columns: None,
            flexible: false,
            lenient_quotes: false,
            trailing_rows: 0,
            ignore_prefixes: Vec::new(),
        };
        match self {
            Self::Generic => StatementLayout { flexible: true, ..base },
            // Summary block (5 rows) precedes the real header.
            // Date,Description,Amount,Running Bal.
            Self::BofaChecking => StatementLayout {
                header_rows: 6,
                balance_column: Some(3),
                flexible: true,
                ignore_prefixes: vec!["Beginning balance".to_string()],
                ..base
            },
            // Transaction Date,Post Date,Description,Category,Type,Amount,Memo
            Self::ChaseCreditCard => StatementLayout {
                description_column: 2,
                amount: AmountColumns::Signed { column: 5, negate: false },
                expected_columns: Some(7),
                ..base
            },
            // Transaction Date,Posted Date,Card No.,Description,Category,Debit,Credit
            Self::CapitalOne => StatementLayout {
                description_column: 3,
                amount: AmountColumns::DebitCredit { debit: 5, credit: 6 },
                date_format: DateFormat::Iso,
                ..base
            },
            // Date,Description,Amount -- charges are positive
            Self::Amex => StatementLayout {
                amount: AmountColumns::Signed { column: 2, negate: true },
                ..base
            },
            // Settlement Date,Description,Amount,Balance + optional disclaimer footer.
            // Quotes are literal, so "15,220.55" widens the row and fails the width check.
            Self::VanguardBrokerage => StatementLayout {
                date_format: DateFormat::Iso,
                balance_column: Some(3),
                lenient_quotes: true,
                trailing_rows: 2,
                ..base
            },
            // Date,Time,Amount,Type,Description,Balance
            Self::AllySavings => StatementLayout {
                description_column: 4,
                date_format: DateFormat::Iso,
                balance_column: Some(5),
                expected_columns: Some(6),
                ..base
            },
        }
    }
}

pub const ALL_INSTITUTIONS: &[Institution] = &[
    Institution::Generic,
    Institution::BofaChecking,
    Institution::ChaseCreditCard,
    Institution::CapitalOne,
    Institution::Amex,
    Institution::VanguardBrokerage,
    Institution::AllySavings,
];

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Institution key -> layout. Built from configuration and handed to the
/// importer; there is no global table.
#[derive(Debug, Clone, Default)]
pub struct ParserRegistry {
    layouts: BTreeMap<String, StatementLayout>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for inst in ALL_INSTITUTIONS {
            registry.register(inst.key(), inst.layout());
        }
        registry
    }

    /// Built-ins plus custom layouts; a custom key replaces a built-in.
    pub fn with_custom(custom: &BTreeMap<String, StatementLayout>) -> Self {
        let mut registry = Self::with_builtins();
        for (key, layout) in custom {
            registry.register(key, layout.clone());
        }
        registry
    }

    pub fn register(&mut self, key: &str, layout: StatementLayout) -> Option<StatementLayout> {
        let previous = self.layouts.insert(key.to_string(), layout);
        if previous.is_some() {
            debug!(key, "replaced statement layout");
        }
        previous
    }

    pub fn get(&self, key: &str) -> Result<&StatementLayout> {
        self.layouts
            .get(key)
            .ok_or_else(|| CashbookError::NoParserConfigured(key.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StatementLayout)> {
        self.layouts.iter().map(|(k, v)| (k.as_str(), v))
    }
}
