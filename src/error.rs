use thiserror::Error;

use crate::submission::SubmissionStatus;

#[derive(Error, Debug)]
pub enum CashbookError {
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Account not found: {0}")]
    AccountNotFound(i64),

    #[error("No parser configured for institution: {0}")]
    NoParserConfigured(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Categorization error: {0}")]
    Categorization(String),

    #[error("Invalid submission transition: {from} -> {to}")]
    InvalidTransition {
        from: SubmissionStatus,
        to: SubmissionStatus,
    },

    #[error("Import cancelled")]
    Cancelled,

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

impl CashbookError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CashbookError>;
