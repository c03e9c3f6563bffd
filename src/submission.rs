//! Durable lifecycle record for one statement import attempt.
//!
//! ```text
//! Submitted ──> Processing ──> Completed
//!     │              │
//!     ├──────────────┴──────> Failed
//!     └─────────────────────> Completed   (statement had no transaction rows)
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{CashbookError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Submitted,
    Processing,
    Failed,
    Completed,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Processing => "processing",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Completed)
    }

    pub fn can_transition_to(&self, next: SubmissionStatus) -> bool {
        use SubmissionStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Submitted, Processing) | (Submitted, Failed) | (Submitted, Completed)
                | (Processing, Failed) | (Processing, Completed)
        )
    }
}

impl FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "submitted" => Ok(Self::Submitted),
            "processing" => Ok(Self::Processing),
            "failed" => Ok(Self::Failed),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Unknown submission status: {s}")),
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSubmission {
    pub id: Option<i64>,
    pub filename: String,
    pub submitted_at: String,
    pub status: SubmissionStatus,
    pub account_id: i64,
    pub transactions_imported: i64,
    pub transactions_skipped: i64,
    pub balances_imported: i64,
    pub balances_skipped: i64,
    pub error: Option<String>,
}

impl ImportSubmission {
    pub fn new(filename: &str, account_id: i64, submitted_at: &str) -> Self {
        Self {
            id: None,
            filename: filename.to_string(),
            submitted_at: submitted_at.to_string(),
            status: SubmissionStatus::Submitted,
            account_id,
            transactions_imported: 0,
            transactions_skipped: 0,
            balances_imported: 0,
            balances_skipped: 0,
            error: None,
        }
    }

    pub fn transition(&mut self, next: SubmissionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CashbookError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Move to `Failed`, recording why.
    pub fn fail(&mut self, reason: &str) -> Result<()> {
        self.transition(SubmissionStatus::Failed)?;
        self.error = Some(reason.to_string());
        Ok(())
    }

    /// Submission id, which exists once the record has been persisted.
    pub fn require_id(&self) -> Result<i64> {
        self.id
            .ok_or_else(|| CashbookError::Persistence("submission has not been saved".to_string()))
    }
}
