//! Repository interfaces consumed by the importer and the report engine.
//!
//! `db::SqliteStore` implements all of them; tests can swap in anything
//! else that does.

use crate::error::Result;
use crate::models::{Account, Balance, Budget, Category, LedgerType, TrainingExample, Transaction};
use crate::submission::ImportSubmission;

pub trait AccountRepository {
    fn get_account(&self, id: i64) -> Result<Option<Account>>;
    fn list_accounts(&self) -> Result<Vec<Account>>;
}

pub trait TransactionRepository {
    /// Transactions with this fingerprint that belong to any submission other
    /// than `submission_id` (including manually entered rows).
    fn find_by_fingerprint_excluding_submission(
        &self,
        fingerprint: &str,
        submission_id: i64,
    ) -> Result<Vec<Transaction>>;

    /// Insert when `id` is `None`, update otherwise. Returns the row id.
    fn upsert_transaction(&self, txn: &Transaction) -> Result<i64>;

    /// Insert `txn` unless another submission already holds its fingerprint.
    /// Returns the new row id, or `None` for a duplicate.
    ///
    /// Stores shared between processes override this so the lookup and the
    /// insert happen under one write lock.
    fn insert_unless_duplicate(&self, txn: &Transaction, submission_id: i64) -> Result<Option<i64>> {
        if !self
            .find_by_fingerprint_excluding_submission(&txn.fingerprint, submission_id)?
            .is_empty()
        {
            return Ok(None);
        }
        self.upsert_transaction(txn).map(Some)
    }

    /// Every training-flagged transaction as (description, category name),
    /// oldest first.
    fn training_set(&self) -> Result<Vec<TrainingExample>>;

    /// Transactions dated within `[start, end]` (ISO8601, inclusive).
    fn transactions_between(&self, start: &str, end: &str) -> Result<Vec<Transaction>>;
}

pub trait BalanceRepository {
    fn upsert_balance(&self, balance: &Balance) -> Result<i64>;

    /// Whether another submission (or a manual entry) already recorded this
    /// snapshot.
    fn balance_exists_excluding_submission(
        &self,
        account_id: i64,
        effective_date: &str,
        amount: i64,
        submission_id: i64,
    ) -> Result<bool>;

    /// Snapshots for accounts of `ledger_type` effective on or before `end`.
    fn balances_through(&self, ledger_type: LedgerType, end: &str) -> Result<Vec<Balance>>;
}

pub trait CategoryRepository {
    fn category_by_name(&self, name: &str) -> Result<Option<Category>>;
    fn list_categories(&self) -> Result<Vec<Category>>;
}

pub trait SubmissionRepository {
    /// Insert when `id` is `None` (assigning it), update otherwise.
    fn upsert_submission(&self, submission: &mut ImportSubmission) -> Result<()>;
    fn get_submission(&self, id: i64) -> Result<Option<ImportSubmission>>;
    fn list_submissions(&self, limit: usize) -> Result<Vec<ImportSubmission>>;
}

pub trait BudgetRepository {
    fn list_budgets(&self) -> Result<Vec<Budget>>;
    fn get_budget(&self, id: i64) -> Result<Option<Budget>>;
}

/// Everything the importer needs.
pub trait ImportStore:
    AccountRepository + TransactionRepository + BalanceRepository + CategoryRepository + SubmissionRepository
{
}

impl<T> ImportStore for T where
    T: AccountRepository
        + TransactionRepository
        + BalanceRepository
        + CategoryRepository
        + SubmissionRepository
        + ?Sized
{
}

/// Everything the report engine needs.
pub trait ReportStore:
    AccountRepository + TransactionRepository + BalanceRepository + CategoryRepository + BudgetRepository
{
}

impl<T> ReportStore for T where
    T: AccountRepository
        + TransactionRepository
        + BalanceRepository
        + CategoryRepository
        + BudgetRepository
        + ?Sized
{
}
