use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::error::{CashbookError, Result};
use crate::models::{
    Account, Balance, Budget, Category, LedgerType, TrainingExample, Transaction, INCOME_CATEGORY,
    UNKNOWN_CATEGORY,
};
use crate::store::{
    AccountRepository, BalanceRepository, BudgetRepository, CategoryRepository,
    SubmissionRepository, TransactionRepository,
};
use crate::submission::{ImportSubmission, SubmissionStatus};

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    ledger_type TEXT NOT NULL CHECK (ledger_type IN ('asset', 'liability')),
    account_category TEXT NOT NULL,
    institution TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

-- No foreign key on account_id: a submission for a missing account is still
-- recorded so it can be marked failed.
CREATE TABLE IF NOT EXISTS import_submissions (
    id INTEGER PRIMARY KEY,
    filename TEXT NOT NULL,
    submitted_at TEXT NOT NULL,
    status TEXT NOT NULL,
    account_id INTEGER NOT NULL,
    transactions_imported INTEGER NOT NULL DEFAULT 0,
    transactions_skipped INTEGER NOT NULL DEFAULT 0,
    balances_imported INTEGER NOT NULL DEFAULT 0,
    balances_skipped INTEGER NOT NULL DEFAULT 0,
    error TEXT
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    account_id INTEGER NOT NULL,
    date TEXT NOT NULL,
    description TEXT NOT NULL,
    amount INTEGER NOT NULL,
    category_id INTEGER NOT NULL,
    is_excluded INTEGER NOT NULL DEFAULT 0,
    fingerprint TEXT NOT NULL,
    use_for_training INTEGER NOT NULL DEFAULT 0,
    submission_id INTEGER,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (account_id) REFERENCES accounts(id),
    FOREIGN KEY (category_id) REFERENCES categories(id),
    FOREIGN KEY (submission_id) REFERENCES import_submissions(id)
);

CREATE INDEX IF NOT EXISTS idx_transactions_fingerprint ON transactions(fingerprint);
CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);

CREATE TABLE IF NOT EXISTS balances (
    id INTEGER PRIMARY KEY,
    account_id INTEGER NOT NULL,
    date TEXT NOT NULL,
    effective_date TEXT NOT NULL,
    amount INTEGER NOT NULL,
    submission_id INTEGER,
    FOREIGN KEY (account_id) REFERENCES accounts(id),
    FOREIGN KEY (submission_id) REFERENCES import_submissions(id)
);

CREATE INDEX IF NOT EXISTS idx_balances_account_effective ON balances(account_id, effective_date);

CREATE TABLE IF NOT EXISTS budgets (
    id INTEGER PRIMARY KEY,
    category_id INTEGER NOT NULL,
    amount INTEGER NOT NULL,
    FOREIGN KEY (category_id) REFERENCES categories(id)
);
";

const DEFAULT_CATEGORIES: &[&str] = &[
    UNKNOWN_CATEGORY,
    INCOME_CATEGORY,
    "Home",
    "Food",
    "Groceries",
    "Transportation",
    "Utilities",
    "Entertainment",
    "Shopping",
    "Health",
    "Travel",
    "Fees",
    "Transfer",
];

/// How long a connection waits for another process's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

/// Create tables and make sure the seed categories (including the
/// `Unknown` sentinel) exist. Safe to run on every start.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    for name in DEFAULT_CATEGORIES {
        conn.execute("INSERT OR IGNORE INTO categories (name) VALUES (?1)", [name])?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

impl ToSql for LedgerType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for LedgerType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

impl ToSql for SubmissionStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for SubmissionStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

const ACCOUNT_COLUMNS: &str = "id, name, ledger_type, account_category, institution";

fn row_to_account(row: &Row) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        name: row.get(1)?,
        ledger_type: row.get(2)?,
        account_category: row.get(3)?,
        institution: row.get(4)?,
    })
}

const TXN_COLUMNS: &str = "id, account_id, date, description, amount, category_id, \
     is_excluded, fingerprint, use_for_training, submission_id";

fn row_to_transaction(row: &Row) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        account_id: row.get(1)?,
        date: row.get(2)?,
        description: row.get(3)?,
        amount: row.get(4)?,
        category_id: row.get(5)?,
        is_excluded: row.get(6)?,
        fingerprint: row.get(7)?,
        use_for_training: row.get(8)?,
        submission_id: row.get(9)?,
    })
}

const SUBMISSION_COLUMNS: &str = "id, filename, submitted_at, status, account_id, \
     transactions_imported, transactions_skipped, balances_imported, balances_skipped, error";

fn row_to_submission(row: &Row) -> rusqlite::Result<ImportSubmission> {
    Ok(ImportSubmission {
        id: row.get(0)?,
        filename: row.get(1)?,
        submitted_at: row.get(2)?,
        status: row.get(3)?,
        account_id: row.get(4)?,
        transactions_imported: row.get(5)?,
        transactions_skipped: row.get(6)?,
        balances_imported: row.get(7)?,
        balances_skipped: row.get(8)?,
        error: row.get(9)?,
    })
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// SQLite-backed implementation of every repository trait.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Open (creating if needed) and initialize the database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = get_connection(db_path)?;
        init_db(&conn)?;
        Ok(Self::new(conn))
    }

    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CashbookError::Persistence("database lock poisoned".to_string()))
    }

    pub fn add_account(
        &self,
        name: &str,
        ledger_type: LedgerType,
        account_category: &str,
        institution: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO accounts (name, ledger_type, account_category, institution) VALUES (?1, ?2, ?3, ?4)",
            params![name, ledger_type, account_category, institution],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn add_category(&self, name: &str) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute("INSERT INTO categories (name) VALUES (?1)", [name])?;
        Ok(conn.last_insert_rowid())
    }

    pub fn add_budget(&self, category_id: i64, amount: i64) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO budgets (category_id, amount) VALUES (?1, ?2)",
            params![category_id, amount],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Manual recategorization. Setting `train` makes the row part of the
    /// categorizer's training set.
    pub fn set_transaction_category(&self, txn_id: i64, category_id: i64, train: bool) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE transactions SET category_id = ?1, use_for_training = ?2 WHERE id = ?3",
            params![category_id, train, txn_id],
        )?;
        if changed == 0 {
            return Err(CashbookError::Other(format!("Unknown transaction: {txn_id}")));
        }
        Ok(())
    }

    pub fn set_transaction_excluded(&self, txn_id: i64, excluded: bool) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE transactions SET is_excluded = ?1 WHERE id = ?2",
            params![excluded, txn_id],
        )?;
        if changed == 0 {
            return Err(CashbookError::Other(format!("Unknown transaction: {txn_id}")));
        }
        Ok(())
    }

    pub fn recent_transactions(&self, limit: usize) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TXN_COLUMNS} FROM transactions ORDER BY date DESC, id DESC LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map([limit as i64], row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Oldest transaction or balance date on record.
    pub fn earliest_activity_date(&self) -> Result<Option<String>> {
        let conn = self.conn()?;
        let earliest: Option<String> = conn.query_row(
            "SELECT MIN(d) FROM (SELECT MIN(date) AS d FROM transactions \
             UNION ALL SELECT MIN(effective_date) AS d FROM balances)",
            [],
            |row| row.get(0),
        )?;
        Ok(earliest)
    }
}

impl AccountRepository for SqliteStore {
    fn get_account(&self, id: i64) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let account = conn
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
                [id],
                row_to_account,
            )
            .optional()?;
        Ok(account)
    }

    fn list_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY id"))?;
        let rows = stmt
            .query_map([], row_to_account)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn fingerprint_matches(conn: &Connection, fingerprint: &str, submission_id: i64) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {TXN_COLUMNS} FROM transactions \
         WHERE fingerprint = ?1 AND (submission_id IS NULL OR submission_id != ?2)"
    ))?;
    let rows = stmt
        .query_map(params![fingerprint, submission_id], row_to_transaction)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn insert_transaction(conn: &Connection, txn: &Transaction) -> Result<i64> {
    conn.execute(
        "INSERT INTO transactions (account_id, date, description, amount, category_id, \
         is_excluded, fingerprint, use_for_training, submission_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            txn.account_id,
            txn.date,
            txn.description,
            txn.amount,
            txn.category_id,
            txn.is_excluded,
            txn.fingerprint,
            txn.use_for_training,
            txn.submission_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

impl TransactionRepository for SqliteStore {
    fn find_by_fingerprint_excluding_submission(
        &self,
        fingerprint: &str,
        submission_id: i64,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        fingerprint_matches(&conn, fingerprint, submission_id)
    }

    fn upsert_transaction(&self, txn: &Transaction) -> Result<i64> {
        let conn = self.conn()?;
        match txn.id {
            None => insert_transaction(&conn, txn),
            Some(id) => {
                let changed = conn.execute(
                    "UPDATE transactions SET account_id = ?1, date = ?2, description = ?3, amount = ?4, \
                     category_id = ?5, is_excluded = ?6, fingerprint = ?7, use_for_training = ?8, \
                     submission_id = ?9 WHERE id = ?10",
                    params![
                        txn.account_id,
                        txn.date,
                        txn.description,
                        txn.amount,
                        txn.category_id,
                        txn.is_excluded,
                        txn.fingerprint,
                        txn.use_for_training,
                        txn.submission_id,
                        id,
                    ],
                )?;
                if changed == 0 {
                    return Err(CashbookError::Persistence(format!("transaction {id} not found")));
                }
                Ok(id)
            }
        }
    }

    /// `BEGIN IMMEDIATE` takes the database write lock before the lookup,
    /// so a second process importing the same rows waits and then sees them.
    fn insert_unless_duplicate(&self, txn: &Transaction, submission_id: i64) -> Result<Option<i64>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !fingerprint_matches(&tx, &txn.fingerprint, submission_id)?.is_empty() {
            return Ok(None);
        }
        let id = insert_transaction(&tx, txn)?;
        tx.commit()?;
        Ok(Some(id))
    }

    fn training_set(&self) -> Result<Vec<TrainingExample>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT t.description, c.name FROM transactions t \
             JOIN categories c ON t.category_id = c.id \
             WHERE t.use_for_training = 1 ORDER BY t.id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(TrainingExample {
                    description: row.get(0)?,
                    category: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn transactions_between(&self, start: &str, end: &str) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TXN_COLUMNS} FROM transactions WHERE date BETWEEN ?1 AND ?2 ORDER BY date, id"
        ))?;
        let rows = stmt
            .query_map(params![start, end], row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl BalanceRepository for SqliteStore {
    fn upsert_balance(&self, balance: &Balance) -> Result<i64> {
        let conn = self.conn()?;
        match balance.id {
            None => {
                conn.execute(
                    "INSERT INTO balances (account_id, date, effective_date, amount, submission_id) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        balance.account_id,
                        balance.date,
                        balance.effective_date,
                        balance.amount,
                        balance.submission_id,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            }
            Some(id) => {
                let changed = conn.execute(
                    "UPDATE balances SET account_id = ?1, date = ?2, effective_date = ?3, amount = ?4, \
                     submission_id = ?5 WHERE id = ?6",
                    params![
                        balance.account_id,
                        balance.date,
                        balance.effective_date,
                        balance.amount,
                        balance.submission_id,
                        id,
                    ],
                )?;
                if changed == 0 {
                    return Err(CashbookError::Persistence(format!("balance {id} not found")));
                }
                Ok(id)
            }
        }
    }

    fn balance_exists_excluding_submission(
        &self,
        account_id: i64,
        effective_date: &str,
        amount: i64,
        submission_id: i64,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT 1 FROM balances WHERE account_id = ?1 AND effective_date = ?2 AND amount = ?3 \
             AND (submission_id IS NULL OR submission_id != ?4)",
        )?;
        Ok(stmt.exists(params![account_id, effective_date, amount, submission_id])?)
    }

    fn balances_through(&self, ledger_type: LedgerType, end: &str) -> Result<Vec<Balance>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT b.id, b.account_id, b.date, b.effective_date, b.amount, b.submission_id \
             FROM balances b JOIN accounts a ON b.account_id = a.id \
             WHERE a.ledger_type = ?1 AND b.effective_date <= ?2 \
             ORDER BY b.effective_date, b.id",
        )?;
        let rows = stmt
            .query_map(params![ledger_type, end], |row| {
                Ok(Balance {
                    id: row.get(0)?,
                    account_id: row.get(1)?,
                    date: row.get(2)?,
                    effective_date: row.get(3)?,
                    amount: row.get(4)?,
                    submission_id: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl CategoryRepository for SqliteStore {
    fn category_by_name(&self, name: &str) -> Result<Option<Category>> {
        let conn = self.conn()?;
        let category = conn
            .query_row("SELECT id, name FROM categories WHERE name = ?1", [name], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .optional()?;
        Ok(category)
    }

    fn list_categories(&self) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY name")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl SubmissionRepository for SqliteStore {
    fn upsert_submission(&self, submission: &mut ImportSubmission) -> Result<()> {
        let conn = self.conn()?;
        match submission.id {
            None => {
                conn.execute(
                    "INSERT INTO import_submissions (filename, submitted_at, status, account_id, \
                     transactions_imported, transactions_skipped, balances_imported, balances_skipped, error) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        submission.filename,
                        submission.submitted_at,
                        submission.status,
                        submission.account_id,
                        submission.transactions_imported,
                        submission.transactions_skipped,
                        submission.balances_imported,
                        submission.balances_skipped,
                        submission.error,
                    ],
                )?;
                submission.id = Some(conn.last_insert_rowid());
            }
            Some(id) => {
                let changed = conn.execute(
                    "UPDATE import_submissions SET status = ?1, transactions_imported = ?2, \
                     transactions_skipped = ?3, balances_imported = ?4, balances_skipped = ?5, error = ?6 \
                     WHERE id = ?7",
                    params![
                        submission.status,
                        submission.transactions_imported,
                        submission.transactions_skipped,
                        submission.balances_imported,
                        submission.balances_skipped,
                        submission.error,
                        id,
                    ],
                )?;
                if changed == 0 {
                    return Err(CashbookError::Persistence(format!("submission {id} not found")));
                }
            }
        }
        Ok(())
    }

    fn get_submission(&self, id: i64) -> Result<Option<ImportSubmission>> {
        let conn = self.conn()?;
        let submission = conn
            .query_row(
                &format!("SELECT {SUBMISSION_COLUMNS} FROM import_submissions WHERE id = ?1"),
                [id],
                row_to_submission,
            )
            .optional()?;
        Ok(submission)
    }

    fn list_submissions(&self, limit: usize) -> Result<Vec<ImportSubmission>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM import_submissions ORDER BY id DESC LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map([limit as i64], row_to_submission)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl BudgetRepository for SqliteStore {
    fn list_budgets(&self) -> Result<Vec<Budget>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, category_id, amount FROM budgets ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Budget {
                    id: row.get(0)?,
                    category_id: row.get(1)?,
                    amount: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_budget(&self, id: i64) -> Result<Option<Budget>> {
        let conn = self.conn()?;
        let budget = conn
            .query_row(
                "SELECT id, category_id, amount FROM budgets WHERE id = ?1",
                [id],
                |row| {
                    Ok(Budget {
                        id: row.get(0)?,
                        category_id: row.get(1)?,
                        amount: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(budget)
    }
}
