use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Local;
use tracing::{debug, info, warn};

use crate::categorizer::{Model, SharedModel};
use crate::error::{CashbookError, Result};
use crate::fingerprint::fingerprint;
use crate::models::{Account, Balance, ParsedBalance, ParsedTransaction, Transaction, UNKNOWN_CATEGORY};
use crate::parser::ParserRegistry;
use crate::store::ImportStore;
use crate::submission::{ImportSubmission, SubmissionStatus};

// ---------------------------------------------------------------------------
// Coordination helpers
// ---------------------------------------------------------------------------

/// Cooperative cancellation flag, checked between rows.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One mutex per account so two imports into the same account never
/// interleave their dedup checks. Different accounts run independently.
#[derive(Debug, Default)]
pub struct AccountLocks {
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, account_id: i64) -> Arc<Mutex<()>> {
        // The map only ever grows, so a poisoned guard still holds valid data.
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(account_id).or_default())
    }
}

fn now_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn persistence(e: CashbookError) -> CashbookError {
    match e {
        CashbookError::Db(e) => CashbookError::Persistence(e.to_string()),
        other => other,
    }
}

fn categorization(e: CashbookError) -> CashbookError {
    match e {
        CashbookError::Db(e) => CashbookError::Categorization(e.to_string()),
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives one statement from raw text to persisted, categorized,
/// deduplicated rows, recording progress on an `ImportSubmission`.
pub struct ImportOrchestrator<'a, S: ImportStore + ?Sized> {
    store: &'a S,
    parsers: &'a ParserRegistry,
    model: &'a SharedModel,
    locks: &'a AccountLocks,
    cancel: CancelToken,
}

impl<'a, S: ImportStore + ?Sized> ImportOrchestrator<'a, S> {
    pub fn new(
        store: &'a S,
        parsers: &'a ParserRegistry,
        model: &'a SharedModel,
        locks: &'a AccountLocks,
    ) -> Self {
        Self {
            store,
            parsers,
            model,
            locks,
            cancel: CancelToken::new(),
        }
    }

    /// Stop imports run by this orchestrator once `cancel` is set.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn import_file(&self, path: &Path, account_id: i64) -> Result<ImportSubmission> {
        let raw = std::fs::read_to_string(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.import_statement(&filename, &raw, account_id)
    }

    /// Import a statement. On failure the submission is left `Failed` with
    /// the error text recorded, and the error is returned; rows persisted
    /// before the failure stay committed.
    pub fn import_statement(&self, filename: &str, raw: &str, account_id: i64) -> Result<ImportSubmission> {
        let lock = self.locks.lock_for(account_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut submission = ImportSubmission::new(filename, account_id, &now_timestamp());
        self.store.upsert_submission(&mut submission).map_err(persistence)?;
        info!(submission_id = ?submission.id, filename, account_id, "import submitted");

        match self.run(&mut submission, raw) {
            Ok(()) => Ok(submission),
            Err(e) => {
                warn!(submission_id = ?submission.id, error = %e, "import failed");
                match submission.fail(&e.to_string()) {
                    Ok(()) => {
                        if let Err(save_err) = self.store.upsert_submission(&mut submission) {
                            warn!(submission_id = ?submission.id, error = %save_err, "could not record failed import");
                        }
                    }
                    Err(transition_err) => {
                        warn!(submission_id = ?submission.id, error = %transition_err, "could not mark import failed");
                    }
                }
                Err(e)
            }
        }
    }

    fn save(&self, submission: &mut ImportSubmission) -> Result<()> {
        self.store.upsert_submission(submission).map_err(persistence)
    }

    fn run(&self, submission: &mut ImportSubmission, raw: &str) -> Result<()> {
        let submission_id = submission.require_id()?;

        let account = self
            .store
            .get_account(submission.account_id)
            .map_err(persistence)?
            .ok_or(CashbookError::AccountNotFound(submission.account_id))?;
        let key = account.institution.as_deref().ok_or_else(|| {
            CashbookError::NoParserConfigured(format!("account {} has no institution", account.id))
        })?;
        let layout = self.parsers.get(key)?;
        let statement = layout.parse(raw)?;
        debug!(
            parser = key,
            transactions = statement.transactions.len(),
            balances = statement.balances.len(),
            "parsed statement"
        );

        let training = self.store.training_set().map_err(categorization)?;
        self.model.rebuild(&training)?;
        let model = self.model.current()?;
        if model.is_empty() {
            debug!("no training data, rows will be filed under {UNKNOWN_CATEGORY}");
        }
        let unknown_id = self
            .store
            .category_by_name(UNKNOWN_CATEGORY)
            .map_err(categorization)?
            .ok_or_else(|| CashbookError::Categorization(format!("{UNKNOWN_CATEGORY} category is missing")))?
            .id;
        let mut category_ids: HashMap<String, i64> = HashMap::new();

        for row in &statement.transactions {
            if submission.status == SubmissionStatus::Submitted {
                submission.transition(SubmissionStatus::Processing)?;
                self.save(submission)?;
            }
            if self.cancel.is_cancelled() {
                return Err(CashbookError::Cancelled);
            }
            if self.import_row(&account, submission_id, row, &model, unknown_id, &mut category_ids)? {
                submission.transactions_imported += 1;
            } else {
                submission.transactions_skipped += 1;
            }
            self.save(submission)?;
        }

        for balance in &statement.balances {
            match self.import_balance(&account, submission_id, balance) {
                Ok(true) => submission.balances_imported += 1,
                Ok(false) => submission.balances_skipped += 1,
                Err(e) => {
                    warn!(account_id = account.id, date = %balance.date, error = %e, "balance not saved");
                    submission.balances_skipped += 1;
                }
            }
            self.save(submission)?;
        }

        submission.transition(SubmissionStatus::Completed)?;
        self.save(submission)?;
        info!(
            submission_id,
            imported = submission.transactions_imported,
            skipped = submission.transactions_skipped,
            balances = submission.balances_imported,
            "import completed"
        );
        Ok(())
    }

    /// Returns `false` when another submission already holds this row.
    fn import_row(
        &self,
        account: &Account,
        submission_id: i64,
        row: &ParsedTransaction,
        model: &Model,
        unknown_id: i64,
        category_ids: &mut HashMap<String, i64>,
    ) -> Result<bool> {
        let category_id = match model.infer(&row.description) {
            Some(name) => self.resolve_category(&name, unknown_id, category_ids)?,
            None => unknown_id,
        };

        let txn = Transaction {
            id: None,
            account_id: account.id,
            date: row.date.clone(),
            description: row.description.clone(),
            amount: row.amount,
            category_id,
            is_excluded: false,
            fingerprint: fingerprint(account.id, row.amount, &row.date, &row.description),
            use_for_training: false,
            submission_id: Some(submission_id),
        };
        let inserted = self
            .store
            .insert_unless_duplicate(&txn, submission_id)
            .map_err(persistence)?;
        if inserted.is_none() {
            debug!(date = %row.date, description = %row.description, "duplicate row skipped");
        }
        Ok(inserted.is_some())
    }

    fn resolve_category(
        &self,
        name: &str,
        unknown_id: i64,
        category_ids: &mut HashMap<String, i64>,
    ) -> Result<i64> {
        if let Some(id) = category_ids.get(name) {
            return Ok(*id);
        }
        // A category deleted since it was trained on falls back to Unknown.
        let id = self
            .store
            .category_by_name(name)
            .map_err(categorization)?
            .map_or(unknown_id, |c| c.id);
        category_ids.insert(name.to_string(), id);
        Ok(id)
    }

    fn import_balance(&self, account: &Account, submission_id: i64, parsed: &ParsedBalance) -> Result<bool> {
        if self
            .store
            .balance_exists_excluding_submission(account.id, &parsed.date, parsed.amount, submission_id)?
        {
            return Ok(false);
        }
        self.store.upsert_balance(&Balance {
            id: None,
            account_id: account.id,
            date: Local::now().date_naive().format("%Y-%m-%d").to_string(),
            effective_date: parsed.date.clone(),
            amount: parsed.amount,
            submission_id: Some(submission_id),
        })?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::db::tests::test_store;
    use crate::db::SqliteStore;
    use crate::models::{Category, LedgerType, TrainingExample};
    use crate::store::{
        AccountRepository, BalanceRepository, CategoryRepository, SubmissionRepository,
        TransactionRepository,
    };

    const COFFEE_CSV: &str = "Date,Description,Amount\n\"01/15/2024\",\"COFFEE SHOP\",\"-12.34\"\n";

    struct Harness {
        parsers: ParserRegistry,
        model: SharedModel,
        locks: AccountLocks,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                parsers: ParserRegistry::with_builtins(),
                model: SharedModel::new().unwrap(),
                locks: AccountLocks::new(),
            }
        }

        fn orchestrator<'a, S: ImportStore + ?Sized>(&'a self, store: &'a S) -> ImportOrchestrator<'a, S> {
            ImportOrchestrator::new(store, &self.parsers, &self.model, &self.locks)
        }
    }

    fn generic_account(store: &SqliteStore) -> i64 {
        store
            .add_account("Checking", LedgerType::Asset, "checking", Some("generic"))
            .unwrap()
    }

    fn last_submission(store: &SqliteStore) -> ImportSubmission {
        store.list_submissions(1).unwrap().remove(0)
    }

    #[test]
    fn test_imports_single_row_statement() {
        let (_dir, store) = test_store();
        let acct = generic_account(&store);
        let h = Harness::new();

        let sub = h.orchestrator(&store).import_statement("jan.csv", COFFEE_CSV, acct).unwrap();
        assert_eq!(sub.status, SubmissionStatus::Completed);
        assert_eq!(sub.transactions_imported, 1);
        assert_eq!(sub.transactions_skipped, 0);
        assert_eq!(last_submission(&store), sub);

        let rows = store.recent_transactions(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, "2024-01-15");
        assert_eq!(rows[0].description, "COFFEE SHOP");
        assert_eq!(rows[0].amount, -1234);
        assert_eq!(rows[0].submission_id, sub.id);
        assert!(!rows[0].use_for_training);
        let unknown = store.category_by_name(UNKNOWN_CATEGORY).unwrap().unwrap();
        assert_eq!(rows[0].category_id, unknown.id);
    }

    #[test]
    fn test_reimport_skips_every_row() {
        let (_dir, store) = test_store();
        let acct = generic_account(&store);
        let h = Harness::new();
        let csv = "Date,Description,Amount\n01/15/2024,A,-1.00\n01/16/2024,B,-2.00\n01/17/2024,C,3.00\n";

        let first = h.orchestrator(&store).import_statement("a.csv", csv, acct).unwrap();
        assert_eq!(first.transactions_imported, 3);
        let second = h.orchestrator(&store).import_statement("a.csv", csv, acct).unwrap();
        assert_eq!(second.status, SubmissionStatus::Completed);
        assert_eq!(second.transactions_imported, 0);
        assert_eq!(second.transactions_skipped, 3);
        assert_eq!(store.recent_transactions(10).unwrap().len(), 3);
    }

    #[test]
    fn test_identical_rows_in_one_statement_both_import() {
        let (_dir, store) = test_store();
        let acct = generic_account(&store);
        let h = Harness::new();
        let csv = "Date,Description,Amount\n01/15/2024,PARKING,-2.00\n01/15/2024,PARKING,-2.00\n";

        let sub = h.orchestrator(&store).import_statement("p.csv", csv, acct).unwrap();
        assert_eq!(sub.transactions_imported, 2);
        assert_eq!(sub.transactions_skipped, 0);
    }

    #[test]
    fn test_same_row_in_other_account_is_not_a_duplicate() {
        let (_dir, store) = test_store();
        let a = generic_account(&store);
        let b = generic_account(&store);
        let h = Harness::new();
        h.orchestrator(&store).import_statement("a.csv", COFFEE_CSV, a).unwrap();
        let sub = h.orchestrator(&store).import_statement("b.csv", COFFEE_CSV, b).unwrap();
        assert_eq!(sub.transactions_imported, 1);
    }

    #[test]
    fn test_missing_account_fails_submission() {
        let (_dir, store) = test_store();
        let h = Harness::new();
        let err = h.orchestrator(&store).import_statement("x.csv", COFFEE_CSV, 99).unwrap_err();
        assert!(matches!(err, CashbookError::AccountNotFound(99)));

        let sub = last_submission(&store);
        assert_eq!(sub.status, SubmissionStatus::Failed);
        assert_eq!(sub.transactions_imported, 0);
        assert_eq!(sub.transactions_skipped, 0);
        assert!(sub.error.unwrap().contains("99"));
    }

    #[test]
    fn test_unconfigured_parser_fails_submission() {
        let (_dir, store) = test_store();
        let acct = store
            .add_account("Odd Bank", LedgerType::Asset, "checking", Some("odd_bank"))
            .unwrap();
        let bare = store.add_account("Cash", LedgerType::Asset, "cash", None).unwrap();
        let h = Harness::new();

        let err = h.orchestrator(&store).import_statement("x.csv", COFFEE_CSV, acct).unwrap_err();
        assert!(matches!(err, CashbookError::NoParserConfigured(_)));
        assert_eq!(last_submission(&store).status, SubmissionStatus::Failed);

        let err = h.orchestrator(&store).import_statement("x.csv", COFFEE_CSV, bare).unwrap_err();
        assert!(matches!(err, CashbookError::NoParserConfigured(_)));
    }

    #[test]
    fn test_parse_error_fails_without_persisting_rows() {
        let (_dir, store) = test_store();
        let acct = generic_account(&store);
        let h = Harness::new();
        let csv = "Date,Description,Amount\n01/15/2024,OK,-1.00\nnot-a-date,BAD,-2.00\n";

        let err = h.orchestrator(&store).import_statement("bad.csv", csv, acct).unwrap_err();
        assert!(matches!(err, CashbookError::Parse { line: 3, .. }));
        let sub = last_submission(&store);
        assert_eq!(sub.status, SubmissionStatus::Failed);
        assert_eq!(sub.transactions_imported, 0);
        assert!(store.recent_transactions(10).unwrap().is_empty());
    }

    #[test]
    fn test_header_only_statement_completes_directly() {
        let (_dir, store) = test_store();
        let acct = generic_account(&store);
        let h = Harness::new();
        let sub = h
            .orchestrator(&store)
            .import_statement("empty.csv", "Date,Description,Amount\n", acct)
            .unwrap();
        assert_eq!(sub.status, SubmissionStatus::Completed);
        assert_eq!(sub.transactions_imported, 0);
    }

    #[test]
    fn test_cancelled_before_first_row() {
        let (_dir, store) = test_store();
        let acct = generic_account(&store);
        let h = Harness::new();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = h
            .orchestrator(&store)
            .with_cancel(cancel)
            .import_statement("c.csv", COFFEE_CSV, acct)
            .unwrap_err();
        assert!(matches!(err, CashbookError::Cancelled));
        let sub = last_submission(&store);
        assert_eq!(sub.status, SubmissionStatus::Failed);
        assert_eq!(sub.transactions_imported, 0);
        assert!(store.recent_transactions(10).unwrap().is_empty());
    }

    #[test]
    fn test_inferred_category_from_training_history() {
        let (_dir, store) = test_store();
        let acct = generic_account(&store);
        let h = Harness::new();
        let seed = "Date,Description,Amount\n01/01/2024,Mortgage payment,-1500.00\n01/02/2024,Starbucks run,-4.00\n";
        h.orchestrator(&store).import_statement("seed.csv", seed, acct).unwrap();

        let home = store.category_by_name("Home").unwrap().unwrap().id;
        let food = store.category_by_name("Food").unwrap().unwrap().id;
        for t in store.recent_transactions(10).unwrap() {
            let category = if t.description.starts_with("Mortgage") { home } else { food };
            store.set_transaction_category(t.id.unwrap(), category, true).unwrap();
        }

        let csv = "Date,Description,Amount\n02/03/2024,Starbucks Coffee,-5.25\n02/04/2024,Shell Oil,-40.00\n";
        h.orchestrator(&store).import_statement("feb.csv", csv, acct).unwrap();
        let feb = store.transactions_between("2024-02-01", "2024-02-29").unwrap();
        let unknown = store.category_by_name(UNKNOWN_CATEGORY).unwrap().unwrap().id;
        assert_eq!(feb[0].description, "Starbucks Coffee");
        assert_eq!(feb[0].category_id, food);
        assert_eq!(feb[1].category_id, unknown);
    }

    #[test]
    fn test_balances_import_then_dedup() {
        let (_dir, store) = test_store();
        let acct = store
            .add_account("Savings", LedgerType::Asset, "savings", Some("ally_savings"))
            .unwrap();
        let h = Harness::new();
        let csv = "\
Date,Time,Amount,Type,Description,Balance
2024-03-02,10:00:00,5.00,Deposit,Interest Paid,1005.00
2024-03-01,09:00:00,-20.00,Withdrawal,Transfer out,1000.00
";
        let first = h.orchestrator(&store).import_statement("ally.csv", csv, acct).unwrap();
        assert_eq!(first.balances_imported, 1);
        assert_eq!(first.balances_skipped, 0);
        let second = h.orchestrator(&store).import_statement("ally.csv", csv, acct).unwrap();
        assert_eq!(second.balances_imported, 0);
        assert_eq!(second.balances_skipped, 1);
        assert_eq!(store.balances_through(LedgerType::Asset, "2024-12-31").unwrap().len(), 1);
    }

    #[test]
    fn test_import_file_uses_file_name() {
        let (dir, store) = test_store();
        let acct = generic_account(&store);
        let path = dir.path().join("january.csv");
        std::fs::write(&path, COFFEE_CSV).unwrap();
        let h = Harness::new();
        let sub = h.orchestrator(&store).import_file(&path, acct).unwrap();
        assert_eq!(sub.filename, "january.csv");
        assert_eq!(sub.transactions_imported, 1);
    }

    #[test]
    fn test_concurrent_imports_same_account_dedup_correctly() {
        let (_dir, store) = test_store();
        let acct = generic_account(&store);
        let h = Harness::new();
        let csv = "Date,Description,Amount\n01/15/2024,A,-1.00\n01/16/2024,B,-2.00\n";

        let results: Vec<ImportSubmission> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| s.spawn(|| h.orchestrator(&store).import_statement("c.csv", csv, acct).unwrap()))
                .collect();
            handles.into_iter().map(|j| j.join().unwrap()).collect()
        });
        let imported: i64 = results.iter().map(|s| s.transactions_imported).sum();
        let skipped: i64 = results.iter().map(|s| s.transactions_skipped).sum();
        assert_eq!(imported, 2);
        assert_eq!(skipped, 2);
    }

    #[test]
    fn test_imports_over_separate_connections_dedup_correctly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.db");
        let first = SqliteStore::open(&path).unwrap();
        let second = SqliteStore::open(&path).unwrap();
        let acct = generic_account(&first);
        // Separate lock registries, as in two `cashbook import` processes.
        let (a, b) = (Harness::new(), Harness::new());

        let results: Vec<ImportSubmission> = std::thread::scope(|s| {
            let one = s.spawn(|| a.orchestrator(&first).import_statement("c.csv", THREE_ROWS, acct).unwrap());
            let two = s.spawn(|| b.orchestrator(&second).import_statement("c.csv", THREE_ROWS, acct).unwrap());
            vec![one.join().unwrap(), two.join().unwrap()]
        });
        let imported: i64 = results.iter().map(|s| s.transactions_imported).sum();
        let skipped: i64 = results.iter().map(|s| s.transactions_skipped).sum();
        assert_eq!(imported, 3);
        assert_eq!(skipped, 3);
        assert_eq!(first.recent_transactions(10).unwrap().len(), 3);
    }

    // -- failure injection ---------------------------------------------------

    /// Delegates to a real store but fails (or cancels) after a number of
    /// transaction inserts. Records every submission status it saves.
    struct FlakyStore<'a> {
        inner: &'a SqliteStore,
        inserts_before_fault: usize,
        inserts: Cell<usize>,
        cancel: Option<CancelToken>,
        fail_balances: bool,
        saved: RefCell<Vec<SubmissionStatus>>,
    }

    impl<'a> FlakyStore<'a> {
        fn new(inner: &'a SqliteStore, inserts_before_fault: usize) -> Self {
            Self {
                inner,
                inserts_before_fault,
                inserts: Cell::new(0),
                cancel: None,
                fail_balances: false,
                saved: RefCell::new(Vec::new()),
            }
        }

        /// Saved statuses with consecutive repeats collapsed.
        fn status_history(&self) -> Vec<SubmissionStatus> {
            let mut history = self.saved.borrow().clone();
            history.dedup();
            history
        }
    }

    impl AccountRepository for FlakyStore<'_> {
        fn get_account(&self, id: i64) -> Result<Option<Account>> {
            self.inner.get_account(id)
        }

        fn list_accounts(&self) -> Result<Vec<Account>> {
            self.inner.list_accounts()
        }
    }

    impl TransactionRepository for FlakyStore<'_> {
        fn find_by_fingerprint_excluding_submission(&self, fp: &str, sub: i64) -> Result<Vec<Transaction>> {
            self.inner.find_by_fingerprint_excluding_submission(fp, sub)
        }

        fn upsert_transaction(&self, txn: &Transaction) -> Result<i64> {
            if self.inserts.get() == self.inserts_before_fault {
                match &self.cancel {
                    Some(token) => token.cancel(),
                    None => return Err(CashbookError::Db(rusqlite::Error::InvalidQuery)),
                }
            }
            self.inserts.set(self.inserts.get() + 1);
            self.inner.upsert_transaction(txn)
        }

        fn training_set(&self) -> Result<Vec<TrainingExample>> {
            self.inner.training_set()
        }

        fn transactions_between(&self, start: &str, end: &str) -> Result<Vec<Transaction>> {
            self.inner.transactions_between(start, end)
        }
    }

    impl BalanceRepository for FlakyStore<'_> {
        fn upsert_balance(&self, balance: &Balance) -> Result<i64> {
            if self.fail_balances {
                return Err(CashbookError::Persistence("disk full".to_string()));
            }
            self.inner.upsert_balance(balance)
        }

        fn balance_exists_excluding_submission(&self, a: i64, d: &str, amt: i64, s: i64) -> Result<bool> {
            self.inner.balance_exists_excluding_submission(a, d, amt, s)
        }

        fn balances_through(&self, ledger_type: LedgerType, end: &str) -> Result<Vec<Balance>> {
            self.inner.balances_through(ledger_type, end)
        }
    }

    impl CategoryRepository for FlakyStore<'_> {
        fn category_by_name(&self, name: &str) -> Result<Option<Category>> {
            self.inner.category_by_name(name)
        }

        fn list_categories(&self) -> Result<Vec<Category>> {
            self.inner.list_categories()
        }
    }

    impl SubmissionRepository for FlakyStore<'_> {
        fn upsert_submission(&self, submission: &mut ImportSubmission) -> Result<()> {
            self.saved.borrow_mut().push(submission.status);
            self.inner.upsert_submission(submission)
        }

        fn get_submission(&self, id: i64) -> Result<Option<ImportSubmission>> {
            self.inner.get_submission(id)
        }

        fn list_submissions(&self, limit: usize) -> Result<Vec<ImportSubmission>> {
            self.inner.list_submissions(limit)
        }
    }

    const THREE_ROWS: &str = "Date,Description,Amount\n01/15/2024,A,-1.00\n01/16/2024,B,-2.00\n01/17/2024,C,-3.00\n";

    #[test]
    fn test_persistence_error_mid_statement_keeps_committed_rows() {
        let (_dir, store) = test_store();
        let acct = generic_account(&store);
        let flaky = FlakyStore::new(&store, 1);
        let h = Harness::new();

        let err = h.orchestrator(&flaky).import_statement("f.csv", THREE_ROWS, acct).unwrap_err();
        assert!(matches!(err, CashbookError::Persistence(_)));
        let sub = last_submission(&store);
        assert_eq!(sub.status, SubmissionStatus::Failed);
        assert_eq!(sub.transactions_imported, 1);
        assert_eq!(store.recent_transactions(10).unwrap().len(), 1);
    }

    #[test]
    fn test_cancel_mid_statement_counts_only_persisted_rows() {
        let (_dir, store) = test_store();
        let acct = generic_account(&store);
        let cancel = CancelToken::new();
        let mut flaky = FlakyStore::new(&store, 1);
        flaky.cancel = Some(cancel.clone());
        let h = Harness::new();

        let err = h
            .orchestrator(&flaky)
            .with_cancel(cancel)
            .import_statement("c.csv", THREE_ROWS, acct)
            .unwrap_err();
        assert!(matches!(err, CashbookError::Cancelled));
        let sub = last_submission(&store);
        assert_eq!(sub.status, SubmissionStatus::Failed);
        // The row in flight when the token flipped still lands.
        assert_eq!(sub.transactions_imported, 2);
        assert_eq!(store.recent_transactions(10).unwrap().len(), 2);
    }

    #[test]
    fn test_balance_save_failure_is_not_fatal() {
        let (_dir, store) = test_store();
        let acct = store
            .add_account("Savings", LedgerType::Asset, "savings", Some("ally_savings"))
            .unwrap();
        let mut flaky = FlakyStore::new(&store, usize::MAX);
        flaky.fail_balances = true;
        let h = Harness::new();
        let csv = "Date,Time,Amount,Type,Description,Balance\n2024-03-02,10:00:00,5.00,Deposit,Interest Paid,1005.00\n";

        let sub = h.orchestrator(&flaky).import_statement("ally.csv", csv, acct).unwrap();
        assert_eq!(sub.status, SubmissionStatus::Completed);
        assert_eq!(sub.transactions_imported, 1);
        assert_eq!(sub.balances_imported, 0);
        assert_eq!(sub.balances_skipped, 1);
    }

    #[test]
    fn test_every_status_change_is_saved() {
        let (_dir, store) = test_store();
        let acct = generic_account(&store);
        let flaky = FlakyStore::new(&store, usize::MAX);
        let h = Harness::new();
        let csv = "Date,Description,Amount\n01/15/2024,COFFEE SHOP,-12.34\n01/16/2024,BAGEL,-3.50\n";

        h.orchestrator(&flaky).import_statement("two.csv", csv, acct).unwrap();
        assert_eq!(
            flaky.status_history(),
            vec![SubmissionStatus::Submitted, SubmissionStatus::Processing, SubmissionStatus::Completed]
        );
        // Processing is saved before the first row, then once per row.
        let saved = flaky.saved.borrow();
        assert_eq!(saved.iter().filter(|s| **s == SubmissionStatus::Processing).count(), 3);
    }

    #[test]
    fn test_parse_failure_saves_submitted_then_failed() {
        let (_dir, store) = test_store();
        let acct = generic_account(&store);
        let flaky = FlakyStore::new(&store, usize::MAX);
        let h = Harness::new();
        let csv = "Date,Description,Amount\nnot-a-date,BAD,-2.00\n";

        h.orchestrator(&flaky).import_statement("bad.csv", csv, acct).unwrap_err();
        assert_eq!(
            *flaky.saved.borrow(),
            vec![SubmissionStatus::Submitted, SubmissionStatus::Failed]
        );
    }
}
