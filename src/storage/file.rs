//! JSON-file-based storage backend.
//!
//! Persists the whole ledger as a single JSON snapshot under a configurable
//! directory (default: `$XDG_DATA_HOME/envelope-ledger/`).

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::{Store, Tables, Write};
use crate::error::{LedgerError, Result};
use crate::models::{
    Account, AccountId, BudgetCategory, BudgetCategoryId, BudgetPeriod, ImportBatch,
    ImportBatchId, MonthlyBudget, OrganizationId, Transaction, TransactionId,
};

/// Application name used for the XDG data directory.
const APP_NAME: &str = "envelope-ledger";

/// File holding the ledger snapshot.
const SNAPSHOT_FILE: &str = "ledger.json";
/// Temporary file the next snapshot is written to before the rename.
const SNAPSHOT_TMP_FILE: &str = "ledger.json.tmp";
/// Sentinel file used for cross-process file locking.
const LOCK_FILE: &str = "storage.lock";

/// File-backed store that persists every entity in one JSON snapshot.
///
/// # Atomicity
///
/// [`Store::apply`] loads the snapshot, applies the writes in memory, and
/// replaces the file with write-to-tmp then rename. A failed apply leaves
/// the previous snapshot in place.
///
/// # Concurrency
///
/// Thread safety within a single process is provided by an in-process
/// [`Mutex`]. Cross-process safety is achieved via an advisory file lock
/// on `storage.lock`: reads take a shared lock, [`Store::apply`] takes an
/// exclusive one.
///
/// # File layout
///
/// ```text
/// <dir>/
///   storage.lock          (cross-process lock sentinel)
///   ledger.json
/// ```
#[derive(Debug)]
pub struct FileStore {
    /// Root directory.
    dir: PathBuf,
    /// Mutex serializing concurrent in-process access.
    lock: Mutex<()>,
    /// Sentinel file for cross-process advisory locking.
    lock_file: fs::File,
}

impl FileStore {
    /// Creates a store rooted at the given directory.
    ///
    /// Creates the directory (and parents) if it does not exist, and opens
    /// (or creates) the `storage.lock` sentinel file.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the lock
    /// file cannot be opened.
    #[inline]
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).map_err(storage_io_error)?;
        let lock_file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))
            .map_err(storage_io_error)?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
            lock_file,
        })
    }

    /// Returns the default XDG-compliant data directory for this application.
    ///
    /// On Linux: `$XDG_DATA_HOME/envelope-ledger/` (typically
    /// `~/.local/share/envelope-ledger/`).
    ///
    /// # Errors
    ///
    /// Returns an error if the platform data directory cannot be determined.
    #[inline]
    pub fn default_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|data_path| data_path.join(APP_NAME))
            .ok_or_else(|| {
                LedgerError::Storage("could not determine platform data directory".into())
            })
    }

    /// Acquires the in-process guard and a shared file lock, runs `op`,
    /// then releases the file lock.
    fn with_shared_lock<R, F: FnOnce() -> Result<R>>(&self, op: F) -> Result<R> {
        let _guard: MutexGuard<'_, ()> = self.lock.lock().map_err(|err| lock_poison_error(&err))?;
        self.lock_file.lock_shared().map_err(storage_io_error)?;
        let result = op();
        if let Err(err) = self.lock_file.unlock()
            && result.is_ok()
        {
            return Err(storage_io_error(err));
        }
        result
    }

    /// Acquires the in-process guard and an exclusive file lock, runs
    /// `op`, then releases the file lock.
    fn with_exclusive_lock<R, F: FnOnce() -> Result<R>>(&self, op: F) -> Result<R> {
        let _guard: MutexGuard<'_, ()> = self.lock.lock().map_err(|err| lock_poison_error(&err))?;
        self.lock_file.lock().map_err(storage_io_error)?;
        let result = op();
        if let Err(err) = self.lock_file.unlock()
            && result.is_ok()
        {
            return Err(storage_io_error(err));
        }
        result
    }

    /// Loads the snapshot; a missing file is an empty ledger.
    fn load(&self) -> Result<Tables> {
        match fs::read_to_string(self.dir.join(SNAPSHOT_FILE)) {
            Ok(contents) => serde_json::from_str(&contents).map_err(LedgerError::from),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Tables::default()),
            Err(err) => Err(storage_io_error(err)),
        }
    }

    /// Atomically replaces the snapshot (write-to-tmp then rename).
    fn save(&self, tables: &Tables) -> Result<()> {
        let tmp_path = self.dir.join(SNAPSHOT_TMP_FILE);
        let json = serde_json::to_string_pretty(tables)?;
        fs::write(&tmp_path, json).map_err(storage_io_error)?;
        fs::rename(&tmp_path, self.dir.join(SNAPSHOT_FILE)).map_err(storage_io_error)?;
        Ok(())
    }

    /// Runs a read against a freshly loaded snapshot.
    fn read<R, F: FnOnce(&Tables) -> R>(&self, f: F) -> Result<R> {
        self.with_shared_lock(|| self.load().map(|tables| f(&tables)))
    }
}

/// Wraps an I/O error into a [`LedgerError::Storage`].
fn storage_io_error(err: std::io::Error) -> LedgerError {
    LedgerError::Storage(Box::new(err))
}

/// Wraps a mutex poison error into a [`LedgerError::Storage`].
fn lock_poison_error<T>(err: &PoisonError<T>) -> LedgerError {
    LedgerError::Storage(err.to_string().into())
}

impl Store for FileStore {
    #[inline]
    fn account(&self, id: &AccountId) -> Result<Option<Account>> {
        self.read(|tables| tables.account(id))
    }

    #[inline]
    fn accounts(&self, organization_id: &OrganizationId) -> Result<Vec<Account>> {
        self.read(|tables| tables.accounts(organization_id))
    }

    #[inline]
    fn transaction(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        self.read(|tables| tables.transaction(id))
    }

    #[inline]
    fn transactions(&self, organization_id: &OrganizationId) -> Result<Vec<Transaction>> {
        self.read(|tables| tables.transactions(organization_id))
    }

    #[inline]
    fn category_transactions(
        &self,
        category_id: &BudgetCategoryId,
        period: BudgetPeriod,
    ) -> Result<Vec<Transaction>> {
        self.read(|tables| tables.category_transactions(category_id, period))
    }

    #[inline]
    fn find_duplicate(
        &self,
        account_id: &AccountId,
        date: NaiveDate,
        amount: Decimal,
        description: &str,
    ) -> Result<Option<Transaction>> {
        self.read(|tables| tables.find_duplicate(account_id, date, amount, description))
    }

    #[inline]
    fn budget_category(&self, id: &BudgetCategoryId) -> Result<Option<BudgetCategory>> {
        self.read(|tables| tables.budget_category(id))
    }

    #[inline]
    fn budget_categories(&self, organization_id: &OrganizationId) -> Result<Vec<BudgetCategory>> {
        self.read(|tables| tables.budget_categories(organization_id))
    }

    #[inline]
    fn monthly_budget(
        &self,
        category_id: &BudgetCategoryId,
        period: BudgetPeriod,
    ) -> Result<Option<MonthlyBudget>> {
        self.read(|tables| tables.monthly_budget(category_id, period))
    }

    #[inline]
    fn import_batch(&self, id: &ImportBatchId) -> Result<Option<ImportBatch>> {
        self.read(|tables| tables.import_batch(id))
    }

    #[inline]
    fn apply(&self, writes: Vec<Write>) -> Result<()> {
        self.with_exclusive_lock(|| {
            let mut tables = self.load()?;
            tables.apply(writes)?;
            self.save(&tables)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    /// Helper to create a [`FileStore`] in a temporary directory.
    fn temp_store() -> (FileStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();
        (store, dir)
    }

    #[test]
    fn empty_store_reads_empty() {
        let (store, _dir) = temp_store();
        assert!(store.accounts(&"org".into()).unwrap().is_empty());
        assert!(store.transaction(&"t".into()).unwrap().is_none());
    }

    #[test]
    fn apply_persists_across_instances() {
        let (store, dir) = temp_store();
        let account = Account::open("org".into(), "Checking", "USD", dec!(42.10)).unwrap();
        store.apply(vec![Write::PutAccount(account.clone())]).unwrap();
        drop(store);

        let reopened = FileStore::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(reopened.account(&account.id).unwrap(), Some(account));
    }

    #[test]
    fn rejected_apply_keeps_previous_snapshot() {
        let (store, dir) = temp_store();
        let account = Account::open("org".into(), "Checking", "USD", dec!(1)).unwrap();
        store.apply(vec![Write::PutAccount(account)]).unwrap();
        let before = fs::read_to_string(dir.path().join(SNAPSHOT_FILE)).unwrap();

        let err = store
            .apply(vec![Write::DeleteTransaction("missing".into())])
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
        let after = fs::read_to_string(dir.path().join(SNAPSHOT_FILE)).unwrap();
        assert_eq!(before, after);
        assert!(!dir.path().join(SNAPSHOT_TMP_FILE).exists());
    }

    #[test]
    fn corrupt_snapshot_is_serialization_error() {
        let (store, dir) = temp_store();
        fs::write(dir.path().join(SNAPSHOT_FILE), "{not json").unwrap();
        let err = store.accounts(&"org".into()).unwrap_err();
        assert!(matches!(err, LedgerError::Serialization(_)));
    }
}
