//! In-memory storage backend.
//!
//! Provides [`InMemoryStore`], a thread-safe in-memory implementation of
//! [`super::Store`]. Ideal for tests and for embedding the engine in a
//! process that persists state elsewhere.

use std::sync::{PoisonError, RwLock};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::{Store, Tables, Write};
use crate::error::{LedgerError, Result};
use crate::models::{
    Account, AccountId, BudgetCategory, BudgetCategoryId, BudgetPeriod, ImportBatch,
    ImportBatchId, MonthlyBudget, OrganizationId, Transaction, TransactionId,
};

/// Thread-safe in-memory store.
///
/// Reads share a read lock; [`Store::apply`] takes the write lock, so an
/// atomic write is never observed half-applied.
///
/// # Example
///
/// ```rust
/// use envelope_ledger::storage::InMemoryStore;
///
/// let store = InMemoryStore::new();
/// // Engine::builder().store(store).build()
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    /// All state behind a single lock.
    inner: RwLock<Tables>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the read lock and applies a closure.
    fn with_read<R, F: FnOnce(&Tables) -> R>(&self, f: F) -> Result<R> {
        let inner = self.inner.read().map_err(|err| lock_error(&err))?;
        Ok(f(&inner))
    }

    /// Acquires the write lock and applies a fallible closure.
    fn with_write<R, F: FnOnce(&mut Tables) -> Result<R>>(&self, f: F) -> Result<R> {
        let mut inner = self.inner.write().map_err(|err| lock_error(&err))?;
        f(&mut inner)
    }
}

/// Wraps a lock poison error.
fn lock_error<T>(err: &PoisonError<T>) -> LedgerError {
    LedgerError::Storage(err.to_string().into())
}

impl Store for InMemoryStore {
    #[inline]
    fn account(&self, id: &AccountId) -> Result<Option<Account>> {
        self.with_read(|tables| tables.account(id))
    }

    #[inline]
    fn accounts(&self, organization_id: &OrganizationId) -> Result<Vec<Account>> {
        self.with_read(|tables| tables.accounts(organization_id))
    }

    #[inline]
    fn transaction(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        self.with_read(|tables| tables.transaction(id))
    }

    #[inline]
    fn transactions(&self, organization_id: &OrganizationId) -> Result<Vec<Transaction>> {
        self.with_read(|tables| tables.transactions(organization_id))
    }

    #[inline]
    fn category_transactions(
        &self,
        category_id: &BudgetCategoryId,
        period: BudgetPeriod,
    ) -> Result<Vec<Transaction>> {
        self.with_read(|tables| tables.category_transactions(category_id, period))
    }

    #[inline]
    fn find_duplicate(
        &self,
        account_id: &AccountId,
        date: NaiveDate,
        amount: Decimal,
        description: &str,
    ) -> Result<Option<Transaction>> {
        self.with_read(|tables| tables.find_duplicate(account_id, date, amount, description))
    }

    #[inline]
    fn budget_category(&self, id: &BudgetCategoryId) -> Result<Option<BudgetCategory>> {
        self.with_read(|tables| tables.budget_category(id))
    }

    #[inline]
    fn budget_categories(&self, organization_id: &OrganizationId) -> Result<Vec<BudgetCategory>> {
        self.with_read(|tables| tables.budget_categories(organization_id))
    }

    #[inline]
    fn monthly_budget(
        &self,
        category_id: &BudgetCategoryId,
        period: BudgetPeriod,
    ) -> Result<Option<MonthlyBudget>> {
        self.with_read(|tables| tables.monthly_budget(category_id, period))
    }

    #[inline]
    fn import_batch(&self, id: &ImportBatchId) -> Result<Option<ImportBatch>> {
        self.with_read(|tables| tables.import_batch(id))
    }

    #[inline]
    fn apply(&self, writes: Vec<Write>) -> Result<()> {
        self.with_write(|tables| tables.apply(writes))
    }
}
