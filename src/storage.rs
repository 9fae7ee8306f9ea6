//! Pluggable persistence backends for ledger state.
//!
//! The [`Store`] trait exposes point reads for every entity plus a single
//! [`Store::apply`] call that commits a list of [`Write`]s atomically: either
//! every write lands or none does. Engines never mutate a store directly;
//! they stage writes in a [`UnitOfWork`] and commit it once.

#[cfg(feature = "storage-file")]
mod file;
mod memory;
mod tables;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

#[cfg(feature = "storage-file")]
pub use file::FileStore;
pub use memory::InMemoryStore;
pub(crate) use tables::Tables;

use crate::error::Result;
use crate::models::{
    Account, AccountId, BudgetCategory, BudgetCategoryId, BudgetPeriod, ImportBatch,
    ImportBatchId, MonthlyBudget, OrganizationId, Transaction, TransactionId,
};

/// A single mutation inside an atomic [`Store::apply`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Inserts or replaces an account.
    PutAccount(Account),
    /// Inserts or replaces a transaction. Its account must exist.
    PutTransaction(Transaction),
    /// Removes a transaction. It must exist.
    DeleteTransaction(TransactionId),
    /// Inserts or replaces a budget category.
    PutBudgetCategory(BudgetCategory),
    /// Upserts a monthly budget row. Its category must exist.
    PutMonthlyBudget(MonthlyBudget),
    /// Inserts or replaces an import batch. Its account must exist.
    PutImportBatch(ImportBatch),
}

/// Synchronous storage backend for ledger state.
///
/// All methods take `&self`; implementations use interior mutability for
/// thread-safe mutation. Reads return owned snapshots.
pub trait Store: core::fmt::Debug + Send + Sync {
    /// Returns the account with the given ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to read.
    fn account(&self, id: &AccountId) -> Result<Option<Account>>;

    /// Returns all accounts of an organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to read.
    fn accounts(&self, organization_id: &OrganizationId) -> Result<Vec<Account>>;

    /// Returns the transaction with the given ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to read.
    fn transaction(&self, id: &TransactionId) -> Result<Option<Transaction>>;

    /// Returns all transactions of an organization, ordered by date then
    /// creation time.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to read.
    fn transactions(&self, organization_id: &OrganizationId) -> Result<Vec<Transaction>>;

    /// Returns the transactions linked to `category_id` dated inside
    /// `period`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to read.
    fn category_transactions(
        &self,
        category_id: &BudgetCategoryId,
        period: BudgetPeriod,
    ) -> Result<Vec<Transaction>>;

    /// Returns a transaction on `account_id` with the same date, amount and
    /// description, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to read.
    fn find_duplicate(
        &self,
        account_id: &AccountId,
        date: NaiveDate,
        amount: Decimal,
        description: &str,
    ) -> Result<Option<Transaction>>;

    /// Returns the budget category with the given ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to read.
    fn budget_category(&self, id: &BudgetCategoryId) -> Result<Option<BudgetCategory>>;

    /// Returns all budget categories of an organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to read.
    fn budget_categories(&self, organization_id: &OrganizationId) -> Result<Vec<BudgetCategory>>;

    /// Returns the stored row for a category and month.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to read.
    fn monthly_budget(
        &self,
        category_id: &BudgetCategoryId,
        period: BudgetPeriod,
    ) -> Result<Option<MonthlyBudget>>;

    /// Returns the import batch with the given ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to read.
    fn import_batch(&self, id: &ImportBatchId) -> Result<Option<ImportBatch>>;

    /// Applies all writes atomically.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LedgerError::NotFound`] if a write references a
    /// missing entity, or a storage error if the backend fails. On error no
    /// write has been applied.
    fn apply(&self, writes: Vec<Write>) -> Result<()>;
}

/// Writes staged against a store, with reads that see the staged state.
///
/// Nothing reaches the store until [`UnitOfWork::commit`].
#[derive(Debug)]
pub(crate) struct UnitOfWork<'store, S: Store> {
    /// Backing store.
    store: &'store S,
    /// Staged accounts.
    accounts: BTreeMap<AccountId, Account>,
    /// Staged transactions; `None` marks a deletion.
    transactions: BTreeMap<TransactionId, Option<Transaction>>,
    /// Staged monthly budget rows.
    budgets: BTreeMap<(BudgetCategoryId, BudgetPeriod), MonthlyBudget>,
}

impl<'store, S: Store> UnitOfWork<'store, S> {
    /// Starts an empty unit of work.
    pub(crate) const fn new(store: &'store S) -> Self {
        Self {
            store,
            accounts: BTreeMap::new(),
            transactions: BTreeMap::new(),
            budgets: BTreeMap::new(),
        }
    }

    /// Reads an account, preferring the staged copy.
    pub(crate) fn account(&self, id: &AccountId) -> Result<Option<Account>> {
        match self.accounts.get(id) {
            Some(account) => Ok(Some(account.clone())),
            None => self.store.account(id),
        }
    }

    /// Stages an account.
    pub(crate) fn put_account(&mut self, account: Account) {
        let _old = self.accounts.insert(account.id.clone(), account);
    }

    /// Stages a transaction insert or replace.
    pub(crate) fn put_transaction(&mut self, transaction: Transaction) {
        let _old = self
            .transactions
            .insert(transaction.id.clone(), Some(transaction));
    }

    /// Stages a transaction removal.
    pub(crate) fn delete_transaction(&mut self, id: TransactionId) {
        let _old = self.transactions.insert(id, None);
    }

    /// Transactions of a category and month as they will be after commit.
    pub(crate) fn category_transactions(
        &self,
        category_id: &BudgetCategoryId,
        period: BudgetPeriod,
    ) -> Result<Vec<Transaction>> {
        let mut rows: Vec<Transaction> = self
            .store
            .category_transactions(category_id, period)?
            .into_iter()
            .filter(|tx| !self.transactions.contains_key(&tx.id))
            .collect();
        rows.extend(self.transactions.values().flatten().filter(|tx| {
            tx.budget_category_id.as_ref() == Some(category_id) && period.contains(tx.date)
        }).cloned());
        Ok(rows)
    }

    /// Reads a monthly budget row, preferring the staged copy.
    pub(crate) fn monthly_budget(
        &self,
        category_id: &BudgetCategoryId,
        period: BudgetPeriod,
    ) -> Result<Option<MonthlyBudget>> {
        match self.budgets.get(&(category_id.clone(), period)) {
            Some(row) => Ok(Some(row.clone())),
            None => self.store.monthly_budget(category_id, period),
        }
    }

    /// Stages a monthly budget row.
    pub(crate) fn put_monthly_budget(&mut self, row: MonthlyBudget) {
        let _old = self
            .budgets
            .insert((row.category_id.clone(), row.period), row);
    }

    /// Commits every staged write in one [`Store::apply`] call.
    pub(crate) fn commit(self) -> Result<()> {
        let mut writes = Vec::with_capacity(
            self.accounts.len() + self.transactions.len() + self.budgets.len(),
        );
        writes.extend(self.accounts.into_values().map(Write::PutAccount));
        writes.extend(self.transactions.into_iter().map(|(id, staged)| match staged {
            Some(tx) => Write::PutTransaction(tx),
            None => Write::DeleteTransaction(id),
        }));
        writes.extend(self.budgets.into_values().map(Write::PutMonthlyBudget));
        if writes.is_empty() {
            return Ok(());
        }
        self.store.apply(writes)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Store wrappers for exercising failure paths.

    use core::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::error::LedgerError;

    /// Delegates to an [`InMemoryStore`] but can be told to fail every
    /// `apply` call, or only the next one.
    #[derive(Debug, Default)]
    pub(crate) struct FlakyStore {
        /// Wrapped store.
        pub(crate) inner: InMemoryStore,
        /// When set, `apply` fails without writing.
        pub(crate) fail_apply: AtomicBool,
        /// When set, the next `apply` fails and clears it.
        pub(crate) fail_next: AtomicBool,
    }

    impl FlakyStore {
        /// Makes subsequent `apply` calls fail (or succeed again).
        pub(crate) fn set_failing(&self, failing: bool) {
            self.fail_apply.store(failing, Ordering::SeqCst);
        }

        /// Makes only the next `apply` call fail.
        pub(crate) fn fail_next_apply(&self) {
            self.fail_next.store(true, Ordering::SeqCst);
        }
    }

    impl Store for FlakyStore {
        fn account(&self, id: &AccountId) -> Result<Option<Account>> {
            self.inner.account(id)
        }
        fn accounts(&self, organization_id: &OrganizationId) -> Result<Vec<Account>> {
            self.inner.accounts(organization_id)
        }
        fn transaction(&self, id: &TransactionId) -> Result<Option<Transaction>> {
            self.inner.transaction(id)
        }
        fn transactions(&self, organization_id: &OrganizationId) -> Result<Vec<Transaction>> {
            self.inner.transactions(organization_id)
        }
        fn category_transactions(
            &self,
            category_id: &BudgetCategoryId,
            period: BudgetPeriod,
        ) -> Result<Vec<Transaction>> {
            self.inner.category_transactions(category_id, period)
        }
        fn find_duplicate(
            &self,
            account_id: &AccountId,
            date: NaiveDate,
            amount: Decimal,
            description: &str,
        ) -> Result<Option<Transaction>> {
            self.inner.find_duplicate(account_id, date, amount, description)
        }
        fn budget_category(&self, id: &BudgetCategoryId) -> Result<Option<BudgetCategory>> {
            self.inner.budget_category(id)
        }
        fn budget_categories(
            &self,
            organization_id: &OrganizationId,
        ) -> Result<Vec<BudgetCategory>> {
            self.inner.budget_categories(organization_id)
        }
        fn monthly_budget(
            &self,
            category_id: &BudgetCategoryId,
            period: BudgetPeriod,
        ) -> Result<Option<MonthlyBudget>> {
            self.inner.monthly_budget(category_id, period)
        }
        fn import_batch(&self, id: &ImportBatchId) -> Result<Option<ImportBatch>> {
            self.inner.import_batch(id)
        }
        fn apply(&self, writes: Vec<Write>) -> Result<()> {
            let fail_once = self.fail_next.swap(false, Ordering::SeqCst);
            if fail_once || self.fail_apply.load(Ordering::SeqCst) {
                return Err(LedgerError::Storage("injected failure".into()));
            }
            self.inner.apply(writes)
        }
    }
}
