//! Envelope budgeting: categories and their monthly rows.
//!
//! Each (category, month) row stores what was budgeted, the net activity of
//! linked transactions and the carryover read from the previous month:
//!
//! ```text
//! available = budgeted + carryover - activity
//! ```
//!
//! Carryover is read from the previous month's stored row at the moment a
//! row is set or first created. Later edits to that month do not cascade
//! forward until the row is set again.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::error::{LedgerError, Result};
use crate::locks::KeyedLocks;
use crate::models::{
    BudgetCategory, BudgetCategoryId, BudgetLine, BudgetPeriod, MonthlyBudget, OrganizationId,
    Transaction, available,
};
use crate::storage::{Store, UnitOfWork, Write};

/// Lock key for one category in one month.
pub(crate) type BudgetKey = (BudgetCategoryId, BudgetPeriod);

/// Per-organization envelope budget engine.
///
/// Shares its store and budget locks with the [`crate::ledger::Ledger`], so
/// recomputation triggered by a ledger write and an explicit refresh never
/// interleave on the same key.
#[derive(Debug)]
pub struct BudgetEngine<S> {
    /// Backing store.
    store: Arc<S>,
    /// One lock per (category, month).
    locks: Arc<KeyedLocks<BudgetKey>>,
}

impl<S: Store> BudgetEngine<S> {
    /// Creates an engine over `store`.
    #[inline]
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: Arc::default(),
        }
    }

    /// The backing store.
    pub(crate) const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Budget key locks, for callers that recompute inside their own scope.
    pub(crate) const fn locks(&self) -> &Arc<KeyedLocks<BudgetKey>> {
        &self.locks
    }

    /// Creates an envelope category.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] for a blank name, or a storage
    /// error if the write fails.
    #[tracing::instrument(skip_all, fields(organization = %organization_id))]
    pub fn create_category(
        &self,
        organization_id: &OrganizationId,
        name: &str,
        group: Option<&str>,
    ) -> Result<BudgetCategory> {
        let category = BudgetCategory::new(organization_id.clone(), name, group)?;
        self.store
            .apply(vec![Write::PutBudgetCategory(category.clone())])?;
        tracing::debug!(category = %category.id, name = %category.name, "category created");
        Ok(category)
    }

    /// Lists the organization's categories, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to read.
    #[inline]
    pub fn categories(&self, organization_id: &OrganizationId) -> Result<Vec<BudgetCategory>> {
        self.store.budget_categories(organization_id)
    }

    /// Looks up a category and checks that `organization_id` owns it.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if the category does not exist and
    /// [`LedgerError::Forbidden`] if another organization owns it.
    pub fn category(
        &self,
        organization_id: &OrganizationId,
        category_id: &BudgetCategoryId,
    ) -> Result<BudgetCategory> {
        let category = self
            .store
            .budget_category(category_id)?
            .ok_or_else(|| LedgerError::not_found("budget category", category_id))?;
        if category.organization_id != *organization_id {
            return Err(LedgerError::Forbidden(format!(
                "budget category {category_id} belongs to another organization"
            )));
        }
        Ok(category)
    }

    /// Budget overview of one month, one line per category.
    ///
    /// Activity is summed fresh from transactions; budgeted and carryover
    /// come from the stored row, or zero if the month was never set. Nothing
    /// is written.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] if `month` is outside `1..=12`,
    /// or a storage error.
    #[tracing::instrument(skip_all, fields(organization = %organization_id, year, month))]
    pub fn get_monthly_budget(
        &self,
        organization_id: &OrganizationId,
        year: i32,
        month: u32,
    ) -> Result<Vec<BudgetLine>> {
        let period = BudgetPeriod::new(year, month)?;
        self.store
            .budget_categories(organization_id)?
            .into_iter()
            .map(|category| -> Result<BudgetLine> {
                let activity =
                    sum_activity(&self.store.category_transactions(&category.id, period)?);
                let (budgeted, carryover) = self
                    .store
                    .monthly_budget(&category.id, period)?
                    .map_or((Decimal::ZERO, Decimal::ZERO), |row| {
                        (row.budgeted, row.carryover)
                    });
                Ok(BudgetLine {
                    category_id: category.id,
                    category: category.name,
                    group: category.group,
                    budgeted,
                    activity,
                    carryover,
                    available: available(budgeted, carryover, activity),
                })
            })
            .collect()
    }

    /// Stored row for a category and month, if any.
    ///
    /// # Errors
    ///
    /// Same as [`BudgetEngine::category`], plus [`LedgerError::InvalidInput`]
    /// for a bad month.
    #[inline]
    pub fn monthly_budget(
        &self,
        organization_id: &OrganizationId,
        category_id: &BudgetCategoryId,
        year: i32,
        month: u32,
    ) -> Result<Option<MonthlyBudget>> {
        let period = BudgetPeriod::new(year, month)?;
        let _category = self.category(organization_id, category_id)?;
        self.store.monthly_budget(category_id, period)
    }

    /// Allocates `budgeted` to a category for a month.
    ///
    /// Activity is recomputed and carryover re-read from the previous
    /// month's stored row (zero in January or if none), then the row is
    /// upserted.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] for a negative amount or a bad
    /// month, [`LedgerError::NotFound`] for an unknown category and
    /// [`LedgerError::Forbidden`] for another organization's category.
    #[tracing::instrument(skip_all, fields(organization = %organization_id, category = %category_id, year, month))]
    pub fn set_monthly_budget(
        &self,
        organization_id: &OrganizationId,
        category_id: &BudgetCategoryId,
        year: i32,
        month: u32,
        budgeted: Decimal,
    ) -> Result<MonthlyBudget> {
        if budgeted.is_sign_negative() && !budgeted.is_zero() {
            return Err(LedgerError::invalid(format!(
                "budgeted amount must be non-negative, got {budgeted}"
            )));
        }
        let period = BudgetPeriod::new(year, month)?;
        let _category = self.category(organization_id, category_id)?;

        self.locks
            .with_locked(vec![(category_id.clone(), period)], || {
                let mut uow = UnitOfWork::new(&*self.store);
                let activity = sum_activity(&uow.category_transactions(category_id, period)?);
                let carryover = previous_available(&uow, category_id, period)?;
                let row = MonthlyBudget::new(
                    category_id.clone(),
                    organization_id.clone(),
                    period,
                    budgeted,
                    activity,
                    carryover,
                );
                uow.put_monthly_budget(row.clone());
                uow.commit()?;
                tracing::debug!(available = %row.available, "monthly budget set");
                Ok(row)
            })
    }

    /// Re-derives a month's activity from the current transactions and
    /// stores the row.
    ///
    /// # Errors
    ///
    /// Same as [`BudgetEngine::set_monthly_budget`], minus the amount check.
    #[tracing::instrument(skip_all, fields(organization = %organization_id, category = %category_id, year, month))]
    pub fn recompute_activity(
        &self,
        organization_id: &OrganizationId,
        category_id: &BudgetCategoryId,
        year: i32,
        month: u32,
    ) -> Result<MonthlyBudget> {
        let period = BudgetPeriod::new(year, month)?;
        let _category = self.category(organization_id, category_id)?;
        self.locks
            .with_locked(vec![(category_id.clone(), period)], || {
                let mut uow = UnitOfWork::new(&*self.store);
                let row = Self::recompute_in(&mut uow, organization_id, category_id, period)?;
                uow.commit()?;
                Ok(row)
            })
    }

    /// Recomputes a row inside an existing unit of work.
    ///
    /// The caller must hold the budget lock for the key. Budgeted and
    /// carryover of an existing row are kept; a new row takes its carryover
    /// from the previous month's stored row (zero in January).
    pub(crate) fn recompute_in(
        uow: &mut UnitOfWork<'_, S>,
        organization_id: &OrganizationId,
        category_id: &BudgetCategoryId,
        period: BudgetPeriod,
    ) -> Result<MonthlyBudget> {
        let activity = sum_activity(&uow.category_transactions(category_id, period)?);
        let row = match uow.monthly_budget(category_id, period)? {
            Some(existing) => existing.with_activity(activity),
            None => MonthlyBudget::new(
                category_id.clone(),
                organization_id.clone(),
                period,
                Decimal::ZERO,
                activity,
                previous_available(uow, category_id, period)?,
            ),
        };
        tracing::debug!(category = %category_id, period = %period, activity = %activity, "activity recomputed");
        uow.put_monthly_budget(row.clone());
        Ok(row)
    }
}

/// Net activity of a set of category transactions.
fn sum_activity(transactions: &[Transaction]) -> Decimal {
    transactions.iter().map(Transaction::activity_effect).sum()
}

/// Stored `available` of the month before `period`, or zero.
///
/// January always starts from zero; nothing carries across a year boundary.
fn previous_available<T: Store>(
    uow: &UnitOfWork<'_, T>,
    category_id: &BudgetCategoryId,
    period: BudgetPeriod,
) -> Result<Decimal> {
    if period.month == 1 {
        return Ok(Decimal::ZERO);
    }
    Ok(uow
        .monthly_budget(category_id, period.previous())?
        .map_or(Decimal::ZERO, |row| row.available))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    use crate::models::{Account, TransactionId, TransactionKind};
    use crate::storage::InMemoryStore;

    struct Fixture {
        store: Arc<InMemoryStore>,
        engine: BudgetEngine<InMemoryStore>,
        org: OrganizationId,
        account: Account,
        groceries: BudgetCategory,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let engine = BudgetEngine::new(Arc::clone(&store));
        let org = OrganizationId::from("org-1");
        let account = Account::open(org.clone(), "Checking", "USD", dec!(0)).unwrap();
        store.apply(vec![Write::PutAccount(account.clone())]).unwrap();
        let groceries = engine.create_category(&org, "Groceries", Some("Food")).unwrap();
        Fixture {
            store,
            engine,
            org,
            account,
            groceries,
        }
    }

    impl Fixture {
        /// Stores a transaction directly, without touching budget rows.
        fn spend(&self, kind: TransactionKind, amount: Decimal, date: NaiveDate) {
            let now = Utc::now();
            let tx = Transaction {
                id: TransactionId::generate(),
                account_id: self.account.id.clone(),
                organization_id: self.org.clone(),
                kind,
                amount,
                currency: "USD".to_owned(),
                category: None,
                budget_category_id: Some(self.groceries.id.clone()),
                description: "Market".to_owned(),
                date,
                import_batch_id: None,
                classification: None,
                created_at: now,
                updated_at: now,
            };
            self.store.apply(vec![Write::PutTransaction(tx)]).unwrap();
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn carryover_chain() {
        let f = fixture();
        let cat = &f.groceries.id;
        f.spend(TransactionKind::Expense, dec!(40), day(2024, 1, 10));
        let january = f.engine.set_monthly_budget(&f.org, cat, 2024, 1, dec!(100)).unwrap();
        assert_eq!(january.activity, dec!(40));
        assert_eq!(january.available, dec!(60));

        f.spend(TransactionKind::Expense, dec!(20), day(2024, 2, 3));
        let february = f.engine.set_monthly_budget(&f.org, cat, 2024, 2, dec!(100)).unwrap();
        assert_eq!(february.carryover, dec!(60));
        assert_eq!(february.available, dec!(140));
    }

    #[test]
    fn january_starts_without_carryover() {
        let f = fixture();
        let cat = &f.groceries.id;
        let december = f.engine.set_monthly_budget(&f.org, cat, 2023, 12, dec!(75)).unwrap();
        assert_eq!(december.available, dec!(75));
        let january = f.engine.set_monthly_budget(&f.org, cat, 2024, 1, dec!(0)).unwrap();
        assert_eq!(january.carryover, dec!(0));
        assert_eq!(january.available, dec!(0));

        let recomputed = f.engine.recompute_activity(&f.org, cat, 2025, 1).unwrap();
        assert_eq!(recomputed.carryover, dec!(0));
    }

    #[test]
    fn carryover_is_not_cascaded() {
        let f = fixture();
        let cat = &f.groceries.id;
        let _feb = f.engine.set_monthly_budget(&f.org, cat, 2024, 2, dec!(50)).unwrap();
        let _jan = f.engine.set_monthly_budget(&f.org, cat, 2024, 1, dec!(30)).unwrap();
        let february = f.engine.monthly_budget(&f.org, cat, 2024, 2).unwrap().unwrap();
        assert_eq!(february.carryover, dec!(0));

        let refreshed = f.engine.set_monthly_budget(&f.org, cat, 2024, 2, dec!(50)).unwrap();
        assert_eq!(refreshed.carryover, dec!(30));
    }

    #[test]
    fn tagged_income_reduces_activity_and_transfer_is_ignored() {
        let f = fixture();
        f.spend(TransactionKind::Expense, dec!(80), day(2024, 5, 1));
        f.spend(TransactionKind::Income, dec!(30), day(2024, 5, 2));
        f.spend(TransactionKind::Transfer, dec!(500), day(2024, 5, 3));
        let row = f
            .engine
            .recompute_activity(&f.org, &f.groceries.id, 2024, 5)
            .unwrap();
        assert_eq!(row.activity, dec!(50));
        assert_eq!(row.available, dec!(-50));
    }

    #[test]
    fn recompute_keeps_budgeted_and_is_idempotent() {
        let f = fixture();
        let cat = &f.groceries.id;
        let _set = f.engine.set_monthly_budget(&f.org, cat, 2024, 3, dec!(200)).unwrap();
        f.spend(TransactionKind::Expense, dec!(25.50), day(2024, 3, 15));
        let first = f.engine.recompute_activity(&f.org, cat, 2024, 3).unwrap();
        let second = f.engine.recompute_activity(&f.org, cat, 2024, 3).unwrap();
        assert_eq!(first.budgeted, dec!(200));
        assert_eq!(first.available, dec!(174.50));
        assert_eq!(second.activity, first.activity);
        assert_eq!(second.available, first.available);
    }

    #[test]
    fn overview_is_a_pure_read() {
        let f = fixture();
        let bills = f.engine.create_category(&f.org, "Bills", None).unwrap();
        f.spend(TransactionKind::Expense, dec!(12), day(2024, 4, 9));
        let lines = f.engine.get_monthly_budget(&f.org, 2024, 4).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].category, "Bills");
        assert_eq!(lines[0].available, dec!(0));
        assert_eq!(lines[1].category, "Groceries");
        assert_eq!(lines[1].activity, dec!(12));
        assert_eq!(lines[1].available, dec!(-12));
        let period = BudgetPeriod::new(2024, 4).unwrap();
        assert!(f.store.monthly_budget(&bills.id, period).unwrap().is_none());
        assert!(f.store.monthly_budget(&f.groceries.id, period).unwrap().is_none());
    }

    #[test]
    fn rejects_bad_input() {
        let f = fixture();
        let cat = &f.groceries.id;
        assert!(matches!(
            f.engine.set_monthly_budget(&f.org, cat, 2024, 1, dec!(-1)),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            f.engine.set_monthly_budget(&f.org, cat, 2024, 13, dec!(1)),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            f.engine.get_monthly_budget(&f.org, 2024, 0),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            f.engine.set_monthly_budget(&f.org, &"missing".into(), 2024, 1, dec!(1)),
            Err(LedgerError::NotFound { .. })
        ));
        assert!(matches!(
            f.engine.set_monthly_budget(&"org-2".into(), cat, 2024, 1, dec!(1)),
            Err(LedgerError::Forbidden(_))
        ));
        assert!(matches!(
            f.engine.create_category(&f.org, "  ", None),
            Err(LedgerError::InvalidInput(_))
        ));
    }
}
