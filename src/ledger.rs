//! Authoritative transaction store and account balances.
//!
//! Every write goes through one atomic [`UnitOfWork`]: the transaction row,
//! the account balance and the affected envelope activity land together or
//! not at all. Writes to one account are serialized by a per-account lock;
//! budget keys are locked after it, in sorted order. Nothing is awaited
//! while a lock is held: auto-classification runs before locking.

mod filter;

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

pub use filter::TransactionFilter;

use crate::budget::{BudgetEngine, BudgetKey};
use crate::cache::CacheProvider;
use crate::classifier::{ClassificationEngine, ExternalClassifier, NoExternalClassifier};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::locks::KeyedLocks;
use crate::models::{
    Account, AccountId, BudgetPeriod, ClassificationInput, NewTransaction, OrganizationId,
    Transaction, TransactionId, TransactionPatch, affects_activity, normalize_currency,
};
use crate::storage::{Store, UnitOfWork, Write};

/// Balance check of one account against its transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Account that was checked.
    pub account_id: AccountId,
    /// Balance stored on the account.
    pub recorded_balance: Decimal,
    /// Initial balance plus the effect of every live transaction.
    pub calculated_balance: Decimal,
    /// `recorded_balance - calculated_balance`.
    pub difference: Decimal,
    /// Number of transactions on the account.
    pub transaction_count: usize,
}

impl Reconciliation {
    /// Whether the stored balance matches the transactions.
    #[inline]
    #[must_use]
    pub const fn is_reconciled(&self) -> bool {
        self.difference.is_zero()
    }
}

/// Outcome of an insert that may skip duplicates.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Inserted {
    /// The transaction was committed.
    Created(Transaction),
    /// An identical transaction already exists.
    Duplicate(TransactionId),
}

/// Transaction ledger for all organizations in a store.
#[derive(Debug)]
pub struct Ledger<S, C, X = NoExternalClassifier> {
    /// Backing store, shared with the budget engine.
    store: Arc<S>,
    /// Envelope budget engine.
    budget: Arc<BudgetEngine<S>>,
    /// Classifier used for transactions created without a category.
    classifier: Arc<ClassificationEngine<C, X>>,
    /// Ledger settings.
    config: LedgerConfig,
    /// One lock per account.
    account_locks: KeyedLocks<AccountId>,
}

impl<S: Store, C: CacheProvider, X: ExternalClassifier> Ledger<S, C, X> {
    /// Creates a ledger over the budget engine's store.
    #[inline]
    #[must_use]
    pub fn new(
        budget: Arc<BudgetEngine<S>>,
        classifier: Arc<ClassificationEngine<C, X>>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store: Arc::clone(budget.store()),
            budget,
            classifier,
            config,
            account_locks: KeyedLocks::default(),
        }
    }

    /// The backing store.
    pub(crate) const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The budget engine this ledger keeps up to date.
    pub(crate) const fn budget(&self) -> &Arc<BudgetEngine<S>> {
        &self.budget
    }

    /// The classifier used for uncategorized transactions.
    pub(crate) const fn classifier(&self) -> &Arc<ClassificationEngine<C, X>> {
        &self.classifier
    }

    /// Opens an account whose balance starts at `initial_balance`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] for a blank name or a bad
    /// currency code, or a storage error if the write fails.
    #[tracing::instrument(skip_all, fields(organization = %organization_id))]
    pub fn open_account(
        &self,
        organization_id: &OrganizationId,
        name: &str,
        currency: &str,
        initial_balance: Decimal,
    ) -> Result<Account> {
        let account = Account::open(organization_id.clone(), name, currency, initial_balance)?;
        self.store.apply(vec![Write::PutAccount(account.clone())])?;
        tracing::info!(account = %account.id, currency = %account.currency, "account opened");
        Ok(account)
    }

    /// Returns an account of the organization.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if the account does not exist or
    /// belongs to another organization.
    #[inline]
    pub fn account(&self, organization_id: &OrganizationId, id: &AccountId) -> Result<Account> {
        self.store
            .account(id)?
            .filter(|account| account.organization_id == *organization_id)
            .ok_or_else(|| LedgerError::not_found("account", id))
    }

    /// Lists the organization's accounts, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to read.
    #[inline]
    pub fn accounts(&self, organization_id: &OrganizationId) -> Result<Vec<Account>> {
        self.store.accounts(organization_id)
    }

    /// Returns a transaction of the organization.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if the transaction does not exist
    /// or belongs to another organization.
    #[inline]
    pub fn transaction(
        &self,
        organization_id: &OrganizationId,
        id: &TransactionId,
    ) -> Result<Transaction> {
        self.store
            .transaction(id)?
            .filter(|tx| tx.organization_id == *organization_id)
            .ok_or_else(|| LedgerError::not_found("transaction", id))
    }

    /// Lists the organization's transactions matching `filter`, ordered by
    /// date.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to read.
    #[inline]
    pub fn transactions(
        &self,
        organization_id: &OrganizationId,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>> {
        Ok(self
            .store
            .transactions(organization_id)?
            .into_iter()
            .filter(|tx| filter.matches(tx))
            .collect())
    }

    /// Records a transaction.
    ///
    /// A transaction without a category is classified first when
    /// auto-classification is enabled. The row, the balance change and the
    /// envelope activity are then committed together.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] for a negative amount or a
    /// currency other than the account's, [`LedgerError::NotFound`] for an
    /// unknown account or envelope, [`LedgerError::Forbidden`] for another
    /// organization's envelope, or a storage error. On error nothing is
    /// written.
    #[tracing::instrument(skip_all, fields(organization = %input.organization_id, account = %input.account_id))]
    pub async fn create_transaction(&self, input: NewTransaction) -> Result<Transaction> {
        let draft = self.prepare(input).await?;
        match self.insert(draft, false)? {
            Inserted::Created(tx) => Ok(tx),
            Inserted::Duplicate(existing) => Err(LedgerError::invalid(format!(
                "duplicate of transaction {existing}"
            ))),
        }
    }

    /// Records a transaction unless `skip_duplicates` is set and an
    /// identical one exists on the account.
    pub(crate) async fn create_unless_duplicate(
        &self,
        input: NewTransaction,
        skip_duplicates: bool,
    ) -> Result<Inserted> {
        let draft = self.prepare(input).await?;
        self.insert(draft, skip_duplicates)
    }

    /// Applies a partial update.
    ///
    /// The account moves by the difference of the new and old balance
    /// effects. If date, amount, kind or envelope changed, both the old and
    /// the new envelope month are recomputed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if the transaction or its account
    /// no longer exists, plus the validation errors of
    /// [`Ledger::create_transaction`]. On error nothing is written.
    #[tracing::instrument(skip_all, fields(organization = %organization_id, transaction = %id))]
    pub fn update_transaction(
        &self,
        organization_id: &OrganizationId,
        id: &TransactionId,
        patch: &TransactionPatch,
    ) -> Result<Transaction> {
        patch.validate()?;
        let current = self.transaction(organization_id, id)?;
        if let Some(category_id) = patch.budget_category_id.as_ref().and_then(Option::as_ref) {
            let _category = self.budget.category(organization_id, category_id)?;
        }

        self.account_locks
            .with_locked(vec![current.account_id], || {
                let before = self.transaction(organization_id, id)?;
                let after = patch.apply_to(&before, Utc::now());
                let mut keys: Vec<BudgetKey> = Vec::new();
                if affects_activity(&before, &after) {
                    keys.extend(budget_key(&before));
                    keys.extend(budget_key(&after));
                    keys.sort();
                    keys.dedup();
                }
                self.budget.locks().with_locked(keys.clone(), || {
                    let mut uow = UnitOfWork::new(&*self.store);
                    let mut account = uow
                        .account(&before.account_id)?
                        .ok_or_else(|| LedgerError::not_found("account", &before.account_id))?;
                    account.balance += after.balance_effect() - before.balance_effect();
                    tracing::debug!(balance = %account.balance, "balance adjusted");
                    uow.put_account(account);
                    uow.put_transaction(after.clone());
                    Self::recompute(&mut uow, organization_id, &keys)?;
                    uow.commit()?;
                    Ok(after)
                })
            })
    }

    /// Removes a transaction and reverses its effects. Returns the removed
    /// row.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if the transaction (or its account)
    /// does not exist, including when it was already deleted.
    #[tracing::instrument(skip_all, fields(organization = %organization_id, transaction = %id))]
    pub fn delete_transaction(
        &self,
        organization_id: &OrganizationId,
        id: &TransactionId,
    ) -> Result<Transaction> {
        let current = self.transaction(organization_id, id)?;
        self.account_locks
            .with_locked(vec![current.account_id], || {
                let removed = self.transaction(organization_id, id)?;
                let keys: Vec<BudgetKey> = budget_key(&removed).into_iter().collect();
                self.budget.locks().with_locked(keys.clone(), || {
                    let mut uow = UnitOfWork::new(&*self.store);
                    let mut account = uow
                        .account(&removed.account_id)?
                        .ok_or_else(|| LedgerError::not_found("account", &removed.account_id))?;
                    account.balance -= removed.balance_effect();
                    uow.put_account(account);
                    uow.delete_transaction(removed.id.clone());
                    Self::recompute(&mut uow, organization_id, &keys)?;
                    uow.commit()?;
                    Ok(removed)
                })
            })
    }

    /// Compares an account's stored balance with its transactions.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] for an unknown account.
    #[tracing::instrument(skip_all, fields(organization = %organization_id, account = %account_id))]
    pub fn reconcile(
        &self,
        organization_id: &OrganizationId,
        account_id: &AccountId,
    ) -> Result<Reconciliation> {
        self.account_locks.with_locked(vec![account_id.clone()], || {
            let account = self.account(organization_id, account_id)?;
            let transactions = self.transactions(
                organization_id,
                &TransactionFilter::new().account(account_id.clone()),
            )?;
            let calculated_balance = account.initial_balance
                + transactions
                    .iter()
                    .map(Transaction::balance_effect)
                    .sum::<Decimal>();
            let difference = account.balance - calculated_balance;
            if !difference.is_zero() {
                tracing::warn!(difference = %difference, "account balance drifted from transactions");
            }
            Ok(Reconciliation {
                account_id: account.id,
                recorded_balance: account.balance,
                calculated_balance,
                difference,
                transaction_count: transactions.len(),
            })
        })
    }

    /// Validates the input and builds the row to insert.
    async fn prepare(&self, input: NewTransaction) -> Result<Transaction> {
        input.validate()?;
        let account = self.account(&input.organization_id, &input.account_id)?;
        if let Some(currency) = input.currency.as_deref() {
            let currency = normalize_currency(currency)?;
            if currency != account.currency {
                return Err(LedgerError::invalid(format!(
                    "transaction currency {currency} does not match account currency {}",
                    account.currency
                )));
            }
        }
        if let Some(category_id) = input.budget_category_id.as_ref() {
            let _category = self.budget.category(&input.organization_id, category_id)?;
        }

        let (category, classification) = match (input.category, input.classification) {
            (Some(category), classification) => (Some(category.trim().to_owned()), classification),
            (None, Some(result)) => (Some(result.category.clone()), Some(result)),
            (None, None) if self.config.auto_classify => {
                let request = ClassificationInput::new(
                    input.description.clone(),
                    input.amount,
                    input.kind,
                );
                let result = self
                    .classifier
                    .classify(&input.organization_id, &request)
                    .await;
                (Some(result.category.clone()), Some(result))
            }
            (None, None) => (None, None),
        };

        let now = Utc::now();
        Ok(Transaction {
            id: TransactionId::generate(),
            account_id: account.id,
            organization_id: input.organization_id,
            kind: input.kind,
            amount: input.amount,
            currency: account.currency,
            category,
            budget_category_id: input.budget_category_id,
            description: input.description,
            date: input.date,
            import_batch_id: input.import_batch_id,
            classification,
            created_at: now,
            updated_at: now,
        })
    }

    /// Commits a prepared row under the account and budget locks.
    fn insert(&self, tx: Transaction, skip_duplicates: bool) -> Result<Inserted> {
        self.account_locks
            .with_locked(vec![tx.account_id.clone()], || {
                if skip_duplicates
                    && let Some(existing) = self.store.find_duplicate(
                        &tx.account_id,
                        tx.date,
                        tx.amount,
                        &tx.description,
                    )?
                {
                    tracing::debug!(existing = %existing.id, "duplicate skipped");
                    return Ok(Inserted::Duplicate(existing.id));
                }
                let keys: Vec<BudgetKey> = budget_key(&tx).into_iter().collect();
                self.budget.locks().with_locked(keys.clone(), || {
                    let mut uow = UnitOfWork::new(&*self.store);
                    let mut account = uow
                        .account(&tx.account_id)?
                        .ok_or_else(|| LedgerError::not_found("account", &tx.account_id))?;
                    account.balance += tx.balance_effect();
                    uow.put_account(account);
                    uow.put_transaction(tx.clone());
                    Self::recompute(&mut uow, &tx.organization_id, &keys)?;
                    uow.commit()?;
                    tracing::debug!(transaction = %tx.id, "transaction recorded");
                    Ok(Inserted::Created(tx))
                })
            })
    }

    /// Recomputes every budget key inside `uow`.
    fn recompute(
        uow: &mut UnitOfWork<'_, S>,
        organization_id: &OrganizationId,
        keys: &[BudgetKey],
    ) -> Result<()> {
        for key in keys {
            let _row = BudgetEngine::recompute_in(uow, organization_id, &key.0, key.1)?;
        }
        Ok(())
    }
}

/// Budget key a transaction contributes to, if it is linked to an envelope.
fn budget_key(tx: &Transaction) -> Option<BudgetKey> {
    tx.budget_category_id
        .clone()
        .map(|id| (id, BudgetPeriod::from_date(tx.date)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use crate::cache::InMemoryCache;
    use crate::config::ClassificationConfig;
    use crate::models::{BudgetCategory, ClassificationSource, TransactionKind};
    use crate::storage::InMemoryStore;
    use crate::storage::testing::FlakyStore;

    struct Fixture<S> {
        store: Arc<S>,
        budget: Arc<BudgetEngine<S>>,
        ledger: Ledger<S, InMemoryCache>,
        org: OrganizationId,
        account: Account,
        food: BudgetCategory,
    }

    fn fixture_with<S: Store>(store: S, config: LedgerConfig) -> Fixture<S> {
        let store = Arc::new(store);
        let budget = Arc::new(BudgetEngine::new(Arc::clone(&store)));
        let classifier = Arc::new(
            ClassificationEngine::new(
                InMemoryCache::new(),
                NoExternalClassifier,
                ClassificationConfig::default(),
            )
            .unwrap(),
        );
        let ledger = Ledger::new(Arc::clone(&budget), classifier, config);
        let org = OrganizationId::from("org-1");
        let account = ledger
            .open_account(&org, "Checking", "usd", dec!(1000))
            .unwrap();
        let food = budget.create_category(&org, "Food", None).unwrap();
        Fixture {
            store,
            budget,
            ledger,
            org,
            account,
            food,
        }
    }

    fn fixture() -> Fixture<InMemoryStore> {
        fixture_with(InMemoryStore::new(), LedgerConfig::default())
    }

    fn march(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    impl<S: Store> Fixture<S> {
        fn new_tx(&self, kind: TransactionKind, amount: Decimal, day: u32) -> NewTransaction {
            NewTransaction::new(
                self.org.clone(),
                self.account.id.clone(),
                kind,
                amount,
                march(day),
                "Weekly shop",
            )
            .category("Groceries")
        }

        fn balance(&self) -> Decimal {
            self.ledger.account(&self.org, &self.account.id).unwrap().balance
        }

        fn activity(&self, month: u32) -> Option<Decimal> {
            self.budget
                .monthly_budget(&self.org, &self.food.id, 2024, month)
                .unwrap()
                .map(|row| row.activity)
        }
    }

    #[tokio::test]
    async fn balance_follows_every_write() {
        let f = fixture();
        let salary = f
            .ledger
            .create_transaction(f.new_tx(TransactionKind::Income, dec!(500), 1))
            .await
            .unwrap();
        let rent = f
            .ledger
            .create_transaction(f.new_tx(TransactionKind::Expense, dec!(300), 2))
            .await
            .unwrap();
        let _transfer = f
            .ledger
            .create_transaction(f.new_tx(TransactionKind::Transfer, dec!(50), 3))
            .await
            .unwrap();
        assert_eq!(f.balance(), dec!(1200));

        let _updated = f
            .ledger
            .update_transaction(&f.org, &rent.id, &TransactionPatch::new().kind(TransactionKind::Income))
            .unwrap();
        assert_eq!(f.balance(), dec!(1800));
        let _removed = f.ledger.delete_transaction(&f.org, &salary.id).unwrap();
        assert_eq!(f.balance(), dec!(1300));

        let check = f.ledger.reconcile(&f.org, &f.account.id).unwrap();
        assert!(check.is_reconciled());
        assert_eq!(check.calculated_balance, dec!(1300));
        assert_eq!(check.transaction_count, 2);
    }

    #[tokio::test]
    async fn update_applies_the_delta() {
        let f = fixture();
        let tx = f
            .ledger
            .create_transaction(
                f.new_tx(TransactionKind::Expense, dec!(100), 5).budget_category(f.food.id.clone()),
            )
            .await
            .unwrap();
        assert_eq!(f.balance(), dec!(900));
        assert_eq!(f.activity(3), Some(dec!(100)));

        let updated = f
            .ledger
            .update_transaction(&f.org, &tx.id, &TransactionPatch::new().amount(dec!(150)))
            .unwrap();
        assert_eq!(updated.amount, dec!(150));
        assert_eq!(f.balance(), dec!(850));
        assert_eq!(f.activity(3), Some(dec!(150)));
    }

    #[tokio::test]
    async fn moving_a_transaction_recomputes_both_months() {
        let f = fixture();
        let tx = f
            .ledger
            .create_transaction(
                f.new_tx(TransactionKind::Expense, dec!(40), 30).budget_category(f.food.id.clone()),
            )
            .await
            .unwrap();
        let _moved = f
            .ledger
            .update_transaction(
                &f.org,
                &tx.id,
                &TransactionPatch::new().date(NaiveDate::from_ymd_opt(2024, 4, 2).unwrap()),
            )
            .unwrap();
        assert_eq!(f.activity(3), Some(dec!(0)));
        assert_eq!(f.activity(4), Some(dec!(40)));

        let _unlinked = f
            .ledger
            .update_transaction(&f.org, &tx.id, &TransactionPatch::new().budget_category(None))
            .unwrap();
        assert_eq!(f.activity(4), Some(dec!(0)));
        assert_eq!(f.balance(), dec!(960));
    }

    #[tokio::test]
    async fn description_edit_leaves_budget_alone() {
        let f = fixture();
        let tx = f
            .ledger
            .create_transaction(f.new_tx(TransactionKind::Expense, dec!(10), 1))
            .await
            .unwrap();
        let updated = f
            .ledger
            .update_transaction(&f.org, &tx.id, &TransactionPatch::new().description("Bakery"))
            .unwrap();
        assert_eq!(updated.description, "Bakery");
        assert_eq!(f.balance(), dec!(990));
        assert!(f.activity(3).is_none());
    }

    #[tokio::test]
    async fn delete_reverses_and_is_not_repeatable() {
        let f = fixture();
        let tx = f
            .ledger
            .create_transaction(
                f.new_tx(TransactionKind::Expense, dec!(75), 9).budget_category(f.food.id.clone()),
            )
            .await
            .unwrap();
        let removed = f.ledger.delete_transaction(&f.org, &tx.id).unwrap();
        assert_eq!(removed.id, tx.id);
        assert_eq!(f.balance(), dec!(1000));
        assert_eq!(f.activity(3), Some(dec!(0)));

        let again = f.ledger.delete_transaction(&f.org, &tx.id);
        assert!(matches!(again, Err(LedgerError::NotFound { entity: "transaction", .. })));
        assert_eq!(f.balance(), dec!(1000));
    }

    #[tokio::test]
    async fn negative_amount_changes_nothing() {
        let f = fixture();
        let err = f
            .ledger
            .create_transaction(f.new_tx(TransactionKind::Expense, dec!(-10), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
        assert_eq!(f.balance(), dec!(1000));
        assert!(f.ledger.transactions(&f.org, &TransactionFilter::new()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_commit_rolls_everything_back() {
        let f = fixture_with(FlakyStore::default(), LedgerConfig::default());
        let kept = f
            .ledger
            .create_transaction(
                f.new_tx(TransactionKind::Expense, dec!(20), 3).budget_category(f.food.id.clone()),
            )
            .await
            .unwrap();
        f.store.set_failing(true);

        let create = f
            .ledger
            .create_transaction(
                f.new_tx(TransactionKind::Expense, dec!(5), 4).budget_category(f.food.id.clone()),
            )
            .await;
        assert!(matches!(create, Err(LedgerError::Storage(_))));
        let update = f
            .ledger
            .update_transaction(&f.org, &kept.id, &TransactionPatch::new().amount(dec!(99)));
        assert!(matches!(update, Err(LedgerError::Storage(_))));
        let delete = f.ledger.delete_transaction(&f.org, &kept.id);
        assert!(matches!(delete, Err(LedgerError::Storage(_))));

        f.store.set_failing(false);
        assert_eq!(f.balance(), dec!(980));
        assert_eq!(f.activity(3), Some(dec!(20)));
        let all = f.ledger.transactions(&f.org, &TransactionFilter::new()).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].amount, dec!(20));
    }

    #[tokio::test]
    async fn other_organizations_are_invisible() {
        let f = fixture();
        let stranger = OrganizationId::from("org-2");
        let tx = f
            .ledger
            .create_transaction(f.new_tx(TransactionKind::Expense, dec!(1), 1))
            .await
            .unwrap();

        let foreign_account = NewTransaction::new(
            stranger.clone(),
            f.account.id.clone(),
            TransactionKind::Expense,
            dec!(1),
            march(1),
            "Sneaky",
        );
        assert!(matches!(
            f.ledger.create_transaction(foreign_account).await,
            Err(LedgerError::NotFound { entity: "account", .. })
        ));
        assert!(matches!(
            f.ledger.transaction(&stranger, &tx.id),
            Err(LedgerError::NotFound { .. })
        ));
        assert!(matches!(
            f.ledger.delete_transaction(&stranger, &tx.id),
            Err(LedgerError::NotFound { .. })
        ));

        let theirs = f.budget.create_category(&stranger, "Theirs", None).unwrap();
        let linked = f.new_tx(TransactionKind::Expense, dec!(1), 1).budget_category(theirs.id);
        assert!(matches!(
            f.ledger.create_transaction(linked).await,
            Err(LedgerError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn currency_must_match_account() {
        let f = fixture();
        let eur = f.new_tx(TransactionKind::Expense, dec!(1), 1).currency("EUR");
        assert!(matches!(
            f.ledger.create_transaction(eur).await,
            Err(LedgerError::InvalidInput(_))
        ));
        let usd = f.new_tx(TransactionKind::Expense, dec!(1), 1).currency(" usd ");
        let tx = f.ledger.create_transaction(usd).await.unwrap();
        assert_eq!(tx.currency, "USD");
    }

    #[tokio::test]
    async fn uncategorized_transactions_are_classified() {
        let f = fixture();
        let input = NewTransaction::new(
            f.org.clone(),
            f.account.id.clone(),
            TransactionKind::Expense,
            dec!(4.75),
            march(2),
            "STARBUCKS #1234",
        );
        let tx = f.ledger.create_transaction(input).await.unwrap();
        assert_eq!(tx.category.as_deref(), Some("Food & Dining"));
        let classification = tx.classification.unwrap();
        assert_eq!(classification.source, ClassificationSource::MerchantRule);

        let manual = f.ledger.create_transaction(f.new_tx(TransactionKind::Expense, dec!(1), 2)).await.unwrap();
        assert_eq!(manual.category.as_deref(), Some("Groceries"));
        assert!(manual.classification.is_none());
    }

    #[tokio::test]
    async fn auto_classification_can_be_disabled() {
        let f = fixture_with(InMemoryStore::new(), LedgerConfig { auto_classify: false });
        let input = NewTransaction::new(
            f.org.clone(),
            f.account.id.clone(),
            TransactionKind::Expense,
            dec!(4.75),
            march(2),
            "STARBUCKS #1234",
        );
        let tx = f.ledger.create_transaction(input).await.unwrap();
        assert!(tx.category.is_none());
        assert!(tx.classification.is_none());
    }

    #[tokio::test]
    async fn duplicates_are_detected_on_request() {
        let f = fixture();
        let first = f
            .ledger
            .create_unless_duplicate(f.new_tx(TransactionKind::Expense, dec!(12), 6), true)
            .await
            .unwrap();
        assert!(matches!(&first, Inserted::Created(tx) if tx.amount == dec!(12)));
        let second = f
            .ledger
            .create_unless_duplicate(f.new_tx(TransactionKind::Expense, dec!(12), 6), true)
            .await
            .unwrap();
        assert!(matches!(second, Inserted::Duplicate(_)));
        assert_eq!(f.balance(), dec!(988));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_keep_the_balance() {
        let f = Arc::new(fixture());
        let tasks: Vec<_> = (0..20_u32)
            .map(|i| {
                let f = Arc::clone(&f);
                tokio::spawn(async move {
                    let input = f
                        .new_tx(TransactionKind::Expense, dec!(5), i % 28 + 1)
                        .budget_category(f.food.id.clone());
                    let _tx = f.ledger.create_transaction(input).await.unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(f.balance(), dec!(900));
        assert_eq!(f.activity(3), Some(dec!(100)));
        assert!(f.ledger.reconcile(&f.org, &f.account.id).unwrap().is_reconciled());
    }
}
