//! In-memory tables shared by every store backend.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Write;
use crate::error::{LedgerError, Result};
use crate::models::{
    Account, AccountId, BudgetCategory, BudgetCategoryId, BudgetPeriod, ImportBatch,
    ImportBatchId, MonthlyBudget, OrganizationId, Transaction, TransactionId,
};

/// Every persisted entity, keyed for point lookups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Snapshot", into = "Snapshot")]
pub(crate) struct Tables {
    /// Accounts by ID.
    accounts: BTreeMap<AccountId, Account>,
    /// Transactions by ID.
    transactions: BTreeMap<TransactionId, Transaction>,
    /// Budget categories by ID.
    categories: BTreeMap<BudgetCategoryId, BudgetCategory>,
    /// Monthly rows by category and month.
    budgets: BTreeMap<(BudgetCategoryId, BudgetPeriod), MonthlyBudget>,
    /// Import batches by ID.
    batches: BTreeMap<ImportBatchId, ImportBatch>,
}

/// On-disk shape of [`Tables`]: one list per entity.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    /// All accounts.
    #[serde(default)]
    accounts: Vec<Account>,
    /// All transactions.
    #[serde(default)]
    transactions: Vec<Transaction>,
    /// All budget categories.
    #[serde(default)]
    budget_categories: Vec<BudgetCategory>,
    /// All monthly budget rows.
    #[serde(default)]
    monthly_budgets: Vec<MonthlyBudget>,
    /// All import batches.
    #[serde(default)]
    import_batches: Vec<ImportBatch>,
}

impl From<Snapshot> for Tables {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            accounts: snapshot
                .accounts
                .into_iter()
                .map(|a| (a.id.clone(), a))
                .collect(),
            transactions: snapshot
                .transactions
                .into_iter()
                .map(|t| (t.id.clone(), t))
                .collect(),
            categories: snapshot
                .budget_categories
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect(),
            budgets: snapshot
                .monthly_budgets
                .into_iter()
                .map(|b| ((b.category_id.clone(), b.period), b))
                .collect(),
            batches: snapshot
                .import_batches
                .into_iter()
                .map(|b| (b.id.clone(), b))
                .collect(),
        }
    }
}

impl From<Tables> for Snapshot {
    fn from(tables: Tables) -> Self {
        Self {
            accounts: tables.accounts.into_values().collect(),
            transactions: tables.transactions.into_values().collect(),
            budget_categories: tables.categories.into_values().collect(),
            monthly_budgets: tables.budgets.into_values().collect(),
            import_batches: tables.batches.into_values().collect(),
        }
    }
}

impl Tables {
    /// Account by ID.
    pub(crate) fn account(&self, id: &AccountId) -> Option<Account> {
        self.accounts.get(id).cloned()
    }

    /// Accounts of an organization, sorted by name.
    pub(crate) fn accounts(&self, organization_id: &OrganizationId) -> Vec<Account> {
        let mut rows: Vec<Account> = self
            .accounts
            .values()
            .filter(|a| a.organization_id == *organization_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        rows
    }

    /// Transaction by ID.
    pub(crate) fn transaction(&self, id: &TransactionId) -> Option<Transaction> {
        self.transactions.get(id).cloned()
    }

    /// Transactions of an organization in date order.
    pub(crate) fn transactions(&self, organization_id: &OrganizationId) -> Vec<Transaction> {
        let mut rows: Vec<Transaction> = self
            .transactions
            .values()
            .filter(|t| t.organization_id == *organization_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        rows
    }

    /// Transactions linked to a category inside a month.
    pub(crate) fn category_transactions(
        &self,
        category_id: &BudgetCategoryId,
        period: BudgetPeriod,
    ) -> Vec<Transaction> {
        self.transactions
            .values()
            .filter(|t| {
                t.budget_category_id.as_ref() == Some(category_id) && period.contains(t.date)
            })
            .cloned()
            .collect()
    }

    /// First transaction with the same dedup identity.
    pub(crate) fn find_duplicate(
        &self,
        account_id: &AccountId,
        date: NaiveDate,
        amount: Decimal,
        description: &str,
    ) -> Option<Transaction> {
        self.transactions
            .values()
            .find(|t| t.is_duplicate_of(account_id, date, amount, description))
            .cloned()
    }

    /// Budget category by ID.
    pub(crate) fn budget_category(&self, id: &BudgetCategoryId) -> Option<BudgetCategory> {
        self.categories.get(id).cloned()
    }

    /// Categories of an organization, sorted by name.
    pub(crate) fn budget_categories(&self, organization_id: &OrganizationId) -> Vec<BudgetCategory> {
        let mut rows: Vec<BudgetCategory> = self
            .categories
            .values()
            .filter(|c| c.organization_id == *organization_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        rows
    }

    /// Stored row for a category and month.
    pub(crate) fn monthly_budget(
        &self,
        category_id: &BudgetCategoryId,
        period: BudgetPeriod,
    ) -> Option<MonthlyBudget> {
        self.budgets.get(&(category_id.clone(), period)).cloned()
    }

    /// Import batch by ID.
    pub(crate) fn import_batch(&self, id: &ImportBatchId) -> Option<ImportBatch> {
        self.batches.get(id).cloned()
    }

    /// Validates every write against the current state plus the writes
    /// before it, then applies them all. Nothing changes on error.
    pub(crate) fn apply(&mut self, writes: Vec<Write>) -> Result<()> {
        self.check(&writes)?;
        for write in writes {
            match write {
                Write::PutAccount(account) => {
                    let _old = self.accounts.insert(account.id.clone(), account);
                }
                Write::PutTransaction(tx) => {
                    let _old = self.transactions.insert(tx.id.clone(), tx);
                }
                Write::DeleteTransaction(id) => {
                    let _old = self.transactions.remove(&id);
                }
                Write::PutBudgetCategory(category) => {
                    let _old = self.categories.insert(category.id.clone(), category);
                }
                Write::PutMonthlyBudget(row) => {
                    let _old = self
                        .budgets
                        .insert((row.category_id.clone(), row.period), row);
                }
                Write::PutImportBatch(batch) => {
                    let _old = self.batches.insert(batch.id.clone(), batch);
                }
            }
        }
        Ok(())
    }

    /// Referential checks for [`Tables::apply`].
    fn check(&self, writes: &[Write]) -> Result<()> {
        let mut new_accounts: HashSet<&AccountId> = HashSet::new();
        let mut new_categories: HashSet<&BudgetCategoryId> = HashSet::new();
        let mut live: HashSet<&TransactionId> = HashSet::new();
        let mut removed: HashSet<&TransactionId> = HashSet::new();

        let account_exists = |id: &AccountId, staged: &HashSet<&AccountId>| {
            staged.contains(id) || self.accounts.contains_key(id)
        };
        let category_exists = |id: &BudgetCategoryId, staged: &HashSet<&BudgetCategoryId>| {
            staged.contains(id) || self.categories.contains_key(id)
        };

        for write in writes {
            match write {
                Write::PutAccount(account) => {
                    let _new = new_accounts.insert(&account.id);
                }
                Write::PutBudgetCategory(category) => {
                    let _new = new_categories.insert(&category.id);
                }
                Write::PutTransaction(tx) => {
                    if !account_exists(&tx.account_id, &new_accounts) {
                        return Err(LedgerError::not_found("account", &tx.account_id));
                    }
                    if let Some(category_id) = tx.budget_category_id.as_ref()
                        && !category_exists(category_id, &new_categories)
                    {
                        return Err(LedgerError::not_found("budget category", category_id));
                    }
                    let _removed = removed.remove(&tx.id);
                    let _new = live.insert(&tx.id);
                }
                Write::DeleteTransaction(id) => {
                    let exists = live.contains(id)
                        || (!removed.contains(id) && self.transactions.contains_key(id));
                    if !exists {
                        return Err(LedgerError::not_found("transaction", id));
                    }
                    let _live = live.remove(id);
                    let _new = removed.insert(id);
                }
                Write::PutMonthlyBudget(row) => {
                    if !category_exists(&row.category_id, &new_categories) {
                        return Err(LedgerError::not_found("budget category", &row.category_id));
                    }
                }
                Write::PutImportBatch(batch) => {
                    if !account_exists(&batch.account_id, &new_accounts) {
                        return Err(LedgerError::not_found("account", &batch.account_id));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use crate::models::TransactionKind;

    fn tx(account_id: &AccountId) -> Transaction {
        let now = Utc::now();
        Transaction {
            id: TransactionId::generate(),
            account_id: account_id.clone(),
            organization_id: "org".into(),
            kind: TransactionKind::Income,
            amount: dec!(5),
            currency: "USD".to_owned(),
            category: None,
            budget_category_id: None,
            description: "Gift".to_owned(),
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            import_batch_id: None,
            classification: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn failed_check_leaves_tables_untouched() {
        let mut tables = Tables::default();
        let account = Account::open("org".into(), "Cash", "USD", Decimal::ZERO).unwrap();
        let orphan = tx(&"missing".into());
        let err = tables
            .apply(vec![
                Write::PutAccount(account.clone()),
                Write::PutTransaction(orphan),
            ])
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { entity: "account", .. }));
        assert!(tables.account(&account.id).is_none());
    }

    #[test]
    fn account_staged_in_same_batch_counts() {
        let mut tables = Tables::default();
        let account = Account::open("org".into(), "Cash", "USD", Decimal::ZERO).unwrap();
        let row = tx(&account.id);
        tables
            .apply(vec![Write::PutAccount(account), Write::PutTransaction(row.clone())])
            .unwrap();
        assert!(tables.transaction(&row.id).is_some());
    }

    #[test]
    fn double_delete_in_one_batch_fails() {
        let mut tables = Tables::default();
        let account = Account::open("org".into(), "Cash", "USD", Decimal::ZERO).unwrap();
        let row = tx(&account.id);
        tables
            .apply(vec![Write::PutAccount(account), Write::PutTransaction(row.clone())])
            .unwrap();
        let err = tables
            .apply(vec![
                Write::DeleteTransaction(row.id.clone()),
                Write::DeleteTransaction(row.id.clone()),
            ])
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
        assert!(tables.transaction(&row.id).is_some());
    }

    #[test]
    fn snapshot_round_trip_keeps_monthly_rows() {
        let mut tables = Tables::default();
        let category = BudgetCategory::new("org".into(), "Food", None).unwrap();
        let row = MonthlyBudget::new(
            category.id.clone(),
            "org".into(),
            BudgetPeriod::new(2024, 1).unwrap(),
            dec!(100),
            dec!(40),
            Decimal::ZERO,
        );
        tables
            .apply(vec![
                Write::PutBudgetCategory(category.clone()),
                Write::PutMonthlyBudget(row.clone()),
            ])
            .unwrap();
        let json = serde_json::to_string(&tables).unwrap();
        let back: Tables = serde_json::from_str(&json).unwrap();
        assert_eq!(back.monthly_budget(&category.id, row.period), Some(row));
    }
}
