//! Composable transaction query filter.

use crate::models::{AccountId, BudgetCategoryId, NaiveDate, Transaction, TransactionKind};

/// Composable filter for listing transactions.
///
/// Use builder-style methods to chain criteria. A transaction must satisfy
/// every criterion that is set.
///
/// # Examples
///
/// ```
/// use envelope_ledger::ledger::TransactionFilter;
/// use envelope_ledger::models::{AccountId, NaiveDate, TransactionKind};
///
/// let filter = TransactionFilter::new()
///     .date_range(
///         NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
///         NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
///     )
///     .account(AccountId::new("acc-1".to_owned()))
///     .kind(TransactionKind::Expense);
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransactionFilter {
    /// Start date (inclusive).
    pub date_from: Option<NaiveDate>,
    /// End date (inclusive).
    pub date_to: Option<NaiveDate>,
    /// Account the transaction is booked on.
    pub account: Option<AccountId>,
    /// Envelope category the transaction is linked to.
    pub budget_category: Option<BudgetCategoryId>,
    /// Direction of the transaction.
    pub kind: Option<TransactionKind>,
    /// Description substring (case-insensitive).
    pub description: Option<String>,
}

impl TransactionFilter {
    /// Creates an empty filter that matches all transactions.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to transactions within the given date range (inclusive).
    #[inline]
    #[must_use]
    pub const fn date_range(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.date_from = Some(from);
        self.date_to = Some(to);
        self
    }

    /// Restricts to transactions on the given account.
    #[inline]
    #[must_use]
    pub fn account(mut self, id: AccountId) -> Self {
        self.account = Some(id);
        self
    }

    /// Restricts to transactions linked to the given envelope.
    #[inline]
    #[must_use]
    pub fn budget_category(mut self, id: BudgetCategoryId) -> Self {
        self.budget_category = Some(id);
        self
    }

    /// Restricts to transactions of the given direction.
    #[inline]
    #[must_use]
    pub const fn kind(mut self, kind: TransactionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Restricts to transactions whose description contains the given
    /// substring (case-insensitive).
    #[inline]
    #[must_use]
    pub fn description<T: Into<String>>(mut self, text: T) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Returns `true` if the transaction satisfies all set criteria.
    #[inline]
    pub(crate) fn matches(&self, tx: &Transaction) -> bool {
        self.matches_date(tx)
            && self.account.as_ref().is_none_or(|id| tx.account_id == *id)
            && self
                .budget_category
                .as_ref()
                .is_none_or(|id| tx.budget_category_id.as_ref() == Some(id))
            && self.kind.is_none_or(|kind| tx.kind == kind)
            && self.matches_description(tx)
    }

    /// Checks date range criteria.
    fn matches_date(&self, tx: &Transaction) -> bool {
        self.date_from.is_none_or(|from| tx.date >= from)
            && self.date_to.is_none_or(|to| tx.date <= to)
    }

    /// Checks description criteria.
    fn matches_description(&self, tx: &Transaction) -> bool {
        self.description.as_ref().is_none_or(|needle| {
            tx.description
                .to_lowercase()
                .contains(&needle.to_lowercase())
        })
    }
}
