//! Transaction model and its typed mutation inputs.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    AccountId, BudgetCategoryId, ClassificationResult, ImportBatchId, OrganizationId,
    TransactionId, TransactionKind,
};
use crate::error::{LedgerError, Result};

/// A recorded money movement on one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique identifier.
    pub id: TransactionId,
    /// Account the transaction is booked on.
    pub account_id: AccountId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Direction; the amount itself is never negative.
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Non-negative amount.
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Category name, `None` until classified.
    pub category: Option<String>,
    /// Envelope category whose activity this transaction counts toward.
    pub budget_category_id: Option<BudgetCategoryId>,
    /// Free-text description.
    pub description: String,
    /// Booking date.
    pub date: NaiveDate,
    /// Import batch that created the row, if any.
    pub import_batch_id: Option<ImportBatchId>,
    /// How the category was determined.
    pub classification: Option<ClassificationResult>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Signed effect of this transaction on its account balance.
    #[inline]
    #[must_use]
    pub fn balance_effect(&self) -> Decimal {
        self.kind.balance_effect(self.amount)
    }

    /// Signed contribution of this transaction to its budget activity.
    #[inline]
    #[must_use]
    pub fn activity_effect(&self) -> Decimal {
        self.kind.activity_effect(self.amount)
    }

    /// Whether this row has the same dedup identity as the given values.
    #[inline]
    #[must_use]
    pub fn is_duplicate_of(
        &self,
        account_id: &AccountId,
        date: NaiveDate,
        amount: Decimal,
        description: &str,
    ) -> bool {
        self.account_id == *account_id
            && self.date == date
            && self.amount == amount
            && self.description == description
    }
}

/// Input for creating a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// Caller's organization.
    pub organization_id: OrganizationId,
    /// Account to book on.
    pub account_id: AccountId,
    /// Direction.
    pub kind: TransactionKind,
    /// Amount; must be non-negative.
    pub amount: Decimal,
    /// Booking date.
    pub date: NaiveDate,
    /// Description.
    pub description: String,
    /// Currency; defaults to the account's currency.
    pub currency: Option<String>,
    /// Explicit category; when absent the ledger may auto-classify.
    pub category: Option<String>,
    /// Envelope category to count toward.
    pub budget_category_id: Option<BudgetCategoryId>,
    /// Import batch that produced this row.
    pub import_batch_id: Option<ImportBatchId>,
    /// Classification metadata computed by the caller.
    pub classification: Option<ClassificationResult>,
}

impl NewTransaction {
    /// Creates an input with the required fields set.
    #[inline]
    #[must_use]
    pub fn new<T: Into<String>>(
        organization_id: OrganizationId,
        account_id: AccountId,
        kind: TransactionKind,
        amount: Decimal,
        date: NaiveDate,
        description: T,
    ) -> Self {
        Self {
            organization_id,
            account_id,
            kind,
            amount,
            date,
            description: description.into(),
            currency: None,
            category: None,
            budget_category_id: None,
            import_batch_id: None,
            classification: None,
        }
    }

    /// Sets an explicit category.
    #[inline]
    #[must_use]
    pub fn category<T: Into<String>>(mut self, category: T) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Links the transaction to an envelope category.
    #[inline]
    #[must_use]
    pub fn budget_category(mut self, id: BudgetCategoryId) -> Self {
        self.budget_category_id = Some(id);
        self
    }

    /// Sets the currency.
    #[inline]
    #[must_use]
    pub fn currency<T: Into<String>>(mut self, currency: T) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Checks the input before any ledger state is read.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] for a negative amount.
    #[inline]
    pub fn validate(&self) -> Result<()> {
        validate_amount(self.amount)?;
        if let Some(category) = self.category.as_ref()
            && category.trim().is_empty()
        {
            return Err(LedgerError::invalid("category must not be blank"));
        }
        Ok(())
    }
}

/// Partial update of a transaction. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionPatch {
    /// New direction.
    pub kind: Option<TransactionKind>,
    /// New amount.
    pub amount: Option<Decimal>,
    /// New booking date.
    pub date: Option<NaiveDate>,
    /// New description.
    pub description: Option<String>,
    /// New category name.
    pub category: Option<String>,
    /// New envelope link; `Some(None)` removes the link.
    pub budget_category_id: Option<Option<BudgetCategoryId>>,
}

impl TransactionPatch {
    /// Creates an empty patch.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Changes the amount.
    #[inline]
    #[must_use]
    pub const fn amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Changes the direction.
    #[inline]
    #[must_use]
    pub const fn kind(mut self, kind: TransactionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Changes the booking date.
    #[inline]
    #[must_use]
    pub const fn date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Changes the description.
    #[inline]
    #[must_use]
    pub fn description<T: Into<String>>(mut self, description: T) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Changes the category name.
    #[inline]
    #[must_use]
    pub fn category<T: Into<String>>(mut self, category: T) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Links the transaction to another envelope category, or unlinks it.
    #[inline]
    #[must_use]
    pub fn budget_category(mut self, id: Option<BudgetCategoryId>) -> Self {
        self.budget_category_id = Some(id);
        self
    }

    /// Checks the patch before any ledger state is read.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] for a negative amount or a blank
    /// category.
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if let Some(amount) = self.amount {
            validate_amount(amount)?;
        }
        if let Some(category) = self.category.as_ref()
            && category.trim().is_empty()
        {
            return Err(LedgerError::invalid("category must not be blank"));
        }
        Ok(())
    }

    /// Returns a copy of `current` with the patch applied.
    #[must_use]
    pub(crate) fn apply_to(&self, current: &Transaction, now: DateTime<Utc>) -> Transaction {
        let mut next = current.clone();
        if let Some(kind) = self.kind {
            next.kind = kind;
        }
        if let Some(amount) = self.amount {
            next.amount = amount;
        }
        if let Some(date) = self.date {
            next.date = date;
        }
        if let Some(description) = self.description.as_ref() {
            next.description.clone_from(description);
        }
        if let Some(category) = self.category.as_ref() {
            next.category = Some(category.trim().to_owned());
            next.classification = None;
        }
        if let Some(link) = self.budget_category_id.as_ref() {
            next.budget_category_id.clone_from(link);
        }
        next.updated_at = now;
        next
    }
}

/// Whether the change from `before` to `after` alters budget activity.
#[must_use]
pub(crate) fn affects_activity(before: &Transaction, after: &Transaction) -> bool {
    before.date != after.date
        || before.amount != after.amount
        || before.kind != after.kind
        || before.budget_category_id != after.budget_category_id
}

/// Rejects negative amounts.
fn validate_amount(amount: Decimal) -> Result<()> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(LedgerError::invalid(format!(
            "amount must be non-negative, got {amount}"
        )));
    }
    Ok(())
}
