//! Enumeration types for constrained values.

use core::fmt;
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Direction of a transaction. Amounts are always non-negative; the kind
/// carries the sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    /// Money coming into the account.
    Income,
    /// Money leaving the account.
    Expense,
    /// Movement between own accounts; no net ledger effect.
    Transfer,
}

impl TransactionKind {
    /// Signed effect of `amount` on the owning account's balance.
    #[inline]
    #[must_use]
    pub fn balance_effect(self, amount: Decimal) -> Decimal {
        match self {
            Self::Income => amount,
            Self::Expense => -amount,
            Self::Transfer => Decimal::ZERO,
        }
    }

    /// Signed contribution of `amount` to a budget category's activity.
    ///
    /// Expenses increase activity; income tagged to a category (refunds)
    /// decreases it.
    #[inline]
    #[must_use]
    pub fn activity_effect(self, amount: Decimal) -> Decimal {
        match self {
            Self::Expense => amount,
            Self::Income => -amount,
            Self::Transfer => Decimal::ZERO,
        }
    }

    /// Lowercase name used in cache keys and wire payloads.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Transfer => "transfer",
        }
    }
}

impl fmt::Display for TransactionKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = LedgerError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "income" | "credit" => Ok(Self::Income),
            "expense" | "debit" => Ok(Self::Expense),
            "transfer" => Ok(Self::Transfer),
            other => Err(LedgerError::invalid(format!(
                "unknown transaction type '{other}'"
            ))),
        }
    }
}

/// Lifecycle state of an import batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStatus {
    /// Rows are still being processed.
    Processing,
    /// Processing finished; individual rows may still have failed.
    Completed,
    /// Processing finished without committing any row.
    Failed,
}

impl ImportStatus {
    /// Whether the batch has reached a final state.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }

    /// Name as stored.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ImportStatus {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How often a recurring charge repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecurringFrequency {
    /// Every week.
    Weekly,
    /// Every month.
    Monthly,
    /// Every three months.
    Quarterly,
    /// Every year.
    Yearly,
}

impl fmt::Display for RecurringFrequency {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        })
    }
}

/// Strategy that produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClassificationSource {
    /// Served from the classification cache.
    Cache,
    /// Matched a merchant pattern rule.
    MerchantRule,
    /// Keyword or amount heuristic.
    Heuristic,
    /// External classification model.
    External,
    /// Supplied by the caller or the imported row.
    Manual,
}

impl fmt::Display for ClassificationSource {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Self::Cache => "cache",
            Self::MerchantRule => "merchant rule",
            Self::Heuristic => "heuristic",
            Self::External => "external",
            Self::Manual => "manual",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn transaction_kind_serde_uses_upper_case() {
        let json = serde_json::to_string(&TransactionKind::Expense).unwrap();
        assert_eq!(json, r#""EXPENSE""#);
        let deserialized: TransactionKind = serde_json::from_str(r#""INCOME""#).unwrap();
        assert_eq!(deserialized, TransactionKind::Income);
    }

    #[test]
    fn balance_effects() {
        assert_eq!(TransactionKind::Income.balance_effect(dec!(10.50)), dec!(10.50));
        assert_eq!(TransactionKind::Expense.balance_effect(dec!(10.50)), dec!(-10.50));
        assert_eq!(TransactionKind::Transfer.balance_effect(dec!(10.50)), Decimal::ZERO);
    }

    #[test]
    fn activity_effects_treat_income_as_refund() {
        assert_eq!(TransactionKind::Expense.activity_effect(dec!(40)), dec!(40));
        assert_eq!(TransactionKind::Income.activity_effect(dec!(15)), dec!(-15));
        assert_eq!(TransactionKind::Transfer.activity_effect(dec!(15)), Decimal::ZERO);
    }

    #[test]
    fn parse_transaction_kind() {
        assert_eq!("Expense".parse::<TransactionKind>().unwrap(), TransactionKind::Expense);
        assert_eq!(" debit ".parse::<TransactionKind>().unwrap(), TransactionKind::Expense);
        assert_eq!("credit".parse::<TransactionKind>().unwrap(), TransactionKind::Income);
        let err = "refund".parse::<TransactionKind>().unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
    }

    #[test]
    fn import_status_terminality() {
        assert!(!ImportStatus::Processing.is_terminal());
        assert!(ImportStatus::Completed.is_terminal());
        assert!(ImportStatus::Failed.is_terminal());
        let json = serde_json::to_string(&ImportStatus::Completed).unwrap();
        assert_eq!(json, r#""COMPLETED""#);
    }

    #[test]
    fn recurring_frequency_serde() {
        let json = serde_json::to_string(&RecurringFrequency::Monthly).unwrap();
        assert_eq!(json, r#""monthly""#);
    }
}
