//! Ledger account model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AccountId, OrganizationId};
use crate::error::{LedgerError, Result};

/// A money account whose running balance is owned by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Unique identifier.
    pub id: AccountId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Display name.
    pub name: String,
    /// ISO 4217 currency code (upper case).
    pub currency: String,
    /// Balance the account was opened with.
    pub initial_balance: Decimal,
    /// Current balance: initial balance plus the effect of every live
    /// transaction.
    pub balance: Decimal,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Opens a new account with a fresh identifier.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] if the name is blank or the
    /// currency is not a three-letter code.
    #[inline]
    pub fn open(
        organization_id: OrganizationId,
        name: &str,
        currency: &str,
        initial_balance: Decimal,
    ) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::invalid("account name must not be empty"));
        }
        let currency = normalize_currency(currency)?;
        Ok(Self {
            id: AccountId::generate(),
            organization_id,
            name: name.to_owned(),
            currency,
            initial_balance,
            balance: initial_balance,
            created_at: Utc::now(),
        })
    }
}

/// Upper-cases and checks a currency code.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidInput`] unless the code is three ASCII
/// letters.
#[inline]
pub fn normalize_currency(raw: &str) -> Result<String> {
    let code = raw.trim().to_ascii_uppercase();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code)
    } else {
        Err(LedgerError::invalid(format!("invalid currency code '{raw}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn open_sets_balance_to_initial() {
        let account = Account::open("org".into(), " Checking ", "usd", dec!(250.00)).unwrap();
        assert_eq!(account.name, "Checking");
        assert_eq!(account.currency, "USD");
        assert_eq!(account.balance, dec!(250.00));
        assert_eq!(account.initial_balance, dec!(250.00));
    }

    #[test]
    fn open_rejects_blank_name() {
        let err = Account::open("org".into(), "  ", "USD", Decimal::ZERO).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
    }

    #[test]
    fn currency_must_be_three_letters() {
        assert!(normalize_currency("EURO").is_err());
        assert!(normalize_currency("U$D").is_err());
        assert_eq!(normalize_currency(" gbp").unwrap(), "GBP");
    }

    #[test]
    fn serialize_uses_camel_case() {
        let account = Account::open("org".into(), "Cash", "EUR", dec!(5)).unwrap();
        let json = serde_json::to_value(&account).unwrap();
        assert!(json.get("initialBalance").is_some());
        assert!(json.get("organizationId").is_some());
        let back: Account = serde_json::from_value(json).unwrap();
        assert_eq!(back, account);
    }
}
