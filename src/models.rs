//! Data models for the ledger, envelope budgets, classification and
//! imports.
//!
//! This module contains strongly-typed entity representations, newtype ID
//! wrappers, enumeration types for constrained values, and the typed input
//! structs accepted by the engines.

mod account;
mod budget;
mod classification;
mod enums;
mod ids;
mod import;
mod transaction;

pub use account::{Account, normalize_currency};
pub use budget::{BudgetCategory, BudgetLine, BudgetPeriod, MonthlyBudget, available};
pub use chrono::NaiveDate;
pub use classification::{ClassificationInput, ClassificationResult, clamp_confidence};
pub use enums::{ClassificationSource, ImportStatus, RecurringFrequency, TransactionKind};
pub use ids::{AccountId, BudgetCategoryId, ImportBatchId, OrganizationId, TransactionId};
pub use import::{ImportBatch, ImportOptions, ImportResult, ImportRow, ImportRowError};
pub use rust_decimal::Decimal;
pub(crate) use transaction::affects_activity;
pub use transaction::{NewTransaction, Transaction, TransactionPatch};
