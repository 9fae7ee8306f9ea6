//! Ledger, envelope budgeting and transaction categorization engine.
//!
//! The crate keeps per-organization accounts and transactions, maintains
//! monthly envelope budgets derived from them, classifies transactions
//! through a cache, rules and an optional external model, and imports
//! parsed statement rows in bulk.
//!
//! ```no_run
//! use envelope_ledger::cache::InMemoryCache;
//! use envelope_ledger::engine::Engine;
//! use envelope_ledger::models::{NaiveDate, NewTransaction, OrganizationId, TransactionKind};
//! use envelope_ledger::storage::InMemoryStore;
//! use rust_decimal::Decimal;
//!
//! # async fn demo() -> envelope_ledger::Result<()> {
//! let engine = Engine::builder()
//!     .store(InMemoryStore::new())
//!     .cache(InMemoryCache::new())
//!     .build()?;
//! let org = OrganizationId::from("household");
//! let account = engine
//!     .ledger()
//!     .open_account(&org, "Checking", "USD", Decimal::new(1000, 0))?;
//! let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap_or_default();
//! let coffee = NewTransaction::new(
//!     org.clone(),
//!     account.id,
//!     TransactionKind::Expense,
//!     Decimal::new(450, 2),
//!     date,
//!     "Blue Bottle Coffee",
//! );
//! let tx = engine.ledger().create_transaction(coffee).await?;
//! assert_eq!(tx.category.as_deref(), Some("Food & Dining"));
//! # Ok(())
//! # }
//! ```

pub mod budget;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod import;
pub mod ledger;
mod locks;
pub mod models;
pub mod storage;

pub use error::{LedgerError, Result};
