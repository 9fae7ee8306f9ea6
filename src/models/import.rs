//! Import row contract and batch bookkeeping.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    AccountId, BudgetCategoryId, ImportBatchId, ImportStatus, OrganizationId, Transaction,
    TransactionKind,
};
use crate::error::{LedgerError, Result};

/// One parsed row handed over by a CSV/Excel tokenizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRow {
    /// Date exactly as it appeared in the file.
    pub date: String,
    /// Amount; direction is carried by `kind`.
    pub amount: Decimal,
    /// Description or payee.
    pub description: String,
    /// Direction.
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Category from the file, if any.
    #[serde(default)]
    pub category: Option<String>,
    /// Currency from the file, if any.
    #[serde(default)]
    pub currency: Option<String>,
    /// The original row, echoed back in error reports.
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl ImportRow {
    /// Category from the file when it is non-blank.
    #[inline]
    #[must_use]
    pub fn usable_category(&self) -> Option<&str> {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Raw data for error reports; falls back to the parsed fields when the
    /// tokenizer supplied nothing.
    #[must_use]
    pub(crate) fn raw_data(&self) -> serde_json::Value {
        if self.raw.is_null() {
            serde_json::json!({
                "date": self.date,
                "amount": self.amount.to_string(),
                "description": self.description,
                "type": self.kind,
            })
        } else {
            self.raw.clone()
        }
    }
}

/// Options controlling an import run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Skip rows whose `(account, date, amount, description)` already exists.
    pub skip_duplicates: bool,
    /// `chrono` format string tried before the built-in list.
    pub date_format: Option<String>,
    /// Envelope category every imported row is linked to.
    pub budget_category_id: Option<BudgetCategoryId>,
}

impl ImportOptions {
    /// Creates default options: duplicates are imported, no explicit date
    /// format, no envelope link.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables duplicate skipping.
    #[inline]
    #[must_use]
    pub const fn skip_duplicates(mut self, skip: bool) -> Self {
        self.skip_duplicates = skip;
        self
    }

    /// Sets an explicit date format.
    #[inline]
    #[must_use]
    pub fn date_format<T: Into<String>>(mut self, format: T) -> Self {
        self.date_format = Some(format.into());
        self
    }

    /// Links every imported row to an envelope category.
    #[inline]
    #[must_use]
    pub fn budget_category(mut self, id: BudgetCategoryId) -> Self {
        self.budget_category_id = Some(id);
        self
    }

    /// Checks the options before a batch is created.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] for a blank date format.
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if let Some(format) = self.date_format.as_deref()
            && format.trim().is_empty()
        {
            return Err(LedgerError::invalid("date format must not be blank"));
        }
        Ok(())
    }
}

/// A row that could not be imported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRowError {
    /// 1-based row number within the submitted rows.
    pub row: usize,
    /// Human-readable reason.
    pub error: String,
    /// The row as it was submitted.
    pub raw_data: serde_json::Value,
}

/// Bookkeeping record of one import run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBatch {
    /// Unique identifier.
    pub id: ImportBatchId,
    /// Target account.
    pub account_id: AccountId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Lifecycle state.
    pub status: ImportStatus,
    /// Rows submitted.
    pub total_rows: usize,
    /// Rows committed to the ledger.
    pub successful_rows: usize,
    /// Rows that failed.
    pub failed_rows: usize,
    /// Rows skipped as duplicates.
    pub skipped_rows: usize,
    /// Failures in row order.
    pub errors: Vec<ImportRowError>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Set once the batch reaches a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl ImportBatch {
    /// Creates a batch in the `PROCESSING` state.
    #[inline]
    #[must_use]
    pub fn start(organization_id: OrganizationId, account_id: AccountId, total_rows: usize) -> Self {
        Self {
            id: ImportBatchId::generate(),
            account_id,
            organization_id,
            status: ImportStatus::Processing,
            total_rows,
            successful_rows: 0,
            failed_rows: 0,
            skipped_rows: 0,
            errors: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Counts a committed row.
    #[inline]
    pub const fn record_success(&mut self) {
        self.successful_rows += 1;
    }

    /// Counts a duplicate that was skipped.
    #[inline]
    pub const fn record_skip(&mut self) {
        self.skipped_rows += 1;
    }

    /// Records a failed row.
    #[inline]
    pub fn record_failure<T: Into<String>>(&mut self, row: usize, error: T, raw_data: serde_json::Value) {
        self.failed_rows += 1;
        self.errors.push(ImportRowError {
            row,
            error: error.into(),
            raw_data,
        });
    }

    /// Moves the batch into its terminal state.
    ///
    /// A finished run is `FAILED` only when rows were submitted and every
    /// one of them failed. An interrupted run is `COMPLETED` if anything was
    /// committed and `FAILED` otherwise. Calling this on a terminal batch
    /// does nothing.
    #[inline]
    pub fn finalize(&mut self, interrupted: bool) {
        if self.status.is_terminal() {
            return;
        }
        let failed = if interrupted {
            self.successful_rows == 0
        } else {
            self.total_rows > 0 && self.failed_rows == self.total_rows
        };
        self.status = if failed {
            ImportStatus::Failed
        } else {
            ImportStatus::Completed
        };
        self.completed_at = Some(Utc::now());
    }
}

/// Outcome of an import run.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportResult {
    /// The finalized batch.
    pub batch: ImportBatch,
    /// Transactions created, in row order.
    pub created: Vec<Transaction>,
}
