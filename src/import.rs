//! Bulk ingestion of parsed statement rows.
//!
//! Rows are processed in order, each through the regular
//! [`Ledger`](crate::ledger::Ledger) write path. A failing row is recorded
//! on the batch and the run continues. The batch is stored as `PROCESSING`
//! before the first row and written once more in a terminal state at the
//! end, even if the import future is dropped part way through.

mod dates;

use std::sync::Arc;

use crate::cache::CacheProvider;
use crate::classifier::{ExternalClassifier, NoExternalClassifier};
use crate::error::{LedgerError, Result};
use crate::ledger::{Inserted, Ledger};
use crate::models::{
    Account, AccountId, ClassificationInput, ClassificationResult, ClassificationSource,
    ImportBatch, ImportBatchId, ImportOptions, ImportResult, ImportRow, NewTransaction,
    OrganizationId, Transaction,
};
use crate::storage::{Store, Write};

/// Confidence recorded for categories taken from the file.
const FILE_CATEGORY_CONFIDENCE: f64 = 1.0;

/// Parses a JSON array of rows, keeping each original object as the row's
/// raw data.
///
/// # Errors
///
/// Returns [`LedgerError::Serialization`] if the document is not an array
/// of row objects.
#[inline]
pub fn rows_from_json(json: &str) -> Result<Vec<ImportRow>> {
    let values: Vec<serde_json::Value> = serde_json::from_str(json)?;
    values
        .into_iter()
        .map(|value| -> Result<ImportRow> {
            let mut row: ImportRow = serde_json::from_value(value.clone())?;
            row.raw = value;
            Ok(row)
        })
        .collect()
}

/// What happened to one row.
#[derive(Debug)]
enum RowOutcome {
    /// The row became this transaction.
    Created(Transaction),
    /// The row duplicated an existing transaction.
    Skipped,
}

/// Keeps an import batch's stored state terminal.
///
/// Dropping the guard before [`BatchGuard::finish`] finalizes the batch as
/// interrupted and stores it.
#[derive(Debug)]
struct BatchGuard<'store, S: Store> {
    /// Store the batch lives in.
    store: &'store S,
    /// Batch being filled.
    batch: ImportBatch,
    /// Set once the terminal state has been written.
    finished: bool,
}

impl<'store, S: Store> BatchGuard<'store, S> {
    /// Stores the new batch and starts guarding it.
    fn start(store: &'store S, batch: ImportBatch) -> Result<Self> {
        store.apply(vec![Write::PutImportBatch(batch.clone())])?;
        tracing::debug!(batch = %batch.id, total = batch.total_rows, "import batch started");
        Ok(Self {
            store,
            batch,
            finished: false,
        })
    }

    /// Finalizes and stores the batch.
    ///
    /// The guard stays armed until the terminal write lands, so a failed
    /// write is retried once on drop.
    fn finish(mut self) -> Result<ImportBatch> {
        self.batch.finalize(false);
        self.store
            .apply(vec![Write::PutImportBatch(self.batch.clone())])?;
        self.finished = true;
        Ok(self.batch.clone())
    }
}

impl<S: Store> Drop for BatchGuard<'_, S> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.batch.finalize(true);
        tracing::warn!(
            batch = %self.batch.id,
            status = %self.batch.status,
            committed = self.batch.successful_rows,
            "import interrupted"
        );
        if let Err(err) = self
            .store
            .apply(vec![Write::PutImportBatch(self.batch.clone())])
        {
            tracing::error!(batch = %self.batch.id, error = %err, "failed to store interrupted batch");
        }
    }
}

/// Import pipeline on top of a [`Ledger`].
#[derive(Debug)]
pub struct Importer<S, C, X = NoExternalClassifier> {
    /// Ledger every row is written through.
    ledger: Arc<Ledger<S, C, X>>,
}

impl<S: Store, C: CacheProvider, X: ExternalClassifier> Importer<S, C, X> {
    /// Creates an importer writing through `ledger`.
    #[inline]
    #[must_use]
    pub const fn new(ledger: Arc<Ledger<S, C, X>>) -> Self {
        Self { ledger }
    }

    /// Imports `rows` into an account.
    ///
    /// Rows are handled in order. Each one has its date parsed (the explicit
    /// format first, then the known formats), is skipped if
    /// `skip_duplicates` is set and an identical transaction exists, is
    /// classified if it has no category, and is then recorded. A failing row
    /// is reported with its 1-based number and raw data.
    ///
    /// # Errors
    ///
    /// Setup failures abort before any row is read:
    /// [`LedgerError::NotFound`] for an unknown account or envelope,
    /// [`LedgerError::Forbidden`] for another organization's envelope,
    /// [`LedgerError::InvalidInput`] for bad options, or a storage error if
    /// the batch cannot be stored.
    #[tracing::instrument(skip_all, fields(organization = %organization_id, account = %account_id, rows = rows.len()))]
    pub async fn import_rows(
        &self,
        organization_id: &OrganizationId,
        account_id: &AccountId,
        rows: &[ImportRow],
        options: &ImportOptions,
    ) -> Result<ImportResult> {
        options.validate()?;
        let account = self.ledger.account(organization_id, account_id)?;
        if let Some(category_id) = options.budget_category_id.as_ref() {
            let _category = self.ledger.budget().category(organization_id, category_id)?;
        }

        let store = &**self.ledger.store();
        let mut guard = BatchGuard::start(
            store,
            ImportBatch::start(organization_id.clone(), account.id.clone(), rows.len()),
        )?;
        let mut created = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            let number = index + 1;
            match self.import_row(&account, row, options, &guard.batch.id).await {
                Ok(RowOutcome::Created(tx)) => {
                    guard.batch.record_success();
                    created.push(tx);
                }
                Ok(RowOutcome::Skipped) => {
                    tracing::debug!(row = number, "duplicate row skipped");
                    guard.batch.record_skip();
                }
                Err(err) => {
                    tracing::warn!(row = number, error = %err, "row rejected");
                    guard
                        .batch
                        .record_failure(number, err.to_string(), row.raw_data());
                }
            }
        }

        let batch = guard.finish()?;
        tracing::info!(
            batch = %batch.id,
            status = %batch.status,
            successful = batch.successful_rows,
            failed = batch.failed_rows,
            skipped = batch.skipped_rows,
            "import finished"
        );
        Ok(ImportResult { batch, created })
    }

    /// Returns an import batch of the organization.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if the batch does not exist or
    /// belongs to another organization.
    #[inline]
    pub fn batch(&self, organization_id: &OrganizationId, id: &ImportBatchId) -> Result<ImportBatch> {
        self.ledger
            .store()
            .import_batch(id)?
            .filter(|batch| batch.organization_id == *organization_id)
            .ok_or_else(|| LedgerError::not_found("import batch", id))
    }

    /// Turns one row into a transaction.
    async fn import_row(
        &self,
        account: &Account,
        row: &ImportRow,
        options: &ImportOptions,
        batch_id: &ImportBatchId,
    ) -> Result<RowOutcome> {
        let date = dates::parse_date(&row.date, options.date_format.as_deref())?;
        if options.skip_duplicates
            && self
                .ledger
                .store()
                .find_duplicate(&account.id, date, row.amount, &row.description)?
                .is_some()
        {
            return Ok(RowOutcome::Skipped);
        }

        let mut input = NewTransaction::new(
            account.organization_id.clone(),
            account.id.clone(),
            row.kind,
            row.amount,
            date,
            row.description.clone(),
        );
        input.currency.clone_from(&row.currency);
        input.budget_category_id.clone_from(&options.budget_category_id);
        input.import_batch_id = Some(batch_id.clone());
        input.classification = Some(match row.usable_category() {
            Some(category) => ClassificationResult::new(
                category,
                FILE_CATEGORY_CONFIDENCE,
                ClassificationSource::Manual,
            ),
            None => {
                input.validate()?;
                let request =
                    ClassificationInput::new(row.description.clone(), row.amount, row.kind);
                self.ledger
                    .classifier()
                    .classify(&account.organization_id, &request)
                    .await
            }
        });

        match self
            .ledger
            .create_unless_duplicate(input, options.skip_duplicates)
            .await?
        {
            Inserted::Created(tx) => Ok(RowOutcome::Created(tx)),
            Inserted::Duplicate(_) => Ok(RowOutcome::Skipped),
        }
    }
}
