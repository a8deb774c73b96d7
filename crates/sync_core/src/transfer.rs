//! Row-to-document transfer with fixed-size sequential commits.
//!
//! Records are staged into a [`WriteBatch`] and committed every
//! [`MAX_BATCH_WRITES`] processed records. The boundary counts every record
//! seen, skipped ones included, so a batch can hold fewer than
//! `MAX_BATCH_WRITES` writes when skips fall inside it. A failed commit is
//! logged and the run moves on to the next batch; nothing is retried.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::document_id::derive_document_id;
use crate::record::Record;
use crate::store::{DocumentStore, WriteBatch, MAX_BATCH_WRITES};

/// Counters for one transfer run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSummary {
    pub records_processed: usize,
    pub records_skipped: usize,
    pub documents_written: usize,
    pub batches_committed: usize,
    pub batches_failed: usize,
    /// Staged writes lost with failed batches.
    pub documents_failed: usize,
}

pub fn transfer_records<I>(
    records: I,
    collection: &str,
    id_field: &str,
    store: &impl DocumentStore,
) -> TransferSummary
where
    I: IntoIterator<Item = Record>,
{
    let mut summary = TransferSummary::default();
    let mut batch = WriteBatch::new(collection);

    for mut record in records {
        summary.records_processed += 1;

        match derive_document_id(&record, id_field) {
            Ok(document_id) => {
                record.remove(id_field);
                batch.set(document_id, record);
            }
            Err(rejection) => {
                summary.records_skipped += 1;
                warn!(
                    component = "transfer",
                    event = "record_skipped",
                    reason = rejection.as_str(),
                    id_field,
                    record = %record.to_json(),
                    "record has no usable document id"
                );
            }
        }

        if summary.records_processed % MAX_BATCH_WRITES == 0 {
            let full = std::mem::replace(&mut batch, WriteBatch::new(collection));
            commit_batch(store, &full, &mut summary);
        }
    }

    commit_batch(store, &batch, &mut summary);

    info!(
        component = "transfer",
        event = "transfer_completed",
        collection,
        records_processed = summary.records_processed,
        records_skipped = summary.records_skipped,
        documents_written = summary.documents_written,
        batches_committed = summary.batches_committed,
        batches_failed = summary.batches_failed,
        "total {} documents written",
        summary.documents_written
    );

    summary
}

fn commit_batch(store: &impl DocumentStore, batch: &WriteBatch, summary: &mut TransferSummary) {
    if batch.is_empty() {
        return;
    }

    match store.commit(batch) {
        Ok(()) => {
            summary.batches_committed += 1;
            summary.documents_written += batch.len();
            info!(
                component = "transfer",
                event = "batch_committed",
                collection = batch.collection(),
                batch_writes = batch.len(),
                documents_written = summary.documents_written,
                "{} documents written",
                summary.documents_written
            );
        }
        Err(commit_error) => {
            summary.batches_failed += 1;
            summary.documents_failed += batch.len();
            error!(
                component = "transfer",
                event = "batch_failed",
                collection = batch.collection(),
                batch_writes = batch.len(),
                error = %commit_error,
                "failed to commit batch"
            );
        }
    }
}
