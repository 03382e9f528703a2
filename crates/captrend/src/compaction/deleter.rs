//! Deletion of superseded observations
//!
//! Delete calls run on a bounded pool. Their outcomes come back to a single
//! loop, which owns the [`AuditWriter`], so the audit buffer has exactly one
//! writer.

use futures::{StreamExt, stream};
use serde::Serialize;

use crate::clock::Clock;
use crate::compaction::audit::AuditWriter;
use crate::error::{CaptrendError, Result};
use crate::observation::DeletionRecord;
use crate::storage::DocumentStore;

/// Successful deletions between progress log lines
const PROGRESS_INTERVAL: usize = 500;

/// Outcome of one delete call
#[derive(Debug)]
pub enum DeleteOutcome {
    Deleted(DeletionRecord),
    Failed { doc_id: String, error: CaptrendError },
}

/// Totals of one deletion pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeletionSummary {
    pub attempted: usize,
    pub deleted: usize,
    pub failed: usize,
    pub audit_records: usize,
    pub audit_batches: usize,
}

pub struct Deleter<'a> {
    store: &'a dyn DocumentStore,
    clock: &'a dyn Clock,
    concurrency: usize,
}

impl<'a> Deleter<'a> {
    pub fn new(store: &'a dyn DocumentStore, clock: &'a dyn Clock) -> Self {
        Self {
            store,
            clock,
            concurrency: 1,
        }
    }

    /// Set the maximum number of delete calls in flight
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Delete one document, stamping the record at the moment it succeeded
    pub async fn delete_one(&self, collection: &str, doc_id: String) -> DeleteOutcome {
        match self.store.delete(collection, &doc_id).await {
            Ok(()) => DeleteOutcome::Deleted(DeletionRecord::new(doc_id, self.clock.now())),
            Err(error) => {
                // Store-level failures still only cost this one document.
                let error = if error.is_per_record() {
                    error
                } else {
                    CaptrendError::delete(&doc_id, error.to_string())
                };
                DeleteOutcome::Failed { doc_id, error }
            }
        }
    }

    /// Delete every id and audit each success.
    ///
    /// Failed deletions are logged and left for the next run. Returns `Err`
    /// only when the audit log cannot be written.
    pub async fn run(
        &self,
        collection: &str,
        doc_ids: Vec<String>,
        mut audit: AuditWriter<'_>,
    ) -> Result<DeletionSummary> {
        let mut summary = DeletionSummary {
            attempted: doc_ids.len(),
            ..Default::default()
        };

        tracing::info!(
            collection,
            documents = summary.attempted,
            concurrency = self.concurrency,
            "Deleting superseded observations"
        );

        let mut outcomes = stream::iter(doc_ids)
            .map(|doc_id| self.delete_one(collection, doc_id))
            .buffer_unordered(self.concurrency);

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                DeleteOutcome::Deleted(record) => {
                    summary.deleted += 1;
                    audit.record(record).await?;
                    if summary.deleted % PROGRESS_INTERVAL == 0 {
                        tracing::info!(collection, deleted = summary.deleted, "Deletion progress");
                    }
                }
                DeleteOutcome::Failed { doc_id, error } => {
                    summary.failed += 1;
                    tracing::error!(collection, %doc_id, %error, "Failed to delete observation");
                }
            }
        }

        let written = audit.finish().await?;
        summary.audit_records = written.records;
        summary.audit_batches = written.batches;

        tracing::info!(
            collection,
            deleted = summary.deleted,
            failed = summary.failed,
            "Deletion complete"
        );

        Ok(summary)
    }
}
