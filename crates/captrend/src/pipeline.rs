//! One compaction run over one collection
//!
//! Load, plan, reconcile, then delete and audit. Every run is wrapped in a
//! `compaction_run` span carrying its id and collection, so the components
//! themselves never configure logging.

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::clock::Clock;
use crate::compaction::{
    AuditWriter, CompactionPlan, Compactor, DeletionSummary, Deleter, RetentionPolicy, delete_set,
};
use crate::config::Config;
use crate::error::Result;
use crate::observation::{LoadedCollection, Loader};
use crate::storage::{AuditSink, DocumentStore};

/// Settings for one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub collection: String,
    pub policy: RetentionPolicy,
    pub concurrency: usize,
    pub batch_size: usize,
}

impl RunOptions {
    /// Options from configuration, with an optional collection override
    pub fn from_config(config: &Config, collection: Option<&str>) -> Self {
        Self {
            collection: collection
                .map(str::to_string)
                .unwrap_or_else(|| config.storage.collection.clone()),
            policy: RetentionPolicy::from(&config.retention),
            concurrency: config.deletion.concurrency,
            batch_size: config.audit.batch_size,
        }
    }
}

/// Everything decided before the first deletion
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub now: NaiveDateTime,
    pub loaded: LoadedCollection,
    pub plan: CompactionPlan,
    /// Identifiers to delete, in fetch order
    pub delete_set: Vec<String>,
}

/// Outcome of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub collection: String,
    pub now: NaiveDateTime,
    pub cutoff: NaiveDateTime,
    pub fetched: usize,
    pub loaded: usize,
    pub skipped: usize,
    pub kept: usize,
    pub planned_deletions: usize,
    pub deleted: usize,
    pub failed: usize,
    pub audit_records: usize,
    pub audit_batches: usize,
    pub dry_run: bool,
}

impl RunReport {
    fn new(run_id: Uuid, plan: &RunPlan, dry_run: bool) -> Self {
        Self {
            run_id,
            collection: plan.loaded.collection.clone(),
            now: plan.now,
            cutoff: plan.plan.cutoff,
            fetched: plan.loaded.fetched,
            loaded: plan.loaded.len(),
            skipped: plan.loaded.skipped,
            kept: plan.plan.keep.len(),
            planned_deletions: plan.delete_set.len(),
            deleted: 0,
            failed: 0,
            audit_records: 0,
            audit_batches: 0,
            dry_run,
        }
    }

    fn with_deletions(mut self, summary: DeletionSummary) -> Self {
        self.deleted = summary.deleted;
        self.failed = summary.failed;
        self.audit_records = summary.audit_records;
        self.audit_batches = summary.audit_batches;
        self
    }
}

pub struct CompactionRun<'a> {
    store: &'a dyn DocumentStore,
    clock: &'a dyn Clock,
    options: RunOptions,
}

impl<'a> CompactionRun<'a> {
    pub fn new(store: &'a dyn DocumentStore, clock: &'a dyn Clock, options: RunOptions) -> Self {
        Self {
            store,
            clock,
            options,
        }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Load the collection and decide what to keep, without deleting.
    ///
    /// `now` is read once here and used for the whole run.
    pub async fn plan(&self) -> Result<RunPlan> {
        let now = self.clock.now();
        let loaded = Loader::new(self.store)
            .load(&self.options.collection)
            .await?;

        let plan = Compactor::with_policy(self.options.policy.clone())
            .plan(&loaded.observations, now);
        let delete_set = delete_set(&loaded.observations, &plan.keep);

        Ok(RunPlan {
            now,
            loaded,
            plan,
            delete_set,
        })
    }

    /// Plan the run and report what it would delete
    pub async fn preview(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        self.preview_inner(run_id)
            .instrument(self.span(run_id))
            .await
    }

    /// Run the full pipeline, auditing every deletion into `sink`.
    ///
    /// Failed deletions are counted in the report. Load, connection and audit
    /// write failures end the run with `Err`.
    pub async fn execute(&self, sink: &mut dyn AuditSink) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        self.execute_inner(run_id, sink)
            .instrument(self.span(run_id))
            .await
    }

    async fn preview_inner(&self, run_id: Uuid) -> Result<RunReport> {
        let plan = self.plan().await?;
        tracing::info!(
            planned_deletions = plan.delete_set.len(),
            "Dry run, nothing deleted"
        );
        Ok(RunReport::new(run_id, &plan, true))
    }

    async fn execute_inner(&self, run_id: Uuid, sink: &mut dyn AuditSink) -> Result<RunReport> {
        tracing::info!("Compaction run started");
        let plan = self.plan().await?;
        let report = RunReport::new(run_id, &plan, false);

        if plan.loaded.is_empty() {
            tracing::info!("Collection is empty, nothing to compact");
            return Ok(report);
        }
        if plan.delete_set.is_empty() {
            tracing::info!(kept = report.kept, "Collection already compact");
            return Ok(report);
        }

        let summary = Deleter::new(self.store, self.clock)
            .with_concurrency(self.options.concurrency)
            .run(
                &self.options.collection,
                plan.delete_set,
                AuditWriter::new(sink, self.options.batch_size),
            )
            .await?;

        let report = report.with_deletions(summary);
        tracing::info!(
            kept = report.kept,
            deleted = report.deleted,
            failed = report.failed,
            audit_batches = report.audit_batches,
            "Compaction run finished"
        );
        Ok(report)
    }

    fn span(&self, run_id: Uuid) -> tracing::Span {
        tracing::info_span!(
            "compaction_run",
            run_id = %run_id,
            collection = %self.options.collection
        )
    }
}
