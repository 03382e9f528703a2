//! Batched writer for the deletion log
//!
//! Buffers one [`DeletionRecord`] per successful delete and appends them to an
//! [`AuditSink`] in fixed-size batches. A failed append is fatal to the run.

use serde::Serialize;

use crate::error::{CaptrendError, Result};
use crate::observation::DeletionRecord;
use crate::storage::AuditSink;

/// Default number of records per append
pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Idle,
    Deleting,
    Flushing,
}

/// Totals written by one [`AuditWriter`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditSummary {
    pub records: usize,
    pub batches: usize,
}

pub struct AuditWriter<'a> {
    sink: &'a mut dyn AuditSink,
    buffer: Vec<DeletionRecord>,
    batch_size: usize,
    state: WriterState,
    summary: AuditSummary,
}

impl<'a> AuditWriter<'a> {
    pub fn new(sink: &'a mut dyn AuditSink, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            sink,
            buffer: Vec::with_capacity(batch_size),
            batch_size,
            state: WriterState::Idle,
            summary: AuditSummary::default(),
        }
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Records buffered but not yet written
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn summary(&self) -> AuditSummary {
        self.summary
    }

    /// Buffer a record, writing the batch once it is full
    pub async fn record(&mut self, record: DeletionRecord) -> Result<()> {
        self.transition(WriterState::Deleting);
        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Write the remainder and return the totals
    pub async fn finish(mut self) -> Result<AuditSummary> {
        self.flush().await?;
        self.transition(WriterState::Idle);
        Ok(self.summary)
    }

    async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let resume = self.state;
        self.transition(WriterState::Flushing);

        self.sink.append(&self.buffer).await.map_err(|e| match e {
            CaptrendError::Write(_) => e,
            other => CaptrendError::Write(other.to_string()),
        })?;

        self.summary.records += self.buffer.len();
        self.summary.batches += 1;
        tracing::debug!(
            batch = self.summary.batches,
            rows = self.buffer.len(),
            "Deletion records written"
        );
        self.buffer.clear();

        self.transition(resume);
        Ok(())
    }

    fn transition(&mut self, next: WriterState) {
        if self.state != next {
            tracing::trace!(from = ?self.state, to = ?next, "Audit writer state change");
            self.state = next;
        }
    }
}
