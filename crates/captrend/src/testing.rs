//! Test utilities for captrend - in-memory store, audit sink and fixtures
//!
//! The pipeline is written against [`DocumentStore`] and [`AuditSink`], so
//! unit and integration tests can run it without a LanceDB directory and can
//! inject the failures a real store would produce.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use futures::{StreamExt, stream};

use crate::error::{CaptrendError, Result};
use crate::observation::{DeletionRecord, Observation, RawObservation, TIMESTAMP_FORMAT, normalize};
use crate::storage::{AuditSink, DocumentStore, DocumentStream};

pub use crate::clock::FixedClock;

/// Document store backed by a map of collections.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<RawObservation>>>,
    failing: Mutex<HashSet<String>>,
    unreachable: AtomicBool,
    delete_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append documents to a collection, creating it if needed
    pub fn insert(&self, collection: &str, documents: Vec<RawObservation>) {
        self.collections
            .lock()
            .expect("store lock poisoned")
            .entry(collection.to_string())
            .or_default()
            .extend(documents);
    }

    /// Make every delete of these ids fail
    pub fn fail_deletes_for<I, S>(&self, doc_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing
            .lock()
            .expect("store lock poisoned")
            .extend(doc_ids.into_iter().map(Into::into));
    }

    /// Make every call fail with a connection error
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Documents currently stored, in insertion order
    pub fn documents(&self, collection: &str) -> Vec<RawObservation> {
        self.collections
            .lock()
            .expect("store lock poisoned")
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn ids(&self, collection: &str) -> Vec<String> {
        self.documents(collection)
            .into_iter()
            .map(|d| d.doc_id)
            .collect()
    }

    /// Number of delete calls received, successful or not
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(CaptrendError::Connection(
                "memory store is unreachable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_all(&self, collection: &str) -> Result<DocumentStream> {
        self.check_reachable()?;
        let documents = self
            .collections
            .lock()
            .expect("store lock poisoned")
            .get(collection)
            .cloned()
            .ok_or_else(|| {
                CaptrendError::Connection(format!("collection '{collection}' does not exist"))
            })?;
        Ok(stream::iter(documents.into_iter().map(Ok)).boxed())
    }

    async fn delete(&self, collection: &str, doc_id: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;

        if self
            .failing
            .lock()
            .expect("store lock poisoned")
            .contains(doc_id)
        {
            return Err(CaptrendError::delete(doc_id, "injected failure"));
        }

        let mut collections = self.collections.lock().expect("store lock poisoned");
        let documents = collections.get_mut(collection).ok_or_else(|| {
            CaptrendError::Connection(format!("collection '{collection}' does not exist"))
        })?;
        let matches = documents.iter().filter(|d| d.doc_id == doc_id).count();
        match matches {
            0 => Err(CaptrendError::delete(doc_id, "document not found")),
            1 => {
                documents.retain(|d| d.doc_id != doc_id);
                Ok(())
            }
            n => Err(CaptrendError::delete(
                doc_id,
                format!("ambiguous document id, {n} rows match"),
            )),
        }
    }
}

/// Audit sink that keeps every appended batch.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    batches: Vec<Vec<DeletionRecord>>,
    fail_on: Option<usize>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose append number `batch` (zero-based) fails
    pub fn failing_on_batch(batch: usize) -> Self {
        Self {
            batches: Vec::new(),
            fail_on: Some(batch),
        }
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.iter().map(Vec::len).collect()
    }

    /// Every record written, in append order
    pub fn records(&self) -> Vec<DeletionRecord> {
        self.batches.iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&mut self, records: &[DeletionRecord]) -> Result<()> {
        if self.fail_on == Some(self.batches.len()) {
            return Err(CaptrendError::Write("injected audit failure".to_string()));
        }
        self.batches.push(records.to_vec());
        Ok(())
    }
}

/// Parse a `YYYY-MM-DD HH:MM:SS` timestamp.
pub fn at(timestamp: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
        .unwrap_or_else(|e| panic!("bad fixture timestamp {timestamp}: {e}"))
}

/// Build a validated observation whose day comes from its timestamp.
pub fn observation(doc_id: &str, hostid: &str, pool: &str, date: &str, perc_used: f64) -> Observation {
    normalize(&RawObservation::new(doc_id, hostid, pool, date, perc_used))
        .unwrap_or_else(|e| panic!("bad fixture observation {doc_id}: {e}"))
}
