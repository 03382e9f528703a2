//! Store and audit sink seams
//!
//! The compaction pipeline only needs to list and delete documents, and to
//! append deletion records. [`LanceStore`] implements both on LanceDB.

pub mod lance;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::observation::{DeletionRecord, RawObservation};

pub use lance::{LanceAuditSink, LanceStore};

/// Stream of documents as returned by a store listing
pub type DocumentStream = BoxStream<'static, Result<RawObservation>>;

/// Document store holding capacity observations
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Stream every document of a collection
    ///
    /// Fails with a connection error when the collection cannot be listed.
    async fn list_all(&self, collection: &str) -> Result<DocumentStream>;

    /// Delete one document
    ///
    /// Fails with a delete error when the document could not be removed,
    /// including when it no longer exists or the id matches several
    /// documents. Nothing is removed in either case.
    async fn delete(&self, collection: &str, doc_id: &str) -> Result<()>;
}

/// Append-only destination for deletion records
#[async_trait]
pub trait AuditSink: Send {
    /// Durably append one batch. Rows keep their order.
    async fn append(&mut self, records: &[DeletionRecord]) -> Result<()>;
}
