//! Error types for captrend

use thiserror::Error;

/// Main error type for captrend operations
#[derive(Error, Debug)]
pub enum CaptrendError {
    /// A single stored record could not be turned into an observation
    #[error("Load error for document {doc_id}: {reason}")]
    Load { doc_id: String, reason: String },

    /// The document store could not be reached or the collection could not be listed
    #[error("Connection error: {0}")]
    Connection(String),

    /// A single delete call against the document store failed
    #[error("Delete error for document {doc_id}: {reason}")]
    Delete { doc_id: String, reason: String },

    /// A batch of deletion records could not be written to the audit log
    #[error("Audit write error: {0}")]
    Write(String),

    /// Storage-related errors (LanceDB, Arrow conversion, etc.)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CaptrendError {
    /// Build a load error for one record
    pub fn load(doc_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Load {
            doc_id: doc_id.into(),
            reason: reason.into(),
        }
    }

    /// Build a delete error for one record
    pub fn delete(doc_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Delete {
            doc_id: doc_id.into(),
            reason: reason.into(),
        }
    }

    /// Whether the run can continue after this error
    pub fn is_per_record(&self) -> bool {
        matches!(self, Self::Load { .. } | Self::Delete { .. })
    }
}

/// Result type alias for captrend operations
pub type Result<T> = std::result::Result<T, CaptrendError>;
