//! Captrend - retention compaction for storage capacity trends
//!
//! This crate loads capacity observations from a LanceDB collection, reduces
//! them with a two-tier retention policy, deletes the superseded documents
//! and records every deletion in an append-only audit table.

pub mod clock;
pub mod compaction;
pub mod config;
pub mod error;
pub mod observation;
pub mod pipeline;
pub mod storage;
pub mod testing;

pub use error::{CaptrendError, Result};
