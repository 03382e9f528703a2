//! Capacity observations
//!
//! Raw documents as stored, validated observations, and the loader that turns
//! one into the other.

pub mod loader;
pub mod types;

pub use loader::{LoadOutcome, LoadedCollection, Loader, normalize};
pub use types::{
    DAY_FORMAT, DayKey, DeletionRecord, Observation, RawObservation, SeriesKey, TIMESTAMP_FORMAT,
};
