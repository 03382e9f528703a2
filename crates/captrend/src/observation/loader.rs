//! Observation Loader
//!
//! Pulls every document of a collection from the store and validates it into
//! an [`Observation`]. Bad records are logged and skipped; only a failure of
//! the listing itself aborts the load.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};
use futures::TryStreamExt;

use crate::error::{CaptrendError, Result};
use crate::observation::types::{DAY_FORMAT, Observation, RawObservation, TIMESTAMP_FORMAT};
use crate::storage::DocumentStore;

/// Observations of one collection, in the order the store returned them.
#[derive(Debug, Clone, Default)]
pub struct LoadedCollection {
    pub collection: String,
    pub observations: Vec<Observation>,
    /// Documents returned by the store, valid or not
    pub fetched: usize,
    /// Documents excluded by validation
    pub skipped: usize,
}

impl LoadedCollection {
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Identifiers in fetch order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.observations.iter().map(|o| o.doc_id.as_str())
    }
}

/// Outcome of validating one fetched document
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(Observation),
    Skipped(CaptrendError),
}

pub struct Loader<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> Loader<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// Load and validate every document in `collection`.
    ///
    /// Returns `Err` only when the store cannot list the collection.
    pub async fn load(&self, collection: &str) -> Result<LoadedCollection> {
        let mut stream = self.store.list_all(collection).await?;

        let mut loaded = LoadedCollection {
            collection: collection.to_string(),
            ..Default::default()
        };
        let mut seen = HashSet::new();

        while let Some(raw) = stream.try_next().await? {
            loaded.fetched += 1;

            let outcome = if seen.insert(raw.doc_id.clone()) {
                match normalize(&raw) {
                    Ok(observation) => LoadOutcome::Loaded(observation),
                    Err(e) => LoadOutcome::Skipped(e),
                }
            } else {
                LoadOutcome::Skipped(CaptrendError::load(&raw.doc_id, "duplicate document id"))
            };

            match outcome {
                LoadOutcome::Loaded(observation) => loaded.observations.push(observation),
                LoadOutcome::Skipped(e) => {
                    tracing::error!(doc_id = %raw.doc_id, error = %e, "Skipping observation");
                    loaded.skipped += 1;
                }
            }
        }

        tracing::info!(
            collection,
            fetched = loaded.fetched,
            loaded = loaded.len(),
            skipped = loaded.skipped,
            "Loaded observations"
        );

        Ok(loaded)
    }
}

/// Validate one raw document.
///
/// `day` is derived from the timestamp when absent or blank.
pub fn normalize(raw: &RawObservation) -> Result<Observation> {
    let doc_id = raw.doc_id.as_str();
    if doc_id.is_empty() {
        return Err(CaptrendError::load(doc_id, "empty document id"));
    }

    let hostid = required_str(doc_id, "hostid", raw.hostid.as_deref())?;
    let pool = required_str(doc_id, "pool", raw.pool.as_deref())?;

    let date = raw
        .date
        .as_deref()
        .ok_or_else(|| CaptrendError::load(doc_id, "missing date"))?;
    let timestamp = NaiveDateTime::parse_from_str(date.trim(), TIMESTAMP_FORMAT)
        .map_err(|e| CaptrendError::load(doc_id, format!("invalid date '{date}': {e}")))?;

    let day = match raw.day.as_deref().map(str::trim) {
        Some(day) if !day.is_empty() => NaiveDate::parse_from_str(day, DAY_FORMAT)
            .map_err(|e| CaptrendError::load(doc_id, format!("invalid day '{day}': {e}")))?,
        _ => timestamp.date(),
    };

    let perc_used = raw
        .perc_used
        .ok_or_else(|| CaptrendError::load(doc_id, "missing perc_used"))?;
    if !perc_used.is_finite() {
        return Err(CaptrendError::load(
            doc_id,
            format!("perc_used is not a finite number: {perc_used}"),
        ));
    }

    Ok(Observation {
        doc_id: doc_id.to_string(),
        hostid,
        pool,
        timestamp,
        day,
        perc_used,
    })
}

fn required_str(doc_id: &str, field: &str, value: Option<&str>) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.to_string()),
        _ => Err(CaptrendError::load(doc_id, format!("missing {field}"))),
    }
}
