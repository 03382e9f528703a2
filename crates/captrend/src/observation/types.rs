use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Timestamp layout used by stored documents and the audit log
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Day layout used by stored documents
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// A capacity document exactly as the store returns it.
///
/// Every field except the identifier is optional; nothing here has been
/// validated. The loader turns these into [`Observation`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub doc_id: String,
    pub hostid: Option<String>,
    pub pool: Option<String>,
    /// Sample instant, `YYYY-MM-DD HH:MM:SS`
    pub date: Option<String>,
    /// Sample day, `YYYY-MM-DD`
    pub day: Option<String>,
    pub perc_used: Option<f64>,
    // Carried through from the source capacity table, never read by compaction.
    pub perc_snap: Option<f64>,
    pub used: Option<f64>,
    pub snap: Option<f64>,
    pub total_space: Option<f64>,
    pub unit_id: Option<String>,
}

impl RawObservation {
    /// Create a document with the fields compaction needs
    pub fn new(
        doc_id: impl Into<String>,
        hostid: impl Into<String>,
        pool: impl Into<String>,
        date: impl Into<String>,
        perc_used: f64,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            hostid: Some(hostid.into()),
            pool: Some(pool.into()),
            date: Some(date.into()),
            perc_used: Some(perc_used),
            ..Default::default()
        }
    }

    pub fn with_day(mut self, day: impl Into<String>) -> Self {
        self.day = Some(day.into());
        self
    }
}

/// One validated capacity sample for a (hostid, pool) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub doc_id: String,
    pub hostid: String,
    pub pool: String,
    pub timestamp: NaiveDateTime,
    pub day: NaiveDate,
    pub perc_used: f64,
}

impl Observation {
    /// Key of the old-partition group this observation belongs to
    pub fn day_key(&self) -> DayKey {
        DayKey {
            hostid: self.hostid.clone(),
            pool: self.pool.clone(),
            day: self.day,
        }
    }

    /// Key of the recent-partition group this observation belongs to
    pub fn series_key(&self) -> SeriesKey {
        SeriesKey {
            hostid: self.hostid.clone(),
            pool: self.pool.clone(),
        }
    }
}

/// (hostid, pool) grouping key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SeriesKey {
    pub hostid: String,
    pub pool: String,
}

/// (hostid, pool, day) grouping key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DayKey {
    pub hostid: String,
    pub pool: String,
    pub day: NaiveDate,
}

impl std::fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.hostid, self.pool)
    }
}

impl std::fmt::Display for DayKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.hostid, self.pool, self.day)
    }
}

/// Audit entry for one deleted document. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionRecord {
    pub doc_id: String,
    /// Deletion time, `YYYY-MM-DD HH:MM:SS`
    pub deleted_at: String,
}

impl DeletionRecord {
    pub fn new(doc_id: impl Into<String>, deleted_at: NaiveDateTime) -> Self {
        Self {
            doc_id: doc_id.into(),
            deleted_at: deleted_at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}
