//! Two-tier retention for capacity observations
//!
//! Observations older than the recent window are reduced to one
//! representative per host, pool and day. Recent observations are thinned to
//! the points where usage actually moved.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::config::RetentionConfig;
use crate::observation::{DayKey, Observation, SeriesKey};

/// Retention thresholds
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Observations at least this many days old are in the old partition (default: 7)
    pub recent_window_days: i64,
    /// Minimum |perc_used| change between kept recent observations (default: 0.01)
    pub change_threshold: f64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            recent_window_days: 7,
            change_threshold: 0.01,
        }
    }
}

impl From<&RetentionConfig> for RetentionPolicy {
    fn from(config: &RetentionConfig) -> Self {
        Self {
            recent_window_days: config.recent_window_days,
            change_threshold: config.change_threshold,
        }
    }
}

impl RetentionPolicy {
    /// Create a policy with a custom recent window
    pub fn new(recent_window_days: i64) -> Self {
        Self {
            recent_window_days,
            ..Default::default()
        }
    }

    /// Set the significant-change threshold
    pub fn with_change_threshold(mut self, threshold: f64) -> Self {
        self.change_threshold = threshold.max(0.0);
        self
    }

    /// Boundary between the partitions: older is `< cutoff`
    ///
    /// A window reaching past the representable range puts every observation
    /// in the recent partition.
    pub fn cutoff(&self, now: NaiveDateTime) -> NaiveDateTime {
        Duration::try_days(self.recent_window_days)
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(NaiveDateTime::MIN)
    }
}

/// Identifiers that survive a compaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeepSet {
    ids: HashSet<String>,
}

impl KeepSet {
    pub fn contains(&self, doc_id: &str) -> bool {
        self.ids.contains(doc_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    fn insert(&mut self, doc_id: &str) {
        self.ids.insert(doc_id.to_string());
    }
}

impl<S: Into<String>> FromIterator<S> for KeepSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Old,
    Recent,
}

/// Outcome for one group of observations
#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub partition: Partition,
    pub hostid: String,
    pub pool: String,
    /// Set for old-partition groups only
    pub day: Option<NaiveDate>,
    pub members: usize,
    pub kept: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PartitionStats {
    pub groups: usize,
    pub observations: usize,
    pub kept: usize,
}

/// Result of applying the retention policy to one collection
#[derive(Debug, Clone)]
pub struct CompactionPlan {
    pub now: NaiveDateTime,
    pub cutoff: NaiveDateTime,
    pub keep: KeepSet,
    pub old: PartitionStats,
    pub recent: PartitionStats,
    /// Old groups by key, then recent groups by key
    pub groups: Vec<GroupSummary>,
}

/// Applies the retention policy to an in-memory observation set
///
/// The compactor never touches the store; it only decides which identifiers
/// survive.
pub struct Compactor {
    policy: RetentionPolicy,
}

impl Default for Compactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compactor {
    /// Create a new Compactor with the default policy
    pub fn new() -> Self {
        Self {
            policy: RetentionPolicy::default(),
        }
    }

    /// Create a new Compactor with a custom policy
    pub fn with_policy(policy: RetentionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Compute the keep-set for `observations` relative to `now`.
    ///
    /// `observations` must be in fetch order; ties in the old partition go to
    /// the earliest fetched record.
    pub fn plan(&self, observations: &[Observation], now: NaiveDateTime) -> CompactionPlan {
        let cutoff = self.policy.cutoff(now);
        let (old, recent): (Vec<&Observation>, Vec<&Observation>) =
            observations.iter().partition(|o| o.timestamp < cutoff);

        let mut keep = KeepSet::default();
        let mut groups = Vec::new();
        let mut old_stats = PartitionStats {
            observations: old.len(),
            ..Default::default()
        };
        let mut recent_stats = PartitionStats {
            observations: recent.len(),
            ..Default::default()
        };

        let mut by_day: BTreeMap<DayKey, Vec<&Observation>> = BTreeMap::new();
        for observation in old {
            by_day
                .entry(observation.day_key())
                .or_default()
                .push(observation);
        }

        for (key, members) in &by_day {
            let Some((representative, mean)) = closest_to_mean(members) else {
                continue;
            };
            tracing::trace!(group = %key, mean, kept = %representative.doc_id, "Old group reduced");
            keep.insert(&representative.doc_id);
            old_stats.groups += 1;
            old_stats.kept += 1;
            groups.push(GroupSummary {
                partition: Partition::Old,
                hostid: key.hostid.clone(),
                pool: key.pool.clone(),
                day: Some(key.day),
                members: members.len(),
                kept: 1,
            });
        }

        let mut by_series: BTreeMap<SeriesKey, Vec<&Observation>> = BTreeMap::new();
        for observation in recent {
            by_series
                .entry(observation.series_key())
                .or_default()
                .push(observation);
        }

        for (key, members) in by_series {
            let member_count = members.len();
            let kept = significant_changes(members, self.policy.change_threshold);
            for observation in &kept {
                keep.insert(&observation.doc_id);
            }
            recent_stats.groups += 1;
            recent_stats.kept += kept.len();
            groups.push(GroupSummary {
                partition: Partition::Recent,
                hostid: key.hostid,
                pool: key.pool,
                day: None,
                members: member_count,
                kept: kept.len(),
            });
        }

        tracing::info!(
            %cutoff,
            old_groups = old_stats.groups,
            old_kept = old_stats.kept,
            recent_groups = recent_stats.groups,
            recent_kept = recent_stats.kept,
            total = observations.len(),
            "Compaction plan computed"
        );

        CompactionPlan {
            now,
            cutoff,
            keep,
            old: old_stats,
            recent: recent_stats,
            groups,
        }
    }
}

/// Pick the member whose perc_used is closest to the group mean.
///
/// Returns the representative and the mean. On equal distance the earlier
/// member wins.
pub fn closest_to_mean<'o>(members: &[&'o Observation]) -> Option<(&'o Observation, f64)> {
    let first = *members.first()?;
    let mean = members.iter().map(|o| o.perc_used).sum::<f64>() / members.len() as f64;

    let mut best = first;
    let mut best_distance = (first.perc_used - mean).abs();
    for &candidate in &members[1..] {
        let distance = (candidate.perc_used - mean).abs();
        if distance < best_distance {
            best = candidate;
            best_distance = distance;
        }
    }

    Some((best, mean))
}

/// Keep the first observation of a series and every later one that moved at
/// least `threshold` away from the last kept value.
///
/// Members are ordered by timestamp; equal timestamps keep their input order.
pub fn significant_changes(mut members: Vec<&Observation>, threshold: f64) -> Vec<&Observation> {
    members.sort_by_key(|o| o.timestamp);

    let mut kept: Vec<&Observation> = Vec::new();
    for observation in members {
        match kept.last() {
            Some(last) if (observation.perc_used - last.perc_used).abs() < threshold => {}
            _ => kept.push(observation),
        }
    }
    kept
}
