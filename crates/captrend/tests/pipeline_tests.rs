//! Integration tests for the compaction pipeline
//!
//! Runs whole compactions against the in-memory store and audit sink.

use std::collections::HashSet;

use captrend::CaptrendError;
use captrend::config::Config;
use captrend::observation::RawObservation;
use captrend::pipeline::{CompactionRun, RunOptions};
use captrend::testing::{FixedClock, MemoryAuditSink, MemoryStore, at};

const NOW: &str = "2025-04-17 12:00:00";

/// Test fixture: two hosts, several pools, both partitions populated
fn mixed_dataset() -> Vec<RawObservation> {
    let mut docs = Vec::new();
    let mut push = |id: &str, host: &str, pool: &str, date: &str, perc: f64| {
        docs.push(RawObservation::new(id, host, pool, date, perc));
    };

    // Old partition, one day per group
    push("a1", "3caf01f0", "sp0", "2025-04-01 08:00:00", 41.0);
    push("a2", "3caf01f0", "sp0", "2025-04-01 12:00:00", 50.0);
    push("a3", "3caf01f0", "sp0", "2025-04-01 16:00:00", 61.0);
    push("b1", "3caf01f0", "sp0", "2025-04-02 08:00:00", 52.0);
    push("c1", "3caf01f0", "sp1", "2025-04-01 09:00:00", 10.0);
    push("c2", "3caf01f0", "sp1", "2025-04-01 10:00:00", 20.0);
    push("d1", "7be21a09", "sp0", "2025-04-01 09:00:00", 70.0);
    push("d2", "7be21a09", "sp0", "2025-04-01 21:00:00", 72.0);

    // Recent partition
    push("r1", "3caf01f0", "sp0", "2025-04-15 08:00:00", 10.0);
    push("r2", "3caf01f0", "sp0", "2025-04-15 09:00:00", 10.005);
    push("r3", "3caf01f0", "sp0", "2025-04-15 10:00:00", 10.02);
    push("r4", "3caf01f0", "sp0", "2025-04-15 11:00:00", 11.0);
    push("s1", "7be21a09", "sp0", "2025-04-16 08:00:00", 72.0);
    push("s2", "7be21a09", "sp0", "2025-04-16 09:00:00", 72.0);

    docs
}

fn options(collection: &str) -> RunOptions {
    RunOptions::from_config(&Config::default(), Some(collection))
}

fn seeded_store(docs: Vec<RawObservation>) -> MemoryStore {
    let store = MemoryStore::new();
    store.insert("trends", docs);
    store
}

mod end_to_end {
    use super::*;

    #[tokio::test]
    async fn test_compaction_keeps_expected_survivors() {
        let store = seeded_store(mixed_dataset());
        let clock = FixedClock(at(NOW));
        let mut sink = MemoryAuditSink::new();

        let report = CompactionRun::new(&store, &clock, options("trends"))
            .execute(&mut sink)
            .await
            .unwrap();

        // c1 and c2 are equidistant from their mean; the earlier fetched wins.
        let survivors: HashSet<String> = store.ids("trends").into_iter().collect();
        let expected: HashSet<String> = ["a2", "b1", "c1", "d1", "r1", "r3", "r4", "s1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(survivors, expected);

        assert_eq!(report.fetched, 14);
        assert_eq!(report.kept, 8);
        assert_eq!(report.deleted, 6);
        assert_eq!(report.failed, 0);
        assert_eq!(report.audit_records, 6);
        assert_eq!(report.audit_batches, 1);
    }

    #[tokio::test]
    async fn test_audit_log_matches_deleted_ids() {
        let store = seeded_store(mixed_dataset());
        let clock = FixedClock(at(NOW));
        let mut sink = MemoryAuditSink::new();

        CompactionRun::new(&store, &clock, options("trends"))
            .execute(&mut sink)
            .await
            .unwrap();

        let before: HashSet<String> = mixed_dataset().into_iter().map(|d| d.doc_id).collect();
        let after: HashSet<String> = store.ids("trends").into_iter().collect();
        let deleted: HashSet<String> = before.difference(&after).cloned().collect();

        let audited: Vec<String> = sink.records().into_iter().map(|r| r.doc_id).collect();
        let audited_set: HashSet<String> = audited.iter().cloned().collect();
        assert_eq!(audited.len(), audited_set.len(), "no doc_id audited twice");
        assert_eq!(audited_set, deleted);
        assert!(sink.records().iter().all(|r| r.deleted_at == NOW));
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let store = seeded_store(mixed_dataset());
        let clock = FixedClock(at(NOW));
        let mut sink = MemoryAuditSink::new();
        let run = CompactionRun::new(&store, &clock, options("trends"));

        run.execute(&mut sink).await.unwrap();
        let survivors = store.ids("trends");

        let mut second_sink = MemoryAuditSink::new();
        let report = run.execute(&mut second_sink).await.unwrap();

        assert_eq!(report.planned_deletions, 0);
        assert_eq!(report.deleted, 0);
        assert!(second_sink.batch_sizes().is_empty());
        assert_eq!(store.ids("trends"), survivors);
    }

    #[tokio::test]
    async fn test_dry_run_changes_nothing() {
        let store = seeded_store(mixed_dataset());
        let clock = FixedClock(at(NOW));

        let report = CompactionRun::new(&store, &clock, options("trends"))
            .preview()
            .await
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.planned_deletions, 6);
        assert_eq!(store.ids("trends").len(), 14);
        assert_eq!(store.delete_calls(), 0);
    }

    #[tokio::test]
    async fn test_bad_records_are_skipped_not_deleted() {
        let mut docs = mixed_dataset();
        docs.push(RawObservation::new("bad", "3caf01f0", "sp0", "garbage", 1.0));
        let store = seeded_store(docs);
        let clock = FixedClock(at(NOW));
        let mut sink = MemoryAuditSink::new();

        let report = CompactionRun::new(&store, &clock, options("trends"))
            .execute(&mut sink)
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert!(store.ids("trends").contains(&"bad".to_string()));
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn test_failed_deletions_do_not_fail_the_run() {
        let store = seeded_store(mixed_dataset());
        store.fail_deletes_for(["a1", "r2"]);
        let clock = FixedClock(at(NOW));
        let mut sink = MemoryAuditSink::new();

        let report = CompactionRun::new(&store, &clock, options("trends"))
            .execute(&mut sink)
            .await
            .unwrap();

        assert_eq!(report.deleted, 4);
        assert_eq!(report.failed, 2);
        assert_eq!(report.audit_records, 4);

        let audited: HashSet<String> = sink.records().into_iter().map(|r| r.doc_id).collect();
        assert!(!audited.contains("a1"));
        assert!(!audited.contains("r2"));
    }

    #[tokio::test]
    async fn test_duplicated_id_is_never_removed_unaudited() {
        let store = seeded_store(vec![
            RawObservation::new("a", "3caf01f0", "sp0", "2025-04-01 08:00:00", 41.0),
            RawObservation::new("b", "3caf01f0", "sp0", "2025-04-01 12:00:00", 50.0),
            RawObservation::new("c", "3caf01f0", "sp0", "2025-04-01 16:00:00", 61.0),
            RawObservation::new("a", "3caf01f0", "sp0", "2025-04-03 08:00:00", 99.0),
        ]);
        let clock = FixedClock(at(NOW));
        let mut sink = MemoryAuditSink::new();

        let report = CompactionRun::new(&store, &clock, options("trends"))
            .execute(&mut sink)
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.failed, 1);

        let removed = 4 - store.ids("trends").len();
        assert_eq!(removed, sink.records().len());
        assert_eq!(store.ids("trends"), vec!["a", "b", "a"]);
    }

    #[tokio::test]
    async fn test_missing_collection_is_fatal() {
        let store = MemoryStore::new();
        let clock = FixedClock(at(NOW));
        let mut sink = MemoryAuditSink::new();

        let result = CompactionRun::new(&store, &clock, options("absent"))
            .execute(&mut sink)
            .await;

        assert!(matches!(result, Err(CaptrendError::Connection(_))));
        assert!(sink.batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn test_audit_write_failure_aborts_run() {
        let store = seeded_store(mixed_dataset());
        let clock = FixedClock(at(NOW));
        let mut sink = MemoryAuditSink::failing_on_batch(0);

        let result = CompactionRun::new(&store, &clock, options("trends"))
            .execute(&mut sink)
            .await;

        assert!(matches!(result, Err(CaptrendError::Write(_))));
    }
}

mod batching {
    use super::*;

    /// One old day group with distinct values, so exactly one survives
    fn moving_series(count: usize) -> Vec<RawObservation> {
        (0..count)
            .map(|i| {
                RawObservation::new(
                    format!("doc-{i:04}"),
                    "3caf01f0",
                    "sp0",
                    "2025-04-01 08:00:00",
                    i as f64,
                )
            })
            .collect()
    }

    async fn deleted_batches(count: usize) -> Vec<usize> {
        let store = seeded_store(moving_series(count + 1));
        let clock = FixedClock(at(NOW));
        let mut sink = MemoryAuditSink::new();

        let report = CompactionRun::new(&store, &clock, options("trends"))
            .execute(&mut sink)
            .await
            .unwrap();
        assert_eq!(report.deleted, count);
        sink.batch_sizes()
    }

    #[tokio::test]
    async fn test_exactly_one_batch() {
        assert_eq!(deleted_batches(500).await, vec![500]);
    }

    #[tokio::test]
    async fn test_remainder_batch() {
        assert_eq!(deleted_batches(501).await, vec![500, 1]);
    }

    #[tokio::test]
    async fn test_configured_batch_size() {
        let store = seeded_store(moving_series(11));
        let clock = FixedClock(at(NOW));
        let mut sink = MemoryAuditSink::new();

        let mut config = Config::default();
        config.audit.batch_size = 4;
        config.deletion.concurrency = 3;

        let report = CompactionRun::new(
            &store,
            &clock,
            RunOptions::from_config(&config, Some("trends")),
        )
        .execute(&mut sink)
        .await
        .unwrap();

        assert_eq!(report.deleted, 10);
        assert_eq!(sink.batch_sizes(), vec![4, 4, 2]);
    }
}
