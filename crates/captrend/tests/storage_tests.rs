//! Integration tests for storage layer
//!
//! Tests the LanceStore implementation and a full compaction against a real
//! database directory.

use captrend::CaptrendError;
use captrend::compaction::AuditWriter;
use captrend::config::Config;
use captrend::observation::{DeletionRecord, RawObservation};
use captrend::pipeline::{CompactionRun, RunOptions};
use captrend::storage::{AuditSink, DocumentStore, LanceStore};
use captrend::testing::{FixedClock, at};
use futures::TryStreamExt;
use tempfile::tempdir;

const COLLECTION: &str = "capacity_trends";
const AUDIT_TABLE: &str = "deleted_docs";

/// Test fixture: Create a test store in a temporary directory
async fn create_test_store() -> (LanceStore, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let store = LanceStore::connect(dir.path()).await.unwrap();
    (store, dir)
}

fn doc(id: &str, date: &str, perc_used: f64) -> RawObservation {
    RawObservation::new(id, "3caf01f0", "sp0", date, perc_used)
}

async fn list(store: &LanceStore, collection: &str) -> Vec<RawObservation> {
    store
        .list_all(collection)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap()
}

mod collection_tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_list_roundtrip() {
        let (store, _dir) = create_test_store().await;
        let mut full = doc("a", "2025-04-10 19:46:44", 41.5).with_day("2025-04-10");
        full.perc_snap = Some(2.5);
        full.used = Some(4096.0);
        full.unit_id = Some("3caf01f0-sp0".to_string());
        let sparse = RawObservation {
            doc_id: "b".to_string(),
            ..Default::default()
        };

        store
            .insert_observations(COLLECTION, &[full.clone(), sparse.clone()])
            .await
            .unwrap();

        let listed = list(&store, COLLECTION).await;
        assert_eq!(listed.len(), 2);
        assert!(listed.contains(&full));
        assert!(listed.contains(&sparse));
    }

    #[tokio::test]
    async fn test_empty_collection_lists_nothing() {
        let (store, _dir) = create_test_store().await;
        store.create_collection(COLLECTION).await.unwrap();

        assert!(list(&store, COLLECTION).await.is_empty());
        assert_eq!(store.count(COLLECTION).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_removes_only_target() {
        let (store, _dir) = create_test_store().await;
        store
            .insert_observations(
                COLLECTION,
                &[
                    doc("a", "2025-04-10 10:00:00", 1.0),
                    doc("b", "2025-04-10 11:00:00", 2.0),
                ],
            )
            .await
            .unwrap();

        store.delete(COLLECTION, "a").await.unwrap();

        let ids: Vec<String> = list(&store, COLLECTION)
            .await
            .into_iter()
            .map(|d| d.doc_id)
            .collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[tokio::test]
    async fn test_delete_missing_document_is_delete_error() {
        let (store, _dir) = create_test_store().await;
        store
            .insert_observations(COLLECTION, &[doc("a", "2025-04-10 10:00:00", 1.0)])
            .await
            .unwrap();

        let result = store.delete(COLLECTION, "ghost").await;
        assert!(matches!(
            result,
            Err(CaptrendError::Delete { ref doc_id, .. }) if doc_id == "ghost"
        ));
        assert_eq!(store.count(COLLECTION).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ambiguous_id_is_not_deleted() {
        let (store, _dir) = create_test_store().await;
        store
            .insert_observations(
                COLLECTION,
                &[
                    doc("a", "2025-04-10 10:00:00", 1.0),
                    doc("a", "2025-04-11 10:00:00", 2.0),
                ],
            )
            .await
            .unwrap();

        let result = store.delete(COLLECTION, "a").await;
        assert!(matches!(result, Err(CaptrendError::Delete { .. })));
        assert_eq!(store.count(COLLECTION).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_quoted_ids_are_deleted_safely() {
        let (store, _dir) = create_test_store().await;
        store
            .insert_observations(
                COLLECTION,
                &[
                    doc("it's", "2025-04-10 10:00:00", 1.0),
                    doc("other", "2025-04-10 11:00:00", 2.0),
                ],
            )
            .await
            .unwrap();

        store.delete(COLLECTION, "it's").await.unwrap();
        assert_eq!(store.count(COLLECTION).await.unwrap(), 1);
    }
}

mod audit_tests {
    use super::*;

    fn record(id: &str) -> DeletionRecord {
        DeletionRecord::new(id, at("2025-04-17 12:00:00"))
    }

    #[tokio::test]
    async fn test_absent_log_reads_empty() {
        let (store, _dir) = create_test_store().await;
        let records = store.list_deletions(AUDIT_TABLE, None, None).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_appends_accumulate() {
        let (store, _dir) = create_test_store().await;
        let mut sink = store.audit_sink(AUDIT_TABLE).await.unwrap();

        sink.append(&[record("a"), record("b")]).await.unwrap();
        sink.append(&[record("c")]).await.unwrap();

        let records = store.list_deletions(AUDIT_TABLE, None, None).await.unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.deleted_at == "2025-04-17 12:00:00"));
    }

    #[tokio::test]
    async fn test_reopened_sink_appends_to_existing_log() {
        let (store, _dir) = create_test_store().await;
        store
            .audit_sink(AUDIT_TABLE)
            .await
            .unwrap()
            .append(&[record("a")])
            .await
            .unwrap();
        store
            .audit_sink(AUDIT_TABLE)
            .await
            .unwrap()
            .append(&[record("b")])
            .await
            .unwrap();

        let records = store.list_deletions(AUDIT_TABLE, None, None).await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_filter_and_limit() {
        let (store, _dir) = create_test_store().await;
        let mut sink = store.audit_sink(AUDIT_TABLE).await.unwrap();
        sink.append(&[record("a"), record("b"), record("c")])
            .await
            .unwrap();

        let only_b = store
            .list_deletions(AUDIT_TABLE, Some("b"), None)
            .await
            .unwrap();
        assert_eq!(only_b, vec![record("b")]);

        let limited = store
            .list_deletions(AUDIT_TABLE, None, Some(2))
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_writer_batches_into_table() {
        let (store, _dir) = create_test_store().await;
        let mut sink = store.audit_sink(AUDIT_TABLE).await.unwrap();

        let mut writer = AuditWriter::new(&mut sink, 2);
        for id in ["a", "b", "c"] {
            writer.record(record(id)).await.unwrap();
        }
        let summary = writer.finish().await.unwrap();

        assert_eq!(summary.records, 3);
        assert_eq!(summary.batches, 2);
        assert_eq!(
            store
                .list_deletions(AUDIT_TABLE, None, None)
                .await
                .unwrap()
                .len(),
            3
        );
    }
}

mod pipeline_tests {
    use super::*;

    #[tokio::test]
    async fn test_compaction_against_lance() {
        let (store, _dir) = create_test_store().await;
        store
            .insert_observations(
                COLLECTION,
                &[
                    doc("a1", "2025-04-01 08:00:00", 41.0),
                    doc("a2", "2025-04-01 12:00:00", 50.0),
                    doc("a3", "2025-04-01 16:00:00", 61.0),
                    doc("r1", "2025-04-15 08:00:00", 10.0),
                    doc("r2", "2025-04-15 09:00:00", 10.005),
                    doc("r3", "2025-04-15 10:00:00", 10.02),
                    doc("r4", "2025-04-15 11:00:00", 11.0),
                ],
            )
            .await
            .unwrap();

        let clock = FixedClock(at("2025-04-17 12:00:00"));
        let options = RunOptions::from_config(&Config::default(), Some(COLLECTION));
        let mut sink = store.audit_sink(AUDIT_TABLE).await.unwrap();

        let report = CompactionRun::new(&store, &clock, options.clone())
            .execute(&mut sink)
            .await
            .unwrap();
        assert_eq!(report.deleted, 3);

        let mut survivors: Vec<String> = list(&store, COLLECTION)
            .await
            .into_iter()
            .map(|d| d.doc_id)
            .collect();
        survivors.sort();
        assert_eq!(survivors, vec!["a2", "r1", "r3", "r4"]);

        let mut audited: Vec<String> = store
            .list_deletions(AUDIT_TABLE, None, None)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.doc_id)
            .collect();
        audited.sort();
        assert_eq!(audited, vec!["a1", "a3", "r2"]);

        let again = CompactionRun::new(&store, &clock, options)
            .execute(&mut sink)
            .await
            .unwrap();
        assert_eq!(again.planned_deletions, 0);
    }

    #[tokio::test]
    async fn test_duplicated_id_rows_removed_match_audit() {
        let (store, _dir) = create_test_store().await;
        store
            .insert_observations(
                COLLECTION,
                &[
                    doc("a", "2025-04-01 08:00:00", 41.0),
                    doc("b", "2025-04-01 12:00:00", 50.0),
                    doc("c", "2025-04-01 16:00:00", 61.0),
                    doc("a", "2025-04-03 08:00:00", 99.0),
                ],
            )
            .await
            .unwrap();

        let clock = FixedClock(at("2025-04-17 12:00:00"));
        let options = RunOptions::from_config(&Config::default(), Some(COLLECTION));
        let mut sink = store.audit_sink(AUDIT_TABLE).await.unwrap();

        let report = CompactionRun::new(&store, &clock, options)
            .execute(&mut sink)
            .await
            .unwrap();
        assert_eq!(report.failed, 1);

        let removed = 4 - store.count(COLLECTION).await.unwrap();
        let audited = store.list_deletions(AUDIT_TABLE, None, None).await.unwrap();
        assert_eq!(removed, audited.len());
        assert_eq!(audited, vec![DeletionRecord::new("c", at("2025-04-17 12:00:00"))]);
    }

    #[tokio::test]
    async fn test_missing_collection_fails_run() {
        let (store, _dir) = create_test_store().await;
        let clock = FixedClock(at("2025-04-17 12:00:00"));
        let options = RunOptions::from_config(&Config::default(), Some(COLLECTION));

        let result = CompactionRun::new(&store, &clock, options).preview().await;
        assert!(matches!(result, Err(CaptrendError::Connection(_))));
    }
}
