use std::path::Path;
use std::sync::Arc;

use arrow_array::{Array, Float64Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::{StreamExt, TryStreamExt, stream};
use lancedb::Table;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};

use crate::error::{CaptrendError, Result};
use crate::observation::{DeletionRecord, RawObservation};
use crate::storage::{AuditSink, DocumentStore, DocumentStream};

/// LanceDB database holding one table per observation collection plus the
/// deletion log.
pub struct LanceStore {
    connection: Connection,
    tables: DashMap<String, Table>,
}

impl LanceStore {
    pub async fn connect(path: &Path) -> Result<Self> {
        let uri = path
            .to_str()
            .ok_or_else(|| CaptrendError::Connection("Invalid path encoding".to_string()))?;

        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| CaptrendError::Connection(format!("Failed to connect to LanceDB: {e}")))?;

        Ok(Self {
            connection,
            tables: DashMap::new(),
        })
    }

    fn observations_schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("doc_id", DataType::Utf8, false),
            Field::new("hostid", DataType::Utf8, true),
            Field::new("pool", DataType::Utf8, true),
            Field::new("date", DataType::Utf8, true),
            Field::new("day", DataType::Utf8, true),
            Field::new("perc_used", DataType::Float64, true),
            Field::new("perc_snap", DataType::Float64, true),
            Field::new("used", DataType::Float64, true),
            Field::new("snap", DataType::Float64, true),
            Field::new("total_space", DataType::Float64, true),
            Field::new("unit_id", DataType::Utf8, true),
        ]))
    }

    fn deletions_schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("doc_id", DataType::Utf8, false),
            Field::new("deleted_at", DataType::Utf8, false),
        ]))
    }

    pub async fn table_exists(&self, name: &str) -> Result<bool> {
        let names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| CaptrendError::Connection(format!("Failed to list tables: {e}")))?;

        Ok(names.iter().any(|n| n == name))
    }

    /// Create an empty observation collection
    pub async fn create_collection(&self, name: &str) -> Result<()> {
        let schema = Self::observations_schema();
        let batch = Self::observations_to_batch(&[], schema.clone())?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let table = self
            .connection
            .create_table(name, Box::new(batches))
            .execute()
            .await
            .map_err(|e| {
                CaptrendError::Storage(format!("Failed to create collection '{name}': {e}"))
            })?;

        self.tables.insert(name.to_string(), table);
        Ok(())
    }

    /// Open a table, reusing a previously opened handle
    async fn table(&self, name: &str) -> Result<Table> {
        if let Some(table) = self.tables.get(name) {
            return Ok(table.clone());
        }

        if !self.table_exists(name).await? {
            return Err(CaptrendError::Connection(format!(
                "Collection '{name}' does not exist"
            )));
        }

        let table = self
            .connection
            .open_table(name)
            .execute()
            .await
            .map_err(|e| CaptrendError::Connection(format!("Failed to open table '{name}': {e}")))?;

        self.tables.insert(name.to_string(), table.clone());
        Ok(table)
    }

    /// Append documents to a collection, creating it when missing
    pub async fn insert_observations(
        &self,
        collection: &str,
        observations: &[RawObservation],
    ) -> Result<()> {
        if !self.table_exists(collection).await? {
            self.create_collection(collection).await?;
        }
        if observations.is_empty() {
            return Ok(());
        }

        let table = self.table(collection).await?;
        let schema = Self::observations_schema();
        let batch = Self::observations_to_batch(observations, schema.clone())?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| CaptrendError::Storage(format!("Failed to insert observations: {e}")))?;

        Ok(())
    }

    /// Number of documents in a collection
    pub async fn count(&self, collection: &str) -> Result<usize> {
        let table = self.table(collection).await?;

        table
            .count_rows(None)
            .await
            .map_err(|e| CaptrendError::Storage(format!("Failed to count documents: {e}")))
    }

    /// Open the deletion log, creating it when missing
    pub async fn audit_sink(&self, name: &str) -> Result<LanceAuditSink> {
        if !self.table_exists(name).await? {
            let schema = Self::deletions_schema();
            let batch = Self::deletions_to_batch(&[], schema.clone())?;
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

            let table = self
                .connection
                .create_table(name, Box::new(batches))
                .execute()
                .await
                .map_err(|e| {
                    CaptrendError::Write(format!("Failed to create deletion log '{name}': {e}"))
                })?;
            self.tables.insert(name.to_string(), table);
        }

        let table = self.table(name).await?;
        Ok(LanceAuditSink { table })
    }

    /// Read the deletion log in write order
    ///
    /// An absent log reads as empty.
    pub async fn list_deletions(
        &self,
        name: &str,
        doc_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<DeletionRecord>> {
        if !self.table_exists(name).await? {
            return Ok(Vec::new());
        }
        let table = self.table(name).await?;

        let mut query = table.query();
        if let Some(doc_id) = doc_id {
            query = query.only_if(format!("doc_id = {}", sql_literal(doc_id)));
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }

        let stream = query
            .execute()
            .await
            .map_err(|e| CaptrendError::Storage(format!("Failed to query deletion log: {e}")))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| CaptrendError::Storage(format!("Failed to collect deletion log: {e}")))?;

        let mut records = Vec::new();
        for batch in &batches {
            let doc_ids = string_column(batch, "doc_id")?;
            let deleted_at = string_column(batch, "deleted_at")?;
            for row in 0..batch.num_rows() {
                records.push(DeletionRecord {
                    doc_id: doc_ids.value(row).to_string(),
                    deleted_at: deleted_at.value(row).to_string(),
                });
            }
        }

        Ok(records)
    }

    /// Convert documents to an Arrow RecordBatch
    fn observations_to_batch(
        observations: &[RawObservation],
        schema: Arc<Schema>,
    ) -> Result<RecordBatch> {
        let doc_ids: Vec<&str> = observations.iter().map(|o| o.doc_id.as_str()).collect();
        let hostids: Vec<Option<&str>> = observations.iter().map(|o| o.hostid.as_deref()).collect();
        let pools: Vec<Option<&str>> = observations.iter().map(|o| o.pool.as_deref()).collect();
        let dates: Vec<Option<&str>> = observations.iter().map(|o| o.date.as_deref()).collect();
        let days: Vec<Option<&str>> = observations.iter().map(|o| o.day.as_deref()).collect();
        let unit_ids: Vec<Option<&str>> =
            observations.iter().map(|o| o.unit_id.as_deref()).collect();

        let floats = |f: fn(&RawObservation) -> Option<f64>| -> Float64Array {
            observations.iter().map(f).collect::<Vec<_>>().into()
        };

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(doc_ids)),
                Arc::new(StringArray::from(hostids)),
                Arc::new(StringArray::from(pools)),
                Arc::new(StringArray::from(dates)),
                Arc::new(StringArray::from(days)),
                Arc::new(floats(|o| o.perc_used)),
                Arc::new(floats(|o| o.perc_snap)),
                Arc::new(floats(|o| o.used)),
                Arc::new(floats(|o| o.snap)),
                Arc::new(floats(|o| o.total_space)),
                Arc::new(StringArray::from(unit_ids)),
            ],
        )
        .map_err(|e| CaptrendError::Storage(format!("Failed to create RecordBatch: {e}")))
    }

    /// Convert every row of a RecordBatch back to a document
    fn batch_to_observations(batch: &RecordBatch) -> Vec<Result<RawObservation>> {
        match Self::decode_observations(batch) {
            Ok(rows) => rows.into_iter().map(Ok).collect(),
            Err(e) => vec![Err(e)],
        }
    }

    fn decode_observations(batch: &RecordBatch) -> Result<Vec<RawObservation>> {
        let doc_ids = string_column(batch, "doc_id")?;
        let hostids = string_column(batch, "hostid")?;
        let pools = string_column(batch, "pool")?;
        let dates = string_column(batch, "date")?;
        let days = string_column(batch, "day")?;
        let perc_used = float_column(batch, "perc_used")?;
        let perc_snap = float_column(batch, "perc_snap")?;
        let used = float_column(batch, "used")?;
        let snap = float_column(batch, "snap")?;
        let total_space = float_column(batch, "total_space")?;
        let unit_ids = string_column(batch, "unit_id")?;

        Ok((0..batch.num_rows())
            .map(|row| RawObservation {
                doc_id: doc_ids.value(row).to_string(),
                hostid: optional_str(hostids, row),
                pool: optional_str(pools, row),
                date: optional_str(dates, row),
                day: optional_str(days, row),
                perc_used: optional_f64(perc_used, row),
                perc_snap: optional_f64(perc_snap, row),
                used: optional_f64(used, row),
                snap: optional_f64(snap, row),
                total_space: optional_f64(total_space, row),
                unit_id: optional_str(unit_ids, row),
            })
            .collect())
    }

    fn deletions_to_batch(records: &[DeletionRecord], schema: Arc<Schema>) -> Result<RecordBatch> {
        let doc_ids: Vec<&str> = records.iter().map(|r| r.doc_id.as_str()).collect();
        let deleted_at: Vec<&str> = records.iter().map(|r| r.deleted_at.as_str()).collect();

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(doc_ids)),
                Arc::new(StringArray::from(deleted_at)),
            ],
        )
        .map_err(|e| CaptrendError::Write(format!("Failed to create deletion RecordBatch: {e}")))
    }
}

#[async_trait]
impl DocumentStore for LanceStore {
    async fn list_all(&self, collection: &str) -> Result<DocumentStream> {
        let table = self.table(collection).await?;

        let batches = table.query().execute().await.map_err(|e| {
            CaptrendError::Connection(format!("Failed to list collection '{collection}': {e}"))
        })?;

        let documents = batches
            .map_err(|e| CaptrendError::Connection(format!("Failed to read documents: {e}")))
            .map_ok(|batch| stream::iter(Self::batch_to_observations(&batch)))
            .try_flatten();

        Ok(documents.boxed())
    }

    async fn delete(&self, collection: &str, doc_id: &str) -> Result<()> {
        let table = self
            .table(collection)
            .await
            .map_err(|e| CaptrendError::delete(doc_id, e.to_string()))?;

        let predicate = format!("doc_id = {}", sql_literal(doc_id));

        let existing = table
            .count_rows(Some(predicate.clone()))
            .await
            .map_err(|e| CaptrendError::delete(doc_id, format!("Failed to look up document: {e}")))?;
        match existing {
            0 => return Err(CaptrendError::delete(doc_id, "document not found")),
            1 => {}
            n => {
                return Err(CaptrendError::delete(
                    doc_id,
                    format!("ambiguous document id, {n} rows match"),
                ));
            }
        }

        table
            .delete(&predicate)
            .await
            .map_err(|e| CaptrendError::delete(doc_id, format!("Failed to delete document: {e}")))?;

        Ok(())
    }
}

/// Deletion log backed by an append-only LanceDB table
pub struct LanceAuditSink {
    table: Table,
}

#[async_trait]
impl AuditSink for LanceAuditSink {
    async fn append(&mut self, records: &[DeletionRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let schema = LanceStore::deletions_schema();
        let batch = LanceStore::deletions_to_batch(records, schema.clone())?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        self.table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| {
                CaptrendError::Write(format!(
                    "Failed to append {} deletion records: {e}",
                    records.len()
                ))
            })?;

        Ok(())
    }
}

/// Quote a value for a LanceDB filter expression
fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn string_column<'b>(batch: &'b RecordBatch, name: &str) -> Result<&'b StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| CaptrendError::Storage(format!("Failed to get {name} column")))
}

fn float_column<'b>(batch: &'b RecordBatch, name: &str) -> Result<&'b Float64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
        .ok_or_else(|| CaptrendError::Storage(format!("Failed to get {name} column")))
}

fn optional_str(array: &StringArray, row: usize) -> Option<String> {
    if array.is_null(row) {
        None
    } else {
        Some(array.value(row).to_string())
    }
}

fn optional_f64(array: &Float64Array, row: usize) -> Option<f64> {
    if array.is_null(row) {
        None
    } else {
        Some(array.value(row))
    }
}
