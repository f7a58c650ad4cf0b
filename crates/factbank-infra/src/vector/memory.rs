//! LanceDB-backed similarity store.
//!
//! Implements `SimilarityStore` from `factbank-core` on a single LanceDB
//! table. Search uses cosine distance; results come back closest first and
//! are cut at the caller's distance threshold.

use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};

use factbank_core::memory::store::SimilarityStore;
use factbank_types::error::RepositoryError;
use factbank_types::memory::{
    ListOptions, MemoryId, MemoryRecord, Metadata, NewMemory, RankedMemory, SearchOptions,
};

use super::lance::LanceConnection;
use super::schema::{memory_schema, vector_dimension};

/// LanceDB-backed [`SimilarityStore`].
pub struct LanceSimilarityStore {
    table: lancedb::Table,
    schema: Arc<Schema>,
    dimension: usize,
}

impl LanceSimilarityStore {
    /// Open (or create) `table_name` for vectors of `dimension` components.
    ///
    /// An existing table built for a different dimension is rejected with
    /// `RepositoryError::Conflict`; mixing embedding models in one table would
    /// make every distance meaningless.
    pub async fn open(
        conn: &LanceConnection,
        table_name: &str,
        dimension: usize,
    ) -> Result<Self, RepositoryError> {
        let width = i32::try_from(dimension)
            .map_err(|_| RepositoryError::Query(format!("unsupported dimension {dimension}")))?;
        let schema = Arc::new(memory_schema(width));

        let table = conn
            .ensure_table(table_name, schema.clone())
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to ensure table: {e}")))?;

        let existing = table
            .schema()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to read table schema: {e}")))?;
        match vector_dimension(&existing) {
            Some(found) if found == width => {}
            Some(found) => {
                return Err(RepositoryError::Conflict(format!(
                    "table '{table_name}' stores {found}-dimensional vectors, embedder produces {dimension}"
                )));
            }
            None => {
                return Err(RepositoryError::Conflict(format!(
                    "table '{table_name}' has no vector column"
                )));
            }
        }

        Ok(Self {
            table,
            schema,
            dimension,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<(), RepositoryError> {
        if embedding.len() != self.dimension {
            return Err(RepositoryError::Query(format!(
                "embedding has {} components, store expects {}",
                embedding.len(),
                self.dimension
            )));
        }
        Ok(())
    }

    /// Build an Arrow RecordBatch from complete records.
    fn build_record_batch(&self, records: &[MemoryRecord]) -> Result<RecordBatch, RepositoryError> {
        let ids = StringArray::from_iter_values(records.iter().map(|r| r.id.as_str()));
        let contents = StringArray::from_iter_values(records.iter().map(|r| r.content.as_str()));
        let metadata = records
            .iter()
            .map(|r| serde_json::to_string(&r.metadata))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RepositoryError::Query(format!("Failed to encode metadata: {e}")))?;
        let metadata = StringArray::from(metadata);
        let created = StringArray::from_iter_values(records.iter().map(|r| r.created_at.to_rfc3339()));
        let updated: StringArray = records
            .iter()
            .map(|r| r.updated_at.map(|ts| ts.to_rfc3339()))
            .collect();

        let values = Float32Array::from_iter_values(
            records.iter().flat_map(|r| r.embedding.iter().copied()),
        );
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vectors =
            FixedSizeListArray::try_new(field, self.dimension as i32, Arc::new(values), None)
                .map_err(|e| RepositoryError::Query(format!("Failed to build vector column: {e}")))?;

        RecordBatch::try_new(
            self.schema.clone(),
            vec![
                Arc::new(ids),
                Arc::new(contents),
                Arc::new(metadata),
                Arc::new(created),
                Arc::new(updated),
                Arc::new(vectors),
            ],
        )
        .map_err(|e| RepositoryError::Query(format!("Failed to build record batch: {e}")))
    }

    async fn insert(&self, records: &[MemoryRecord]) -> Result<(), RepositoryError> {
        let batch = self.build_record_batch(records)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        self.table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to add memories: {e}")))?;
        Ok(())
    }

    /// Overwrite the row whose id matches `record` in a single merge, so
    /// readers never observe the row missing.
    ///
    /// No row is inserted when the id is gone, which covers a delete racing
    /// the read in `update`: that surfaces as `NotFound`.
    async fn replace_row(&self, record: &MemoryRecord) -> Result<(), RepositoryError> {
        let batch = self.build_record_batch(std::slice::from_ref(record))?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let mut merge = self.table.merge_insert(&["id"]);
        merge.when_matched_update_all(None);
        let result = merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to update memory: {e}")))?;

        if result.num_updated_rows == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Run a filtered scan and parse every returned row.
    async fn scan(&self, filter: Option<String>) -> Result<Vec<MemoryRecord>, RepositoryError> {
        let query = match filter {
            Some(filter) => self.table.query().only_if(filter),
            None => self.table.query(),
        };
        let results = query
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("Query failed: {e}")))?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to collect results: {e}")))?;

        let mut records = Vec::new();
        for batch in &batches {
            records.extend(record_batch_to_records(batch)?);
        }
        Ok(records)
    }
}

/// Quote a string as a SQL literal for LanceDB filter expressions.
fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn id_filter(id: &MemoryId) -> String {
    format!("id = {}", sql_literal(id.as_str()))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, RepositoryError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| RepositoryError::Query(format!("column '{name}' missing or not Utf8")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid timestamp '{raw}': {e}")))
}

/// Parse Arrow RecordBatch rows into `MemoryRecord` values.
///
/// Columns are looked up by name, so the extra `_distance` column added by
/// vector search is ignored here.
fn record_batch_to_records(batch: &RecordBatch) -> Result<Vec<MemoryRecord>, RepositoryError> {
    let num_rows = batch.num_rows();
    if num_rows == 0 {
        return Ok(vec![]);
    }

    let id_col = string_column(batch, "id")?;
    let content_col = string_column(batch, "content")?;
    let metadata_col = string_column(batch, "metadata")?;
    let created_col = string_column(batch, "created_at")?;
    let updated_col = string_column(batch, "updated_at")?;
    let vector_col = batch
        .column_by_name("vector")
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| RepositoryError::Query("column 'vector' missing".to_string()))?;

    let mut records = Vec::with_capacity(num_rows);
    for i in 0..num_rows {
        let metadata: Metadata = serde_json::from_str(metadata_col.value(i))
            .map_err(|e| RepositoryError::Query(format!("invalid metadata JSON: {e}")))?;
        let updated_at = if updated_col.is_null(i) {
            None
        } else {
            Some(parse_timestamp(updated_col.value(i))?)
        };
        let vector = vector_col.value(i);
        let embedding = vector
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| RepositoryError::Query("vector items are not Float32".to_string()))?
            .values()
            .to_vec();

        records.push(MemoryRecord {
            id: MemoryId::from(id_col.value(i)),
            content: content_col.value(i).to_string(),
            embedding,
            metadata,
            created_at: parse_timestamp(created_col.value(i))?,
            updated_at,
        });
    }

    Ok(records)
}

impl SimilarityStore for LanceSimilarityStore {
    async fn get(&self, id: &MemoryId) -> Result<Option<MemoryRecord>, RepositoryError> {
        Ok(self.scan(Some(id_filter(id))).await?.into_iter().next())
    }

    #[tracing::instrument(name = "lance_add", skip_all, fields(count = memories.len()))]
    async fn add(&self, memories: &[NewMemory]) -> Result<Vec<MemoryRecord>, RepositoryError> {
        if memories.is_empty() {
            return Ok(vec![]);
        }
        for memory in memories {
            self.check_dimension(&memory.embedding)?;
        }

        let now = Utc::now();
        let records: Vec<MemoryRecord> = memories
            .iter()
            .map(|memory| MemoryRecord {
                id: MemoryId::generate(),
                content: memory.content.clone(),
                embedding: memory.embedding.clone(),
                metadata: memory.metadata.clone(),
                created_at: now,
                updated_at: None,
            })
            .collect();

        self.insert(&records).await?;
        Ok(records)
    }

    #[tracing::instrument(name = "lance_update", skip_all, fields(memory_id = %id))]
    async fn update(
        &self,
        id: &MemoryId,
        memory: &NewMemory,
    ) -> Result<MemoryRecord, RepositoryError> {
        self.check_dimension(&memory.embedding)?;

        let existing = self.get(id).await?.ok_or(RepositoryError::NotFound)?;
        let record = MemoryRecord {
            id: existing.id,
            content: memory.content.clone(),
            embedding: memory.embedding.clone(),
            metadata: memory.metadata.clone(),
            created_at: existing.created_at,
            updated_at: Some(Utc::now()),
        };

        self.replace_row(&record).await?;
        Ok(record)
    }

    #[tracing::instrument(name = "lance_delete", skip_all, fields(memory_id = %id))]
    async fn delete(&self, id: &MemoryId) -> Result<(), RepositoryError> {
        self.table
            .delete(&id_filter(id))
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to delete memory: {e}")))?;
        Ok(())
    }

    #[tracing::instrument(
        name = "lance_search",
        skip_all,
        fields(top_k = options.top_k, threshold = options.threshold)
    )]
    async fn search(
        &self,
        query: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<RankedMemory>, RepositoryError> {
        self.check_dimension(query)?;
        if options.top_k == 0 {
            return Ok(vec![]);
        }

        let results = self
            .table
            .vector_search(query)
            .map_err(|e| RepositoryError::Query(format!("Vector search setup failed: {e}")))?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(options.top_k)
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("Vector search failed: {e}")))?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to collect results: {e}")))?;

        let mut ranked = Vec::new();
        for batch in &batches {
            if batch.num_rows() == 0 {
                continue;
            }

            // The _distance column is added by LanceDB vector search
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| RepositoryError::Query("missing _distance column".to_string()))?;

            for (i, record) in record_batch_to_records(batch)?.into_iter().enumerate() {
                let distance = distances.value(i);
                if distance <= options.threshold {
                    ranked.push(RankedMemory { record, distance });
                }
            }
        }

        sort_closest_first(&mut ranked);
        ranked.truncate(options.top_k);
        Ok(ranked)
    }

    /// The cursor is pushed into the scan filter, but LanceDB plain queries
    /// have no ordering, so every row after the cursor is read and sorted
    /// before `offset` and `limit` apply. A page costs O(n) in the rows past
    /// the cursor; walk large tables with the cursor rather than `offset`.
    async fn list(&self, options: &ListOptions) -> Result<Vec<MemoryRecord>, RepositoryError> {
        let filter = options
            .cursor
            .as_ref()
            .map(|cursor| format!("id > {}", sql_literal(cursor.as_str())));

        let mut records = self.scan(filter).await?;
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records
            .into_iter()
            .skip(options.offset)
            .take(options.limit)
            .collect())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count = self
            .table
            .count_rows(None)
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to count rows: {e}")))?;
        Ok(count as u64)
    }
}

/// Ascending distance; ties broken by id so equal scores order deterministically.
pub(crate) fn sort_closest_first(ranked: &mut [RankedMemory]) {
    ranked.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
}
