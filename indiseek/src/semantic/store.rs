//! Per-repo ANN tables on lancedb. One table per repo (`chunks_{repo_id}`)
//! under `DATA_DIR/lancedb`; the embedding dimensionality is fixed by the
//! table schema at creation and re-checked on every open.

use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{ArrowError, DataType, Field, Schema};
use futures::StreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SemanticError {
    #[error("lancedb error: {0}")]
    LanceDb(#[from] lancedb::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("embedding dimension mismatch: table has {table}, got {got}")]
    DimensionMismatch { table: usize, got: usize },

    #[error("malformed column {0} in vector table")]
    MalformedColumn(&'static str),
}

#[derive(Debug, Clone)]
pub struct VectorRow {
    pub chunk_id: i64,
    pub file_path: String,
    pub symbol_name: Option<String>,
    pub chunk_type: String,
    pub content: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub chunk_id: i64,
    pub file_path: String,
    pub symbol_name: Option<String>,
    pub chunk_type: String,
    pub content: String,
    /// Cosine distance, smaller is closer.
    pub distance: f32,
}

pub struct VectorStore {
    db: Connection,
    dims: usize,
}

impl VectorStore {
    pub async fn open(root: &Path, dims: usize) -> Result<Self, SemanticError> {
        let uri = root.to_string_lossy().to_string();
        let db = lancedb::connect(&uri).execute().await?;
        Ok(Self { db, dims })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    fn table_name(repo_id: i64) -> String {
        format!("chunks_{repo_id}")
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("chunk_id", DataType::Int64, false),
            Field::new("file_path", DataType::Utf8, false),
            Field::new("symbol_name", DataType::Utf8, true),
            Field::new("chunk_type", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dims as i32,
                ),
                false,
            ),
        ]))
    }

    pub async fn table_exists(&self, repo_id: i64) -> Result<bool, SemanticError> {
        let tables = self.db.table_names().execute().await?;
        Ok(tables.contains(&Self::table_name(repo_id)))
    }

    /// Open the repo table, creating an empty one on first use. An existing
    /// table with a different vector width is an error, never silently
    /// re-created — mixing dimensionalities is undefined behavior.
    pub async fn create_or_open(&self, repo_id: i64) -> Result<Table, SemanticError> {
        let name = Self::table_name(repo_id);
        if self.table_exists(repo_id).await? {
            let table = self.db.open_table(&name).execute().await?;
            let schema = table.schema().await?;
            let table_dims = schema
                .field_with_name("vector")
                .ok()
                .and_then(|field| match field.data_type() {
                    DataType::FixedSizeList(_, size) => Some(*size as usize),
                    _ => None,
                })
                .ok_or(SemanticError::MalformedColumn("vector"))?;
            if table_dims != self.dims {
                return Err(SemanticError::DimensionMismatch {
                    table: table_dims,
                    got: self.dims,
                });
            }
            return Ok(table);
        }

        let schema = self.schema();
        let empty = RecordBatch::new_empty(schema.clone());
        let reader = RecordBatchIterator::new(vec![Ok(empty)], schema);
        Ok(self.db.create_table(&name, reader).execute().await?)
    }

    fn rows_to_batch(&self, rows: &[VectorRow]) -> Result<RecordBatch, SemanticError> {
        for row in rows {
            if row.vector.len() != self.dims {
                return Err(SemanticError::DimensionMismatch {
                    table: self.dims,
                    got: row.vector.len(),
                });
            }
        }

        let chunk_ids: Vec<i64> = rows.iter().map(|r| r.chunk_id).collect();
        let file_paths: Vec<&str> = rows.iter().map(|r| r.file_path.as_str()).collect();
        let symbol_names: Vec<Option<&str>> =
            rows.iter().map(|r| r.symbol_name.as_deref()).collect();
        let chunk_types: Vec<&str> = rows.iter().map(|r| r.chunk_type.as_str()).collect();
        let contents: Vec<&str> = rows.iter().map(|r| r.content.as_str()).collect();

        let vectors = FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(
            rows.iter()
                .map(|r| Some(r.vector.iter().map(|v| Some(*v)).collect::<Vec<_>>())),
            self.dims as i32,
        );

        Ok(RecordBatch::try_new(
            self.schema(),
            vec![
                Arc::new(Int64Array::from(chunk_ids)),
                Arc::new(StringArray::from(file_paths)),
                Arc::new(StringArray::from(symbol_names)),
                Arc::new(StringArray::from(chunk_types)),
                Arc::new(StringArray::from(contents)),
                Arc::new(vectors),
            ],
        )?)
    }

    /// Insert rows, replacing any previous vector for the same chunk id.
    pub async fn upsert(&self, repo_id: i64, rows: &[VectorRow]) -> Result<(), SemanticError> {
        if rows.is_empty() {
            return Ok(());
        }
        let table = self.create_or_open(repo_id).await?;
        let ids = rows
            .iter()
            .map(|r| r.chunk_id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        table.delete(&format!("chunk_id IN ({ids})")).await?;

        let batch = self.rows_to_batch(rows)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table.add(reader).execute().await?;
        Ok(())
    }

    /// Chunk ids already embedded, used by the embed stage to skip done work.
    pub async fn existing_ids(&self, repo_id: i64) -> Result<Vec<i64>, SemanticError> {
        if !self.table_exists(repo_id).await? {
            return Ok(vec![]);
        }
        let table = self.db
            .open_table(&Self::table_name(repo_id))
            .execute()
            .await?;
        let mut stream = table.query().execute().await?;
        let mut ids = vec![];
        while let Some(batch) = stream.next().await {
            let batch = batch?;
            let column = batch
                .column_by_name("chunk_id")
                .and_then(|c| c.as_any().downcast_ref::<Int64Array>().cloned())
                .ok_or(SemanticError::MalformedColumn("chunk_id"))?;
            ids.extend(column.values().iter().copied());
        }
        Ok(ids)
    }

    pub async fn search(
        &self,
        repo_id: i64,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<VectorHit>, SemanticError> {
        if vector.len() != self.dims {
            return Err(SemanticError::DimensionMismatch {
                table: self.dims,
                got: vector.len(),
            });
        }
        if !self.table_exists(repo_id).await? {
            return Ok(vec![]);
        }
        let table = self.db
            .open_table(&Self::table_name(repo_id))
            .execute()
            .await?;
        let mut stream = table
            .vector_search(vector.to_vec())?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await?;

        let mut hits = vec![];
        while let Some(batch) = stream.next().await {
            let batch = batch?;
            hits.extend(Self::batch_to_hits(&batch)?);
        }
        hits.truncate(k);
        Ok(hits)
    }

    fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<VectorHit>, SemanticError> {
        let chunk_ids = batch
            .column_by_name("chunk_id")
            .and_then(|c| c.as_any().downcast_ref::<Int64Array>().cloned())
            .ok_or(SemanticError::MalformedColumn("chunk_id"))?;
        let file_paths = batch
            .column_by_name("file_path")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>().cloned())
            .ok_or(SemanticError::MalformedColumn("file_path"))?;
        let symbol_names = batch
            .column_by_name("symbol_name")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>().cloned())
            .ok_or(SemanticError::MalformedColumn("symbol_name"))?;
        let chunk_types = batch
            .column_by_name("chunk_type")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>().cloned())
            .ok_or(SemanticError::MalformedColumn("chunk_type"))?;
        let contents = batch
            .column_by_name("content")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>().cloned())
            .ok_or(SemanticError::MalformedColumn("content"))?;
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>().cloned())
            .ok_or(SemanticError::MalformedColumn("_distance"))?;

        let mut hits = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            hits.push(VectorHit {
                chunk_id: chunk_ids.value(i),
                file_path: file_paths.value(i).to_owned(),
                symbol_name: if symbol_names.is_null(i) {
                    None
                } else {
                    Some(symbol_names.value(i).to_owned())
                },
                chunk_type: chunk_types.value(i).to_owned(),
                content: contents.value(i).to_owned(),
                distance: distances.value(i),
            });
        }
        Ok(hits)
    }

    pub async fn delete_by_files(
        &self,
        repo_id: i64,
        paths: &[String],
    ) -> Result<(), SemanticError> {
        if paths.is_empty() || !self.table_exists(repo_id).await? {
            return Ok(());
        }
        let table = self.db
            .open_table(&Self::table_name(repo_id))
            .execute()
            .await?;
        let escaped = paths
            .iter()
            .map(|p| format!("'{}'", p.replace('\'', "''")))
            .collect::<Vec<_>>()
            .join(", ");
        table.delete(&format!("file_path IN ({escaped})")).await?;
        Ok(())
    }

    pub async fn drop_repo(&self, repo_id: i64) -> Result<(), SemanticError> {
        if self.table_exists(repo_id).await? {
            self.db.drop_table(&Self::table_name(repo_id)).await?;
        }
        Ok(())
    }

    pub async fn count(&self, repo_id: i64) -> Result<usize, SemanticError> {
        if !self.table_exists(repo_id).await? {
            return Ok(0);
        }
        let table = self.db
            .open_table(&Self::table_name(repo_id))
            .execute()
            .await?;
        Ok(table.count_rows(None).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(chunk_id: i64, file_path: &str, vector: Vec<f32>) -> VectorRow {
        VectorRow {
            chunk_id,
            file_path: file_path.to_owned(),
            symbol_name: None,
            chunk_type: "function".to_owned(),
            content: "fn noop() {}".to_owned(),
            vector,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_same_chunk_id() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::open(dir.path(), 4).await.unwrap();
        store
            .upsert(1, &[row(7, "a.ts", vec![1.0, 0.0, 0.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert(1, &[row(7, "a.ts", vec![0.0, 1.0, 0.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(store.count(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn search_orders_by_cosine_distance() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::open(dir.path(), 4).await.unwrap();
        store
            .upsert(
                1,
                &[
                    row(1, "a.ts", vec![1.0, 0.0, 0.0, 0.0]),
                    row(2, "b.ts", vec![0.0, 1.0, 0.0, 0.0]),
                ],
            )
            .await
            .unwrap();
        let hits = store.search(1, &[1.0, 0.05, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, 1);
        assert!(hits[0].distance < hits[1].distance);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::open(dir.path(), 4).await.unwrap();
        store
            .upsert(1, &[row(1, "a.ts", vec![1.0, 0.0, 0.0, 0.0])])
            .await
            .unwrap();

        let err = store.search(1, &[1.0, 0.0], 2).await.unwrap_err();
        assert!(matches!(err, SemanticError::DimensionMismatch { .. }));

        let reopened = VectorStore::open(dir.path(), 8).await.unwrap();
        let err = reopened.create_or_open(1).await.unwrap_err();
        assert!(matches!(err, SemanticError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn delete_by_files_removes_only_named_paths() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::open(dir.path(), 4).await.unwrap();
        store
            .upsert(
                1,
                &[
                    row(1, "src/foo.ts", vec![1.0, 0.0, 0.0, 0.0]),
                    row(2, "src/bar.ts", vec![0.0, 1.0, 0.0, 0.0]),
                ],
            )
            .await
            .unwrap();
        store
            .delete_by_files(1, &["src/foo.ts".to_owned()])
            .await
            .unwrap();
        let ids = store.existing_ids(1).await.unwrap();
        assert_eq!(ids, vec![2]);
    }
}
