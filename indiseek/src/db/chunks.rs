use serde::Serialize;

use super::{SqlDb, StoreError, StoreResult};

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct Chunk {
    pub id: i64,
    pub repo_id: i64,
    pub file_path: String,
    pub symbol_name: Option<String>,
    pub chunk_type: String,
    pub start_line: i64,
    pub end_line: i64,
    pub content: String,
    pub token_estimate: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct NewChunk {
    pub file_path: String,
    pub symbol_name: Option<String>,
    pub chunk_type: String,
    pub start_line: i64,
    pub end_line: i64,
    pub content: String,
    pub token_estimate: Option<i64>,
}

/// Chunks are rebuilt per file alongside symbols; returns the fresh row ids
/// so the embed stage can target exactly the new rows.
pub async fn replace_for_file(
    db: &SqlDb,
    repo_id: i64,
    file_path: &str,
    chunks: &[NewChunk],
) -> StoreResult<Vec<i64>> {
    let mut tx = db.begin().await?;
    sqlx::query("DELETE FROM chunks WHERE repo_id = ? AND file_path = ?")
        .bind(repo_id)
        .bind(file_path)
        .execute(&mut *tx)
        .await?;

    let mut ids = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO chunks
                (repo_id, file_path, symbol_name, chunk_type, start_line, end_line, content,
                 token_estimate)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(repo_id)
        .bind(&chunk.file_path)
        .bind(&chunk.symbol_name)
        .bind(&chunk.chunk_type)
        .bind(chunk.start_line)
        .bind(chunk.end_line)
        .bind(&chunk.content)
        .bind(chunk.token_estimate)
        .fetch_one(&mut *tx)
        .await?;
        ids.push(id);
    }

    tx.commit().await?;
    Ok(ids)
}

pub async fn get(db: &SqlDb, repo_id: i64, chunk_id: i64) -> StoreResult<Chunk> {
    sqlx::query_as::<_, Chunk>("SELECT * FROM chunks WHERE repo_id = ? AND id = ?")
        .bind(repo_id)
        .bind(chunk_id)
        .fetch_optional(db.as_ref())
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("chunk {chunk_id}")))
}

pub async fn for_repo(db: &SqlDb, repo_id: i64) -> StoreResult<Vec<Chunk>> {
    Ok(
        sqlx::query_as::<_, Chunk>("SELECT * FROM chunks WHERE repo_id = ? ORDER BY id")
            .bind(repo_id)
            .fetch_all(db.as_ref())
            .await?,
    )
}

pub async fn for_file(db: &SqlDb, repo_id: i64, file_path: &str) -> StoreResult<Vec<Chunk>> {
    Ok(sqlx::query_as::<_, Chunk>(
        "SELECT * FROM chunks WHERE repo_id = ? AND file_path = ? ORDER BY start_line",
    )
    .bind(repo_id)
    .bind(file_path)
    .fetch_all(db.as_ref())
    .await?)
}

pub async fn under_path(db: &SqlDb, repo_id: i64, prefix: &str) -> StoreResult<Vec<Chunk>> {
    Ok(sqlx::query_as::<_, Chunk>(
        "SELECT * FROM chunks WHERE repo_id = ? AND file_path LIKE ? || '%' ORDER BY id",
    )
    .bind(repo_id)
    .bind(prefix)
    .fetch_all(db.as_ref())
    .await?)
}

pub async fn by_ids(db: &SqlDb, repo_id: i64, ids: &[i64]) -> StoreResult<Vec<Chunk>> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let mut query = sqlx::query_as::<_, Chunk>(&format!(
        "SELECT * FROM chunks WHERE repo_id = ? AND id IN ({placeholders})"
    ))
    .bind(repo_id);
    for id in ids {
        query = query.bind(id);
    }
    Ok(query.fetch_all(db.as_ref()).await?)
}

/// Distinct file paths that currently hold chunks, the summarize stage's
/// work list.
pub async fn files_with_chunks(db: &SqlDb, repo_id: i64) -> StoreResult<Vec<String>> {
    Ok(sqlx::query_scalar(
        "SELECT DISTINCT file_path FROM chunks WHERE repo_id = ? ORDER BY file_path",
    )
    .bind(repo_id)
    .fetch_all(db.as_ref())
    .await?)
}

pub async fn delete_by_file(db: &SqlDb, repo_id: i64, file_path: &str) -> StoreResult<u64> {
    Ok(
        sqlx::query("DELETE FROM chunks WHERE repo_id = ? AND file_path = ?")
            .bind(repo_id)
            .bind(file_path)
            .execute(db.as_ref())
            .await?
            .rows_affected(),
    )
}

pub async fn count(db: &SqlDb, repo_id: i64) -> StoreResult<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE repo_id = ?")
            .bind(repo_id)
            .fetch_one(db.as_ref())
            .await?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::test_db;

    pub(crate) fn chunk(file_path: &str, content: &str) -> NewChunk {
        NewChunk {
            file_path: file_path.to_owned(),
            symbol_name: None,
            chunk_type: "function".to_owned(),
            start_line: 1,
            end_line: 10,
            content: content.to_owned(),
            token_estimate: Some(content.len() as i64 / 4),
        }
    }

    #[tokio::test]
    async fn by_ids_filters_on_repo() {
        let db = test_db().await;
        let ids = replace_for_file(&db, 1, "a.ts", &[chunk("a.ts", "fn a")])
            .await
            .unwrap();
        let other = replace_for_file(&db, 2, "b.ts", &[chunk("b.ts", "fn b")])
            .await
            .unwrap();
        let mut all = ids.clone();
        all.extend(other);
        let found = by_ids(&db, 1, &all).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_path, "a.ts");
    }

    #[tokio::test]
    async fn missing_chunk_is_not_found() {
        let db = test_db().await;
        assert!(matches!(
            get(&db, 1, 999).await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }
}
