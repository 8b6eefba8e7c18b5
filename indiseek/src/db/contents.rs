use serde::Serialize;

use super::{SqlDb, StoreError, StoreResult};

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct FileContent {
    pub file_path: String,
    pub content: String,
    pub line_count: i64,
    pub repo_id: i64,
}

/// Authoritative source for read_file — no disk access at query time.
pub async fn upsert(db: &SqlDb, repo_id: i64, file_path: &str, content: &str) -> StoreResult<()> {
    let line_count = content.lines().count() as i64;
    sqlx::query(
        "INSERT INTO file_contents (repo_id, file_path, content, line_count)
         VALUES (?, ?, ?, ?)
         ON CONFLICT (repo_id, file_path) DO UPDATE SET content = excluded.content,
             line_count = excluded.line_count",
    )
    .bind(repo_id)
    .bind(file_path)
    .bind(content)
    .bind(line_count)
    .execute(db.as_ref())
    .await?;
    Ok(())
}

pub async fn get(db: &SqlDb, repo_id: i64, file_path: &str) -> StoreResult<FileContent> {
    sqlx::query_as::<_, FileContent>(
        "SELECT * FROM file_contents WHERE repo_id = ? AND file_path = ?",
    )
    .bind(repo_id)
    .bind(file_path)
    .fetch_optional(db.as_ref())
    .await?
    .ok_or_else(|| StoreError::NotFound(format!("file {file_path}")))
}

/// Stored content for change detection during re-parse; None when the file
/// has never been indexed.
pub async fn stored_content(
    db: &SqlDb,
    repo_id: i64,
    file_path: &str,
) -> StoreResult<Option<String>> {
    Ok(sqlx::query_scalar(
        "SELECT content FROM file_contents WHERE repo_id = ? AND file_path = ?",
    )
    .bind(repo_id)
    .bind(file_path)
    .fetch_optional(db.as_ref())
    .await?)
}

pub async fn all_paths(db: &SqlDb, repo_id: i64) -> StoreResult<Vec<String>> {
    Ok(sqlx::query_scalar(
        "SELECT file_path FROM file_contents WHERE repo_id = ? ORDER BY file_path",
    )
    .bind(repo_id)
    .fetch_all(db.as_ref())
    .await?)
}

pub async fn delete_by_file(db: &SqlDb, repo_id: i64, file_path: &str) -> StoreResult<u64> {
    Ok(
        sqlx::query("DELETE FROM file_contents WHERE repo_id = ? AND file_path = ?")
            .bind(repo_id)
            .bind(file_path)
            .execute(db.as_ref())
            .await?
            .rows_affected(),
    )
}

pub async fn count(db: &SqlDb, repo_id: i64) -> StoreResult<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM file_contents WHERE repo_id = ?")
            .bind(repo_id)
            .fetch_one(db.as_ref())
            .await?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::test_db;

    #[tokio::test]
    async fn upsert_replaces_and_counts_lines() {
        let db = test_db().await;
        upsert(&db, 1, "src/a.ts", "one\ntwo\nthree").await.unwrap();
        upsert(&db, 1, "src/a.ts", "one\ntwo").await.unwrap();
        let row = get(&db, 1, "src/a.ts").await.unwrap();
        assert_eq!(row.line_count, 2);
        assert_eq!(count(&db, 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let db = test_db().await;
        assert!(matches!(
            get(&db, 1, "nope.ts").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }
}
