use serde::Serialize;

use super::{SqlDb, StoreResult};

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct FileSummary {
    pub file_path: String,
    pub summary: String,
    pub language: Option<String>,
    pub line_count: i64,
    pub repo_id: i64,
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct DirectorySummary {
    pub dir_path: String,
    pub summary: String,
    pub repo_id: i64,
}

pub async fn upsert_file(
    db: &SqlDb,
    repo_id: i64,
    file_path: &str,
    summary: &str,
    language: Option<&str>,
    line_count: i64,
) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO file_summaries (repo_id, file_path, summary, language, line_count)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT (repo_id, file_path) DO UPDATE SET summary = excluded.summary,
             language = excluded.language, line_count = excluded.line_count",
    )
    .bind(repo_id)
    .bind(file_path)
    .bind(summary)
    .bind(language)
    .bind(line_count)
    .execute(db.as_ref())
    .await?;
    Ok(())
}

pub async fn get_file(
    db: &SqlDb,
    repo_id: i64,
    file_path: &str,
) -> StoreResult<Option<FileSummary>> {
    Ok(sqlx::query_as::<_, FileSummary>(
        "SELECT file_path, summary, language, line_count, repo_id FROM file_summaries
         WHERE repo_id = ? AND file_path = ?",
    )
    .bind(repo_id)
    .bind(file_path)
    .fetch_optional(db.as_ref())
    .await?)
}

pub async fn all_files(db: &SqlDb, repo_id: i64) -> StoreResult<Vec<FileSummary>> {
    Ok(sqlx::query_as::<_, FileSummary>(
        "SELECT file_path, summary, language, line_count, repo_id FROM file_summaries
         WHERE repo_id = ? ORDER BY file_path",
    )
    .bind(repo_id)
    .fetch_all(db.as_ref())
    .await?)
}

pub async fn summarized_paths(db: &SqlDb, repo_id: i64) -> StoreResult<Vec<String>> {
    Ok(
        sqlx::query_scalar("SELECT file_path FROM file_summaries WHERE repo_id = ?")
            .bind(repo_id)
            .fetch_all(db.as_ref())
            .await?,
    )
}

pub async fn delete_file(db: &SqlDb, repo_id: i64, file_path: &str) -> StoreResult<u64> {
    Ok(
        sqlx::query("DELETE FROM file_summaries WHERE repo_id = ? AND file_path = ?")
            .bind(repo_id)
            .bind(file_path)
            .execute(db.as_ref())
            .await?
            .rows_affected(),
    )
}

pub async fn upsert_dir(
    db: &SqlDb,
    repo_id: i64,
    dir_path: &str,
    summary: &str,
) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO dir_summaries (repo_id, dir_path, summary)
         VALUES (?, ?, ?)
         ON CONFLICT (repo_id, dir_path) DO UPDATE SET summary = excluded.summary",
    )
    .bind(repo_id)
    .bind(dir_path)
    .bind(summary)
    .execute(db.as_ref())
    .await?;
    Ok(())
}

pub async fn get_dir(
    db: &SqlDb,
    repo_id: i64,
    dir_path: &str,
) -> StoreResult<Option<DirectorySummary>> {
    Ok(sqlx::query_as::<_, DirectorySummary>(
        "SELECT dir_path, summary, repo_id FROM dir_summaries WHERE repo_id = ? AND dir_path = ?",
    )
    .bind(repo_id)
    .bind(dir_path)
    .fetch_optional(db.as_ref())
    .await?)
}

pub async fn all_dirs(db: &SqlDb, repo_id: i64) -> StoreResult<Vec<DirectorySummary>> {
    Ok(sqlx::query_as::<_, DirectorySummary>(
        "SELECT dir_path, summary, repo_id FROM dir_summaries WHERE repo_id = ? ORDER BY dir_path",
    )
    .bind(repo_id)
    .fetch_all(db.as_ref())
    .await?)
}

pub async fn delete_dir(db: &SqlDb, repo_id: i64, dir_path: &str) -> StoreResult<u64> {
    Ok(
        sqlx::query("DELETE FROM dir_summaries WHERE repo_id = ? AND dir_path = ?")
            .bind(repo_id)
            .bind(dir_path)
            .execute(db.as_ref())
            .await?
            .rows_affected(),
    )
}

pub async fn file_count(db: &SqlDb, repo_id: i64) -> StoreResult<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM file_summaries WHERE repo_id = ?")
            .bind(repo_id)
            .fetch_one(db.as_ref())
            .await?,
    )
}

pub async fn dir_count(db: &SqlDb, repo_id: i64) -> StoreResult<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM dir_summaries WHERE repo_id = ?")
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
    async fn file_summary_upserts_in_place() {
        let db = test_db().await;
        upsert_file(&db, 1, "src/a.ts", "first", Some("typescript"), 10)
            .await
            .unwrap();
        upsert_file(&db, 1, "src/a.ts", "second", Some("typescript"), 12)
            .await
            .unwrap();
        let row = get_file(&db, 1, "src/a.ts").await.unwrap().unwrap();
        assert_eq!(row.summary, "second");
        assert_eq!(file_count(&db, 1).await.unwrap(), 1);
    }
}
