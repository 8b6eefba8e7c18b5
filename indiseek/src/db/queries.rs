use serde::Serialize;

use super::{SqlDb, StoreError, StoreResult};

pub const STATUS_RUNNING: &str = "running";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_CACHED: &str = "cached";

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct QueryRecord {
    pub id: i64,
    pub repo_id: i64,
    pub prompt: String,
    pub answer: Option<String>,
    pub evidence_json: Option<String>,
    pub status: String,
    pub error: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
    pub duration_secs: Option<f64>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub thinking_tokens: Option<i64>,
    pub estimated_cost: Option<f64>,
    pub source_query_id: Option<i64>,
    pub strategy: Option<String>,
}

pub struct CompletedQuery<'a> {
    pub answer: &'a str,
    pub evidence_json: &'a str,
    pub duration_secs: f64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub thinking_tokens: i64,
    pub estimated_cost: Option<f64>,
    pub strategy: &'a str,
}

pub async fn insert_running(db: &SqlDb, repo_id: i64, prompt: &str) -> StoreResult<i64> {
    Ok(sqlx::query_scalar(
        "INSERT INTO queries (repo_id, prompt, status, created_at)
         VALUES (?, ?, 'running', ?) RETURNING id",
    )
    .bind(repo_id)
    .bind(prompt)
    .bind(chrono::Utc::now().to_rfc3339())
    .fetch_one(db.as_ref())
    .await?)
}

/// Rows are immutable once completed; this is the only transition out of
/// `running` besides `fail`.
pub async fn complete(db: &SqlDb, query_id: i64, done: CompletedQuery<'_>) -> StoreResult<()> {
    sqlx::query(
        "UPDATE queries SET status = 'completed', answer = ?, evidence_json = ?,
            completed_at = ?, duration_secs = ?, prompt_tokens = ?, completion_tokens = ?,
            thinking_tokens = ?, estimated_cost = ?, strategy = ?
         WHERE id = ? AND status = 'running'",
    )
    .bind(done.answer)
    .bind(done.evidence_json)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(done.duration_secs)
    .bind(done.prompt_tokens)
    .bind(done.completion_tokens)
    .bind(done.thinking_tokens)
    .bind(done.estimated_cost)
    .bind(done.strategy)
    .bind(query_id)
    .execute(db.as_ref())
    .await?;
    Ok(())
}

pub async fn fail(db: &SqlDb, query_id: i64, error: &str) -> StoreResult<()> {
    sqlx::query(
        "UPDATE queries SET status = 'failed', error = ?, completed_at = ?
         WHERE id = ? AND status = 'running'",
    )
    .bind(error)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(query_id)
    .execute(db.as_ref())
    .await?;
    Ok(())
}

/// A cache hit materializes as its own row pointing back at the original.
pub async fn insert_cached(
    db: &SqlDb,
    repo_id: i64,
    prompt: &str,
    source: &QueryRecord,
) -> StoreResult<i64> {
    let now = chrono::Utc::now().to_rfc3339();
    Ok(sqlx::query_scalar(
        "INSERT INTO queries (repo_id, prompt, answer, evidence_json, status, created_at,
            completed_at, source_query_id, strategy)
         VALUES (?, ?, ?, ?, 'cached', ?, ?, ?, ?) RETURNING id",
    )
    .bind(repo_id)
    .bind(prompt)
    .bind(&source.answer)
    .bind(&source.evidence_json)
    .bind(&now)
    .bind(&now)
    .bind(source.id)
    .bind(&source.strategy)
    .fetch_one(db.as_ref())
    .await?)
}

pub async fn get(db: &SqlDb, query_id: i64) -> StoreResult<QueryRecord> {
    sqlx::query_as::<_, QueryRecord>("SELECT * FROM queries WHERE id = ?")
        .bind(query_id)
        .fetch_optional(db.as_ref())
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("query {query_id}")))
}

pub async fn list(db: &SqlDb, repo_id: i64, limit: i64) -> StoreResult<Vec<QueryRecord>> {
    Ok(sqlx::query_as::<_, QueryRecord>(
        "SELECT * FROM queries WHERE repo_id = ? ORDER BY id DESC LIMIT ?",
    )
    .bind(repo_id)
    .bind(limit)
    .fetch_all(db.as_ref())
    .await?)
}

/// Cache candidates: completed answers newer than the last index mutation.
pub async fn completed_since(
    db: &SqlDb,
    repo_id: i64,
    since: &str,
) -> StoreResult<Vec<QueryRecord>> {
    Ok(sqlx::query_as::<_, QueryRecord>(
        "SELECT * FROM queries
         WHERE repo_id = ? AND status = 'completed' AND completed_at > ?
         ORDER BY completed_at DESC",
    )
    .bind(repo_id)
    .bind(since)
    .fetch_all(db.as_ref())
    .await?)
}

pub async fn count(db: &SqlDb, repo_id: i64) -> StoreResult<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM queries WHERE repo_id = ?")
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
    async fn lifecycle_running_to_completed() {
        let db = test_db().await;
        let id = insert_running(&db, 1, "how does hmr work").await.unwrap();
        complete(
            &db,
            id,
            CompletedQuery {
                answer: "through the module graph",
                evidence_json: "[]",
                duration_secs: 3.5,
                prompt_tokens: 1000,
                completion_tokens: 200,
                thinking_tokens: 0,
                estimated_cost: Some(0.001),
                strategy: "classic",
            },
        )
        .await
        .unwrap();

        let row = get(&db, id).await.unwrap();
        assert_eq!(row.status, STATUS_COMPLETED);
        assert_eq!(row.answer.as_deref(), Some("through the module graph"));
    }

    #[tokio::test]
    async fn cached_rows_reference_their_source() {
        let db = test_db().await;
        let id = insert_running(&db, 1, "original").await.unwrap();
        complete(
            &db,
            id,
            CompletedQuery {
                answer: "a",
                evidence_json: "[]",
                duration_secs: 1.0,
                prompt_tokens: 0,
                completion_tokens: 0,
                thinking_tokens: 0,
                estimated_cost: None,
                strategy: "single",
            },
        )
        .await
        .unwrap();
        let source = get(&db, id).await.unwrap();
        let cached_id = insert_cached(&db, 1, "ORIGINAL", &source).await.unwrap();
        let cached = get(&db, cached_id).await.unwrap();
        assert_eq!(cached.status, STATUS_CACHED);
        assert_eq!(cached.source_query_id, Some(id));
        assert_eq!(cached.answer.as_deref(), Some("a"));
    }
}
