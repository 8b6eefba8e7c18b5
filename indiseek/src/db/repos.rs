use serde::{Deserialize, Serialize};

use super::{SqlDb, StoreError, StoreResult};

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Debug)]
#[serde(rename_all = "snake_case")]
pub enum RepoStatus {
    Cloning,
    Active,
    Deleted,
}

impl RepoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoStatus::Cloning => "cloning",
            RepoStatus::Active => "active",
            RepoStatus::Deleted => "deleted",
        }
    }
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct Repo {
    pub id: i64,
    pub name: String,
    pub origin_url: Option<String>,
    pub local_path: String,
    pub created_at: String,
    pub last_indexed_at: Option<String>,
    pub indexed_commit_sha: Option<String>,
    pub current_commit_sha: Option<String>,
    pub commits_behind: i64,
    pub status: String,
}

impl Repo {
    pub fn is_active(&self) -> bool {
        self.status == RepoStatus::Active.as_str()
    }
}

pub async fn create(
    db: &SqlDb,
    name: &str,
    origin_url: Option<&str>,
    local_path: &str,
    status: RepoStatus,
) -> StoreResult<Repo> {
    let created_at = chrono::Utc::now().to_rfc3339();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO repos (name, origin_url, local_path, created_at, status)
         VALUES (?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(name)
    .bind(origin_url)
    .bind(local_path)
    .bind(&created_at)
    .bind(status.as_str())
    .fetch_one(db.as_ref())
    .await
    .map_err(|e| StoreError::from_insert(e, &format!("repo name {name}")))?;

    get(db, id).await
}

pub async fn get(db: &SqlDb, repo_id: i64) -> StoreResult<Repo> {
    sqlx::query_as::<_, Repo>("SELECT * FROM repos WHERE id = ?")
        .bind(repo_id)
        .fetch_optional(db.as_ref())
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("repo {repo_id}")))
}

pub async fn list(db: &SqlDb) -> StoreResult<Vec<Repo>> {
    Ok(
        sqlx::query_as::<_, Repo>("SELECT * FROM repos WHERE status != 'deleted' ORDER BY id")
            .fetch_all(db.as_ref())
            .await?,
    )
}

pub async fn set_status(db: &SqlDb, repo_id: i64, status: RepoStatus) -> StoreResult<()> {
    let affected = sqlx::query("UPDATE repos SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(repo_id)
        .execute(db.as_ref())
        .await?
        .rows_affected();
    if affected == 0 {
        return Err(StoreError::NotFound(format!("repo {repo_id}")));
    }
    Ok(())
}

pub async fn set_current_sha(db: &SqlDb, repo_id: i64, sha: &str) -> StoreResult<()> {
    sqlx::query("UPDATE repos SET current_commit_sha = ? WHERE id = ?")
        .bind(sha)
        .bind(repo_id)
        .execute(db.as_ref())
        .await?;
    Ok(())
}

pub async fn set_commits_behind(db: &SqlDb, repo_id: i64, commits_behind: i64) -> StoreResult<()> {
    sqlx::query("UPDATE repos SET commits_behind = ? WHERE id = ?")
        .bind(commits_behind)
        .bind(repo_id)
        .execute(db.as_ref())
        .await?;
    Ok(())
}

/// Record a successful index run: both shas converge on HEAD and the repo is
/// no longer behind.
pub async fn mark_indexed(db: &SqlDb, repo_id: i64, head_sha: &str) -> StoreResult<()> {
    sqlx::query(
        "UPDATE repos SET indexed_commit_sha = ?, current_commit_sha = ?,
            commits_behind = 0, last_indexed_at = ? WHERE id = ?",
    )
    .bind(head_sha)
    .bind(head_sha)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(repo_id)
    .execute(db.as_ref())
    .await?;
    Ok(())
}

/// Cascade removal of every relational row belonging to a repo. The caller
/// is responsible for the vector table, the lexical directory and the clone.
pub async fn delete_all_rows(db: &SqlDb, repo_id: i64) -> StoreResult<()> {
    let mut tx = db.begin().await?;
    for table in [
        "symbols",
        "chunks",
        "file_summaries",
        "dir_summaries",
        "file_contents",
        "xref_occurrences",
        "xref_relationships",
        "xref_symbols",
        "queries",
    ] {
        sqlx::query(&format!("DELETE FROM {table} WHERE repo_id = ?"))
            .bind(repo_id)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("DELETE FROM repos WHERE id = ?")
        .bind(repo_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::test_db;

    #[tokio::test]
    async fn duplicate_repo_name_is_a_conflict() {
        let db = test_db().await;
        create(&db, "vite", None, "/data/repos/1", RepoStatus::Cloning)
            .await
            .unwrap();
        let err = create(&db, "vite", None, "/data/repos/2", RepoStatus::Cloning)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn mark_indexed_converges_shas() {
        let db = test_db().await;
        let repo = create(&db, "r", None, "/tmp/r", RepoStatus::Active)
            .await
            .unwrap();
        mark_indexed(&db, repo.id, "abc123").await.unwrap();
        let repo = get(&db, repo.id).await.unwrap();
        assert_eq!(repo.indexed_commit_sha.as_deref(), Some("abc123"));
        assert_eq!(repo.current_commit_sha.as_deref(), Some("abc123"));
        assert_eq!(repo.commits_behind, 0);
        assert!(repo.last_indexed_at.is_some());
    }
}
