//! Idempotent schema migrations. Tables are created if missing; columns
//! added after the first release are probed through `pragma_table_info`
//! and attached with `ALTER TABLE ... ADD COLUMN ... DEFAULT`, so existing
//! rows inherit the legacy value and a re-run is a no-op.

use std::path::Path;

use sqlx::SqlitePool;
use tracing::info;

const CREATE_TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS repos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        origin_url TEXT,
        local_path TEXT NOT NULL,
        created_at TEXT NOT NULL,
        last_indexed_at TEXT,
        indexed_commit_sha TEXT,
        current_commit_sha TEXT,
        status TEXT NOT NULL DEFAULT 'active'
    )",
    "CREATE TABLE IF NOT EXISTS symbols (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_path TEXT NOT NULL,
        name TEXT NOT NULL,
        kind TEXT NOT NULL,
        start_line INTEGER NOT NULL,
        start_col INTEGER NOT NULL,
        end_line INTEGER NOT NULL,
        end_col INTEGER NOT NULL,
        signature TEXT,
        parent_symbol_id INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS chunks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_path TEXT NOT NULL,
        symbol_name TEXT,
        chunk_type TEXT NOT NULL,
        start_line INTEGER NOT NULL,
        end_line INTEGER NOT NULL,
        content TEXT NOT NULL,
        token_estimate INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS xref_symbols (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol_string TEXT NOT NULL,
        documentation TEXT
    )",
    "CREATE TABLE IF NOT EXISTS xref_occurrences (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        xref_symbol_id INTEGER NOT NULL,
        file_path TEXT NOT NULL,
        start_line INTEGER NOT NULL,
        start_col INTEGER NOT NULL,
        end_line INTEGER NOT NULL,
        end_col INTEGER NOT NULL,
        role TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS xref_relationships (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        xref_symbol_id INTEGER NOT NULL,
        related_xref_symbol_id INTEGER NOT NULL,
        kind TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS file_summaries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_path TEXT NOT NULL,
        summary TEXT NOT NULL,
        language TEXT,
        line_count INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS dir_summaries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        dir_path TEXT NOT NULL,
        summary TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS file_contents (
        file_path TEXT NOT NULL,
        content TEXT NOT NULL,
        line_count INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS queries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        prompt TEXT NOT NULL,
        answer TEXT,
        evidence_json TEXT,
        status TEXT NOT NULL,
        error TEXT,
        created_at TEXT NOT NULL,
        completed_at TEXT,
        duration_secs REAL,
        prompt_tokens INTEGER,
        completion_tokens INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
];

/// Columns added after the original single-repo schema. Existing rows take
/// the legacy default (repo id 1).
const ADDED_COLUMNS: &[(&str, &str, &str)] = &[
    ("repos", "commits_behind", "INTEGER NOT NULL DEFAULT 0"),
    ("symbols", "repo_id", "INTEGER NOT NULL DEFAULT 1"),
    ("chunks", "repo_id", "INTEGER NOT NULL DEFAULT 1"),
    ("xref_symbols", "repo_id", "INTEGER NOT NULL DEFAULT 1"),
    ("xref_occurrences", "repo_id", "INTEGER NOT NULL DEFAULT 1"),
    ("xref_relationships", "repo_id", "INTEGER NOT NULL DEFAULT 1"),
    ("file_summaries", "repo_id", "INTEGER NOT NULL DEFAULT 1"),
    ("dir_summaries", "repo_id", "INTEGER NOT NULL DEFAULT 1"),
    ("file_contents", "repo_id", "INTEGER NOT NULL DEFAULT 1"),
    ("queries", "repo_id", "INTEGER NOT NULL DEFAULT 1"),
    ("queries", "thinking_tokens", "INTEGER"),
    ("queries", "estimated_cost", "REAL"),
    ("queries", "source_query_id", "INTEGER"),
    ("queries", "strategy", "TEXT"),
];

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_symbols_repo_file ON symbols(repo_id, file_path)",
    "CREATE INDEX IF NOT EXISTS idx_symbols_repo_name ON symbols(repo_id, name)",
    "CREATE INDEX IF NOT EXISTS idx_chunks_repo_file ON chunks(repo_id, file_path)",
    "CREATE INDEX IF NOT EXISTS idx_xref_symbols_repo ON xref_symbols(repo_id, symbol_string)",
    "CREATE INDEX IF NOT EXISTS idx_xref_occ_symbol ON xref_occurrences(xref_symbol_id)",
    "CREATE INDEX IF NOT EXISTS idx_xref_occ_repo_file ON xref_occurrences(repo_id, file_path)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_file_summaries_repo_path
        ON file_summaries(repo_id, file_path)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_dir_summaries_repo_path
        ON dir_summaries(repo_id, dir_path)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_file_contents_repo_path
        ON file_contents(repo_id, file_path)",
    "CREATE INDEX IF NOT EXISTS idx_queries_repo_status ON queries(repo_id, status)",
];

pub async fn apply(pool: &SqlitePool, legacy_repo_path: Option<&Path>) -> anyhow::Result<()> {
    for statement in CREATE_TABLES {
        sqlx::query(statement).execute(pool).await?;
    }

    for (table, column, definition) in ADDED_COLUMNS {
        if !column_exists(pool, table, column).await? {
            info!(table, column, "adding missing column");
            sqlx::query(&format!(
                "ALTER TABLE {table} ADD COLUMN {column} {definition}"
            ))
            .execute(pool)
            .await?;
        }
    }

    for statement in CREATE_INDEXES {
        sqlx::query(statement).execute(pool).await?;
    }

    insert_legacy_repo(pool, legacy_repo_path).await?;

    Ok(())
}

async fn column_exists(pool: &SqlitePool, table: &str, column: &str) -> anyhow::Result<bool> {
    let count: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM pragma_table_info('{table}') WHERE name = ?"
    ))
    .bind(column)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Pre-multi-repo databases carry symbols but no repos table content. They
/// keep working through an auto-inserted repo with id 1 pointing at the
/// configured legacy path.
async fn insert_legacy_repo(
    pool: &SqlitePool,
    legacy_repo_path: Option<&Path>,
) -> anyhow::Result<()> {
    let repo_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM repos")
        .fetch_one(pool)
        .await?;
    if repo_count > 0 {
        return Ok(());
    }
    let symbol_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM symbols")
        .fetch_one(pool)
        .await?;
    if symbol_count == 0 {
        return Ok(());
    }

    let local_path = legacy_repo_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| ".".to_owned());
    info!(%local_path, "migrating legacy single-repo index to repo id 1");
    sqlx::query(
        "INSERT INTO repos (id, name, local_path, created_at, status)
         VALUES (1, 'legacy', ?, ?, 'active')",
    )
    .bind(local_path)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::db::sqlite::test_db;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = test_db().await;
        // second application must not error or duplicate columns
        super::apply(&db, None).await.expect("re-apply to succeed");
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pragma_table_info('queries') WHERE name = 'strategy'",
        )
        .fetch_one(db.as_ref())
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn legacy_repo_is_created_when_symbols_exist() {
        let db = test_db().await;
        sqlx::query(
            "INSERT INTO symbols (repo_id, file_path, name, kind, start_line, start_col, end_line, end_col)
             VALUES (1, 'src/a.ts', 'foo', 'function', 1, 0, 3, 1)",
        )
        .execute(db.as_ref())
        .await
        .unwrap();
        super::apply(&db, Some(std::path::Path::new("/srv/legacy"))).await.unwrap();

        let (id, local_path): (i64, String) =
            sqlx::query_as("SELECT id, local_path FROM repos LIMIT 1")
                .fetch_one(db.as_ref())
                .await
                .unwrap();
        assert_eq!(id, 1);
        assert_eq!(local_path, "/srv/legacy");
    }
}
