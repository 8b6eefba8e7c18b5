use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::debug;

use super::migrations;

pub type SqlDb = Arc<SqlitePool>;

/// Open (creating if missing) the single relational store and bring the
/// schema up to date. WAL mode so readers proceed while the task writer
/// holds a transaction.
pub async fn init_sqlite_db(
    db_path: &Path,
    legacy_repo_path: Option<&Path>,
) -> anyhow::Result<SqlDb> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    debug!(?db_path, "sqlite pool ready, applying migrations");
    migrations::apply(&pool, legacy_repo_path).await?;

    Ok(Arc::new(pool))
}

#[cfg(test)]
pub(crate) async fn test_db() -> SqlDb {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            SqliteConnectOptions::from_str("sqlite::memory:")
                .expect("memory sqlite options parse"),
        )
        .await
        .expect("in-memory sqlite to open");
    migrations::apply(&pool, None)
        .await
        .expect("migrations to apply");
    Arc::new(pool)
}
