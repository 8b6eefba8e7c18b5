pub mod chunks;
pub mod contents;
pub mod metadata;
pub mod migrations;
pub mod queries;
pub mod repos;
pub mod sqlite;
pub mod summaries;
pub mod symbols;
pub mod xrefs;

pub use sqlite::{init_sqlite_db, SqlDb};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("sqlite error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl StoreError {
    /// Unique-constraint violations are upsert collisions, everything else
    /// stays a storage error.
    pub(crate) fn from_insert(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return StoreError::Conflict(what.to_owned());
            }
        }
        StoreError::Sqlx(err)
    }
}
