use serde::Serialize;

use super::{SqlDb, StoreError, StoreResult};

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct XrefSymbol {
    pub id: i64,
    pub repo_id: i64,
    pub symbol_string: String,
    pub documentation: Option<String>,
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct Occurrence {
    pub id: i64,
    pub xref_symbol_id: i64,
    pub repo_id: i64,
    pub file_path: String,
    pub start_line: i64,
    pub start_col: i64,
    pub end_line: i64,
    pub end_col: i64,
    pub role: String,
}

pub const ROLE_DEFINITION: &str = "definition";
pub const ROLE_REFERENCE: &str = "reference";

#[derive(Clone, Debug)]
pub struct NewOccurrence {
    pub file_path: String,
    pub start_line: i64,
    pub start_col: i64,
    pub end_line: i64,
    pub end_col: i64,
    pub role: &'static str,
}

/// Uniqueness of (symbol_string, repo_id) is enforced here rather than by a
/// table constraint — the legacy schema had UNIQUE(symbol_string) only, and
/// the lookup is needed for upsert-by-string anyway.
pub async fn upsert_symbol(
    db: &SqlDb,
    repo_id: i64,
    symbol_string: &str,
    documentation: Option<&str>,
) -> StoreResult<i64> {
    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM xref_symbols WHERE repo_id = ? AND symbol_string = ?",
    )
    .bind(repo_id)
    .bind(symbol_string)
    .fetch_optional(db.as_ref())
    .await?;

    if let Some(id) = existing {
        if documentation.is_some() {
            sqlx::query("UPDATE xref_symbols SET documentation = ? WHERE id = ?")
                .bind(documentation)
                .bind(id)
                .execute(db.as_ref())
                .await?;
        }
        return Ok(id);
    }

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO xref_symbols (repo_id, symbol_string, documentation)
         VALUES (?, ?, ?) RETURNING id",
    )
    .bind(repo_id)
    .bind(symbol_string)
    .bind(documentation)
    .fetch_one(db.as_ref())
    .await
    .map_err(|e| StoreError::from_insert(e, symbol_string))?;
    Ok(id)
}

pub async fn insert_occurrences(
    db: &SqlDb,
    repo_id: i64,
    xref_symbol_id: i64,
    occurrences: &[NewOccurrence],
) -> StoreResult<u64> {
    let mut tx = db.begin().await?;
    for occurrence in occurrences {
        sqlx::query(
            "INSERT INTO xref_occurrences
                (xref_symbol_id, repo_id, file_path, start_line, start_col, end_line, end_col, role)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(xref_symbol_id)
        .bind(repo_id)
        .bind(&occurrence.file_path)
        .bind(occurrence.start_line)
        .bind(occurrence.start_col)
        .bind(occurrence.end_line)
        .bind(occurrence.end_col)
        .bind(occurrence.role)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(occurrences.len() as u64)
}

pub async fn insert_relationship(
    db: &SqlDb,
    repo_id: i64,
    xref_symbol_id: i64,
    related_xref_symbol_id: i64,
    kind: &str,
) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO xref_relationships (xref_symbol_id, related_xref_symbol_id, kind, repo_id)
         VALUES (?, ?, ?, ?)",
    )
    .bind(xref_symbol_id)
    .bind(related_xref_symbol_id)
    .bind(kind)
    .bind(repo_id)
    .execute(db.as_ref())
    .await?;
    Ok(())
}

/// Full reload support: cross-references are never patched incrementally.
pub async fn clear_repo(db: &SqlDb, repo_id: i64) -> StoreResult<()> {
    let mut tx = db.begin().await?;
    for table in ["xref_occurrences", "xref_relationships", "xref_symbols"] {
        sqlx::query(&format!("DELETE FROM {table} WHERE repo_id = ?"))
            .bind(repo_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn symbols_matching_name(
    db: &SqlDb,
    repo_id: i64,
    name: &str,
) -> StoreResult<Vec<XrefSymbol>> {
    // scip symbol strings end in the display name, e.g. `...`/Foo#bar().`
    Ok(sqlx::query_as::<_, XrefSymbol>(
        "SELECT * FROM xref_symbols WHERE repo_id = ? AND symbol_string LIKE '%' || ? || '%'",
    )
    .bind(repo_id)
    .bind(name)
    .fetch_all(db.as_ref())
    .await?)
}

pub async fn occurrences_for_symbol(
    db: &SqlDb,
    repo_id: i64,
    xref_symbol_id: i64,
    role: &str,
) -> StoreResult<Vec<Occurrence>> {
    Ok(sqlx::query_as::<_, Occurrence>(
        "SELECT * FROM xref_occurrences
         WHERE repo_id = ? AND xref_symbol_id = ? AND role = ?
         ORDER BY file_path, start_line",
    )
    .bind(repo_id)
    .bind(xref_symbol_id)
    .bind(role)
    .fetch_all(db.as_ref())
    .await?)
}

/// Reference occurrences whose start line falls inside a definition range —
/// the raw material for callee resolution.
pub async fn references_in_range(
    db: &SqlDb,
    repo_id: i64,
    file_path: &str,
    start_line: i64,
    end_line: i64,
) -> StoreResult<Vec<Occurrence>> {
    Ok(sqlx::query_as::<_, Occurrence>(
        "SELECT * FROM xref_occurrences
         WHERE repo_id = ? AND file_path = ? AND role = 'reference'
           AND start_line >= ? AND start_line <= ?
         ORDER BY start_line",
    )
    .bind(repo_id)
    .bind(file_path)
    .bind(start_line)
    .bind(end_line)
    .fetch_all(db.as_ref())
    .await?)
}

pub async fn symbol_by_id(db: &SqlDb, xref_symbol_id: i64) -> StoreResult<XrefSymbol> {
    sqlx::query_as::<_, XrefSymbol>("SELECT * FROM xref_symbols WHERE id = ?")
        .bind(xref_symbol_id)
        .fetch_optional(db.as_ref())
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("xref symbol {xref_symbol_id}")))
}

pub async fn delete_occurrences_by_file(
    db: &SqlDb,
    repo_id: i64,
    file_path: &str,
) -> StoreResult<u64> {
    Ok(
        sqlx::query("DELETE FROM xref_occurrences WHERE repo_id = ? AND file_path = ?")
            .bind(repo_id)
            .bind(file_path)
            .execute(db.as_ref())
            .await?
            .rows_affected(),
    )
}

pub async fn symbol_count(db: &SqlDb, repo_id: i64) -> StoreResult<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM xref_symbols WHERE repo_id = ?")
            .bind(repo_id)
            .fetch_one(db.as_ref())
            .await?,
    )
}

pub async fn occurrence_count(db: &SqlDb, repo_id: i64) -> StoreResult<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM xref_occurrences WHERE repo_id = ?")
            .bind(repo_id)
            .fetch_one(db.as_ref())
            .await?,
    )
}
