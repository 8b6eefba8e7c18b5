use serde::Serialize;

use super::{SqlDb, StoreResult};

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct Symbol {
    pub id: i64,
    pub repo_id: i64,
    pub file_path: String,
    pub name: String,
    pub kind: String,
    pub start_line: i64,
    pub start_col: i64,
    pub end_line: i64,
    pub end_col: i64,
    pub signature: Option<String>,
    pub parent_symbol_id: Option<i64>,
}

/// Insert form produced by the parser. `parent` indexes into the same batch
/// (methods point at their class), resolved to row ids during insert.
#[derive(Clone, Debug)]
pub struct NewSymbol {
    pub name: String,
    pub kind: String,
    pub start_line: i64,
    pub start_col: i64,
    pub end_line: i64,
    pub end_col: i64,
    pub signature: Option<String>,
    pub parent: Option<usize>,
}

/// Symbols are rebuilt per file on every parse: clear then insert, one
/// transaction.
pub async fn replace_for_file(
    db: &SqlDb,
    repo_id: i64,
    file_path: &str,
    symbols: &[NewSymbol],
) -> StoreResult<u64> {
    let mut tx = db.begin().await?;
    sqlx::query("DELETE FROM symbols WHERE repo_id = ? AND file_path = ?")
        .bind(repo_id)
        .bind(file_path)
        .execute(&mut *tx)
        .await?;

    let mut inserted_ids: Vec<i64> = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let parent_symbol_id = symbol.parent.and_then(|idx| inserted_ids.get(idx).copied());
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO symbols
                (repo_id, file_path, name, kind, start_line, start_col, end_line, end_col,
                 signature, parent_symbol_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(repo_id)
        .bind(file_path)
        .bind(&symbol.name)
        .bind(&symbol.kind)
        .bind(symbol.start_line)
        .bind(symbol.start_col)
        .bind(symbol.end_line)
        .bind(symbol.end_col)
        .bind(&symbol.signature)
        .bind(parent_symbol_id)
        .fetch_one(&mut *tx)
        .await?;
        inserted_ids.push(id);
    }

    tx.commit().await?;
    Ok(symbols.len() as u64)
}

pub async fn find_by_name(db: &SqlDb, repo_id: i64, name: &str) -> StoreResult<Vec<Symbol>> {
    Ok(sqlx::query_as::<_, Symbol>(
        "SELECT * FROM symbols WHERE repo_id = ? AND name = ? ORDER BY file_path, start_line",
    )
    .bind(repo_id)
    .bind(name)
    .fetch_all(db.as_ref())
    .await?)
}

/// The innermost symbol whose range contains the given line — tightest
/// span wins, so a method beats its class.
pub async fn enclosing(
    db: &SqlDb,
    repo_id: i64,
    file_path: &str,
    line: i64,
) -> StoreResult<Option<Symbol>> {
    Ok(sqlx::query_as::<_, Symbol>(
        "SELECT * FROM symbols
         WHERE repo_id = ? AND file_path = ? AND start_line <= ? AND end_line >= ?
         ORDER BY (end_line - start_line) ASC LIMIT 1",
    )
    .bind(repo_id)
    .bind(file_path)
    .bind(line)
    .bind(line)
    .fetch_optional(db.as_ref())
    .await?)
}

pub async fn delete_by_file(db: &SqlDb, repo_id: i64, file_path: &str) -> StoreResult<u64> {
    Ok(
        sqlx::query("DELETE FROM symbols WHERE repo_id = ? AND file_path = ?")
            .bind(repo_id)
            .bind(file_path)
            .execute(db.as_ref())
            .await?
            .rows_affected(),
    )
}

pub async fn delete_under_path(db: &SqlDb, repo_id: i64, prefix: &str) -> StoreResult<u64> {
    Ok(
        sqlx::query("DELETE FROM symbols WHERE repo_id = ? AND file_path LIKE ? || '%'")
            .bind(repo_id)
            .bind(prefix)
            .execute(db.as_ref())
            .await?
            .rows_affected(),
    )
}

pub async fn count(db: &SqlDb, repo_id: i64) -> StoreResult<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM symbols WHERE repo_id = ?")
            .bind(repo_id)
            .fetch_one(db.as_ref())
            .await?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::test_db;

    fn symbol(name: &str, kind: &str, lines: (i64, i64), parent: Option<usize>) -> NewSymbol {
        NewSymbol {
            name: name.to_owned(),
            kind: kind.to_owned(),
            start_line: lines.0,
            start_col: 0,
            end_line: lines.1,
            end_col: 1,
            signature: None,
            parent,
        }
    }

    #[tokio::test]
    async fn parent_links_resolve_within_batch() {
        let db = test_db().await;
        replace_for_file(
            &db,
            1,
            "src/graph.ts",
            &[
                symbol("ModuleGraph", "class", (1, 40), None),
                symbol("invalidate", "method", (10, 20), Some(0)),
            ],
        )
        .await
        .unwrap();

        let found = find_by_name(&db, 1, "invalidate").await.unwrap();
        assert_eq!(found.len(), 1);
        let parent_id = found[0].parent_symbol_id.unwrap();
        let class = find_by_name(&db, 1, "ModuleGraph").await.unwrap();
        assert_eq!(class[0].id, parent_id);
    }

    #[tokio::test]
    async fn enclosing_prefers_tightest_range() {
        let db = test_db().await;
        replace_for_file(
            &db,
            1,
            "src/graph.ts",
            &[
                symbol("ModuleGraph", "class", (1, 40), None),
                symbol("invalidate", "method", (10, 20), Some(0)),
            ],
        )
        .await
        .unwrap();

        let hit = enclosing(&db, 1, "src/graph.ts", 15).await.unwrap().unwrap();
        assert_eq!(hit.name, "invalidate");
        let outer = enclosing(&db, 1, "src/graph.ts", 35).await.unwrap().unwrap();
        assert_eq!(outer.name, "ModuleGraph");
    }

    #[tokio::test]
    async fn reparse_replaces_previous_rows() {
        let db = test_db().await;
        replace_for_file(&db, 1, "a.ts", &[symbol("one", "function", (1, 2), None)])
            .await
            .unwrap();
        replace_for_file(&db, 1, "a.ts", &[symbol("two", "function", (1, 2), None)])
            .await
            .unwrap();
        assert!(find_by_name(&db, 1, "one").await.unwrap().is_empty());
        assert_eq!(count(&db, 1).await.unwrap(), 1);
    }
}
