//! Reads the cross-reference index file emitted by scip-typescript and
//! equivalents. Each document is handled independently; `local` symbols are
//! file-scoped temporaries and never useful across files, so they are
//! skipped outright.

use std::collections::HashMap;
use std::path::Path;

use protobuf::Message;
use thiserror::Error;
use tracing::{debug, warn};

use crate::db::{xrefs, SqlDb, StoreError};

#[derive(Debug, Error)]
pub enum XrefError {
    #[error("could not read index file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed index file: {0}")]
    Decode(#[from] protobuf::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct XrefCounts {
    pub documents: u64,
    pub symbols: u64,
    pub occurrences: u64,
    pub relationships: u64,
    pub skipped_local: u64,
}

/// scip ranges are packed as 3 ints (same-line: line, col_start, col_end) or
/// 4 ints (cross-line), zero-based. Lines convert to 1-based here to match
/// the symbols table.
fn decode_range(range: &[i32]) -> Option<(i64, i64, i64, i64)> {
    match range {
        [line, col_start, col_end] => Some((
            *line as i64 + 1,
            *col_start as i64,
            *line as i64 + 1,
            *col_end as i64,
        )),
        [start_line, start_col, end_line, end_col] => Some((
            *start_line as i64 + 1,
            *start_col as i64,
            *end_line as i64 + 1,
            *end_col as i64,
        )),
        _ => None,
    }
}

fn is_local(symbol: &str) -> bool {
    symbol.starts_with("local ")
}

/// Full reload: clears the repo's cross-reference rows first, then replays
/// the index file. Cross-references are not incrementally updatable.
pub async fn load_index_file(
    db: &SqlDb,
    repo_id: i64,
    index_path: &Path,
    mut on_document: impl FnMut(u64, u64, &str),
) -> Result<XrefCounts, XrefError> {
    let bytes = tokio::fs::read(index_path).await?;
    let index = scip::types::Index::parse_from_bytes(&bytes)?;

    xrefs::clear_repo(db, repo_id).await?;

    let mut counts = XrefCounts::default();
    let total = index.documents.len() as u64;
    let mut symbol_ids: HashMap<String, i64> = HashMap::new();

    for (position, document) in index.documents.iter().enumerate() {
        on_document(position as u64 + 1, total, &document.relative_path);
        counts.documents += 1;

        for info in &document.symbols {
            if is_local(&info.symbol) {
                counts.skipped_local += 1;
                continue;
            }
            let documentation = if info.documentation.is_empty() {
                None
            } else {
                Some(info.documentation.join("\n"))
            };
            let symbol_id = upsert_cached(
                db,
                repo_id,
                &mut symbol_ids,
                &info.symbol,
                documentation.as_deref(),
                &mut counts,
            )
            .await?;

            for relationship in &info.relationships {
                if is_local(&relationship.symbol) {
                    continue;
                }
                let related_id = upsert_cached(
                    db,
                    repo_id,
                    &mut symbol_ids,
                    &relationship.symbol,
                    None,
                    &mut counts,
                )
                .await?;
                for kind in relationship_kinds(relationship) {
                    xrefs::insert_relationship(db, repo_id, symbol_id, related_id, kind).await?;
                    counts.relationships += 1;
                }
            }
        }

        let mut occurrences_by_symbol: HashMap<i64, Vec<xrefs::NewOccurrence>> = HashMap::new();
        for occurrence in &document.occurrences {
            if is_local(&occurrence.symbol) {
                counts.skipped_local += 1;
                continue;
            }
            let Some((start_line, start_col, end_line, end_col)) =
                decode_range(&occurrence.range)
            else {
                warn!(
                    path = %document.relative_path,
                    "occurrence with malformed range, skipping"
                );
                continue;
            };
            let symbol_id = upsert_cached(
                db,
                repo_id,
                &mut symbol_ids,
                &occurrence.symbol,
                None,
                &mut counts,
            )
            .await?;
            let role = if occurrence.symbol_roles & scip::types::SymbolRole::Definition as i32 != 0
            {
                xrefs::ROLE_DEFINITION
            } else {
                xrefs::ROLE_REFERENCE
            };
            occurrences_by_symbol
                .entry(symbol_id)
                .or_default()
                .push(xrefs::NewOccurrence {
                    file_path: document.relative_path.clone(),
                    start_line,
                    start_col,
                    end_line,
                    end_col,
                    role,
                });
        }

        for (symbol_id, occurrences) in occurrences_by_symbol {
            counts.occurrences +=
                xrefs::insert_occurrences(db, repo_id, symbol_id, &occurrences).await?;
        }
    }

    debug!(
        repo_id,
        documents = counts.documents,
        symbols = counts.symbols,
        occurrences = counts.occurrences,
        "cross-reference index loaded"
    );
    Ok(counts)
}

async fn upsert_cached(
    db: &SqlDb,
    repo_id: i64,
    cache: &mut HashMap<String, i64>,
    symbol: &str,
    documentation: Option<&str>,
    counts: &mut XrefCounts,
) -> Result<i64, XrefError> {
    if let Some(id) = cache.get(symbol) {
        if documentation.is_some() {
            xrefs::upsert_symbol(db, repo_id, symbol, documentation).await?;
        }
        return Ok(*id);
    }
    let id = xrefs::upsert_symbol(db, repo_id, symbol, documentation).await?;
    cache.insert(symbol.to_owned(), id);
    counts.symbols += 1;
    Ok(id)
}

fn relationship_kinds(relationship: &scip::types::Relationship) -> Vec<&'static str> {
    let mut kinds = vec![];
    if relationship.is_implementation {
        kinds.push("implementation");
    }
    if relationship.is_reference {
        kinds.push("reference");
    }
    if relationship.is_type_definition {
        kinds.push("type_definition");
    }
    kinds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::test_db;
    use protobuf::Message;

    #[test]
    fn three_tuple_ranges_are_same_line() {
        assert_eq!(decode_range(&[4, 2, 9]), Some((5, 2, 5, 9)));
        assert_eq!(decode_range(&[4, 2, 6, 1]), Some((5, 2, 7, 1)));
        assert_eq!(decode_range(&[1]), None);
    }

    #[tokio::test]
    async fn load_skips_local_symbols_and_records_roles() {
        let mut document = scip::types::Document::new();
        document.relative_path = "src/foo.ts".to_owned();

        let mut definition = scip::types::Occurrence::new();
        definition.symbol = "scip-typescript npm pkg 1.0 src/`foo.ts`/bar().".to_owned();
        definition.symbol_roles = scip::types::SymbolRole::Definition as i32;
        definition.range = vec![0, 0, 10];
        document.occurrences.push(definition);

        let mut reference = scip::types::Occurrence::new();
        reference.symbol = "scip-typescript npm pkg 1.0 src/`foo.ts`/bar().".to_owned();
        reference.symbol_roles = 0;
        reference.range = vec![8, 4, 7];
        document.occurrences.push(reference);

        let mut local = scip::types::Occurrence::new();
        local.symbol = "local 3".to_owned();
        local.range = vec![2, 0, 4];
        document.occurrences.push(local);

        let mut index = scip::types::Index::new();
        index.documents.push(document);

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("index.scip");
        std::fs::write(&path, index.write_to_bytes().unwrap()).unwrap();

        let db = test_db().await;
        let counts = load_index_file(&db, 1, &path, |_, _, _| {}).await.unwrap();

        assert_eq!(counts.symbols, 1);
        assert_eq!(counts.occurrences, 2);
        assert_eq!(counts.skipped_local, 1);

        let symbols = xrefs::symbols_matching_name(&db, 1, "bar").await.unwrap();
        assert_eq!(symbols.len(), 1);
        let definitions =
            xrefs::occurrences_for_symbol(&db, 1, symbols[0].id, xrefs::ROLE_DEFINITION)
                .await
                .unwrap();
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].start_line, 1);
        let references =
            xrefs::occurrences_for_symbol(&db, 1, symbols[0].id, xrefs::ROLE_REFERENCE)
                .await
                .unwrap();
        assert_eq!(references[0].start_line, 9);
    }

    #[tokio::test]
    async fn reload_replaces_previous_rows() {
        let mut index = scip::types::Index::new();
        let mut document = scip::types::Document::new();
        document.relative_path = "a.ts".to_owned();
        let mut occurrence = scip::types::Occurrence::new();
        occurrence.symbol = "pkg a/x().".to_owned();
        occurrence.range = vec![0, 0, 1];
        document.occurrences.push(occurrence);
        index.documents.push(document);

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("index.scip");
        std::fs::write(&path, index.write_to_bytes().unwrap()).unwrap();

        let db = test_db().await;
        load_index_file(&db, 1, &path, |_, _, _| {}).await.unwrap();
        load_index_file(&db, 1, &path, |_, _, _| {}).await.unwrap();
        assert_eq!(xrefs::occurrence_count(&db, 1).await.unwrap(), 1);
    }
}
