//! resolve_symbol: definition, references, callers, callees. Tree-sitter
//! symbols answer "where is it declared", the cross-reference occurrences
//! answer "who touches it", and enclosing-range lookups bridge the two.
//! Ambiguity is disclosed in the output rather than silently resolved.

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::db::{symbols, xrefs, SqlDb};

use super::RetrievalError;

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SymbolAction {
    Definition,
    References,
    Callers,
    Callees,
}

impl SymbolAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "definition" => Some(SymbolAction::Definition),
            "references" => Some(SymbolAction::References),
            "callers" => Some(SymbolAction::Callers),
            "callees" => Some(SymbolAction::Callees),
            _ => None,
        }
    }
}

/// Human-readable trailing name of a scip symbol string, e.g.
/// `... src/`graph.ts`/ModuleGraph#invalidate().` -> `invalidate`.
pub(crate) fn display_name(symbol_string: &str) -> &str {
    let tail = symbol_string
        .trim_end_matches('.')
        .trim_end_matches("()")
        .trim_end_matches('.')
        .trim_end_matches('#');
    let after_slash = tail.rsplit('/').next().unwrap_or(tail);
    let after_hash = after_slash.rsplit('#').next().unwrap_or(after_slash);
    after_hash.rsplit('`').next().unwrap_or(after_hash)
}

/// Cross-reference rows whose display name matches exactly; the LIKE match
/// in sql is only a pre-filter.
async fn matching_xref_symbols(
    db: &SqlDb,
    repo_id: i64,
    name: &str,
) -> Result<Vec<xrefs::XrefSymbol>, RetrievalError> {
    let candidates = xrefs::symbols_matching_name(db, repo_id, name).await?;
    let exact: Vec<xrefs::XrefSymbol> = candidates
        .iter()
        .filter(|symbol| display_name(&symbol.symbol_string) == name)
        .cloned()
        .collect();
    Ok(if exact.is_empty() { candidates } else { exact })
}

pub async fn resolve_symbol(
    db: &SqlDb,
    repo_id: i64,
    name: &str,
    action: SymbolAction,
) -> Result<String, RetrievalError> {
    match action {
        SymbolAction::Definition => definition(db, repo_id, name).await,
        SymbolAction::References => references(db, repo_id, name).await,
        SymbolAction::Callers => callers(db, repo_id, name).await,
        SymbolAction::Callees => callees(db, repo_id, name).await,
    }
}

async fn definition(db: &SqlDb, repo_id: i64, name: &str) -> Result<String, RetrievalError> {
    let declared = symbols::find_by_name(db, repo_id, name).await?;
    if !declared.is_empty() {
        let mut out = String::new();
        if declared.len() > 1 {
            out.push_str(&format!(
                "{} definitions named '{name}' (ambiguous):\n",
                declared.len()
            ));
        }
        for symbol in &declared {
            out.push_str(&format!(
                "{} ({}) — {}:{}\n",
                symbol.name, symbol.kind, symbol.file_path, symbol.start_line
            ));
            if let Some(signature) = &symbol.signature {
                out.push_str(&format!("    {signature}\n"));
            }
        }
        return Ok(out);
    }

    // fall back to the cross-reference index
    let xref_symbols = matching_xref_symbols(db, repo_id, name).await?;
    let mut out = String::new();
    for symbol in &xref_symbols {
        let definitions =
            xrefs::occurrences_for_symbol(db, repo_id, symbol.id, xrefs::ROLE_DEFINITION).await?;
        for occurrence in definitions {
            out.push_str(&format!(
                "{} — {}:{}\n",
                display_name(&symbol.symbol_string),
                occurrence.file_path,
                occurrence.start_line
            ));
        }
    }
    if out.is_empty() {
        return Ok(format!("No definition found for '{name}'."));
    }
    Ok(out)
}

async fn references(db: &SqlDb, repo_id: i64, name: &str) -> Result<String, RetrievalError> {
    let xref_symbols = matching_xref_symbols(db, repo_id, name).await?;
    let mut out = String::new();
    let mut total = 0usize;
    for symbol in &xref_symbols {
        let occurrences =
            xrefs::occurrences_for_symbol(db, repo_id, symbol.id, xrefs::ROLE_REFERENCE).await?;
        if occurrences.is_empty() {
            continue;
        }
        if xref_symbols.len() > 1 {
            out.push_str(&format!("via {}:\n", symbol.symbol_string));
        }
        for occurrence in occurrences {
            out.push_str(&format!(
                "{}:{}\n",
                occurrence.file_path, occurrence.start_line
            ));
            total += 1;
        }
    }
    if total == 0 {
        return Ok(format!("No references found for '{name}'."));
    }
    Ok(format!("{total} references to '{name}':\n{out}"))
}

async fn callers(db: &SqlDb, repo_id: i64, name: &str) -> Result<String, RetrievalError> {
    let xref_symbols = matching_xref_symbols(db, repo_id, name).await?;
    let mut seen: BTreeSet<i64> = BTreeSet::new();
    let mut out = String::new();
    for symbol in &xref_symbols {
        let occurrences =
            xrefs::occurrences_for_symbol(db, repo_id, symbol.id, xrefs::ROLE_REFERENCE).await?;
        for occurrence in occurrences {
            let Some(enclosing) = symbols::enclosing(
                db,
                repo_id,
                &occurrence.file_path,
                occurrence.start_line,
            )
            .await?
            else {
                continue;
            };
            if !seen.insert(enclosing.id) {
                continue;
            }
            out.push_str(&format!(
                "{} ({}) — {}:{}\n",
                enclosing.name, enclosing.kind, enclosing.file_path, enclosing.start_line
            ));
        }
    }
    if seen.is_empty() {
        return Ok(format!("No callers found for '{name}'."));
    }
    Ok(format!("Callers of '{name}':\n{out}"))
}

async fn callees(db: &SqlDb, repo_id: i64, name: &str) -> Result<String, RetrievalError> {
    let declared = symbols::find_by_name(db, repo_id, name).await?;
    if declared.is_empty() {
        return Ok(format!("No definition found for '{name}'."));
    }

    let mut out = String::new();
    if declared.len() > 1 {
        out.push_str(&format!(
            "{} definitions named '{name}', listing callees of each:\n",
            declared.len()
        ));
    }
    let mut total = 0usize;
    for symbol in &declared {
        let occurrences = xrefs::references_in_range(
            db,
            repo_id,
            &symbol.file_path,
            symbol.start_line,
            symbol.end_line,
        )
        .await?;
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for occurrence in occurrences {
            let target = xrefs::symbol_by_id(db, occurrence.xref_symbol_id).await?;
            let callee = display_name(&target.symbol_string).to_owned();
            // a symbol referencing itself inside its own body is recursion,
            // still worth listing, but duplicates are not
            if seen.insert(callee.clone()) {
                out.push_str(&format!(
                    "{callee} — {}:{}\n",
                    occurrence.file_path, occurrence.start_line
                ));
                total += 1;
            }
        }
    }
    if total == 0 {
        return Ok(format!("No callees found inside '{name}'."));
    }
    Ok(format!("Callees of '{name}':\n{out}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::test_db;
    use crate::db::symbols::NewSymbol;

    #[test]
    fn display_names_strip_scip_punctuation() {
        assert_eq!(
            display_name("scip-typescript npm pkg 1.0 src/`graph.ts`/ModuleGraph#invalidate()."),
            "invalidate"
        );
        assert_eq!(display_name("pkg a/b/createServer()."), "createServer");
        assert_eq!(display_name("pkg a/Widget#"), "Widget");
    }

    fn symbol(name: &str, kind: &str, file: &str, lines: (i64, i64)) -> NewSymbol {
        NewSymbol {
            name: name.to_owned(),
            kind: kind.to_owned(),
            start_line: lines.0,
            start_col: 0,
            end_line: lines.1,
            end_col: 1,
            signature: None,
            parent: None,
        }
    }

    async fn seed_call_graph(db: &SqlDb) {
        // caller() at b.ts:10-20 calls target() defined at a.ts:1-5
        symbols::replace_for_file(db, 1, "a.ts", &[symbol("target", "function", "a.ts", (1, 5))])
            .await
            .unwrap();
        symbols::replace_for_file(
            db,
            1,
            "b.ts",
            &[symbol("caller", "function", "b.ts", (10, 20))],
        )
        .await
        .unwrap();

        let target = xrefs::upsert_symbol(db, 1, "pkg `a.ts`/target().", None)
            .await
            .unwrap();
        xrefs::insert_occurrences(
            db,
            1,
            target,
            &[
                xrefs::NewOccurrence {
                    file_path: "a.ts".to_owned(),
                    start_line: 1,
                    start_col: 9,
                    end_line: 1,
                    end_col: 15,
                    role: xrefs::ROLE_DEFINITION,
                },
                xrefs::NewOccurrence {
                    file_path: "b.ts".to_owned(),
                    start_line: 12,
                    start_col: 4,
                    end_line: 12,
                    end_col: 10,
                    role: xrefs::ROLE_REFERENCE,
                },
            ],
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn definition_prefers_parsed_symbols() {
        let db = test_db().await;
        seed_call_graph(&db).await;
        let out = resolve_symbol(&db, 1, "target", SymbolAction::Definition)
            .await
            .unwrap();
        assert!(out.contains("target (function) — a.ts:1"));
    }

    #[tokio::test]
    async fn callers_deduplicate_enclosing_symbols() {
        let db = test_db().await;
        seed_call_graph(&db).await;
        let out = resolve_symbol(&db, 1, "target", SymbolAction::Callers)
            .await
            .unwrap();
        assert!(out.contains("caller (function) — b.ts:10"));
    }

    #[tokio::test]
    async fn callees_come_from_references_inside_the_body() {
        let db = test_db().await;
        seed_call_graph(&db).await;
        let out = resolve_symbol(&db, 1, "caller", SymbolAction::Callees)
            .await
            .unwrap();
        assert!(out.contains("target — b.ts:12"));
    }

    #[tokio::test]
    async fn unknown_name_is_a_clear_string_not_an_error() {
        let db = test_db().await;
        let out = resolve_symbol(&db, 1, "doesNotExist", SymbolAction::Definition)
            .await
            .unwrap();
        assert_eq!(out, "No definition found for 'doesNotExist'.");
        let out = resolve_symbol(&db, 1, "doesNotExist", SymbolAction::References)
            .await
            .unwrap();
        assert_eq!(out, "No references found for 'doesNotExist'.");
    }

    #[tokio::test]
    async fn ambiguous_definitions_are_disclosed() {
        let db = test_db().await;
        symbols::replace_for_file(&db, 1, "a.ts", &[symbol("parse", "function", "a.ts", (1, 4))])
            .await
            .unwrap();
        symbols::replace_for_file(&db, 1, "b.ts", &[symbol("parse", "method", "b.ts", (7, 9))])
            .await
            .unwrap();
        let out = resolve_symbol(&db, 1, "parse", SymbolAction::Definition)
            .await
            .unwrap();
        assert!(out.contains("2 definitions named 'parse' (ambiguous):"));
        assert!(out.contains("a.ts:1"));
        assert!(out.contains("b.ts:7"));
    }
}
