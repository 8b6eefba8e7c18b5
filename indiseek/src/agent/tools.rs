//! The closed set of tools the agent can call, as a registry keyed by
//! name. Schemas for the LLM are generated from these static tables.

use llm_client::clients::types::LLMToolDefinition;
use serde_json::json;
use thiserror::Error;

use crate::application::application::Application;
use crate::retrieval::hybrid::{self, SearchMode};
use crate::retrieval::symbols::{self, SymbolAction};
use crate::retrieval::{file, map, RetrievalError};

use super::cache::ToolCallCache;

pub const READ_MAP: &str = "read_map";
pub const SEARCH_CODE: &str = "search_code";
pub const RESOLVE_SYMBOL: &str = "resolve_symbol";
pub const READ_FILE: &str = "read_file";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool {0}")]
    UnknownTool(String),

    #[error("bad arguments: {0}")]
    BadArgs(String),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
}

pub struct ToolRegistry {
    app: Application,
    repo_id: i64,
}

impl ToolRegistry {
    pub fn new(app: Application, repo_id: i64) -> Self {
        Self { app, repo_id }
    }

    pub fn definitions() -> Vec<LLMToolDefinition> {
        vec![
            LLMToolDefinition {
                name: READ_MAP.to_owned(),
                description: "Render the directory tree with per-file and per-directory \
                              summaries. Use this first to orient yourself; pass `path` to \
                              zoom into a subtree."
                    .to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Subtree to scope to, e.g. src/node" }
                    }
                }),
            },
            LLMToolDefinition {
                name: SEARCH_CODE.to_owned(),
                description: "Search the codebase. `hybrid` fuses semantic and keyword \
                              search and is the right default; use `lexical` for exact \
                              identifiers and error strings, `semantic` for conceptual \
                              questions."
                    .to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string" },
                        "mode": { "type": "string", "enum": ["semantic", "lexical", "hybrid"] },
                        "k": { "type": "integer", "minimum": 1, "maximum": 50 }
                    },
                    "required": ["query"]
                }),
            },
            LLMToolDefinition {
                name: RESOLVE_SYMBOL.to_owned(),
                description: "Resolve a symbol by name: its definition site, every \
                              reference, the functions that call it, or the functions it \
                              calls."
                    .to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "action": { "type": "string", "enum": ["definition", "references", "callers", "callees"] }
                    },
                    "required": ["name", "action"]
                }),
            },
            LLMToolDefinition {
                name: READ_FILE.to_owned(),
                description: "Read a file from the index with line numbers. Optional \
                              start/end lines; small ranges are widened automatically."
                    .to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "start": { "type": "integer", "minimum": 1 },
                        "end": { "type": "integer", "minimum": 1 }
                    },
                    "required": ["path"]
                }),
            },
        ]
    }

    fn require_str<'a>(
        args: &'a serde_json::Value,
        field: &str,
    ) -> Result<&'a str, ToolError> {
        args.get(field)
            .and_then(|value| value.as_str())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ToolError::BadArgs(format!("missing required field '{field}'")))
    }

    pub async fn dispatch(
        &self,
        cache: &mut ToolCallCache,
        name: &str,
        args: &serde_json::Value,
    ) -> Result<String, ToolError> {
        match name {
            READ_MAP => {
                let path = args.get("path").and_then(|value| value.as_str());
                Ok(map::read_map(&self.app.sql, self.repo_id, path).await?)
            }
            SEARCH_CODE => {
                let query = Self::require_str(args, "query")?;
                let mode_str = args
                    .get("mode")
                    .and_then(|value| value.as_str())
                    .unwrap_or("hybrid");
                let mode = SearchMode::parse(mode_str)
                    .ok_or_else(|| ToolError::BadArgs(format!("invalid mode '{mode_str}'")))?;
                let k = args
                    .get("k")
                    .and_then(|value| value.as_u64())
                    .unwrap_or(10)
                    .clamp(1, 50) as usize;

                if let Some(cached) = cache.lookup_search(query, mode_str) {
                    return Ok(cached.to_owned());
                }
                let hits =
                    hybrid::search_code(&self.app, self.repo_id, query, mode, k).await?;
                let rendered = hybrid::render_hits(&hits);
                cache.store_search(query, mode_str, rendered.clone());
                Ok(rendered)
            }
            RESOLVE_SYMBOL => {
                let symbol_name = Self::require_str(args, "name")?;
                let action_str = Self::require_str(args, "action")?;
                let action = SymbolAction::parse(action_str)
                    .ok_or_else(|| ToolError::BadArgs(format!("invalid action '{action_str}'")))?;
                Ok(symbols::resolve_symbol(&self.app.sql, self.repo_id, symbol_name, action)
                    .await?)
            }
            READ_FILE => {
                let path = Self::require_str(args, "path")?;
                let start = args.get("start").and_then(|value| value.as_i64());
                let end = args.get("end").and_then(|value| value.as_i64());
                let key = format!(
                    "{path}:{}:{}",
                    start.unwrap_or_default(),
                    end.unwrap_or_default()
                );
                if let Some(cached) = cache.lookup_read(&key) {
                    return Ok(cached.to_owned());
                }
                let rendered =
                    file::read_file(&self.app.sql, self.repo_id, path, start, end).await?;
                cache.store_read(key, rendered.clone());
                Ok(rendered)
            }
            other => Err(ToolError::UnknownTool(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::application::test_support::test_application;
    use crate::db::contents;

    #[test]
    fn schema_table_covers_the_closed_tool_set() {
        let definitions = ToolRegistry::definitions();
        let names: Vec<&str> = definitions.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec![READ_MAP, SEARCH_CODE, RESOLVE_SYMBOL, READ_FILE]);
        for definition in &definitions {
            assert_eq!(definition.parameters["type"], "object");
        }
    }

    #[tokio::test]
    async fn read_file_dispatch_goes_through_the_cache() {
        let dir = tempfile::TempDir::new().unwrap();
        let app = test_application(dir.path()).await;
        contents::upsert(&app.sql, 1, "src/a.ts", "const a = 1;\n")
            .await
            .unwrap();

        let registry = ToolRegistry::new(app, 1);
        let mut cache = ToolCallCache::new();
        let args = json!({"path": "src/a.ts"});
        let first = registry
            .dispatch(&mut cache, READ_FILE, &args)
            .await
            .unwrap();
        assert!(first.contains("const a = 1;"));
        assert!(cache.lookup_read("src/a.ts:0:0").is_some());
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_args_are_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let app = test_application(dir.path()).await;
        let registry = ToolRegistry::new(app, 1);
        let mut cache = ToolCallCache::new();

        let err = registry
            .dispatch(&mut cache, "grep_files", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));

        let err = registry
            .dispatch(&mut cache, SEARCH_CODE, &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::BadArgs(_)));
    }
}
