use axum::extract::Query;
use axum::response::IntoResponse;
use axum::Extension;
use serde::{Deserialize, Serialize};

use crate::application::application::Application;
use crate::db::{chunks, contents, queries, summaries, symbols, xrefs};

use super::types::{json, ApiResponse, Result};

fn default_repo_id() -> i64 {
    1
}

#[derive(Deserialize, Debug)]
pub(crate) struct StatsParams {
    #[serde(default = "default_repo_id")]
    pub repo_id: i64,
}

#[derive(Serialize, Debug)]
pub(crate) struct StatsResponse {
    repo_id: i64,
    symbols: i64,
    chunks: i64,
    files: i64,
    file_summaries: i64,
    dir_summaries: i64,
    xref_symbols: i64,
    xref_occurrences: i64,
    queries: i64,
    vectors: usize,
    lexical_documents: u64,
}

impl ApiResponse for StatsResponse {}

/// Aggregate counts across every store, the dashboard's landing numbers.
pub async fn stats(
    Query(params): Query<StatsParams>,
    Extension(app): Extension<Application>,
) -> Result<impl IntoResponse> {
    let repo_id = params.repo_id;
    let vectors = app.semantic.count(repo_id).await.unwrap_or(0);
    let lexical_documents = app.lexical.doc_count(repo_id).unwrap_or(0);

    Ok(json(StatsResponse {
        repo_id,
        symbols: symbols::count(&app.sql, repo_id).await?,
        chunks: chunks::count(&app.sql, repo_id).await?,
        files: contents::count(&app.sql, repo_id).await?,
        file_summaries: summaries::file_count(&app.sql, repo_id).await?,
        dir_summaries: summaries::dir_count(&app.sql, repo_id).await?,
        xref_symbols: xrefs::symbol_count(&app.sql, repo_id).await?,
        xref_occurrences: xrefs::occurrence_count(&app.sql, repo_id).await?,
        queries: queries::count(&app.sql, repo_id).await?,
        vectors,
        lexical_documents,
    }))
}
