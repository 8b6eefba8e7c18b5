use axum::extract::Query;
use axum::response::IntoResponse;
use axum::Extension;
use serde::{Deserialize, Serialize};

use crate::application::application::Application;
use crate::retrieval::hybrid::{self, SearchHit, SearchMode};

use super::types::{json, ApiError, ApiResponse, Result};

fn default_repo_id() -> i64 {
    1
}

fn default_limit() -> usize {
    10
}

#[derive(Deserialize, Debug)]
pub(crate) struct SearchParams {
    pub q: String,
    pub mode: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_repo_id")]
    pub repo_id: i64,
}

#[derive(Serialize, Debug)]
pub(crate) struct SearchResponse {
    query: String,
    mode: SearchMode,
    hits: Vec<SearchHit>,
}

impl ApiResponse for SearchResponse {}

pub async fn search(
    Query(params): Query<SearchParams>,
    Extension(app): Extension<Application>,
) -> Result<impl IntoResponse> {
    if params.q.trim().is_empty() {
        return Err(ApiError::bad_request("query parameter q is required"));
    }
    let mode_str = params.mode.as_deref().unwrap_or("hybrid");
    let mode = SearchMode::parse(mode_str)
        .ok_or_else(|| ApiError::bad_request(format!("invalid mode '{mode_str}'")))?;

    let hits = hybrid::search_code(
        &app,
        params.repo_id,
        &params.q,
        mode,
        params.limit.clamp(1, 100),
    )
    .await?;
    Ok(json(SearchResponse {
        query: params.q,
        mode,
        hits,
    }))
}
