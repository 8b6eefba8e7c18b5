use axum::extract::{Path, Query};
use axum::response::IntoResponse;
use axum::Extension;
use serde::{Deserialize, Serialize};

use crate::agent::strategies::StrategyRegistry;
use crate::application::application::Application;
use crate::db::queries;

use super::types::{json, ApiResponse, Result};

fn default_repo_id() -> i64 {
    1
}

fn default_limit() -> i64 {
    50
}

#[derive(Deserialize, Debug)]
pub(crate) struct HistoryParams {
    #[serde(default = "default_repo_id")]
    pub repo_id: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[derive(Serialize, Debug)]
pub(crate) struct QueryHistory {
    queries: Vec<queries::QueryRecord>,
}

impl ApiResponse for QueryHistory {}
impl ApiResponse for queries::QueryRecord {}

pub async fn list(
    Query(params): Query<HistoryParams>,
    Extension(app): Extension<Application>,
) -> Result<impl IntoResponse> {
    let records = queries::list(&app.sql, params.repo_id, params.limit.clamp(1, 500)).await?;
    Ok(json(QueryHistory { queries: records }))
}

pub async fn detail(
    Path(query_id): Path<i64>,
    Extension(app): Extension<Application>,
) -> Result<impl IntoResponse> {
    Ok(json(queries::get(&app.sql, query_id).await?))
}

#[derive(Serialize, Debug)]
pub(crate) struct StrategiesResponse {
    strategies: Vec<&'static str>,
    default: &'static str,
}

impl ApiResponse for StrategiesResponse {}

pub async fn strategies() -> Result<impl IntoResponse> {
    Ok(json(StrategiesResponse {
        strategies: StrategyRegistry::with_default_strategies().names(),
        default: "auto",
    }))
}
