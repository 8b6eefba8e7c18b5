//! Task-submitting endpoints: pipeline stages and queries. Stage names
//! match the pipeline: parse, xrefs, embed, summarize, lexical.

use axum::extract::Path;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;

use crate::agent::{query_cache, service};
use crate::application::application::Application;
use crate::db::repos;
use crate::pipeline;
use crate::pipeline::progress::ProgressReporter;

use super::types::{ApiError, Result};

fn default_repo_id() -> i64 {
    1
}

#[derive(Deserialize, Debug)]
pub(crate) struct RunStageRequest {
    #[serde(default = "default_repo_id")]
    pub repo_id: i64,
    pub path_filter: Option<String>,
}

impl Default for RunStageRequest {
    fn default() -> Self {
        Self {
            repo_id: default_repo_id(),
            path_filter: None,
        }
    }
}

fn stage_needs_chat_key(stage: &str) -> bool {
    matches!(stage, "summarize")
}

fn stage_needs_embedder(stage: &str) -> bool {
    matches!(stage, "embed")
}

pub async fn run_stage(
    Path(stage): Path<String>,
    Extension(app): Extension<Application>,
    body: Option<Json<RunStageRequest>>,
) -> Result<impl IntoResponse> {
    let request = body.map(|Json(inner)| inner).unwrap_or_default();
    let repo_id = request.repo_id;
    let path_filter = request.path_filter.clone();

    if !matches!(
        stage.as_str(),
        "parse" | "xrefs" | "embed" | "summarize" | "lexical"
    ) {
        return Err(ApiError::bad_request(format!("unknown stage '{stage}'")));
    }
    // a task that cannot get its credential must not reach the queue
    if stage_needs_chat_key(&stage) && app.config.chat_api_key().is_none() {
        return Err(ApiError::bad_request("chat provider key missing"));
    }
    if stage_needs_embedder(&stage) && app.config.embedder().is_none() {
        return Err(ApiError::bad_request("embedding provider key missing"));
    }
    repos::get(&app.sql, repo_id).await?;

    let task_app = app.clone();
    let task_name = format!("run_{stage}");
    let task_id = app
        .task_manager
        .submit(&task_name, move |progress| async move {
            let counts = match stage.as_str() {
                "parse" => {
                    pipeline::parse::run(&task_app, repo_id, path_filter.as_deref(), &progress)
                        .await?
                }
                "xrefs" => pipeline::xrefs::run(&task_app, repo_id, &progress).await?,
                "embed" => {
                    pipeline::embed::run(&task_app, repo_id, path_filter.as_deref(), &progress)
                        .await?
                }
                "summarize" => {
                    let mut counts = pipeline::summarize::run_files(
                        &task_app,
                        repo_id,
                        path_filter.as_deref(),
                        &progress,
                    )
                    .await?;
                    let dirs =
                        pipeline::summarize::run_dirs(&task_app, repo_id, &progress).await?;
                    counts.extend(dirs);
                    counts
                }
                "lexical" => pipeline::lexical::run(&task_app, repo_id, &progress).await?,
                other => anyhow::bail!("unknown stage {other}"),
            };
            Ok(json!(counts))
        })?;

    Ok(Json(json!({ "task_id": task_id })))
}

#[derive(Deserialize, Debug)]
pub(crate) struct QueryRequest {
    pub prompt: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub force: bool,
    #[serde(default = "default_repo_id")]
    pub repo_id: i64,
}

fn validate_query(app: &Application, request: &QueryRequest) -> Result<()> {
    if request.prompt.trim().is_empty() {
        return Err(ApiError::bad_request("prompt is required"));
    }
    if app.config.chat_api_key().is_none() {
        return Err(ApiError::bad_request("chat provider key missing"));
    }
    Ok(())
}

/// Async variant: cache first, then the task manager.
pub async fn run_query(
    Extension(app): Extension<Application>,
    Json(request): Json<QueryRequest>,
) -> Result<impl IntoResponse> {
    validate_query(&app, &request)?;
    let repo_id = request.repo_id;

    if let Some(hit) = query_cache::lookup(&app, repo_id, &request.prompt, request.force).await? {
        return Ok(Json(json!({
            "cached": true,
            "query_id": hit.id,
            "source_query_id": hit.source_query_id,
            "answer": hit.answer,
            "evidence": hit
                .evidence_json
                .as_deref()
                .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
                .unwrap_or(serde_json::Value::Array(vec![])),
        })));
    }

    let prompt = request.prompt.clone();
    let strategy = request.mode.clone().unwrap_or_else(|| "auto".to_owned());
    let task_app = app.clone();
    let task_id = app.task_manager.submit("query", move |progress| async move {
        service::execute_query(&task_app, repo_id, &prompt, &strategy, &progress).await
    })?;

    Ok(Json(json!({ "task_id": task_id })))
}

/// Synchronous variant of run_query: blocks the handler until the agent
/// finishes. Bypasses the task manager, so it can run alongside index
/// tasks — queries only read.
pub async fn query_sync(
    Extension(app): Extension<Application>,
    Json(request): Json<QueryRequest>,
) -> Result<impl IntoResponse> {
    validate_query(&app, &request)?;
    let repo_id = request.repo_id;

    if let Some(hit) = query_cache::lookup(&app, repo_id, &request.prompt, request.force).await? {
        return Ok(Json(json!({
            "cached": true,
            "query_id": hit.id,
            "source_query_id": hit.source_query_id,
            "answer": hit.answer,
        })));
    }

    let strategy = request.mode.as_deref().unwrap_or("auto");
    let result = service::execute_query(
        &app,
        repo_id,
        &request.prompt,
        strategy,
        &ProgressReporter::noop(),
    )
    .await?;
    Ok(Json(result))
}
