// This is the place where we handle all the routes with respect to the
// repos and how we are going to index them.

use axum::extract::Path;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::application::application::Application;
use crate::db::repos;
use crate::repo::sync;
use crate::repo::types::FreshnessReport;

use super::types::{json as api_json, ApiError, ApiResponse, Result};

#[derive(Serialize, Debug)]
pub(crate) struct ReposList {
    repos: Vec<repos::Repo>,
}

impl ApiResponse for ReposList {}

#[derive(Serialize, Debug)]
pub(crate) struct RepoCreated {
    repo: repos::Repo,
    task_id: Uuid,
}

impl ApiResponse for RepoCreated {}

impl ApiResponse for repos::Repo {}
impl ApiResponse for FreshnessReport {}

#[derive(Deserialize, Debug)]
pub(crate) struct CreateRepoRequest {
    pub name: String,
    pub url: String,
}

pub async fn list(Extension(app): Extension<Application>) -> Result<impl IntoResponse> {
    let repos = repos::list(&app.sql).await?;
    Ok(api_json(ReposList { repos }))
}

pub async fn create(
    Extension(app): Extension<Application>,
    Json(request): Json<CreateRepoRequest>,
) -> Result<impl IntoResponse> {
    if request.name.trim().is_empty() || request.url.trim().is_empty() {
        return Err(ApiError::bad_request("name and url are required"));
    }
    let (repo, task_id) = sync::add_repo(&app, request.name.trim(), request.url.trim()).await?;
    Ok(api_json(RepoCreated { repo, task_id }))
}

pub async fn detail(
    Path(repo_id): Path<i64>,
    Extension(app): Extension<Application>,
) -> Result<impl IntoResponse> {
    Ok(api_json(repos::get(&app.sql, repo_id).await?))
}

pub async fn delete(
    Path(repo_id): Path<i64>,
    Extension(app): Extension<Application>,
) -> Result<impl IntoResponse> {
    sync::delete_repo(&app, repo_id).await.map_err(|err| {
        match err.downcast::<crate::db::StoreError>() {
            Ok(store_err) => ApiError::from(store_err),
            Err(err) => ApiError::internal(format!("{err:#}")),
        }
    })?;
    Ok(Json(json!({ "deleted": repo_id })))
}

/// Synchronous freshness check: fetch, compare, report. No index mutation.
pub async fn check(
    Path(repo_id): Path<i64>,
    Extension(app): Extension<Application>,
) -> Result<impl IntoResponse> {
    let report = sync::freshness_check(&app, repo_id)
        .await
        .map_err(|err| match err.downcast::<crate::db::StoreError>() {
            Ok(store_err) => ApiError::from(store_err),
            Err(err) => ApiError::internal(format!("{err:#}")),
        })?;
    Ok(api_json(report))
}

/// Async incremental re-index under the task manager.
pub async fn sync_repo(
    Path(repo_id): Path<i64>,
    Extension(app): Extension<Application>,
) -> Result<impl IntoResponse> {
    // sync embeds and summarizes, both providers must be usable
    if app.config.embedder().is_none() {
        return Err(ApiError::bad_request("embedding provider key missing"));
    }
    if app.config.chat_api_key().is_none() {
        return Err(ApiError::bad_request("chat provider key missing"));
    }
    // fail fast instead of queueing a doomed task
    repos::get(&app.sql, repo_id).await?;

    let task_app = app.clone();
    let task_id = app.task_manager.submit("sync", move |progress| async move {
        sync::run_sync(&task_app, repo_id, &progress).await
    })?;
    Ok(Json(json!({ "task_id": task_id })))
}
