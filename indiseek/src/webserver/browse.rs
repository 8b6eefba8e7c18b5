//! Dashboard browse endpoints: one-level tree listing with coverage
//! flags, file detail, and raw chunk fetch.

use std::collections::BTreeSet;

use axum::extract::{Path, Query};
use axum::response::IntoResponse;
use axum::Extension;
use serde::{Deserialize, Serialize};

use crate::application::application::Application;
use crate::db::{chunks, contents, summaries};

use super::types::{json, ApiResponse, Result};

fn default_repo_id() -> i64 {
    1
}

#[derive(Deserialize, Debug)]
pub(crate) struct TreeParams {
    #[serde(default = "default_repo_id")]
    pub repo_id: i64,
    pub path: Option<String>,
}

#[derive(Serialize, Debug)]
pub(crate) struct TreeEntry {
    name: String,
    path: String,
    is_directory: bool,
    summary: Option<String>,
    chunk_count: usize,
    embedded_chunks: usize,
}

#[derive(Serialize, Debug)]
pub(crate) struct TreeResponse {
    path: String,
    entries: Vec<TreeEntry>,
}

impl ApiResponse for TreeResponse {}

/// One level of children under `path`, with per-entry coverage flags.
pub async fn tree(
    Query(params): Query<TreeParams>,
    Extension(app): Extension<Application>,
) -> Result<impl IntoResponse> {
    let repo_id = params.repo_id;
    let scope = params
        .path
        .as_deref()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty());

    let all_paths = contents::all_paths(&app.sql, repo_id).await?;
    let embedded: BTreeSet<i64> = app
        .semantic
        .existing_ids(repo_id)
        .await
        .unwrap_or_default()
        .into_iter()
        .collect();

    let prefix = scope.map(|s| format!("{s}/")).unwrap_or_default();
    let mut dirs: BTreeSet<String> = BTreeSet::new();
    let mut files: Vec<String> = vec![];
    for path in &all_paths {
        let Some(rest) = path.strip_prefix(&prefix) else {
            continue;
        };
        match rest.split_once('/') {
            Some((dir, _)) => {
                dirs.insert(dir.to_owned());
            }
            None => files.push(path.clone()),
        }
    }

    let mut entries = vec![];
    for dir in dirs {
        let full = format!("{prefix}{dir}");
        let summary = summaries::get_dir(&app.sql, repo_id, &full)
            .await?
            .map(|row| row.summary);
        entries.push(TreeEntry {
            name: dir,
            path: full,
            is_directory: true,
            summary,
            chunk_count: 0,
            embedded_chunks: 0,
        });
    }
    for file in files {
        let summary = summaries::get_file(&app.sql, repo_id, &file)
            .await?
            .map(|row| row.summary);
        let file_chunks = chunks::for_file(&app.sql, repo_id, &file).await?;
        let embedded_chunks = file_chunks
            .iter()
            .filter(|chunk| embedded.contains(&chunk.id))
            .count();
        entries.push(TreeEntry {
            name: file.rsplit('/').next().unwrap_or(&file).to_owned(),
            path: file,
            is_directory: false,
            summary,
            chunk_count: file_chunks.len(),
            embedded_chunks,
        });
    }

    Ok(json(TreeResponse {
        path: scope.unwrap_or("").to_owned(),
        entries,
    }))
}

#[derive(Deserialize, Debug)]
pub(crate) struct FileParams {
    #[serde(default = "default_repo_id")]
    pub repo_id: i64,
}

#[derive(Serialize, Debug)]
pub(crate) struct FileDetail {
    path: String,
    line_count: i64,
    summary: Option<String>,
    language: Option<String>,
    chunks: Vec<chunks::Chunk>,
    embedded_chunks: usize,
    lexical_indexed: bool,
}

impl ApiResponse for FileDetail {}

pub async fn file_detail(
    Path(path): Path<String>,
    Query(params): Query<FileParams>,
    Extension(app): Extension<Application>,
) -> Result<impl IntoResponse> {
    let repo_id = params.repo_id;
    let path = path.trim_start_matches('/').to_owned();
    let content = contents::get(&app.sql, repo_id, &path).await?;
    let summary_row = summaries::get_file(&app.sql, repo_id, &path).await?;
    let file_chunks = chunks::for_file(&app.sql, repo_id, &path).await?;
    let embedded: BTreeSet<i64> = app
        .semantic
        .existing_ids(repo_id)
        .await
        .unwrap_or_default()
        .into_iter()
        .collect();
    let embedded_chunks = file_chunks
        .iter()
        .filter(|chunk| embedded.contains(&chunk.id))
        .count();

    let (summary, language) = match summary_row {
        Some(row) => (Some(row.summary), row.language),
        None => (None, None),
    };
    Ok(json(FileDetail {
        path,
        line_count: content.line_count,
        summary,
        language,
        chunks: file_chunks,
        embedded_chunks,
        lexical_indexed: app.lexical.exists(repo_id),
    }))
}

impl ApiResponse for chunks::Chunk {}

pub async fn chunk_detail(
    Path(chunk_id): Path<i64>,
    Query(params): Query<FileParams>,
    Extension(app): Extension<Application>,
) -> Result<impl IntoResponse> {
    Ok(json(chunks::get(&app.sql, params.repo_id, chunk_id).await?))
}
