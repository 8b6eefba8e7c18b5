//! Parse stage: walk the repo working tree, run the parser over every
//! source file on the allow-list and replace that file's symbols, chunks
//! and stored contents. Files whose stored content is byte-identical are
//! skipped, which is what makes a re-run idempotent.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::application::application::Application;
use crate::db::{chunks, contents, metadata, repos, symbols};

use super::progress::ProgressReporter;
use super::{PipelineError, StageCounts};

pub const STAGE: &str = "parse";

/// Candidate source files under the repo root, repo-relative paths with
/// forward slashes. `path_filter` scopes the walk to a subtree.
pub(crate) fn candidate_files(
    app: &Application,
    root: &Path,
    path_filter: Option<&str>,
) -> Vec<(PathBuf, String)> {
    let walk_root = match path_filter {
        Some(filter) => root.join(filter),
        None => root.to_owned(),
    };
    WalkBuilder::new(&walk_root)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| {
            let path = entry.path().to_owned();
            let extension = path.extension()?.to_str()?;
            if !app.parser.supports_extension(extension) {
                return None;
            }
            let relative = path
                .strip_prefix(root)
                .ok()?
                .to_string_lossy()
                .replace('\\', "/");
            Some((path, relative))
        })
        .collect()
}

pub async fn run(
    app: &Application,
    repo_id: i64,
    path_filter: Option<&str>,
    progress: &ProgressReporter,
) -> Result<StageCounts, PipelineError> {
    let repo = repos::get(&app.sql, repo_id).await?;
    let root = PathBuf::from(&repo.local_path);

    let files = candidate_files(app, &root, path_filter);
    let total = files.len() as u64;
    debug!(repo_id, total, ?path_filter, "parse stage starting");

    let mut counts = StageCounts::new();
    let mut parsed = 0u64;
    let mut skipped = 0u64;
    let mut errors = 0u64;

    for (position, (absolute, relative)) in files.iter().enumerate() {
        progress.emit(STAGE, position as u64 + 1, total, Some(relative.as_str()));

        let content = match tokio::fs::read_to_string(absolute).await {
            Ok(content) => content,
            Err(err) => {
                warn!(path = %relative, %err, "failed to read file");
                errors += 1;
                continue;
            }
        };

        // unchanged input, nothing to redo
        if contents::stored_content(&app.sql, repo_id, relative).await?.as_deref()
            == Some(content.as_str())
        {
            skipped += 1;
            continue;
        }

        let parsed_file = match app.parser.parse(relative, &content) {
            Ok(parsed_file) => parsed_file,
            Err(err) => {
                warn!(path = %relative, %err, "failed to parse file");
                errors += 1;
                continue;
            }
        };

        symbols::replace_for_file(&app.sql, repo_id, relative, &parsed_file.symbols).await?;
        chunks::replace_for_file(&app.sql, repo_id, relative, &parsed_file.chunks).await?;
        contents::upsert(&app.sql, repo_id, relative, &content).await?;
        parsed += 1;
    }

    if parsed > 0 {
        metadata::touch_last_index(&app.sql).await?;
    }

    counts.insert("files_parsed".to_owned(), parsed);
    counts.insert("files_skipped".to_owned(), skipped);
    counts.insert("files_errored".to_owned(), errors);
    Ok(counts)
}

/// Parse an explicit list of repo-relative paths — the sync flow knows
/// exactly which files moved and does not want a tree walk.
pub async fn run_paths(
    app: &Application,
    repo_id: i64,
    paths: &[String],
    progress: &ProgressReporter,
) -> Result<StageCounts, PipelineError> {
    let repo = repos::get(&app.sql, repo_id).await?;
    let root = PathBuf::from(&repo.local_path);
    let total = paths.len() as u64;

    let mut parsed = 0u64;
    let mut errors = 0u64;

    for (position, relative) in paths.iter().enumerate() {
        progress.emit(STAGE, position as u64 + 1, total, Some(relative.as_str()));

        let content = match tokio::fs::read_to_string(root.join(relative)).await {
            Ok(content) => content,
            Err(err) => {
                warn!(path = %relative, %err, "failed to read file");
                errors += 1;
                continue;
            }
        };
        let parsed_file = match app.parser.parse(relative, &content) {
            Ok(parsed_file) => parsed_file,
            Err(err) => {
                warn!(path = %relative, %err, "failed to parse file");
                errors += 1;
                continue;
            }
        };

        symbols::replace_for_file(&app.sql, repo_id, relative, &parsed_file.symbols).await?;
        chunks::replace_for_file(&app.sql, repo_id, relative, &parsed_file.chunks).await?;
        contents::upsert(&app.sql, repo_id, relative, &content).await?;
        parsed += 1;
    }

    if parsed > 0 {
        metadata::touch_last_index(&app.sql).await?;
    }

    let mut counts = StageCounts::new();
    counts.insert("files_parsed".to_owned(), parsed);
    counts.insert("files_errored".to_owned(), errors);
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::application::test_support::test_application;
    use crate::db::repos::RepoStatus;

    async fn seeded_app() -> (tempfile::TempDir, Application, i64) {
        let dir = tempfile::TempDir::new().unwrap();
        let app = test_application(dir.path()).await;

        let repo_root = dir.path().join("checkout");
        std::fs::create_dir_all(repo_root.join("src")).unwrap();
        std::fs::write(
            repo_root.join("src/graph.ts"),
            "export function build(): number {\n    return 1;\n}\n",
        )
        .unwrap();
        std::fs::write(repo_root.join("README.md"), "# not source\n").unwrap();

        let repo = repos::create(
            &app.sql,
            "fixture",
            None,
            repo_root.to_str().unwrap(),
            RepoStatus::Active,
        )
        .await
        .unwrap();
        (dir, app, repo.id)
    }

    #[tokio::test]
    async fn parse_indexes_source_files_only() {
        let (_dir, app, repo_id) = seeded_app().await;
        let counts = run(&app, repo_id, None, &ProgressReporter::noop())
            .await
            .unwrap();
        assert_eq!(counts["files_parsed"], 1);
        assert_eq!(symbols::count(&app.sql, repo_id).await.unwrap(), 1);
        assert_eq!(chunks::count(&app.sql, repo_id).await.unwrap(), 1);
        assert!(contents::get(&app.sql, repo_id, "src/graph.ts").await.is_ok());
        assert!(metadata::get(&app.sql, metadata::LAST_INDEX_AT)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn rerun_skips_unchanged_files() {
        let (_dir, app, repo_id) = seeded_app().await;
        run(&app, repo_id, None, &ProgressReporter::noop())
            .await
            .unwrap();
        let counts = run(&app, repo_id, None, &ProgressReporter::noop())
            .await
            .unwrap();
        assert_eq!(counts["files_parsed"], 0);
        assert_eq!(counts["files_skipped"], 1);
        assert_eq!(chunks::count(&app.sql, repo_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn path_filter_scopes_the_walk() {
        let (dir, app, repo_id) = seeded_app().await;
        let repo_root = dir.path().join("checkout");
        std::fs::create_dir_all(repo_root.join("tools")).unwrap();
        std::fs::write(repo_root.join("tools/cli.ts"), "export const x = 1;\n").unwrap();

        let counts = run(&app, repo_id, Some("tools"), &ProgressReporter::noop())
            .await
            .unwrap();
        assert_eq!(counts["files_parsed"], 1);
        assert!(contents::get(&app.sql, repo_id, "tools/cli.ts").await.is_ok());
        // src was out of scope
        assert!(contents::get(&app.sql, repo_id, "src/graph.ts").await.is_err());
    }
}
