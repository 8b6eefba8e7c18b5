//! Repo lifecycle: clone, freshness check and the diff-driven incremental
//! sync. Sync runs under the task manager's single writer slot, so nothing
//! else touches the working tree or the indexes while it goes.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::application::Application;
use crate::db::{chunks, contents, metadata, repos, summaries, symbols, xrefs};
use crate::pipeline::progress::ProgressReporter;
use crate::pipeline::{self, StageCounts};
use crate::tasks::TaskError;

use super::git;
use super::types::{FreshnessReport, FreshnessStatus, COMMITS_BEHIND_UNKNOWN};

/// Create the repo row (status=cloning) and schedule the background clone.
pub async fn add_repo(
    app: &Application,
    name: &str,
    origin_url: &str,
) -> Result<(repos::Repo, Uuid), AddRepoError> {
    let placeholder = app.config.repos_dir().join("pending");
    let repo = repos::create(
        &app.sql,
        name,
        Some(origin_url),
        &placeholder.to_string_lossy(),
        repos::RepoStatus::Cloning,
    )
    .await?;

    let local_path = app.config.repo_dir(repo.id);
    sqlx::query("UPDATE repos SET local_path = ? WHERE id = ?")
        .bind(local_path.to_string_lossy().as_ref())
        .bind(repo.id)
        .execute(app.sql.as_ref())
        .await
        .map_err(crate::db::StoreError::from)?;

    let task_app = app.clone();
    let repo_id = repo.id;
    let url = origin_url.to_owned();
    let task_id = app.task_manager.submit("clone", move |progress| async move {
        progress.emit("clone", 0, 1, Some(url.as_str()));
        let destination = task_app.config.repo_dir(repo_id);
        git::clone_repo(&url, &destination).await?;
        let head = git::head_sha(&destination).await?;
        repos::set_current_sha(&task_app.sql, repo_id, &head).await?;
        repos::set_commits_behind(&task_app.sql, repo_id, COMMITS_BEHIND_UNKNOWN).await?;
        repos::set_status(&task_app.sql, repo_id, repos::RepoStatus::Active).await?;
        progress.emit("clone", 1, 1, Some(url.as_str()));
        info!(repo_id, head = %head, "clone finished");
        Ok(json!({ "repo_id": repo_id, "head": head }))
    })?;

    let repo = repos::get(&app.sql, repo.id).await?;
    Ok((repo, task_id))
}

#[derive(Debug, thiserror::Error)]
pub enum AddRepoError {
    #[error(transparent)]
    Store(#[from] crate::db::StoreError),

    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Synchronous and fast: fetch, resolve the remote tip, report how far the
/// index lags. Pure with respect to indexed data — calling it N times
/// without a sync is the same as calling it once.
pub async fn freshness_check(
    app: &Application,
    repo_id: i64,
) -> Result<FreshnessReport, anyhow::Error> {
    let repo = repos::get(&app.sql, repo_id).await?;
    let path = PathBuf::from(&repo.local_path);

    git::fetch(&path).await?;
    let current_sha = git::remote_head_sha(&path).await?;
    repos::set_current_sha(&app.sql, repo_id, &current_sha).await?;

    let (commits_behind, changed_files, status) = match &repo.indexed_commit_sha {
        None => (COMMITS_BEHIND_UNKNOWN, vec![], FreshnessStatus::NotIndexed),
        Some(indexed) if indexed == &current_sha => (0, vec![], FreshnessStatus::Current),
        Some(indexed) => {
            let behind = git::commits_between(&path, indexed, &current_sha).await?;
            let changed = git::changed_files(&path, indexed, &current_sha).await?;
            (behind, changed, FreshnessStatus::Stale)
        }
    };
    repos::set_commits_behind(&app.sql, repo_id, commits_behind).await?;

    Ok(FreshnessReport {
        indexed_sha: repo.indexed_commit_sha,
        current_sha,
        commits_behind,
        changed_files,
        status,
    })
}

fn merge_counts(target: &mut serde_json::Map<String, serde_json::Value>, name: &str, counts: StageCounts) {
    target.insert(name.to_owned(), json!(counts));
}

/// Ancestor directories whose summaries went stale because a file below
/// them changed or vanished.
fn stale_ancestor_dirs(paths: &BTreeSet<String>) -> BTreeSet<String> {
    let mut dirs = BTreeSet::new();
    for path in paths {
        let mut current = path.as_str();
        while let Some((dir, _)) = current.rsplit_once('/') {
            dirs.insert(dir.to_owned());
            current = dir;
        }
    }
    dirs
}

/// Incremental re-index against a moving HEAD. The heavy stages only see
/// the files the diff names; the lexical index and cross-references are
/// rebuilt whole because they do not update incrementally.
pub async fn run_sync(
    app: &Application,
    repo_id: i64,
    progress: &ProgressReporter,
) -> Result<serde_json::Value, anyhow::Error> {
    let repo = repos::get(&app.sql, repo_id).await?;
    let path = PathBuf::from(&repo.local_path);

    git::pull(&path).await?;
    let head = git::head_sha(&path).await?;

    if repo.indexed_commit_sha.as_deref() == Some(head.as_str()) {
        debug!(repo_id, "sync requested but index is current");
        return Ok(json!({ "status": "up to date", "head": head }));
    }

    let mut result = serde_json::Map::new();

    let (changed, deleted): (BTreeSet<String>, BTreeSet<String>) = match &repo.indexed_commit_sha {
        Some(indexed) => {
            let changed = git::changed_files(&path, indexed, &head).await?;
            let deleted = git::deleted_files(&path, indexed, &head).await?;
            let deleted: BTreeSet<String> = deleted.into_iter().collect();
            let changed = changed
                .into_iter()
                .filter(|file| !deleted.contains(file))
                .collect();
            (changed, deleted)
        }
        // first index of this repo: everything is "changed"
        None => {
            let files = pipeline::parse::candidate_files(app, &path, None)
                .into_iter()
                .map(|(_, relative)| relative)
                .collect();
            (files, BTreeSet::new())
        }
    };

    let removed = apply_deletions(app, repo_id, &deleted).await?;
    result.insert("files_deleted".to_owned(), json!(deleted.len()));
    result.insert("rows_removed".to_owned(), json!(removed));

    // re-parse just the files the diff named, where they are source files
    let source_changed: Vec<String> = changed
        .iter()
        .filter(|file| {
            Path::new(file)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| app.parser.supports_extension(e))
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    // their summaries are stale now, clear so the stage recomputes
    for file in &source_changed {
        summaries::delete_file(&app.sql, repo_id, file).await?;
    }

    let parse_counts = pipeline::parse::run_paths(app, repo_id, &source_changed, progress).await?;
    merge_counts(&mut result, "parse", parse_counts);

    let embed_counts = pipeline::embed::run(app, repo_id, None, progress).await?;
    merge_counts(&mut result, "embed", embed_counts);

    let summarize_counts = pipeline::summarize::run_files(app, repo_id, None, progress).await?;
    merge_counts(&mut result, "summarize_files", summarize_counts);

    // recompute directory summaries above anything that moved
    let mut touched: BTreeSet<String> = deleted;
    touched.extend(source_changed.iter().cloned());
    for dir in stale_ancestor_dirs(&touched) {
        summaries::delete_dir(&app.sql, repo_id, &dir).await?;
    }
    let dir_counts = pipeline::summarize::run_dirs(app, repo_id, progress).await?;
    merge_counts(&mut result, "summarize_dirs", dir_counts);

    // always rebuilt whole
    let lexical_counts = pipeline::lexical::run(app, repo_id, progress).await?;
    merge_counts(&mut result, "build_lexical", lexical_counts);

    if pipeline::xrefs::index_file_path(&repo.local_path).exists() {
        let xref_counts = pipeline::xrefs::run(app, repo_id, progress).await?;
        merge_counts(&mut result, "load_xrefs", xref_counts);
    }

    repos::mark_indexed(&app.sql, repo_id, &head).await?;
    metadata::touch_last_index(&app.sql).await?;
    result.insert("indexed_commit_sha".to_owned(), json!(head));

    Ok(serde_json::Value::Object(result))
}

/// Drop every row keyed by a deleted path across all stores.
pub(crate) async fn apply_deletions(
    app: &Application,
    repo_id: i64,
    deleted: &BTreeSet<String>,
) -> Result<u64, anyhow::Error> {
    let mut removed = 0u64;
    for file in deleted {
        removed += symbols::delete_by_file(&app.sql, repo_id, file).await?;
        removed += chunks::delete_by_file(&app.sql, repo_id, file).await?;
        removed += summaries::delete_file(&app.sql, repo_id, file).await?;
        removed += contents::delete_by_file(&app.sql, repo_id, file).await?;
        removed += xrefs::delete_occurrences_by_file(&app.sql, repo_id, file).await?;
    }
    if !deleted.is_empty() {
        let deleted_vec: Vec<String> = deleted.iter().cloned().collect();
        app.semantic.delete_by_files(repo_id, &deleted_vec).await?;
        metadata::touch_last_index(&app.sql).await?;
    }
    Ok(removed)
}

/// Remove the repo and every trace of it: clone directory, vector table,
/// lexical index, relational rows.
pub async fn delete_repo(app: &Application, repo_id: i64) -> Result<(), anyhow::Error> {
    let repo = repos::get(&app.sql, repo_id).await?;
    repos::set_status(&app.sql, repo_id, repos::RepoStatus::Deleted).await?;

    let clone_dir = PathBuf::from(&repo.local_path);
    if clone_dir.starts_with(app.config.repos_dir()) && clone_dir.exists() {
        tokio::fs::remove_dir_all(&clone_dir).await?;
    }
    app.semantic.drop_repo(repo_id).await?;
    app.lexical.remove(repo_id)?;
    repos::delete_all_rows(&app.sql, repo_id).await?;
    metadata::touch_last_index(&app.sql).await?;
    info!(repo_id, "repo deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::application::test_support::test_application;
    use crate::db::chunks::NewChunk;
    use crate::db::symbols::NewSymbol;

    #[tokio::test]
    async fn deletions_purge_every_store_keyed_by_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let app = test_application(dir.path()).await;
        let repo = repos::create(&app.sql, "r", None, "/tmp/r", repos::RepoStatus::Active)
            .await
            .unwrap();

        symbols::replace_for_file(
            &app.sql,
            repo.id,
            "src/foo.ts",
            &[NewSymbol {
                name: "gone".to_owned(),
                kind: "function".to_owned(),
                start_line: 1,
                start_col: 0,
                end_line: 3,
                end_col: 1,
                signature: None,
                parent: None,
            }],
        )
        .await
        .unwrap();
        chunks::replace_for_file(
            &app.sql,
            repo.id,
            "src/foo.ts",
            &[NewChunk {
                file_path: "src/foo.ts".to_owned(),
                symbol_name: Some("gone".to_owned()),
                chunk_type: "function".to_owned(),
                start_line: 1,
                end_line: 3,
                content: "function gone() {}".to_owned(),
                token_estimate: None,
            }],
        )
        .await
        .unwrap();
        contents::upsert(&app.sql, repo.id, "src/foo.ts", "function gone() {}")
            .await
            .unwrap();
        summaries::upsert_file(&app.sql, repo.id, "src/foo.ts", "it is gone", None, 3)
            .await
            .unwrap();
        let xref_id = xrefs::upsert_symbol(&app.sql, repo.id, "pkg foo/gone().", None)
            .await
            .unwrap();
        xrefs::insert_occurrences(
            &app.sql,
            repo.id,
            xref_id,
            &[xrefs::NewOccurrence {
                file_path: "src/foo.ts".to_owned(),
                start_line: 1,
                start_col: 9,
                end_line: 1,
                end_col: 13,
                role: xrefs::ROLE_DEFINITION,
            }],
        )
        .await
        .unwrap();

        let deleted: BTreeSet<String> = [String::from("src/foo.ts")].into();
        let removed = apply_deletions(&app, repo.id, &deleted).await.unwrap();
        assert_eq!(removed, 5);

        assert_eq!(symbols::count(&app.sql, repo.id).await.unwrap(), 0);
        assert_eq!(chunks::count(&app.sql, repo.id).await.unwrap(), 0);
        assert_eq!(summaries::file_count(&app.sql, repo.id).await.unwrap(), 0);
        assert_eq!(contents::count(&app.sql, repo.id).await.unwrap(), 0);
        assert_eq!(xrefs::occurrence_count(&app.sql, repo.id).await.unwrap(), 0);
        assert!(metadata::get(&app.sql, metadata::LAST_INDEX_AT)
            .await
            .unwrap()
            .is_some());
    }

    fn git_in(dir: &Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_NAME", "test")
            .env("GIT_AUTHOR_EMAIL", "test@test")
            .env("GIT_COMMITTER_NAME", "test")
            .env("GIT_COMMITTER_EMAIL", "test@test")
            .status()
            .expect("git to run");
        assert!(status.success(), "git {args:?} failed");
    }

    #[tokio::test]
    async fn freshness_sentinel_then_current_then_stale() {
        let dir = tempfile::TempDir::new().unwrap();
        let app = test_application(dir.path()).await;

        let origin = dir.path().join("origin");
        std::fs::create_dir_all(&origin).unwrap();
        git_in(&origin, &["init", "-q", "-b", "main"]);
        std::fs::write(origin.join("a.ts"), "export const a = 1;\n").unwrap();
        git_in(&origin, &["add", "."]);
        git_in(&origin, &["commit", "-q", "-m", "initial"]);

        let checkout = dir.path().join("checkout");
        super::git::clone_repo(origin.to_str().unwrap(), &checkout)
            .await
            .unwrap();

        let repo = repos::create(
            &app.sql,
            "fixture",
            Some(origin.to_str().unwrap()),
            checkout.to_str().unwrap(),
            repos::RepoStatus::Active,
        )
        .await
        .unwrap();

        // never indexed: the sentinel, not zero
        let report = freshness_check(&app, repo.id).await.unwrap();
        assert_eq!(report.commits_behind, COMMITS_BEHIND_UNKNOWN);
        assert_eq!(report.status, FreshnessStatus::NotIndexed);
        assert!(report.changed_files.is_empty());

        // the check is pure, repeating it changes nothing
        let again = freshness_check(&app, repo.id).await.unwrap();
        assert_eq!(again.commits_behind, COMMITS_BEHIND_UNKNOWN);

        // indexed at HEAD: current
        repos::mark_indexed(&app.sql, repo.id, &report.current_sha)
            .await
            .unwrap();
        let current = freshness_check(&app, repo.id).await.unwrap();
        assert_eq!(current.commits_behind, 0);
        assert_eq!(current.status, FreshnessStatus::Current);

        // origin moves: stale with the diff listed
        std::fs::write(origin.join("b.ts"), "export const b = 2;\n").unwrap();
        git_in(&origin, &["add", "."]);
        git_in(&origin, &["commit", "-q", "-m", "second"]);
        let stale = freshness_check(&app, repo.id).await.unwrap();
        assert_eq!(stale.commits_behind, 1);
        assert_eq!(stale.changed_files, vec!["b.ts".to_owned()]);
        assert_eq!(stale.status, FreshnessStatus::Stale);

        let row = repos::get(&app.sql, repo.id).await.unwrap();
        assert_eq!(row.commits_behind, 1);
    }

    #[test]
    fn stale_ancestors_cover_the_whole_chain() {
        let mut paths = BTreeSet::new();
        paths.insert("src/a/b/c.ts".to_owned());
        paths.insert("src/d.ts".to_owned());
        let dirs = stale_ancestor_dirs(&paths);
        let expected: BTreeSet<String> = ["src", "src/a", "src/a/b"]
            .into_iter()
            .map(str::to_owned)
            .collect();
        assert_eq!(dirs, expected);
    }
}
