//! Cross-reference stage: full reload of the scip index file sitting at
//! the repo root. Always a full replace — occurrence data cannot be
//! patched per file without the whole index.

use std::path::PathBuf;

use crate::application::application::Application;
use crate::db::{metadata, repos};
use crate::xref;

use super::progress::ProgressReporter;
use super::{PipelineError, StageCounts};

pub const STAGE: &str = "load_xrefs";
pub const INDEX_FILE_NAME: &str = "index.scip";

pub fn index_file_path(repo_local_path: &str) -> PathBuf {
    PathBuf::from(repo_local_path).join(INDEX_FILE_NAME)
}

pub async fn run(
    app: &Application,
    repo_id: i64,
    progress: &ProgressReporter,
) -> Result<StageCounts, PipelineError> {
    let repo = repos::get(&app.sql, repo_id).await?;
    let index_path = index_file_path(&repo.local_path);
    if !index_path.exists() {
        return Err(PipelineError::Fatal(format!(
            "no {INDEX_FILE_NAME} at the repo root, run the cross-reference indexer first"
        )));
    }

    let counts = xref::load_index_file(&app.sql, repo_id, &index_path, |current, total, path| {
        progress.emit(STAGE, current, total, Some(path));
    })
    .await?;

    metadata::touch_last_index(&app.sql).await?;

    let mut stage_counts = StageCounts::new();
    stage_counts.insert("documents".to_owned(), counts.documents);
    stage_counts.insert("symbols".to_owned(), counts.symbols);
    stage_counts.insert("occurrences".to_owned(), counts.occurrences);
    stage_counts.insert("relationships".to_owned(), counts.relationships);
    stage_counts.insert("skipped_local".to_owned(), counts.skipped_local);
    Ok(stage_counts)
}
