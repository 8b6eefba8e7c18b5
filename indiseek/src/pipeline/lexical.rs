//! Lexical stage: full rebuild of the per-repo BM25 index from the chunks
//! table. The store swaps directories atomically, so this stage is safe to
//! run while searches are in flight.

use crate::application::application::Application;
use crate::db::{chunks, metadata};

use super::progress::ProgressReporter;
use super::{PipelineError, StageCounts};

pub const STAGE: &str = "build_lexical";

pub async fn run(
    app: &Application,
    repo_id: i64,
    progress: &ProgressReporter,
) -> Result<StageCounts, PipelineError> {
    progress.emit(STAGE, 0, 1, None);

    let all_chunks = chunks::for_repo(&app.sql, repo_id).await?;
    let store = app.lexical.clone();
    let indexed = tokio::task::spawn_blocking(move || store.build(repo_id, &all_chunks))
        .await
        .map_err(|err| PipelineError::Fatal(format!("lexical build panicked: {err}")))??;

    metadata::touch_last_index(&app.sql).await?;
    progress.emit(STAGE, 1, 1, None);

    let mut counts = StageCounts::new();
    counts.insert("chunks_indexed".to_owned(), indexed as u64);
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::application::test_support::test_application;
    use crate::db::chunks::NewChunk;
    use crate::db::repos::{self, RepoStatus};

    #[tokio::test]
    async fn rebuild_reflects_current_chunk_rows() {
        let dir = tempfile::TempDir::new().unwrap();
        let app = test_application(dir.path()).await;
        let repo = repos::create(&app.sql, "r", None, "/tmp/r", RepoStatus::Active)
            .await
            .unwrap();

        chunks::replace_for_file(
            &app.sql,
            repo.id,
            "src/a.ts",
            &[NewChunk {
                file_path: "src/a.ts".to_owned(),
                symbol_name: Some("connectWebSocket".to_owned()),
                chunk_type: "function".to_owned(),
                start_line: 1,
                end_line: 8,
                content: "function connectWebSocket() { return new WebSocket(url); }".to_owned(),
                token_estimate: None,
            }],
        )
        .await
        .unwrap();

        let counts = run(&app, repo.id, &ProgressReporter::noop()).await.unwrap();
        assert_eq!(counts["chunks_indexed"], 1);

        let hits = app.lexical.search(repo.id, "websocket", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_path, "src/a.ts");
    }
}
