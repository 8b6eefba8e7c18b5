//! Embed stage: find chunks with no vector in the per-repo table, batch
//! them through the embedding provider and insert. Transient provider
//! errors back off exponentially; auth errors abort at once; three
//! consecutive failed batches promote to stage-fatal.

use std::collections::HashSet;
use std::time::Duration;

use llm_client::embedder::EmbeddingProvider;
use rand::Rng;
use tracing::{debug, warn};

use crate::application::application::Application;
use crate::db::{chunks, metadata};
use crate::semantic::store::VectorRow;

use super::progress::ProgressReporter;
use super::{PipelineError, StageCounts};

pub const STAGE: &str = "embed";

const MAX_ATTEMPTS: u32 = 5;
const BACKOFF_BASE_MS: u64 = 1000;
const MAX_CONSECUTIVE_FAILURES: u32 = 3;
const INTER_BATCH_DELAY_MS: u64 = 100;

pub async fn run(
    app: &Application,
    repo_id: i64,
    path_filter: Option<&str>,
    progress: &ProgressReporter,
) -> Result<StageCounts, PipelineError> {
    let embedder = app
        .config
        .embedder()
        .ok_or_else(|| PipelineError::MissingKey("embedding provider".to_owned()))?;

    let all_chunks = match path_filter {
        Some(prefix) => chunks::under_path(&app.sql, repo_id, prefix).await?,
        None => chunks::for_repo(&app.sql, repo_id).await?,
    };
    let existing: HashSet<i64> = app
        .semantic
        .existing_ids(repo_id)
        .await?
        .into_iter()
        .collect();
    let pending: Vec<_> = all_chunks
        .into_iter()
        .filter(|chunk| !existing.contains(&chunk.id))
        .collect();

    let batch_size = app.config.embed_batch_size.max(1);
    let total_batches = pending.len().div_ceil(batch_size) as u64;
    debug!(repo_id, pending = pending.len(), total_batches, "embed stage starting");

    let mut counts = StageCounts::new();
    let mut embedded = 0u64;
    let mut failed_batches = 0u64;
    let mut consecutive_failures = 0u32;

    for (batch_index, batch) in pending.chunks(batch_size).enumerate() {
        progress.emit(STAGE, batch_index as u64 + 1, total_batches, None);

        let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
        match embed_with_retry(embedder.as_ref(), &texts).await {
            Ok(vectors) => {
                let rows: Vec<VectorRow> = batch
                    .iter()
                    .zip(vectors)
                    .map(|(chunk, vector)| VectorRow {
                        chunk_id: chunk.id,
                        file_path: chunk.file_path.clone(),
                        symbol_name: chunk.symbol_name.clone(),
                        chunk_type: chunk.chunk_type.clone(),
                        content: chunk.content.clone(),
                        vector,
                    })
                    .collect();
                app.semantic.upsert(repo_id, &rows).await?;
                embedded += rows.len() as u64;
                consecutive_failures = 0;
            }
            Err(err) if err.is_auth() => return Err(PipelineError::ProviderAuth),
            Err(err) => {
                warn!(batch_index, %err, "embedding batch failed");
                failed_batches += 1;
                consecutive_failures += 1;
                if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    return Err(PipelineError::Fatal(format!(
                        "{MAX_CONSECUTIVE_FAILURES} consecutive embedding batches failed: {err}"
                    )));
                }
            }
        }

        tokio::time::sleep(Duration::from_millis(INTER_BATCH_DELAY_MS)).await;
    }

    if embedded > 0 {
        metadata::touch_last_index(&app.sql).await?;
    }

    counts.insert("chunks_embedded".to_owned(), embedded);
    counts.insert("chunks_skipped".to_owned(), existing.len() as u64);
    counts.insert("batches_failed".to_owned(), failed_batches);
    Ok(counts)
}

async fn embed_with_retry(
    embedder: &dyn EmbeddingProvider,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, llm_client::clients::types::LLMClientError> {
    let mut attempt = 0u32;
    loop {
        match embedder.embed_batch(texts).await {
            Ok(vectors) => return Ok(vectors),
            Err(err) if err.is_auth() => return Err(err),
            Err(err) if err.is_transient() && attempt + 1 < MAX_ATTEMPTS => {
                // jitter so parallel deployments do not hammer in lockstep
                let jitter = rand::thread_rng().gen_range(0..250);
                let delay = BACKOFF_BASE_MS * 2u64.pow(attempt) + jitter;
                warn!(attempt, delay_ms = delay, %err, "transient embedding error, backing off");
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
