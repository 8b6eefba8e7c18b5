//! Persistent fuzzy cache of past answers. A candidate answer is reusable
//! only if it finished after the last index mutation; any store write
//! bumps `last_index_at` and wholesale-invalidates everything older.

use tracing::debug;

use crate::application::application::Application;
use crate::db::{metadata, queries, StoreResult};

use super::similarity::prompt_similarity;

/// Timestamp predating any real index, used when `last_index_at` was never
/// written.
const EPOCH: &str = "1970-01-01T00:00:00Z";

/// On hit, a fresh `cached` row is inserted and returned.
pub async fn lookup(
    app: &Application,
    repo_id: i64,
    prompt: &str,
    force: bool,
) -> StoreResult<Option<queries::QueryRecord>> {
    if force {
        return Ok(None);
    }

    let last_index_at = metadata::get(&app.sql, metadata::LAST_INDEX_AT)
        .await?
        .unwrap_or_else(|| EPOCH.to_owned());
    let candidates = queries::completed_since(&app.sql, repo_id, &last_index_at).await?;

    let threshold = app.config.cache_similarity_threshold;
    let best = candidates
        .into_iter()
        .map(|candidate| {
            let similarity = prompt_similarity(prompt, &candidate.prompt);
            (candidate, similarity)
        })
        .filter(|(_, similarity)| *similarity >= threshold)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let Some((source, similarity)) = best else {
        return Ok(None);
    };
    debug!(source_id = source.id, similarity, "query cache hit");

    let cached_id = queries::insert_cached(&app.sql, repo_id, prompt, &source).await?;
    Ok(Some(queries::get(&app.sql, cached_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::application::test_support::test_application;
    use crate::db::queries::CompletedQuery;

    async fn complete_query(app: &Application, prompt: &str, answer: &str) -> i64 {
        let id = queries::insert_running(&app.sql, 1, prompt).await.unwrap();
        queries::complete(
            &app.sql,
            id,
            CompletedQuery {
                answer,
                evidence_json: "[]",
                duration_secs: 1.0,
                prompt_tokens: 10,
                completion_tokens: 5,
                thinking_tokens: 0,
                estimated_cost: None,
                strategy: "classic",
            },
        )
        .await
        .unwrap();
        id
    }

    #[tokio::test]
    async fn case_variant_prompt_is_a_hit() {
        let dir = tempfile::TempDir::new().unwrap();
        let app = test_application(dir.path()).await;
        let source_id =
            complete_query(&app, "How does the module graph handle cycles?", "carefully").await;

        let hit = lookup(&app, 1, "how does the MODULE GRAPH handle cycles", false)
            .await
            .unwrap()
            .expect("cache hit");
        assert_eq!(hit.status, queries::STATUS_CACHED);
        assert_eq!(hit.source_query_id, Some(source_id));
        assert_eq!(hit.answer.as_deref(), Some("carefully"));
    }

    #[tokio::test]
    async fn force_bypasses_the_cache() {
        let dir = tempfile::TempDir::new().unwrap();
        let app = test_application(dir.path()).await;
        complete_query(&app, "how does hmr work", "via websocket").await;
        let miss = lookup(&app, 1, "how does hmr work", true).await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn index_mutation_invalidates_older_answers() {
        let dir = tempfile::TempDir::new().unwrap();
        let app = test_application(dir.path()).await;
        complete_query(&app, "how does hmr work", "via websocket").await;

        // any index mutation moves last_index_at past the completion time
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        metadata::touch_last_index(&app.sql).await.unwrap();

        let miss = lookup(&app, 1, "how does hmr work", false).await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn dissimilar_prompts_miss() {
        let dir = tempfile::TempDir::new().unwrap();
        let app = test_application(dir.path()).await;
        complete_query(&app, "how does hmr work", "via websocket").await;
        let miss = lookup(&app, 1, "where is the config file parsed", false)
            .await
            .unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn other_repos_answers_are_not_reused() {
        let dir = tempfile::TempDir::new().unwrap();
        let app = test_application(dir.path()).await;
        complete_query(&app, "how does hmr work", "via websocket").await;
        let miss = lookup(&app, 2, "how does hmr work", false).await.unwrap();
        assert!(miss.is_none());
    }
}
