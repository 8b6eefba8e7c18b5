//! Query execution service shared by the synchronous endpoint and the
//! task-backed one: record the running row, run the strategy, persist the
//! outcome.

use std::time::Instant;

use serde_json::json;
use tracing::info;

use crate::application::application::Application;
use crate::db::queries::{self, CompletedQuery};
use crate::pipeline::progress::ProgressReporter;

use super::strategies::StrategyRegistry;

pub async fn execute_query(
    app: &Application,
    repo_id: i64,
    prompt: &str,
    strategy_name: &str,
    progress: &ProgressReporter,
) -> anyhow::Result<serde_json::Value> {
    let registry = StrategyRegistry::with_default_strategies();
    let strategy = registry.select(strategy_name, prompt);

    let query_id = queries::insert_running(&app.sql, repo_id, prompt).await?;
    let started = Instant::now();
    info!(query_id, strategy = strategy.name(), "query starting");

    let result = strategy.run(app, repo_id, prompt, progress).await;
    let duration_secs = started.elapsed().as_secs_f64();

    match (&result.answer, &result.error) {
        (Some(answer), _) => {
            let evidence_json = serde_json::to_string(&result.evidence)?;
            queries::complete(
                &app.sql,
                query_id,
                CompletedQuery {
                    answer,
                    evidence_json: &evidence_json,
                    duration_secs,
                    prompt_tokens: result.usage.prompt_tokens as i64,
                    completion_tokens: result.usage.completion_tokens as i64,
                    thinking_tokens: result.usage.thinking_tokens as i64,
                    estimated_cost: result.estimated_cost,
                    strategy: &result.strategy,
                },
            )
            .await?;
        }
        (None, Some(error)) => {
            queries::fail(&app.sql, query_id, error).await?;
        }
        (None, None) => {
            queries::fail(&app.sql, query_id, "no answer produced").await?;
        }
    }

    Ok(json!({
        "query_id": query_id,
        "answer": result.answer,
        "evidence": result.evidence,
        "strategy": result.strategy,
        "duration_secs": duration_secs,
        "usage": result.usage,
        "estimated_cost": result.estimated_cost,
        "error": result.error,
    }))
}
