//! Agent strategies: named variants of the same bounded tool loop. All of
//! them drive the chat model through the four retrieval tools; they differ
//! in iteration budget and whether a mid-loop critique pass is injected.

use std::sync::Arc;

use async_trait::async_trait;
use llm_client::broker::cost_estimate;
use llm_client::clients::types::{
    LLMClientCompletionRequest, LLMClientMessage, LLMClientToolCall,
};
use tracing::{debug, warn};

use crate::application::application::Application;
use crate::pipeline::progress::ProgressReporter;
use crate::retrieval::map;

use super::cache::ToolCallCache;
use super::tools::ToolRegistry;
use super::types::{EvidenceStep, QueryResult, UsageStats};

const TOOL_RESULT_MAX_CHARS: usize = 15_000;
const REPO_MAP_MAX_CHARS: usize = 4_000;
const EVIDENCE_SUMMARY_CHARS: usize = 160;
/// Tools are disabled this many iterations before the budget runs out.
const SYNTHESIS_RESERVE: usize = 2;
/// The critique pass fires once the run has made this many tool calls.
const CRITIQUE_THRESHOLD: usize = 6;

const SYSTEM_PROMPT: &str = "You are a code-research agent answering questions about one \
repository. You cannot run code; everything you claim must come from the tools.\n\
\n\
Tool choice by question shape:\n\
- \"where is / what does <file or area> do\" -> read_map, then read_file\n\
- \"how does <concept> work\" -> search_code mode=hybrid, then read_file the top hits\n\
- \"who calls / what calls <function>\" -> resolve_symbol action=callers\n\
- \"what does <function> use\" -> resolve_symbol action=callees\n\
- exact identifier or error string -> search_code mode=lexical\n\
\n\
Cite evidence as file:line in the final answer. Answer when you have enough evidence; \
do not keep searching for marginal gains.";

#[async_trait]
pub trait AgentStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        app: &Application,
        repo_id: i64,
        prompt: &str,
        progress: &ProgressReporter,
    ) -> QueryResult;
}

struct LoopStrategy {
    name: &'static str,
    max_iterations: usize,
    critique: bool,
}

#[async_trait]
impl AgentStrategy for LoopStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(
        &self,
        app: &Application,
        repo_id: i64,
        prompt: &str,
        progress: &ProgressReporter,
    ) -> QueryResult {
        run_loop(self, app, repo_id, prompt, progress).await
    }
}

fn evidence_summary(text: &str) -> String {
    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.len() > EVIDENCE_SUMMARY_CHARS {
        format!(
            "{}...",
            crate::strings::truncated(&collapsed, EVIDENCE_SUMMARY_CHARS)
        )
    } else {
        collapsed
    }
}

fn truncate_tool_result(mut text: String) -> String {
    if text.len() > TOOL_RESULT_MAX_CHARS {
        crate::strings::truncate_at_boundary(&mut text, TOOL_RESULT_MAX_CHARS);
        text.push_str("\n[truncated]");
    }
    text
}

async fn run_loop(
    strategy: &LoopStrategy,
    app: &Application,
    repo_id: i64,
    prompt: &str,
    progress: &ProgressReporter,
) -> QueryResult {
    let Some(api_key) = app.config.chat_api_key() else {
        return QueryResult::failed(strategy.name, "chat provider key missing".to_owned());
    };
    let model = app.config.chat_model();

    let repo_map = match map::read_map(&app.sql, repo_id, None).await {
        Ok(mut rendered) => {
            if rendered.len() > REPO_MAP_MAX_CHARS {
                crate::strings::truncate_at_boundary(&mut rendered, REPO_MAP_MAX_CHARS);
                rendered.push_str("\n[map truncated, use read_map to drill down]");
            }
            rendered
        }
        Err(err) => {
            warn!(%err, "could not prefetch repo map");
            "(map unavailable)".to_owned()
        }
    };

    let registry = ToolRegistry::new(app.clone(), repo_id);
    let mut cache = ToolCallCache::new();
    let mut evidence: Vec<EvidenceStep> = vec![];
    let mut usage = UsageStats::default();

    let mut messages = vec![
        LLMClientMessage::system(format!("{SYSTEM_PROMPT}\n\nRepository map:\n{repo_map}")),
        LLMClientMessage::user(prompt.to_owned()),
    ];

    let mut answer: Option<String> = None;
    let mut error: Option<String> = None;
    let mut critiqued = false;
    let mut tool_calls_made = 0usize;

    for iteration in 0..strategy.max_iterations {
        let synthesis = iteration + SYNTHESIS_RESERVE >= strategy.max_iterations;
        progress.emit(
            "agent",
            iteration as u64 + 1,
            strategy.max_iterations as u64,
            Some(if synthesis { "synthesis" } else { "explore" }),
        );

        if synthesis && answer.is_none() {
            messages.push(LLMClientMessage::user(
                "Produce your final answer now from the evidence gathered so far. \
                 Cite file:line for each claim."
                    .to_owned(),
            ));
        } else if strategy.critique && !critiqued && tool_calls_made > CRITIQUE_THRESHOLD {
            messages.push(LLMClientMessage::user(
                "Before answering: list your key claims so far and verify each one with a \
                 single targeted tool call. Drop any claim you cannot support."
                    .to_owned(),
            ));
            critiqued = true;
        }

        // the widest strategy gets the research thinking level when set
        let thinking_level = if strategy.name == "multi" {
            app.config
                .gemini_thinking_research
                .clone()
                .or_else(|| app.config.gemini_thinking_level.clone())
        } else {
            app.config.gemini_thinking_level.clone()
        };
        let mut request = LLMClientCompletionRequest::new(
            model.clone(),
            messages.clone(),
            app.config.chat_temperature(),
        )
        .set_thinking_level(thinking_level);
        if let Some(max_tokens) = app.config.gemini_max_output_tokens {
            request = request.set_max_tokens(max_tokens);
        }
        if !synthesis {
            request = request.set_tools(ToolRegistry::definitions());
        }

        let response = match app.llm_broker.chat(api_key.clone(), request).await {
            Ok(response) => response,
            Err(err) => {
                error = Some(format!("model error: {err}"));
                break;
            }
        };
        usage.accumulate(response.usage());

        let tool_calls: Vec<LLMClientToolCall> = response.tool_calls().to_vec();
        if tool_calls.is_empty() {
            if let Some(text) = response.message() {
                answer = Some(text.to_owned());
                break;
            }
            // neither text nor tool calls, give the model another turn
            continue;
        }

        messages.push(LLMClientMessage::assistant_with_tool_calls(
            response.message().unwrap_or_default().to_owned(),
            tool_calls.clone(),
        ));

        for call in tool_calls {
            tool_calls_made += 1;
            debug!(tool = %call.name, "dispatching tool call");
            let result = registry.dispatch(&mut cache, &call.name, &call.arguments).await;
            let (content, summary) = match result {
                Ok(output) => {
                    let summary = evidence_summary(&output);
                    (truncate_tool_result(output), summary)
                }
                // tool errors become evidence, the loop continues
                Err(err) => {
                    let message = format!("error: {err}");
                    (message.clone(), message)
                }
            };
            evidence.push(EvidenceStep {
                tool_name: call.name.clone(),
                args: call.arguments.clone(),
                summary,
            });
            messages.push(LLMClientMessage::tool_result(call.id, call.name, content));
        }
    }

    if answer.is_none() && error.is_none() {
        error = Some("iteration budget exhausted without an answer".to_owned());
    }

    let estimated_cost = cost_estimate(&model, &usage.as_client_usage());
    QueryResult {
        answer,
        evidence,
        usage,
        estimated_cost,
        strategy: strategy.name.to_owned(),
        error,
    }
}

pub struct StrategyRegistry {
    strategies: Vec<Arc<dyn AgentStrategy>>,
}

impl StrategyRegistry {
    pub fn with_default_strategies() -> Self {
        Self {
            strategies: vec![
                Arc::new(LoopStrategy {
                    name: "single",
                    max_iterations: 12,
                    critique: false,
                }),
                Arc::new(LoopStrategy {
                    name: "classic",
                    max_iterations: 16,
                    critique: true,
                }),
                Arc::new(LoopStrategy {
                    name: "multi",
                    max_iterations: 20,
                    critique: true,
                }),
            ],
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentStrategy>> {
        self.strategies
            .iter()
            .find(|s| s.name() == name)
            .cloned()
    }

    /// `auto` heuristic: wide questions get the widest budget, pinpoint
    /// identifier lookups the narrowest.
    pub fn select(&self, requested: &str, prompt: &str) -> Arc<dyn AgentStrategy> {
        let name = if requested == "auto" || requested.is_empty() {
            auto_select_name(prompt)
        } else {
            requested
        };
        self.get(name)
            .or_else(|| self.get("classic"))
            .expect("default strategies registered")
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_default_strategies()
    }
}

fn looks_like_identifier(token: &str) -> bool {
    token.contains('_')
        || token.contains("::")
        || token
            .chars()
            .zip(token.chars().skip(1))
            .any(|(a, b)| a.is_lowercase() && b.is_uppercase())
}

pub fn auto_select_name(prompt: &str) -> &'static str {
    let words = prompt.split_whitespace().count();
    let questions = prompt.matches('?').count();
    if questions > 1 || words > 25 {
        "multi"
    } else if words <= 8 && prompt.split_whitespace().any(looks_like_identifier) {
        "single"
    } else {
        "classic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_selection_follows_prompt_shape() {
        assert_eq!(auto_select_name("where is handleHMRUpdate defined"), "single");
        assert_eq!(
            auto_select_name("How does the module graph handle cycles?"),
            "classic"
        );
        assert_eq!(
            auto_select_name(
                "How does the dev server watch files? And how do those events reach the \
                 client? Also what happens on css changes?"
            ),
            "multi"
        );
    }

    #[test]
    fn registry_knows_its_strategies() {
        let registry = StrategyRegistry::with_default_strategies();
        assert_eq!(registry.names(), vec!["single", "classic", "multi"]);
        assert!(registry.get("classic").is_some());
        assert!(registry.get("nonsense").is_none());
        // unknown request degrades to classic
        assert_eq!(registry.select("nonsense", "whatever").name(), "classic");
    }

    #[test]
    fn evidence_summaries_are_single_line_and_bounded() {
        let long = "line one\nline two   with    gaps\n".repeat(50);
        let summary = evidence_summary(&long);
        assert!(summary.len() <= EVIDENCE_SUMMARY_CHARS + 3);
        assert!(!summary.contains('\n'));
    }

    #[test]
    fn oversized_tool_results_are_truncated() {
        let truncated = truncate_tool_result("x".repeat(20_000));
        assert!(truncated.len() <= TOOL_RESULT_MAX_CHARS + 20);
        assert!(truncated.ends_with("[truncated]"));
    }
}
