use llm_client::clients::types::LLMClientUsage;
use serde::{Deserialize, Serialize};

/// One tool call's worth of evidence, stored as JSON on the query row.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EvidenceStep {
    pub tool_name: String,
    pub args: serde_json::Value,
    pub summary: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default)]
pub struct UsageStats {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub thinking_tokens: u64,
}

impl UsageStats {
    pub fn accumulate(&mut self, usage: &LLMClientUsage) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.thinking_tokens += usage.thinking_tokens;
    }

    pub fn as_client_usage(&self) -> LLMClientUsage {
        LLMClientUsage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            thinking_tokens: self.thinking_tokens,
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct QueryResult {
    pub answer: Option<String>,
    pub evidence: Vec<EvidenceStep>,
    pub usage: UsageStats,
    pub estimated_cost: Option<f64>,
    pub strategy: String,
    pub error: Option<String>,
}

impl QueryResult {
    pub fn failed(strategy: &str, error: String) -> Self {
        Self {
            answer: None,
            evidence: vec![],
            usage: UsageStats::default(),
            estimated_cost: None,
            strategy: strategy.to_owned(),
            error: Some(error),
        }
    }
}
