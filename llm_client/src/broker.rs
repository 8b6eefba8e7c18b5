//! The llm client broker takes care of picking the right wire client for a
//! provider without the caller having to worry about the specifics, just pass
//! in the request and the provider key and we take care of the rest.

use std::collections::HashMap;

use tracing::debug;

use crate::{
    clients::{
        anthropic::AnthropicClient,
        gemini::GeminiClient,
        openai::OpenAIClient,
        types::{
            LLMClient, LLMClientCompletionRequest, LLMClientCompletionResponse, LLMClientError,
            LLMClientUsage,
        },
    },
    provider::{LLMProvider, LLMProviderAPIKeys},
};

pub struct LLMBroker {
    providers: HashMap<LLMProvider, Box<dyn LLMClient + Send + Sync>>,
}

impl LLMBroker {
    pub fn new() -> Self {
        let mut broker = Self {
            providers: HashMap::new(),
        };
        broker
            .add_provider(LLMProvider::Gemini, Box::new(GeminiClient::new()))
            .add_provider(LLMProvider::OpenAI, Box::new(OpenAIClient::new()))
            .add_provider(LLMProvider::Anthropic, Box::new(AnthropicClient::new()))
    }

    pub fn add_provider(
        mut self,
        provider: LLMProvider,
        client: Box<dyn LLMClient + Send + Sync>,
    ) -> Self {
        self.providers.insert(provider, client);
        self
    }

    pub async fn chat(
        &self,
        api_key: LLMProviderAPIKeys,
        request: LLMClientCompletionRequest,
    ) -> Result<LLMClientCompletionResponse, LLMClientError> {
        let provider = api_key.provider();
        let client = self
            .providers
            .get(&provider)
            .ok_or_else(|| LLMClientError::MissingProvider(provider.to_string()))?;
        debug!(%provider, model = request.model(), "dispatching chat request");
        client.chat(api_key, request).await
    }
}

impl Default for LLMBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// USD per 1M tokens, (input, output). Prefix match so dated releases of the
/// same family price identically.
const MODEL_PRICES: &[(&str, f64, f64)] = &[
    ("gemini-2.5-pro", 1.25, 10.0),
    ("gemini-2.5-flash", 0.30, 2.50),
    ("gemini-2.0-flash", 0.10, 0.40),
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-4o", 2.50, 10.0),
    ("gpt-4.1-mini", 0.40, 1.60),
    ("gpt-4.1", 2.00, 8.00),
    ("claude-opus-4", 15.0, 75.0),
    ("claude-sonnet-4", 3.0, 15.0),
    ("claude-haiku-4", 1.0, 5.0),
    ("text-embedding-3-small", 0.02, 0.0),
    ("text-embedding-3-large", 0.13, 0.0),
    ("gemini-embedding", 0.15, 0.0),
];

/// Estimated cost in USD for a usage record, None when the model is unknown.
/// Thinking tokens bill at the output rate.
pub fn cost_estimate(model: &str, usage: &LLMClientUsage) -> Option<f64> {
    let (_, input_price, output_price) = MODEL_PRICES
        .iter()
        .find(|(prefix, _, _)| model.starts_with(prefix))?;
    let input = usage.prompt_tokens as f64 / 1_000_000.0 * input_price;
    let output =
        (usage.completion_tokens + usage.thinking_tokens) as f64 / 1_000_000.0 * output_price;
    Some(input + output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_estimate_matches_price_table() {
        let usage = LLMClientUsage {
            prompt_tokens: 1_000_000,
            completion_tokens: 500_000,
            thinking_tokens: 500_000,
        };
        let cost = cost_estimate("gemini-2.5-flash", &usage).unwrap();
        assert!((cost - (0.30 + 2.50)).abs() < 1e-9);
    }

    #[test]
    fn unknown_models_have_no_estimate() {
        assert!(cost_estimate("mystery-model", &LLMClientUsage::default()).is_none());
    }

    #[test]
    fn dated_releases_share_family_pricing() {
        let usage = LLMClientUsage {
            prompt_tokens: 2_000_000,
            completion_tokens: 0,
            thinking_tokens: 0,
        };
        assert_eq!(
            cost_estimate("claude-sonnet-4-5-20250929", &usage),
            cost_estimate("claude-sonnet-4-5", &usage),
        );
    }
}
