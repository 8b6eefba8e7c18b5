use async_trait::async_trait;
use thiserror::Error;

use crate::provider::{LLMProvider, LLMProviderAPIKeys};

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub enum LLMClientRole {
    System,
    User,
    Assistant,
    // carries the result of a tool invocation back to the model
    Tool,
}

impl LLMClientRole {
    pub fn is_system(&self) -> bool {
        matches!(self, LLMClientRole::System)
    }

    pub fn is_user(&self) -> bool {
        matches!(self, LLMClientRole::User)
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, LLMClientRole::Assistant)
    }

    pub fn is_tool(&self) -> bool {
        matches!(self, LLMClientRole::Tool)
    }
}

/// A tool invocation requested by the model. The `id` is always present:
/// providers which do not issue ids (Gemini) get one generated so a single
/// agent loop works against all of them.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct LLMClientToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl LLMClientToolCall {
    pub fn new(id: String, name: String, arguments: serde_json::Value) -> Self {
        Self {
            id,
            name,
            arguments,
        }
    }

    pub fn with_generated_id(name: String, arguments: serde_json::Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name,
            arguments,
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct LLMClientToolResult {
    pub call_id: String,
    pub name: String,
    pub content: String,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct LLMClientMessage {
    role: LLMClientRole,
    message: String,
    tool_calls: Vec<LLMClientToolCall>,
    tool_result: Option<LLMClientToolResult>,
}

impl LLMClientMessage {
    pub fn new(role: LLMClientRole, message: String) -> Self {
        Self {
            role,
            message,
            tool_calls: vec![],
            tool_result: None,
        }
    }

    pub fn system(message: String) -> Self {
        Self::new(LLMClientRole::System, message)
    }

    pub fn user(message: String) -> Self {
        Self::new(LLMClientRole::User, message)
    }

    pub fn assistant(message: String) -> Self {
        Self::new(LLMClientRole::Assistant, message)
    }

    pub fn assistant_with_tool_calls(
        message: String,
        tool_calls: Vec<LLMClientToolCall>,
    ) -> Self {
        Self {
            role: LLMClientRole::Assistant,
            message,
            tool_calls,
            tool_result: None,
        }
    }

    pub fn tool_result(call_id: String, name: String, content: String) -> Self {
        Self {
            role: LLMClientRole::Tool,
            message: String::new(),
            tool_calls: vec![],
            tool_result: Some(LLMClientToolResult {
                call_id,
                name,
                content,
            }),
        }
    }

    pub fn role(&self) -> &LLMClientRole {
        &self.role
    }

    pub fn content(&self) -> &str {
        &self.message
    }

    pub fn tool_calls(&self) -> &[LLMClientToolCall] {
        &self.tool_calls
    }

    pub fn get_tool_result(&self) -> Option<&LLMClientToolResult> {
        self.tool_result.as_ref()
    }
}

/// Tool description shipped to the provider; `parameters` is a JSON schema
/// object generated from the static tool tables on the agent side.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct LLMToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Clone, Debug)]
pub struct LLMClientCompletionRequest {
    model: String,
    messages: Vec<LLMClientMessage>,
    temperature: f32,
    max_tokens: Option<usize>,
    tools: Vec<LLMToolDefinition>,
    // provider specific thinking/reasoning level, empty string means API default
    thinking_level: Option<String>,
}

impl LLMClientCompletionRequest {
    pub fn new(model: String, messages: Vec<LLMClientMessage>, temperature: f32) -> Self {
        Self {
            model,
            messages,
            temperature,
            max_tokens: None,
            tools: vec![],
            thinking_level: None,
        }
    }

    pub fn set_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn set_tools(mut self, tools: Vec<LLMToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn set_thinking_level(mut self, thinking_level: Option<String>) -> Self {
        self.thinking_level = thinking_level;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn messages(&self) -> &[LLMClientMessage] {
        self.messages.as_slice()
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn get_max_tokens(&self) -> Option<usize> {
        self.max_tokens
    }

    pub fn tools(&self) -> &[LLMToolDefinition] {
        self.tools.as_slice()
    }

    pub fn thinking_level(&self) -> Option<&str> {
        self.thinking_level.as_deref().filter(|l| !l.is_empty())
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct LLMClientUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub thinking_tokens: u64,
}

impl LLMClientUsage {
    pub fn accumulate(&mut self, other: &LLMClientUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.thinking_tokens += other.thinking_tokens;
    }
}

#[derive(Debug)]
pub struct LLMClientCompletionResponse {
    message: Option<String>,
    tool_calls: Vec<LLMClientToolCall>,
    usage: LLMClientUsage,
    model: String,
}

impl LLMClientCompletionResponse {
    pub fn new(
        message: Option<String>,
        tool_calls: Vec<LLMClientToolCall>,
        usage: LLMClientUsage,
        model: String,
    ) -> Self {
        Self {
            message,
            tool_calls,
            usage,
            model,
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn tool_calls(&self) -> &[LLMClientToolCall] {
        self.tool_calls.as_slice()
    }

    pub fn usage(&self) -> &LLMClientUsage {
        &self.usage
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Error, Debug)]
pub enum LLMClientError {
    #[error("Failed to get response from LLM")]
    FailedToGetResponse,

    #[error("Reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("serde failed: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("API key rejected by provider")]
    AuthenticationRejected,

    #[error("provider rate limited the request")]
    RateLimited,

    #[error("provider returned {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("unsupported model {0}")]
    UnSupportedModel(String),

    #[error("Wrong api key type")]
    WrongAPIKeyType,

    #[error("no provider registered for {0}")]
    MissingProvider(String),
}

impl LLMClientError {
    /// Credential failures abort a pipeline stage immediately.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            LLMClientError::AuthenticationRejected | LLMClientError::WrongAPIKeyType
        )
    }

    /// Transient failures are retried with exponential backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            LLMClientError::RateLimited => true,
            LLMClientError::ReqwestError(e) => e.is_timeout() || e.is_connect(),
            LLMClientError::UnexpectedStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => LLMClientError::AuthenticationRejected,
            429 => LLMClientError::RateLimited,
            _ => LLMClientError::UnexpectedStatus { status, body },
        }
    }
}

#[async_trait]
pub trait LLMClient {
    fn client(&self) -> &LLMProvider;

    async fn chat(
        &self,
        api_key: LLMProviderAPIKeys,
        request: LLMClientCompletionRequest,
    ) -> Result<LLMClientCompletionResponse, LLMClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tool_call_ids_are_unique() {
        let a = LLMClientToolCall::with_generated_id("read_file".to_owned(), serde_json::json!({}));
        let b = LLMClientToolCall::with_generated_id("read_file".to_owned(), serde_json::json!({}));
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("call_"));
    }

    #[test]
    fn usage_accumulates_across_turns() {
        let mut total = LLMClientUsage::default();
        total.accumulate(&LLMClientUsage {
            prompt_tokens: 100,
            completion_tokens: 20,
            thinking_tokens: 0,
        });
        total.accumulate(&LLMClientUsage {
            prompt_tokens: 150,
            completion_tokens: 30,
            thinking_tokens: 12,
        });
        assert_eq!(total.prompt_tokens, 250);
        assert_eq!(total.completion_tokens, 50);
        assert_eq!(total.thinking_tokens, 12);
    }
}
