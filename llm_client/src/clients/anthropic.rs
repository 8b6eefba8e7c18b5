use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::provider::{LLMProvider, LLMProviderAPIKeys};

use super::types::{
    LLMClient, LLMClientCompletionRequest, LLMClientCompletionResponse, LLMClientError,
    LLMClientToolCall, LLMClientUsage,
};

#[derive(Serialize, Debug)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Serialize, Debug)]
struct AnthropicMessage {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Serialize, Debug)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Serialize, Debug)]
struct AnthropicRequest {
    model: String,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Deserialize, Debug)]
struct AnthropicResponse {
    content: Vec<ResponseBlock>,
    model: String,
    usage: Usage,
}

pub struct AnthropicClient {
    client: reqwest::Client,
    base_url: String,
    chat_endpoint: String,
}

impl AnthropicClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "https://api.anthropic.com".to_owned(),
            chat_endpoint: "/v1/messages".to_owned(),
        }
    }

    pub fn chat_endpoint(&self) -> String {
        format!("{}{}", &self.base_url, &self.chat_endpoint)
    }

    fn generate_api_key(&self, api_key: LLMProviderAPIKeys) -> Result<String, LLMClientError> {
        match api_key {
            LLMProviderAPIKeys::Anthropic(api_key) => Ok(api_key.api_key),
            _ => Err(LLMClientError::WrongAPIKeyType),
        }
    }

    fn build_request(request: &LLMClientCompletionRequest) -> AnthropicRequest {
        let system = request
            .messages()
            .iter()
            .find(|m| m.role().is_system())
            .map(|m| m.content().to_owned());

        let mut messages = vec![];
        for message in request.messages() {
            if message.role().is_system() {
                continue;
            }
            if let Some(result) = message.get_tool_result() {
                // tool results ride in a user turn as tool_result blocks
                messages.push(AnthropicMessage {
                    role: "user".to_owned(),
                    content: vec![ContentBlock::ToolResult {
                        tool_use_id: result.call_id.clone(),
                        content: result.content.clone(),
                    }],
                });
                continue;
            }
            let mut content = vec![];
            if !message.content().is_empty() {
                content.push(ContentBlock::Text {
                    text: message.content().to_owned(),
                });
            }
            for call in message.tool_calls() {
                content.push(ContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.arguments.clone(),
                });
            }
            if content.is_empty() {
                continue;
            }
            let role = if message.role().is_assistant() {
                "assistant"
            } else {
                "user"
            };
            messages.push(AnthropicMessage {
                role: role.to_owned(),
                content,
            });
        }

        AnthropicRequest {
            model: request.model().to_owned(),
            max_tokens: request.get_max_tokens().unwrap_or(4096),
            system,
            messages,
            temperature: request.temperature(),
            tools: request
                .tools()
                .iter()
                .map(|tool| AnthropicTool {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    input_schema: tool.parameters.clone(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl LLMClient for AnthropicClient {
    fn client(&self) -> &LLMProvider {
        &LLMProvider::Anthropic
    }

    async fn chat(
        &self,
        api_key: LLMProviderAPIKeys,
        request: LLMClientCompletionRequest,
    ) -> Result<LLMClientCompletionResponse, LLMClientError> {
        let anthropic_request = Self::build_request(&request);
        let response = self
            .client
            .post(self.chat_endpoint())
            .header("x-api-key", self.generate_api_key(api_key)?)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&anthropic_request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LLMClientError::from_status(status.as_u16(), body));
        }

        let parsed: AnthropicResponse = response.json().await?;
        let mut text = String::new();
        let mut tool_calls = vec![];
        for block in parsed.content {
            match block {
                ResponseBlock::Text { text: t } => text.push_str(&t),
                ResponseBlock::ToolUse { id, name, input } => {
                    tool_calls.push(LLMClientToolCall::new(id, name, input));
                }
                ResponseBlock::Other => {}
            }
        }

        let usage = LLMClientUsage {
            prompt_tokens: parsed.usage.input_tokens,
            completion_tokens: parsed.usage.output_tokens,
            thinking_tokens: 0,
        };
        let message = if text.is_empty() { None } else { Some(text) };
        Ok(LLMClientCompletionResponse::new(
            message,
            tool_calls,
            usage,
            parsed.model,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::types::{LLMClientMessage, LLMToolDefinition};

    #[test]
    fn tool_results_become_user_turns() {
        let request = LLMClientCompletionRequest::new(
            "claude-sonnet-4-5".to_owned(),
            vec![
                LLMClientMessage::system("sys".to_owned()),
                LLMClientMessage::user("question".to_owned()),
                LLMClientMessage::assistant_with_tool_calls(
                    String::new(),
                    vec![LLMClientToolCall::new(
                        "call_1".to_owned(),
                        "read_map".to_owned(),
                        serde_json::json!({}),
                    )],
                ),
                LLMClientMessage::tool_result(
                    "call_1".to_owned(),
                    "read_map".to_owned(),
                    "src/".to_owned(),
                ),
            ],
            0.0,
        )
        .set_tools(vec![LLMToolDefinition {
            name: "read_map".to_owned(),
            description: "render map".to_owned(),
            parameters: serde_json::json!({"type": "object"}),
        }]);

        let wire = AnthropicClient::build_request(&request);
        assert_eq!(wire.system.as_deref(), Some("sys"));
        assert_eq!(wire.messages.len(), 3);
        assert_eq!(wire.messages[1].role, "assistant");
        assert_eq!(wire.messages[2].role, "user");
        assert!(matches!(
            wire.messages[2].content[0],
            ContentBlock::ToolResult { .. }
        ));
    }
}
