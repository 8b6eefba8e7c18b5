use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::provider::{LLMProvider, LLMProviderAPIKeys};

use super::types::{
    LLMClient, LLMClientCompletionRequest, LLMClientCompletionResponse, LLMClientError,
    LLMClientToolCall, LLMClientUsage,
};

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FunctionCallPart {
    name: String,
    args: serde_json::Value,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FunctionResponsePart {
    name: String,
    response: serde_json::Value,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
enum Part {
    #[serde(rename = "text")]
    Text(String),
    #[serde(rename = "functionCall")]
    FunctionCall(FunctionCallPart),
    #[serde(rename = "functionResponse")]
    FunctionResponse(FunctionResponsePart),
}

#[derive(Serialize, Debug)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: i64,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ResponseFunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    function_call: Option<ResponseFunctionCall>,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize, Debug)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    thoughts_token_count: u64,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: UsageMetadata,
}

pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "https://generativelanguage.googleapis.com".to_owned(),
        }
    }

    pub fn get_api_endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    fn generate_api_key(&self, api_key: LLMProviderAPIKeys) -> Result<String, LLMClientError> {
        match api_key {
            LLMProviderAPIKeys::Gemini(api_key) => Ok(api_key.api_key),
            _ => Err(LLMClientError::WrongAPIKeyType),
        }
    }

    fn thinking_budget(level: &str) -> Option<i64> {
        // gemini takes a token budget rather than a named level
        match level {
            "off" => Some(0),
            "low" => Some(1024),
            "medium" => Some(8192),
            "high" => Some(24576),
            _ => None,
        }
    }

    fn build_request(request: &LLMClientCompletionRequest) -> GeminiRequest {
        let system_instruction = request
            .messages()
            .iter()
            .find(|m| m.role().is_system())
            .map(|m| SystemInstruction {
                parts: vec![Part::Text(m.content().to_owned())],
            });

        let mut contents = vec![];
        for message in request.messages() {
            if message.role().is_system() {
                continue;
            }
            if let Some(result) = message.get_tool_result() {
                contents.push(Content {
                    role: "user".to_owned(),
                    parts: vec![Part::FunctionResponse(FunctionResponsePart {
                        name: result.name.clone(),
                        response: serde_json::json!({ "result": result.content }),
                    })],
                });
                continue;
            }
            let mut parts = vec![];
            if !message.content().is_empty() {
                parts.push(Part::Text(message.content().to_owned()));
            }
            for call in message.tool_calls() {
                parts.push(Part::FunctionCall(FunctionCallPart {
                    name: call.name.clone(),
                    args: call.arguments.clone(),
                }));
            }
            if parts.is_empty() {
                continue;
            }
            let role = if message.role().is_assistant() {
                "model"
            } else {
                "user"
            };
            contents.push(Content {
                role: role.to_owned(),
                parts,
            });
        }

        let tools = if request.tools().is_empty() {
            vec![]
        } else {
            vec![GeminiTool {
                function_declarations: request
                    .tools()
                    .iter()
                    .map(|tool| FunctionDeclaration {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.parameters.clone(),
                    })
                    .collect(),
            }]
        };

        GeminiRequest {
            system_instruction,
            contents,
            tools,
            generation_config: GenerationConfig {
                temperature: request.temperature(),
                max_output_tokens: request.get_max_tokens(),
                thinking_config: request
                    .thinking_level()
                    .and_then(Self::thinking_budget)
                    .map(|thinking_budget| ThinkingConfig { thinking_budget }),
            },
        }
    }
}

#[async_trait]
impl LLMClient for GeminiClient {
    fn client(&self) -> &LLMProvider {
        &LLMProvider::Gemini
    }

    async fn chat(
        &self,
        api_key: LLMProviderAPIKeys,
        request: LLMClientCompletionRequest,
    ) -> Result<LLMClientCompletionResponse, LLMClientError> {
        let endpoint = self.get_api_endpoint(request.model());
        let model = request.model().to_owned();
        let gemini_request = Self::build_request(&request);
        let response = self
            .client
            .post(endpoint)
            .header("x-goog-api-key", self.generate_api_key(api_key)?)
            .json(&gemini_request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LLMClientError::from_status(status.as_u16(), body));
        }

        let parsed: GeminiResponse = response.json().await?;
        let mut text = String::new();
        let mut tool_calls = vec![];
        if let Some(content) = parsed.candidates.into_iter().next().and_then(|c| c.content) {
            for part in content.parts {
                if part.thought {
                    continue;
                }
                if let Some(t) = part.text {
                    text.push_str(&t);
                }
                if let Some(call) = part.function_call {
                    // gemini does not issue call ids, generate one so the
                    // agent loop can correlate results
                    tool_calls.push(LLMClientToolCall::with_generated_id(call.name, call.args));
                }
            }
        }

        let usage = LLMClientUsage {
            prompt_tokens: parsed.usage_metadata.prompt_token_count,
            completion_tokens: parsed.usage_metadata.candidates_token_count,
            thinking_tokens: parsed.usage_metadata.thoughts_token_count,
        };
        let message = if text.is_empty() { None } else { Some(text) };
        Ok(LLMClientCompletionResponse::new(
            message,
            tool_calls,
            usage,
            model,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::types::LLMClientMessage;

    #[test]
    fn system_turn_is_lifted_out_of_contents() {
        let request = LLMClientCompletionRequest::new(
            "gemini-2.5-flash".to_owned(),
            vec![
                LLMClientMessage::system("instructions".to_owned()),
                LLMClientMessage::user("question".to_owned()),
            ],
            0.2,
        );
        let wire = GeminiClient::build_request(&request);
        assert!(wire.system_instruction.is_some());
        assert_eq!(wire.contents.len(), 1);
        assert_eq!(wire.contents[0].role, "user");
    }

    #[test]
    fn thinking_levels_map_to_budgets() {
        assert_eq!(GeminiClient::thinking_budget("off"), Some(0));
        assert_eq!(GeminiClient::thinking_budget("high"), Some(24576));
        assert_eq!(GeminiClient::thinking_budget(""), None);
    }
}
