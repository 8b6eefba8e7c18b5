use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::provider::{LLMProvider, LLMProviderAPIKeys};

use super::types::{
    LLMClient, LLMClientCompletionRequest, LLMClientCompletionResponse, LLMClientError,
    LLMClientToolCall, LLMClientUsage,
};

#[derive(Serialize, Debug)]
struct FunctionCall {
    name: String,
    // arguments are shipped as a JSON-encoded string on the openai wire
    arguments: String,
}

#[derive(Serialize, Debug)]
struct ToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: FunctionCall,
}

#[derive(Serialize, Debug)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Debug)]
struct OpenAITool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAIFunction,
}

#[derive(Serialize, Debug)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize, Debug)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAITool>,
}

#[derive(Deserialize, Debug)]
struct ResponseFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Deserialize, Debug)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunctionCall,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug, Default)]
struct CompletionTokensDetails {
    #[serde(default)]
    reasoning_tokens: u64,
}

#[derive(Deserialize, Debug)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
    #[serde(default)]
    completion_tokens_details: CompletionTokensDetails,
}

#[derive(Deserialize, Debug)]
struct OpenAIResponse {
    choices: Vec<Choice>,
    model: String,
    usage: Option<Usage>,
}

pub struct OpenAIClient {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAIClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "https://api.openai.com".to_owned(),
        }
    }

    pub fn chat_endpoint(&self) -> String {
        format!("{}/v1/chat/completions", &self.base_url)
    }

    fn generate_api_key(&self, api_key: LLMProviderAPIKeys) -> Result<String, LLMClientError> {
        match api_key {
            LLMProviderAPIKeys::OpenAI(api_key) => Ok(api_key.api_key),
            _ => Err(LLMClientError::WrongAPIKeyType),
        }
    }

    fn build_request(request: &LLMClientCompletionRequest) -> OpenAIRequest {
        let mut messages = vec![];
        for message in request.messages() {
            if let Some(result) = message.get_tool_result() {
                messages.push(OpenAIMessage {
                    role: "tool".to_owned(),
                    content: Some(result.content.clone()),
                    tool_calls: None,
                    tool_call_id: Some(result.call_id.clone()),
                });
                continue;
            }
            let role = match message.role() {
                r if r.is_system() => "system",
                r if r.is_assistant() => "assistant",
                _ => "user",
            };
            let tool_calls = if message.tool_calls().is_empty() {
                None
            } else {
                Some(
                    message
                        .tool_calls()
                        .iter()
                        .map(|call| ToolCall {
                            id: call.id.clone(),
                            call_type: "function".to_owned(),
                            function: FunctionCall {
                                name: call.name.clone(),
                                arguments: call.arguments.to_string(),
                            },
                        })
                        .collect(),
                )
            };
            let content = if message.content().is_empty() && tool_calls.is_some() {
                None
            } else {
                Some(message.content().to_owned())
            };
            messages.push(OpenAIMessage {
                role: role.to_owned(),
                content,
                tool_calls,
                tool_call_id: None,
            });
        }

        OpenAIRequest {
            model: request.model().to_owned(),
            messages,
            temperature: request.temperature(),
            max_tokens: request.get_max_tokens(),
            tools: request
                .tools()
                .iter()
                .map(|tool| OpenAITool {
                    tool_type: "function".to_owned(),
                    function: OpenAIFunction {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.parameters.clone(),
                    },
                })
                .collect(),
        }
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    fn client(&self) -> &LLMProvider {
        &LLMProvider::OpenAI
    }

    async fn chat(
        &self,
        api_key: LLMProviderAPIKeys,
        request: LLMClientCompletionRequest,
    ) -> Result<LLMClientCompletionResponse, LLMClientError> {
        let openai_request = Self::build_request(&request);
        let response = self
            .client
            .post(self.chat_endpoint())
            .bearer_auth(self.generate_api_key(api_key)?)
            .json(&openai_request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LLMClientError::from_status(status.as_u16(), body));
        }

        let parsed: OpenAIResponse = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(LLMClientError::FailedToGetResponse)?;

        let mut tool_calls = vec![];
        for call in choice.message.tool_calls {
            let arguments = serde_json::from_str(&call.function.arguments)
                .unwrap_or(serde_json::Value::Object(Default::default()));
            tool_calls.push(LLMClientToolCall::new(
                call.id,
                call.function.name,
                arguments,
            ));
        }

        let usage = parsed
            .usage
            .map(|u| LLMClientUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                thinking_tokens: u.completion_tokens_details.reasoning_tokens,
            })
            .unwrap_or_default();

        let message = choice.message.content.filter(|c| !c.is_empty());
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
    use crate::clients::types::LLMClientMessage;

    #[test]
    fn tool_arguments_are_json_encoded_strings() {
        let request = LLMClientCompletionRequest::new(
            "gpt-4o".to_owned(),
            vec![LLMClientMessage::assistant_with_tool_calls(
                String::new(),
                vec![LLMClientToolCall::new(
                    "call_9".to_owned(),
                    "search_code".to_owned(),
                    serde_json::json!({"query": "graph cycles", "k": 10}),
                )],
            )],
            0.0,
        );
        let wire = OpenAIClient::build_request(&request);
        let calls = wire.messages[0].tool_calls.as_ref().unwrap();
        let decoded: serde_json::Value =
            serde_json::from_str(&calls[0].function.arguments).unwrap();
        assert_eq!(decoded["k"], 10);
    }
}
