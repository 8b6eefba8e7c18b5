//! Contains types for setting the provider for the LLM, we support 3 chat
//! providers and 2 embedding providers:
//! - Gemini
//! - OpenAI
//! - Anthropic

#[derive(Debug, Clone, Copy, serde::Deserialize, serde::Serialize, Hash, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    Gemini,
    OpenAI,
    Anthropic,
}

impl LLMProvider {
    pub fn from_str_loose(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "gemini" | "google" => Some(LLMProvider::Gemini),
            "openai" => Some(LLMProvider::OpenAI),
            "anthropic" => Some(LLMProvider::Anthropic),
            _ => None,
        }
    }
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::Gemini => write!(f, "gemini"),
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub enum LLMProviderAPIKeys {
    Gemini(GeminiProvider),
    OpenAI(OpenAIProvider),
    Anthropic(AnthropicProvider),
}

impl LLMProviderAPIKeys {
    pub fn provider(&self) -> LLMProvider {
        match self {
            LLMProviderAPIKeys::Gemini(_) => LLMProvider::Gemini,
            LLMProviderAPIKeys::OpenAI(_) => LLMProvider::OpenAI,
            LLMProviderAPIKeys::Anthropic(_) => LLMProvider::Anthropic,
        }
    }

    // Gets the relevant key for the llm provider
    pub fn key(&self, llm_provider: &LLMProvider) -> Option<Self> {
        if self.provider() == *llm_provider {
            Some(self.clone())
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct GeminiProvider {
    pub api_key: String,
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct OpenAIProvider {
    pub api_key: String,
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct AnthropicProvider {
    pub api_key: String,
}
