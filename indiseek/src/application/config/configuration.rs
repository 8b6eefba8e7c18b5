use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use llm_client::embedder::{EmbeddingProvider, GeminiEmbedder, OpenAIEmbedder};
use llm_client::provider::{
    AnthropicProvider, GeminiProvider, LLMProvider, LLMProviderAPIKeys, OpenAIProvider,
};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Configuration {
    #[clap(long, env = "DATA_DIR", default_value_os_t = default_data_dir())]
    #[serde(default = "default_data_dir")]
    /// Root directory for all persistent state
    pub data_dir: PathBuf,

    #[clap(long, env = "REPOS_DIR")]
    /// Per-repo clone root, defaults to DATA_DIR/repos
    pub repos_dir: Option<PathBuf>,

    #[clap(long, env = "REPO_PATH")]
    /// Legacy single-repo local path, enables the id=1 auto-migration
    pub repo_path: Option<PathBuf>,

    #[clap(long, env = "HOST", default_value_t = default_host())]
    #[serde(default = "default_host")]
    /// Bind the webserver to `<host>`
    pub host: String,

    #[clap(long, env = "PORT", default_value_t = default_port())]
    #[serde(default = "default_port")]
    /// Bind the webserver to `<port>`
    pub port: u16,

    #[clap(long, env = "GEMINI_API_KEY")]
    pub gemini_api_key: Option<String>,

    #[clap(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    #[clap(long, env = "ANTHROPIC_API_KEY")]
    pub anthropic_api_key: Option<String>,

    #[clap(long, env = "LLM_PROVIDER", default_value = "gemini")]
    #[serde(default = "default_llm_provider")]
    /// Chat provider: gemini, openai or anthropic
    pub llm_provider: String,

    #[clap(long, env = "EMBEDDING_PROVIDER", default_value = "gemini")]
    #[serde(default = "default_llm_provider")]
    /// Embedding provider: gemini or openai
    pub embedding_provider: String,

    #[clap(long, env = "GEMINI_MODEL", default_value = "gemini-2.5-flash")]
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    #[clap(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    #[clap(long, env = "ANTHROPIC_MODEL", default_value = "claude-sonnet-4-5")]
    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,

    #[clap(long, env = "GEMINI_EMBEDDING_MODEL", default_value = "gemini-embedding-001")]
    #[serde(default = "default_gemini_embedding_model")]
    pub gemini_embedding_model: String,

    #[clap(long, env = "OPENAI_EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    #[serde(default = "default_openai_embedding_model")]
    pub openai_embedding_model: String,

    #[clap(long, env = "GEMINI_EMBEDDING_DIMS", default_value_t = 768)]
    #[serde(default = "default_gemini_embedding_dims")]
    pub gemini_embedding_dims: usize,

    #[clap(long, env = "OPENAI_EMBEDDING_DIMS", default_value_t = 1536)]
    #[serde(default = "default_openai_embedding_dims")]
    pub openai_embedding_dims: usize,

    #[clap(long, env = "GEMINI_TEMPERATURE")]
    /// Empty means API default
    pub gemini_temperature: Option<f32>,

    #[clap(long, env = "GEMINI_THINKING_LEVEL")]
    pub gemini_thinking_level: Option<String>,

    #[clap(long, env = "GEMINI_MAX_OUTPUT_TOKENS")]
    pub gemini_max_output_tokens: Option<usize>,

    #[clap(long, env = "GEMINI_THINKING_RESEARCH")]
    /// Thinking level override for research-heavy agent strategies
    pub gemini_thinking_research: Option<String>,

    #[clap(long, env = "EMBED_BATCH_SIZE", default_value_t = 32)]
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,

    #[clap(long, env = "SUMMARY_DELAY_MS", default_value_t = 500)]
    #[serde(default = "default_summary_delay_ms")]
    /// Rate-limit delay between summarization calls
    pub summary_delay_ms: u64,

    #[clap(long, env = "SUMMARY_MAX_CHARS", default_value_t = 6000)]
    #[serde(default = "default_summary_max_chars")]
    /// File contents are truncated to this many characters before
    /// summarization
    pub summary_max_chars: usize,

    #[clap(long, env = "CACHE_SIMILARITY_THRESHOLD", default_value_t = 0.8)]
    #[serde(default = "default_cache_similarity_threshold")]
    pub cache_similarity_threshold: f64,

    #[clap(long, env = "RRF_K", default_value_t = 60)]
    #[serde(default = "default_rrf_k")]
    /// Reciprocal rank fusion constant
    pub rrf_k: u32,

    #[clap(long, env = "TASK_TIMEOUT_SECS")]
    /// Wall-clock budget per background task, unlimited when unset
    pub task_timeout_secs: Option<u64>,
}

impl Configuration {
    pub fn index_db_path(&self) -> PathBuf {
        self.data_dir.join("indiseek.db")
    }

    pub fn lancedb_dir(&self) -> PathBuf {
        self.data_dir.join("lancedb")
    }

    /// Directory where logs are written to
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn repos_dir(&self) -> PathBuf {
        self.repos_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("repos"))
    }

    pub fn repo_dir(&self, repo_id: i64) -> PathBuf {
        self.repos_dir().join(repo_id.to_string())
    }

    pub fn chat_provider(&self) -> Option<LLMProvider> {
        LLMProvider::from_str_loose(&self.llm_provider)
    }

    pub fn chat_model(&self) -> String {
        match self.chat_provider() {
            Some(LLMProvider::OpenAI) => self.openai_model.clone(),
            Some(LLMProvider::Anthropic) => self.anthropic_model.clone(),
            _ => self.gemini_model.clone(),
        }
    }

    pub fn chat_api_key(&self) -> Option<LLMProviderAPIKeys> {
        match self.chat_provider()? {
            LLMProvider::Gemini => self.gemini_api_key.clone().map(|api_key| {
                LLMProviderAPIKeys::Gemini(GeminiProvider { api_key })
            }),
            LLMProvider::OpenAI => self.openai_api_key.clone().map(|api_key| {
                LLMProviderAPIKeys::OpenAI(OpenAIProvider { api_key })
            }),
            LLMProvider::Anthropic => self.anthropic_api_key.clone().map(|api_key| {
                LLMProviderAPIKeys::Anthropic(AnthropicProvider { api_key })
            }),
        }
    }

    pub fn embedding_dims(&self) -> usize {
        match LLMProvider::from_str_loose(&self.embedding_provider) {
            Some(LLMProvider::OpenAI) => self.openai_embedding_dims,
            _ => self.gemini_embedding_dims,
        }
    }

    /// Build the embedding client, None when the required key is absent.
    pub fn embedder(&self) -> Option<Arc<dyn EmbeddingProvider>> {
        match LLMProvider::from_str_loose(&self.embedding_provider) {
            Some(LLMProvider::OpenAI) => self.openai_api_key.clone().map(|key| {
                Arc::new(OpenAIEmbedder::new(
                    key,
                    self.openai_embedding_model.clone(),
                    self.openai_embedding_dims,
                )) as Arc<dyn EmbeddingProvider>
            }),
            _ => self.gemini_api_key.clone().map(|key| {
                Arc::new(GeminiEmbedder::new(
                    key,
                    self.gemini_embedding_model.clone(),
                    self.gemini_embedding_dims,
                )) as Arc<dyn EmbeddingProvider>
            }),
        }
    }

    pub fn chat_temperature(&self) -> f32 {
        self.gemini_temperature.unwrap_or(0.2)
    }
}

fn default_data_dir() -> PathBuf {
    "./data".into()
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
    7430
}

fn default_llm_provider() -> String {
    "gemini".to_owned()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash".to_owned()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_owned()
}

fn default_anthropic_model() -> String {
    "claude-sonnet-4-5".to_owned()
}

fn default_gemini_embedding_model() -> String {
    "gemini-embedding-001".to_owned()
}

fn default_openai_embedding_model() -> String {
    "text-embedding-3-small".to_owned()
}

fn default_gemini_embedding_dims() -> usize {
    768
}

fn default_openai_embedding_dims() -> usize {
    1536
}

fn default_embed_batch_size() -> usize {
    32
}

fn default_summary_delay_ms() -> u64 {
    500
}

fn default_summary_max_chars() -> usize {
    6000
}

fn default_cache_similarity_threshold() -> f64 {
    0.8
}

fn default_rrf_k() -> u32 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn test_configuration(data_dir: &std::path::Path) -> Configuration {
        Configuration {
            data_dir: data_dir.to_owned(),
            repos_dir: None,
            repo_path: None,
            host: default_host(),
            port: default_port(),
            gemini_api_key: None,
            openai_api_key: None,
            anthropic_api_key: None,
            llm_provider: default_llm_provider(),
            embedding_provider: default_llm_provider(),
            gemini_model: default_gemini_model(),
            openai_model: default_openai_model(),
            anthropic_model: default_anthropic_model(),
            gemini_embedding_model: default_gemini_embedding_model(),
            openai_embedding_model: default_openai_embedding_model(),
            gemini_embedding_dims: default_gemini_embedding_dims(),
            openai_embedding_dims: default_openai_embedding_dims(),
            gemini_temperature: None,
            gemini_thinking_level: None,
            gemini_max_output_tokens: None,
            gemini_thinking_research: None,
            embed_batch_size: default_embed_batch_size(),
            summary_delay_ms: 0,
            summary_max_chars: default_summary_max_chars(),
            cache_similarity_threshold: default_cache_similarity_threshold(),
            rrf_k: default_rrf_k(),
            task_timeout_secs: None,
        }
    }

    #[test]
    fn repos_dir_defaults_under_data_dir() {
        let config = test_configuration(std::path::Path::new("/data"));
        assert_eq!(config.repos_dir(), PathBuf::from("/data/repos"));
        assert_eq!(config.repo_dir(3), PathBuf::from("/data/repos/3"));
    }

    #[test]
    fn missing_key_means_no_embedder() {
        let config = test_configuration(std::path::Path::new("/data"));
        assert!(config.embedder().is_none());
        assert!(config.chat_api_key().is_none());
    }
}
