//! Embedding provider contract plus the Gemini and OpenAI implementations.
//! The dimensionality is fixed per provider instance and must match the
//! vector table it writes into.

use async_trait::async_trait;
use serde::Deserialize;

use crate::clients::types::LLMClientError;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dims(&self) -> usize;

    fn model(&self) -> &str;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LLMClientError>;
}

pub struct OpenAIEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
}

#[derive(Deserialize)]
struct OpenAIEmbeddingRow {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingRow>,
}

impl OpenAIEmbedder {
    pub fn new(api_key: String, model: String, dims: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "https://api.openai.com".to_owned(),
            api_key,
            model,
            dims,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedder {
    fn dims(&self) -> usize {
        self.dims
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LLMClientError> {
        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "input": texts,
                "dimensions": self.dims,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LLMClientError::from_status(status.as_u16(), body));
        }

        let mut parsed: OpenAIEmbeddingResponse = response.json().await?;
        parsed.data.sort_by_key(|row| row.index);
        Ok(parsed.data.into_iter().map(|row| row.embedding).collect())
    }
}

pub struct GeminiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
}

#[derive(Deserialize)]
struct GeminiEmbeddingValues {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct GeminiEmbeddingResponse {
    embeddings: Vec<GeminiEmbeddingValues>,
}

impl GeminiEmbedder {
    pub fn new(api_key: String, model: String, dims: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "https://generativelanguage.googleapis.com".to_owned(),
            api_key,
            model,
            dims,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    fn dims(&self) -> usize {
        self.dims
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LLMClientError> {
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|text| {
                serde_json::json!({
                    "model": format!("models/{}", self.model),
                    "content": { "parts": [{ "text": text }] },
                    "outputDimensionality": self.dims,
                })
            })
            .collect();

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:batchEmbedContents",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&serde_json::json!({ "requests": requests }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LLMClientError::from_status(status.as_u16(), body));
        }

        let parsed: GeminiEmbeddingResponse = response.json().await?;
        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }
}
