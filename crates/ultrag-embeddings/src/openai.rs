//! OpenAI embeddings over the `/embeddings` REST endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use ultrag_core::{Embeddings, UltragError};

/// Configuration for [`OpenAiEmbeddings`].
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiEmbeddingsConfig {
    pub api_key: String,
    /// Model name (default: `"text-embedding-3-small"`).
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL (default: `"https://api.openai.com/v1"`).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Requested output dimension. Only the `text-embedding-3` family honours it.
    #[serde(default)]
    pub dimensions: Option<usize>,
}

fn default_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

impl OpenAiEmbeddingsConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: default_model(),
            base_url: default_base_url(),
            dimensions: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

/// Embeddings backed by the OpenAI API.
pub struct OpenAiEmbeddings {
    config: OpenAiEmbeddingsConfig,
    client: reqwest::Client,
}

impl OpenAiEmbeddings {
    pub fn new(config: OpenAiEmbeddingsConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(config: OpenAiEmbeddingsConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &OpenAiEmbeddingsConfig {
        &self.config
    }

    fn request_body(&self, texts: &[&str]) -> serde_json::Value {
        let mut body = json!({
            "model": self.config.model,
            "input": texts,
            "encoding_format": "float",
        });
        if let Some(dimensions) = self.config.dimensions {
            body["dimensions"] = json!(dimensions);
        }
        body
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl Embeddings for OpenAiEmbeddings {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, UltragError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/embeddings", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(texts))
            .send()
            .await
            .map_err(|e| UltragError::Embedding(format!("OpenAI embed request: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(UltragError::Embedding(format!(
                "OpenAI embed API error ({status}): {text}"
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| UltragError::Embedding(format!("OpenAI embed parse: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(UltragError::Embedding(format!(
                "OpenAI returned {} embeddings for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        // The API does not promise response order.
        parsed.data.sort_by_key(|item| item.index);
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, UltragError> {
        let mut results = self.embed_documents(&[text]).await?;
        results
            .pop()
            .ok_or_else(|| UltragError::Embedding("empty response".to_string()))
    }
}
