//! Backend selection from configuration.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use ultrag_core::{DocumentStore, Embeddings, UltragError};
use ultrag_embeddings::FakeEmbeddings;

#[cfg(feature = "chroma")]
use ultrag_chroma::{ChromaConfig, ChromaVectorStore};
#[cfg(feature = "openai")]
use ultrag_embeddings::{OpenAiEmbeddings, OpenAiEmbeddingsConfig};
#[cfg(feature = "pgvector")]
use ultrag_pgvector::{PgVectorConfig, PgVectorStore};

/// Which backend a store runs on, tagged by `"backend"`.
///
/// ```json
/// {"backend": "chroma", "collection_name": "documents", "dimension": 384}
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    #[cfg(feature = "chroma")]
    Chroma(ChromaConfig),
    #[cfg(feature = "pgvector")]
    Pgvector(PgVectorConfig),
}

impl StoreConfig {
    /// Embedding dimension the backend expects.
    pub fn dimension(&self) -> usize {
        match *self {
            #[cfg(feature = "chroma")]
            StoreConfig::Chroma(ref config) => config.dimension,
            #[cfg(feature = "pgvector")]
            StoreConfig::Pgvector(ref config) => config.dimension,
        }
    }
}

/// Which embeddings provider to use, tagged by `"provider"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum EmbeddingsConfig {
    /// Deterministic offline vectors.
    Fake { dimensions: usize },
    #[cfg(feature = "openai")]
    #[serde(rename = "openai")]
    OpenAi(OpenAiEmbeddingsConfig),
}

impl EmbeddingsConfig {
    /// Output dimension, when the configuration pins one.
    pub fn dimensions(&self) -> Option<usize> {
        match self {
            EmbeddingsConfig::Fake { dimensions } => Some(*dimensions),
            #[cfg(feature = "openai")]
            EmbeddingsConfig::OpenAi(config) => config.dimensions,
        }
    }

    pub fn build(&self) -> Result<Arc<dyn Embeddings>, UltragError> {
        match self {
            EmbeddingsConfig::Fake { dimensions } => {
                if *dimensions == 0 {
                    return Err(UltragError::Config(
                        "fake embeddings need at least one dimension".to_string(),
                    ));
                }
                Ok(Arc::new(FakeEmbeddings::new(*dimensions)))
            }
            #[cfg(feature = "openai")]
            EmbeddingsConfig::OpenAi(config) => {
                if config.api_key.is_empty() {
                    return Err(UltragError::Config("OpenAI api_key is empty".to_string()));
                }
                Ok(Arc::new(OpenAiEmbeddings::new(config.clone())))
            }
        }
    }
}

/// A complete store setup: backend plus embeddings provider.
#[derive(Debug, Clone, Deserialize)]
pub struct UltragConfig {
    pub store: StoreConfig,
    pub embeddings: EmbeddingsConfig,
}

impl UltragConfig {
    pub fn from_json(json: &str) -> Result<Self, UltragError> {
        serde_json::from_str(json)
            .map_err(|e| UltragError::Config(format!("invalid configuration: {e}")))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, UltragError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            UltragError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Build the embeddings provider and open the configured store.
    ///
    /// Fails with [`UltragError::Config`] when the provider's pinned
    /// dimension disagrees with the backend's.
    pub async fn open(&self) -> Result<Arc<dyn DocumentStore>, UltragError> {
        if let Some(dimensions) = self.embeddings.dimensions() {
            if dimensions != self.store.dimension() {
                return Err(UltragError::Config(format!(
                    "embeddings produce {dimensions} dimensions but the store expects {}",
                    self.store.dimension()
                )));
            }
        }
        let embeddings = self.embeddings.build()?;
        open_store(self.store.clone(), embeddings).await
    }
}

/// Open the store `config` selects.
pub async fn open_store(
    config: StoreConfig,
    embeddings: Arc<dyn Embeddings>,
) -> Result<Arc<dyn DocumentStore>, UltragError> {
    if config.dimension() == 0 {
        return Err(UltragError::Config(
            "store dimension must be at least 1".to_string(),
        ));
    }
    match config {
        #[cfg(feature = "chroma")]
        StoreConfig::Chroma(config) => {
            tracing::debug!(
                url = %config.url,
                collection = %config.collection_name,
                "opening Chroma store"
            );
            Ok(Arc::new(ChromaVectorStore::new(config, embeddings)))
        }
        #[cfg(feature = "pgvector")]
        StoreConfig::Pgvector(config) => {
            tracing::debug!(table = %config.table_name, "opening pgvector store");
            Ok(Arc::new(PgVectorStore::connect(config, embeddings).await?))
        }
    }
}
