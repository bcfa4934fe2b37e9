//! ultrag: access-controlled vector retrieval with a query-space visualization.
//!
//! This crate re-exports the ultrag sub-crates and adds [`open_store`], which
//! picks a backend from a [`StoreConfig`]. Enable features to control which
//! backends are available.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `default` | `chroma` |
//! | `chroma` | Disk-persistent Chroma collection store |
//! | `pgvector` | PostgreSQL + pgvector store |
//! | `openai` | OpenAI embeddings provider |
//! | `full` | All features enabled |
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use ultrag::{AccessLevel, Document, UltragConfig};
//!
//! let config = UltragConfig::from_file("ultrag.json")?;
//! let store = config.open().await?;
//! store.add_documents(vec![Document::new("hello")], Some("u1"), AccessLevel::Private).await?;
//! let payload = store.search_with_embeddings("hi", Some("u1"), 10).await?;
//! ```

mod config;

pub use config::{open_store, EmbeddingsConfig, StoreConfig, UltragConfig};

/// Core traits and types: DocumentStore, Embeddings, FilterExpression, UltragError, etc.
/// Always available.
pub use ultrag_core as core;

/// Embeddings providers. `OpenAiEmbeddings` requires the `openai` feature.
pub use ultrag_embeddings as embeddings;

/// Chroma-backed store.
#[cfg(feature = "chroma")]
pub use ultrag_chroma as chroma;

/// PostgreSQL + pgvector store.
#[cfg(feature = "pgvector")]
pub use ultrag_pgvector as pgvector;

pub use ultrag_core::{
    AccessLevel, Document, DocumentStore, Embeddings, FilterExpression, Retriever,
    RetrieverOptions, UltragError, VisualizationPayload, DEFAULT_VISUALIZATION_K,
};
