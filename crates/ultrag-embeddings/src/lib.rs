mod fake;
#[cfg(feature = "openai")]
mod openai;

pub use fake::FakeEmbeddings;
#[cfg(feature = "openai")]
pub use openai::{OpenAiEmbeddings, OpenAiEmbeddingsConfig};

// Re-export the Embeddings trait from core.
pub use ultrag_core::Embeddings;
