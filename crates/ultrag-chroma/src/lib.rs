//! Chroma integration for ultrag.
//!
//! [`ChromaVectorStore`] implements [`DocumentStore`](ultrag_core::DocumentStore)
//! over one collection of a Chroma index running with on-disk persistence
//! (`chroma run --path <dir>`). Visibility filters are compiled into Chroma's
//! native `where` syntax by [`compile_where`].
//!
//! The store reaches the index through the [`IndexCollection`] trait;
//! [`ChromaCollection`] is the REST implementation.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ultrag_chroma::{ChromaConfig, ChromaVectorStore};
//! use ultrag_core::{AccessLevel, Document, DocumentStore};
//! use ultrag_embeddings::FakeEmbeddings;
//!
//! # async fn example() -> Result<(), ultrag_core::UltragError> {
//! let config = ChromaConfig::new("documents", 64).with_url("http://localhost:8000");
//! let store = ChromaVectorStore::new(config, Arc::new(FakeEmbeddings::new(64)));
//! store
//!     .add_documents(vec![Document::new("hello")], None, AccessLevel::Common)
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod collection;
mod filter;
mod vector_store;

pub use collection::{
    ChromaCollection, ChromaConfig, IndexCollection, IndexQuery, IndexRecord, Include,
    QueryResult,
};
pub use filter::compile_where;
pub use vector_store::ChromaVectorStore;

// Re-export core traits/types for convenience.
pub use ultrag_core::{Document, DocumentStore, Embeddings};
