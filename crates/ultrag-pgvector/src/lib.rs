//! PostgreSQL + pgvector integration for ultrag.
//!
//! [`PgVectorStore`] implements [`DocumentStore`](ultrag_core::DocumentStore)
//! over a pre-existing table of `(content, metadata, embedding)` rows, ranking
//! by cosine distance (`<=>`). Filters are compiled into parameterised
//! predicates on the JSONB `metadata` column by [`compile_sql`].
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ultrag_core::{AccessLevel, Document, DocumentStore};
//! use ultrag_embeddings::FakeEmbeddings;
//! use ultrag_pgvector::{PgConnectionConfig, PgVectorConfig, PgVectorStore};
//!
//! # async fn example() -> Result<(), ultrag_core::UltragError> {
//! let config = PgVectorConfig::new("documents", 384)
//!     .with_connection(PgConnectionConfig::default().with_database("rag"));
//! let store = PgVectorStore::connect(config, Arc::new(FakeEmbeddings::new(384))).await?;
//! store
//!     .add_documents(vec![Document::new("hello")], Some("u1"), AccessLevel::Private)
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod filter;
mod vector_store;

pub use filter::{compile_sql, CompiledSql, SqlParam};
pub use vector_store::{PgConnectionConfig, PgVectorConfig, PgVectorStore};

// Re-export core traits/types for convenience.
pub use ultrag_core::{Document, DocumentStore, Embeddings};
