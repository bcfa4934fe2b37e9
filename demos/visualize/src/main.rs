//! Ingest a private and a common document, then print the visualization
//! payload each caller would see.
//!
//! Needs a Chroma server (`chroma run --path ./chroma-data`). Pass a JSON
//! config file to use another backend or embeddings provider:
//!
//! ```bash
//! RUST_LOG=debug cargo run -p visualize -- ultrag.json
//! ```

use ultrag::chroma::ChromaConfig;
use ultrag::{
    AccessLevel, Document, EmbeddingsConfig, StoreConfig, UltragConfig, UltragError,
    DEFAULT_VISUALIZATION_K,
};

const DEFAULT_DIMENSIONS: usize = 64;

#[tokio::main]
async fn main() -> Result<(), UltragError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => UltragConfig::from_file(path)?,
        None => UltragConfig {
            store: StoreConfig::Chroma(ChromaConfig::new("ultrag_demo", DEFAULT_DIMENSIONS)),
            embeddings: EmbeddingsConfig::Fake {
                dimensions: DEFAULT_DIMENSIONS,
            },
        },
    };
    let store = config.open().await?;

    println!("=== Ingesting ===");
    store
        .add_documents(
            vec![
                Document::new("alpha: the owner's private notes on vector search"),
                Document::new("alpha: quarterly figures, do not share"),
            ],
            Some("u1"),
            AccessLevel::Private,
        )
        .await?;
    store
        .add_documents(
            vec![
                Document::new("beta: public handbook for new users"),
                Document::new("beta: frequently asked questions"),
            ],
            None,
            AccessLevel::Common,
        )
        .await?;
    println!("Added 2 private and 2 common documents");

    for caller in [Some("u1"), Some("u2"), None] {
        println!("\n=== Visualization for {} ===", caller.unwrap_or("anonymous"));
        let payload = store
            .search_with_embeddings("alpha notes", caller, DEFAULT_VISUALIZATION_K)
            .await?;
        let json = serde_json::to_string_pretty(&payload)
            .map_err(|e| UltragError::Config(format!("cannot render payload: {e}")))?;
        println!("{json}");
        tracing::info!(points = payload.points.len(), "visualization rendered");
    }

    Ok(())
}
