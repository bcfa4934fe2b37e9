use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use ultrag_core::{
    check_dimensions, tag_documents, AccessLevel, Document, DocumentStore, EmbeddedMatch,
    Embeddings, FilterExpression, UltragError,
};
use uuid::Uuid;

use crate::collection::{
    ChromaCollection, ChromaConfig, IndexCollection, IndexQuery, IndexRecord, Include, QueryResult,
};
use crate::filter::compile_where;

/// A [`DocumentStore`] backed by one collection of a disk-persistent
/// [Chroma](https://www.trychroma.com/) index.
///
/// # Write atomicity
///
/// Batches larger than [`ChromaConfig::max_batch_size`] are written in
/// several requests. Chroma applies each request on its own, so a failure
/// part-way through can leave the earlier chunks persisted. Callers needing
/// all-or-nothing ingestion should use the relational backend.
pub struct ChromaVectorStore {
    config: ChromaConfig,
    collection: Arc<dyn IndexCollection>,
    embeddings: Arc<dyn Embeddings>,
}

impl ChromaVectorStore {
    /// Create a store talking to Chroma over HTTP.
    pub fn new(config: ChromaConfig, embeddings: Arc<dyn Embeddings>) -> Self {
        let collection = Arc::new(ChromaCollection::new(config.clone()));
        Self::with_collection(config, collection, embeddings)
    }

    /// Create a store over any [`IndexCollection`].
    pub fn with_collection(
        config: ChromaConfig,
        collection: Arc<dyn IndexCollection>,
        embeddings: Arc<dyn Embeddings>,
    ) -> Self {
        Self {
            config,
            collection,
            embeddings,
        }
    }

    pub fn config(&self) -> &ChromaConfig {
        &self.config
    }
}

#[async_trait]
impl DocumentStore for ChromaVectorStore {
    fn embeddings(&self) -> &dyn Embeddings {
        self.embeddings.as_ref()
    }

    async fn add_documents(
        &self,
        docs: Vec<Document>,
        user_id: Option<&str>,
        access_level: AccessLevel,
    ) -> Result<(), UltragError> {
        if docs.is_empty() {
            return Ok(());
        }

        let docs = tag_documents(docs, user_id, access_level)?;

        let texts: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();
        let vectors = self.embeddings.embed_documents(&texts).await?;
        if vectors.len() != docs.len() {
            return Err(UltragError::Embedding(format!(
                "provider returned {} embeddings for {} documents",
                vectors.len(),
                docs.len()
            )));
        }
        check_dimensions(&vectors, self.config.dimension)?;

        let total = docs.len();
        let mut records = docs
            .into_iter()
            .zip(vectors)
            .map(|(doc, embedding)| to_record(doc, embedding))
            .peekable();

        let chunk_size = self.config.max_batch_size.max(1);
        let mut written = 0;
        while records.peek().is_some() {
            let chunk: Vec<IndexRecord> = records.by_ref().take(chunk_size).collect();
            let len = chunk.len();
            if let Err(e) = self.collection.add(chunk).await {
                if written > 0 {
                    tracing::warn!(
                        collection = %self.config.collection_name,
                        written,
                        total,
                        "Chroma batch failed part-way; earlier chunks stay persisted"
                    );
                }
                return Err(e);
            }
            written += len;
        }

        tracing::info!(
            collection = %self.config.collection_name,
            count = total,
            access_level = %access_level,
            "added documents"
        );
        Ok(())
    }

    async fn similarity_search_by_vector(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&FilterExpression>,
        with_embeddings: bool,
    ) -> Result<Vec<EmbeddedMatch>, UltragError> {
        if k == 0 {
            return Err(UltragError::Validation("k must be at least 1".to_string()));
        }
        if embedding.len() != self.config.dimension {
            return Err(UltragError::Embedding(format!(
                "expected {}-dimensional query embedding, got {}",
                self.config.dimension,
                embedding.len()
            )));
        }

        let where_clause = match filter {
            Some(filter) => compile_where(filter)?,
            None => None,
        };

        let include = if with_embeddings {
            vec![
                Include::Documents,
                Include::Metadatas,
                Include::Embeddings,
                Include::Distances,
            ]
        } else {
            vec![Include::Documents, Include::Metadatas, Include::Distances]
        };

        tracing::debug!(
            collection = %self.config.collection_name,
            k,
            filtered = where_clause.is_some(),
            with_embeddings,
            "Chroma similarity query"
        );

        let result = self
            .collection
            .query(IndexQuery {
                embedding: embedding.to_vec(),
                n_results: k,
                where_clause,
                include,
            })
            .await?;

        Ok(into_matches(result, k))
    }
}

/// Convert a document into an index record.
///
/// Chroma metadata only accepts primitive types: nested values are stored
/// as JSON strings and nulls are dropped.
fn to_record(doc: Document, embedding: Vec<f32>) -> IndexRecord {
    let mut metadata = Map::new();
    for (k, v) in doc.metadata {
        let flat = match v {
            Value::Null => continue,
            Value::String(_) | Value::Number(_) | Value::Bool(_) => v,
            other => Value::String(other.to_string()),
        };
        metadata.insert(k, flat);
    }

    IndexRecord {
        id: doc.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        document: doc.content,
        metadata,
        embedding,
    }
}

fn into_matches(result: QueryResult, k: usize) -> Vec<EmbeddedMatch> {
    let mut embeddings = result.embeddings.map(|e| e.into_iter());
    let mut documents = result.documents.into_iter();
    let mut metadatas = result.metadatas.into_iter();

    result
        .ids
        .into_iter()
        .zip(result.distances)
        .take(k)
        .map(|(id, distance)| {
            let content = documents.next().flatten().unwrap_or_default();
            let metadata = metadatas
                .next()
                .flatten()
                .map(|m| m.into_iter().collect())
                .unwrap_or_default();
            EmbeddedMatch {
                document: Document::with_metadata(content, metadata).with_id(id),
                distance,
                embedding: embeddings.as_mut().and_then(Iterator::next),
            }
        })
        .collect()
}
