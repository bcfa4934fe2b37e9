use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

mod filter;
pub mod projection;

pub use filter::{
    Condition, FilterClause, FilterExpression, MetadataValue, ACCESS_LEVEL_KEY, USER_ID_KEY,
};

/// Number of dimensions a visualization payload is projected to.
pub const VISUALIZATION_DIMENSIONS: usize = 3;

/// Characters of document text kept in a visualization preview.
pub const PREVIEW_LENGTH: usize = 100;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Unified error type for ultrag, one variant per failure class.
///
/// An empty search result is never an error.
#[derive(Debug, Error)]
pub enum UltragError {
    /// Invalid input rejected before any backend work, e.g. a private
    /// document without an owner.
    #[error("validation error: {0}")]
    Validation(String),
    /// The backend could not be reached when the operation started.
    #[error("connection error: {0}")]
    Connection(String),
    /// Filter compilation or backend execution failed.
    #[error("backend query error: {0}")]
    BackendQuery(String),
    #[error("embedding error: {0}")]
    Embedding(String),
    #[error("config error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// AccessLevel
// ---------------------------------------------------------------------------

/// Visibility classification of a stored document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    /// Visible to its owner only. Requires a `user_id` at ingestion.
    #[default]
    Private,
    /// Visible to every caller.
    Common,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Private => "private",
            AccessLevel::Common => "common",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = UltragError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(AccessLevel::Private),
            "common" => Ok(AccessLevel::Common),
            other => Err(UltragError::Validation(format!(
                "unknown access level '{other}': expected 'private' or 'common'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A text document with scalar metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Backend identifier, when the backend keeps one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub content: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: None,
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(content: impl Into<String>, metadata: HashMap<String, Value>) -> Self {
        Self {
            id: None,
            content: content.into(),
            metadata,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn access_level(&self) -> Option<AccessLevel> {
        self.metadata
            .get(ACCESS_LEVEL_KEY)
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
    }

    pub fn user_id(&self) -> Option<&str> {
        self.metadata.get(USER_ID_KEY).and_then(Value::as_str)
    }
}

/// Validate a batch for ingestion and write the access metadata into it.
///
/// The whole batch is rejected before any document is touched when a
/// private batch has no owner.
pub fn tag_documents(
    mut docs: Vec<Document>,
    user_id: Option<&str>,
    access_level: AccessLevel,
) -> Result<Vec<Document>, UltragError> {
    let user_id = user_id.filter(|id| !id.is_empty());
    if access_level == AccessLevel::Private && user_id.is_none() {
        return Err(UltragError::Validation(
            "a user id must be provided for private documents".to_string(),
        ));
    }

    for doc in &mut docs {
        if let Some(id) = user_id {
            doc.metadata
                .insert(USER_ID_KEY.to_string(), Value::String(id.to_string()));
        }
        doc.metadata.insert(
            ACCESS_LEVEL_KEY.to_string(),
            Value::String(access_level.as_str().to_string()),
        );
    }

    Ok(docs)
}

/// Check that every vector has the configured dimension.
pub fn check_dimensions(vectors: &[Vec<f32>], expected: usize) -> Result<(), UltragError> {
    match vectors.iter().find(|v| v.len() != expected) {
        Some(v) => Err(UltragError::Embedding(format!(
            "expected {expected}-dimensional embedding, got {}",
            v.len()
        ))),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Embeddings trait
// ---------------------------------------------------------------------------

/// Trait for embedding text into vectors.
#[async_trait]
pub trait Embeddings: Send + Sync {
    /// Embed multiple texts (for batch document embedding).
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, UltragError>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, UltragError>;
}

// ---------------------------------------------------------------------------
// Search results
// ---------------------------------------------------------------------------

/// A search hit together with its stored embedding, when requested.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedMatch {
    pub document: Document,
    /// Backend-reported distance; smaller is more similar.
    pub distance: f32,
    pub embedding: Option<Vec<f32>>,
}

impl EmbeddedMatch {
    pub fn into_scored(self) -> (Document, f32) {
        (self.document, self.distance)
    }
}

// ---------------------------------------------------------------------------
// Visualization
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointKind {
    Query,
    Doc,
}

/// A projected point for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(rename = "type")]
    pub kind: PointKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl VisualizationPoint {
    fn from_coords(
        coords: &[f32],
        kind: PointKind,
        text: String,
        metadata: HashMap<String, Value>,
    ) -> Self {
        let axis = |i: usize| coords.get(i).copied().unwrap_or(0.0);
        Self {
            x: axis(0),
            y: axis(1),
            z: axis(2),
            kind,
            text,
            metadata,
        }
    }
}

/// A query and its neighbours projected into a shared low-dimensional space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationPayload {
    pub query_point: VisualizationPoint,
    pub points: Vec<VisualizationPoint>,
}

impl VisualizationPayload {
    /// The payload returned when nothing visible matched.
    pub fn empty(query: &str) -> Self {
        Self {
            query_point: VisualizationPoint::from_coords(
                &[],
                PointKind::Query,
                query.to_string(),
                HashMap::new(),
            ),
            points: Vec::new(),
        }
    }

    /// Project the query embedding and the matches jointly and lay them out.
    ///
    /// Every match must carry its embedding; a missing one is a
    /// `BackendQuery` error since the backend was asked to include them.
    pub fn build(
        query: &str,
        query_embedding: Vec<f32>,
        matches: Vec<EmbeddedMatch>,
    ) -> Result<Self, UltragError> {
        if matches.is_empty() {
            return Ok(Self::empty(query));
        }
        let (docs, mut vectors): (Vec<Document>, Vec<Vec<f32>>) = matches
            .into_iter()
            .map(|m| match m.embedding {
                Some(embedding) => Ok((m.document, embedding)),
                None => Err(UltragError::BackendQuery(
                    "match returned without its embedding".to_string(),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .unzip();

        vectors.insert(0, query_embedding);
        let reduced = projection::reduce(&vectors, VISUALIZATION_DIMENSIONS)?;

        let query_point = VisualizationPoint::from_coords(
            &reduced[0],
            PointKind::Query,
            query.to_string(),
            HashMap::new(),
        );
        let points = reduced[1..]
            .iter()
            .zip(docs)
            .map(|(coords, doc)| {
                VisualizationPoint::from_coords(
                    coords,
                    PointKind::Doc,
                    text_preview(&doc.content, PREVIEW_LENGTH),
                    doc.metadata,
                )
            })
            .collect();

        Ok(Self {
            query_point,
            points,
        })
    }
}

/// Truncate `text` to `length` characters, marking the cut with `...`.
pub fn text_preview(text: &str, length: usize) -> String {
    match text.char_indices().nth(length) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Retriever trait
// ---------------------------------------------------------------------------

/// Trait for retrieving relevant documents given a query string.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Document>, UltragError>;
}

// ---------------------------------------------------------------------------
// DocumentStore trait
// ---------------------------------------------------------------------------

/// A persistent, filterable vector store.
///
/// Implementations differ in write atomicity: check the backend's docs
/// before relying on all-or-nothing batches.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Provider used for both documents and queries.
    fn embeddings(&self) -> &dyn Embeddings;

    /// Tag, embed and persist `docs`.
    ///
    /// An empty batch is a no-op. A private batch without `user_id` fails
    /// with [`UltragError::Validation`] and persists nothing.
    async fn add_documents(
        &self,
        docs: Vec<Document>,
        user_id: Option<&str>,
        access_level: AccessLevel,
    ) -> Result<(), UltragError>;

    /// Nearest neighbours of a pre-computed embedding, ascending by distance.
    async fn similarity_search_by_vector(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&FilterExpression>,
        with_embeddings: bool,
    ) -> Result<Vec<EmbeddedMatch>, UltragError>;

    /// Search by query text. Results are ascending by distance, at most `k`.
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&FilterExpression>,
    ) -> Result<Vec<(Document, f32)>, UltragError> {
        ensure_k(k)?;
        let query_vec = self.embeddings().embed_query(query).await?;
        let matches = self
            .similarity_search_by_vector(&query_vec, k, filter, false)
            .await?;
        Ok(matches.into_iter().map(EmbeddedMatch::into_scored).collect())
    }

    /// Search under the visibility rule for `user_id` and project the query
    /// and its matches into three dimensions.
    ///
    /// The projection is fitted per call, so coordinates from different
    /// calls are not comparable.
    async fn search_with_embeddings(
        &self,
        query: &str,
        user_id: Option<&str>,
        k: usize,
    ) -> Result<VisualizationPayload, UltragError> {
        ensure_k(k)?;
        let query_vec = self.embeddings().embed_query(query).await?;
        let filter = FilterExpression::visibility(user_id);
        let matches = self
            .similarity_search_by_vector(&query_vec, k, Some(&filter), true)
            .await?;

        if matches.is_empty() {
            tracing::debug!("visualization search matched nothing");
            return Ok(VisualizationPayload::empty(query));
        }
        VisualizationPayload::build(query, query_vec, matches)
    }

    /// Wrap this store in a [`Retriever`] with bound defaults.
    fn get_retriever(self: Arc<Self>, options: RetrieverOptions) -> StoreRetriever
    where
        Self: Sized + 'static,
    {
        StoreRetriever::new(self, options)
    }
}

/// Default number of results for [`DocumentStore::search_with_embeddings`].
pub const DEFAULT_VISUALIZATION_K: usize = 10;

fn ensure_k(k: usize) -> Result<(), UltragError> {
    if k == 0 {
        return Err(UltragError::Validation("k must be at least 1".to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// StoreRetriever
// ---------------------------------------------------------------------------

/// Defaults bound into a [`StoreRetriever`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverOptions {
    #[serde(default = "default_retriever_k")]
    pub k: usize,
    #[serde(default)]
    pub filter: Option<FilterExpression>,
    /// Drop hits farther than this distance.
    #[serde(default)]
    pub max_distance: Option<f32>,
}

fn default_retriever_k() -> usize {
    4
}

impl Default for RetrieverOptions {
    fn default() -> Self {
        Self {
            k: default_retriever_k(),
            filter: None,
            max_distance: None,
        }
    }
}

impl RetrieverOptions {
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_filter(mut self, filter: FilterExpression) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_max_distance(mut self, max_distance: f32) -> Self {
        self.max_distance = Some(max_distance);
        self
    }
}

/// A retriever that wraps a DocumentStore, bridging it to the `Retriever` trait.
pub struct StoreRetriever {
    store: Arc<dyn DocumentStore>,
    options: RetrieverOptions,
}

impl StoreRetriever {
    pub fn new(store: Arc<dyn DocumentStore>, options: RetrieverOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &RetrieverOptions {
        &self.options
    }
}

#[async_trait]
impl Retriever for StoreRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Document>, UltragError> {
        let k = if top_k > 0 { top_k } else { self.options.k };
        let scored = self
            .store
            .similarity_search(query, k, self.options.filter.as_ref())
            .await?;

        Ok(scored
            .into_iter()
            .filter(|(_, distance)| self.options.max_distance.is_none_or(|max| *distance <= max))
            .map(|(doc, _)| doc)
            .collect())
    }
}
