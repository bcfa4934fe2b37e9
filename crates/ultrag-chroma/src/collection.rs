use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use ultrag_core::UltragError;

// ---------------------------------------------------------------------------
// ChromaConfig
// ---------------------------------------------------------------------------

/// Configuration for a Chroma-backed store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChromaConfig {
    /// Chroma server URL (default: `http://localhost:8000`).
    #[serde(default = "default_url")]
    pub url: String,
    /// Name of the collection to operate on.
    pub collection_name: String,
    /// Tenant name (default: `default_tenant`).
    #[serde(default = "default_tenant")]
    pub tenant: String,
    /// Database name (default: `default_database`).
    #[serde(default = "default_database")]
    pub database: String,
    /// Dimensionality every embedding must have.
    pub dimension: usize,
    /// Maximum records sent in one add request (default: 5000).
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_tenant() -> String {
    "default_tenant".to_string()
}

fn default_database() -> String {
    "default_database".to_string()
}

fn default_max_batch_size() -> usize {
    5000
}

impl ChromaConfig {
    /// Create a new config with the required collection name and dimension.
    ///
    /// # Panics
    ///
    /// Panics if `collection_name` is empty or `dimension` is zero.
    pub fn new(collection_name: impl Into<String>, dimension: usize) -> Self {
        let collection_name = collection_name.into();
        assert!(!collection_name.is_empty(), "collection_name must not be empty");
        assert!(dimension > 0, "dimension must be > 0");
        Self {
            url: default_url(),
            collection_name,
            tenant: default_tenant(),
            database: default_database(),
            dimension,
            max_batch_size: default_max_batch_size(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = tenant.into();
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// # Panics
    ///
    /// Panics if `max_batch_size` is zero.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        assert!(max_batch_size > 0, "max_batch_size must be > 0");
        self.max_batch_size = max_batch_size;
        self
    }
}

// ---------------------------------------------------------------------------
// IndexCollection
// ---------------------------------------------------------------------------

/// Fields a query asks the index to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Include {
    Documents,
    Metadatas,
    Embeddings,
    Distances,
}

/// One record written to the index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    pub id: String,
    pub document: String,
    pub metadata: Map<String, Value>,
    pub embedding: Vec<f32>,
}

/// A nearest-neighbour query against one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexQuery {
    pub embedding: Vec<f32>,
    pub n_results: usize,
    pub where_clause: Option<Value>,
    pub include: Vec<Include>,
}

/// Column-oriented query result, ascending by distance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub ids: Vec<String>,
    pub documents: Vec<Option<String>>,
    pub metadatas: Vec<Option<Map<String, Value>>>,
    pub embeddings: Option<Vec<Vec<f32>>>,
    pub distances: Vec<f32>,
}

/// A named collection inside a vector index.
///
/// Each call is a single request; the index guarantees nothing across
/// calls.
#[async_trait]
pub trait IndexCollection: Send + Sync {
    async fn add(&self, records: Vec<IndexRecord>) -> Result<(), UltragError>;

    async fn query(&self, query: IndexQuery) -> Result<QueryResult, UltragError>;
}

// ---------------------------------------------------------------------------
// ChromaCollection
// ---------------------------------------------------------------------------

/// [`IndexCollection`] over the Chroma REST API v1.
///
/// The collection is created with cosine distance on first use and its id is
/// cached afterwards.
pub struct ChromaCollection {
    config: ChromaConfig,
    client: reqwest::Client,
    collection_id: RwLock<Option<String>>,
}

impl ChromaCollection {
    pub fn new(config: ChromaConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(config: ChromaConfig, client: reqwest::Client) -> Self {
        Self {
            config,
            client,
            collection_id: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &ChromaConfig {
        &self.config
    }

    /// Get or create the configured collection and return its id.
    pub async fn ensure_collection(&self) -> Result<String, UltragError> {
        if let Some(id) = self.collection_id.read().await.as_ref() {
            return Ok(id.clone());
        }

        let url = format!(
            "{}/api/v1/tenants/{}/databases/{}/collections",
            self.config.url.trim_end_matches('/'),
            self.config.tenant,
            self.config.database,
        );
        let body = serde_json::json!({
            "name": self.config.collection_name,
            "metadata": { "hnsw:space": "cosine" },
            "get_or_create": true,
        });

        let parsed = self.post(&url, &body).await?;
        let id = parsed
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                UltragError::BackendQuery("Chroma response missing collection id".to_string())
            })?
            .to_string();

        tracing::debug!(collection = %self.config.collection_name, id = %id, "resolved Chroma collection");
        *self.collection_id.write().await = Some(id.clone());
        Ok(id)
    }

    async fn collection_url(&self, path: &str) -> Result<String, UltragError> {
        let id = self.ensure_collection().await?;
        Ok(format!(
            "{}/api/v1/collections/{id}{path}",
            self.config.url.trim_end_matches('/'),
        ))
    }

    async fn post(&self, url: &str, body: &Value) -> Result<Value, UltragError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            UltragError::BackendQuery(format!("failed to read Chroma response: {e}"))
        })?;

        if !status.is_success() {
            return Err(UltragError::BackendQuery(format!(
                "Chroma API error (HTTP {status}): {text}"
            )));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| UltragError::BackendQuery(format!("failed to parse Chroma response: {e}")))
    }
}

fn request_error(e: reqwest::Error) -> UltragError {
    if e.is_connect() || e.is_timeout() {
        UltragError::Connection(format!("Chroma unreachable: {e}"))
    } else {
        UltragError::BackendQuery(format!("Chroma request failed: {e}"))
    }
}

#[async_trait]
impl IndexCollection for ChromaCollection {
    async fn add(&self, records: Vec<IndexRecord>) -> Result<(), UltragError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut ids = Vec::with_capacity(records.len());
        let mut documents = Vec::with_capacity(records.len());
        let mut metadatas = Vec::with_capacity(records.len());
        let mut embeddings = Vec::with_capacity(records.len());
        for record in records {
            ids.push(record.id);
            documents.push(record.document);
            metadatas.push(Value::Object(record.metadata));
            embeddings.push(record.embedding);
        }

        let url = self.collection_url("/add").await?;
        let body = serde_json::json!({
            "ids": ids,
            "embeddings": embeddings,
            "documents": documents,
            "metadatas": metadatas,
        });
        self.post(&url, &body).await?;
        Ok(())
    }

    async fn query(&self, query: IndexQuery) -> Result<QueryResult, UltragError> {
        let url = self.collection_url("/query").await?;
        let mut body = serde_json::json!({
            "query_embeddings": [query.embedding],
            "n_results": query.n_results,
            "include": query.include,
        });
        if let Some(where_clause) = query.where_clause {
            body["where"] = where_clause;
        }

        let parsed = self.post(&url, &body).await?;
        parse_query_response(&parsed, query.include.contains(&Include::Embeddings))
    }
}

/// Parse the first (and only) result row of a Chroma query response.
///
/// Chroma answers with arrays of arrays, one per query embedding:
/// `{ "ids": [[...]], "documents": [[...]], "metadatas": [[...]], "distances": [[...]] }`.
pub(crate) fn parse_query_response(
    parsed: &Value,
    with_embeddings: bool,
) -> Result<QueryResult, UltragError> {
    let first = |field: &str| -> Vec<Value> {
        parsed[field]
            .get(0)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    };

    let ids: Vec<String> = first("ids")
        .iter()
        .map(|v| v.as_str().unwrap_or_default().to_string())
        .collect();
    let documents = first("documents")
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect();
    let metadatas = first("metadatas")
        .iter()
        .map(|v| v.as_object().cloned())
        .collect();
    let distances: Vec<f32> = first("distances")
        .iter()
        .map(|v| v.as_f64().unwrap_or(f64::MAX) as f32)
        .collect();

    if distances.len() != ids.len() {
        return Err(UltragError::BackendQuery(format!(
            "Chroma returned {} distances for {} ids",
            distances.len(),
            ids.len()
        )));
    }

    let embeddings = if with_embeddings {
        let rows = first("embeddings");
        if rows.len() != ids.len() {
            return Err(UltragError::BackendQuery(
                "Chroma response missing embeddings".to_string(),
            ));
        }
        Some(
            rows.iter()
                .map(|row| {
                    row.as_array()
                        .map(|xs| xs.iter().map(|x| x.as_f64().unwrap_or(0.0) as f32).collect())
                        .unwrap_or_default()
                })
                .collect(),
        )
    } else {
        None
    };

    Ok(QueryResult {
        ids,
        documents,
        metadatas,
        embeddings,
        distances,
    })
}
