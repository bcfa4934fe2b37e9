use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pgvector::Vector;
use serde::Deserialize;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use ultrag_core::{
    check_dimensions, tag_documents, AccessLevel, Document, DocumentStore, EmbeddedMatch,
    Embeddings, FilterExpression, UltragError,
};

use crate::filter::{compile_sql, CompiledSql, SqlParam};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Where to reach PostgreSQL.
#[derive(Clone, Deserialize)]
pub struct PgConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
    /// Upper bound on pooled connections (default: 5).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long to wait for a pooled connection, in seconds (default: 30).
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_database() -> String {
    "Vector_DB".to_string()
}

fn default_user() -> String {
    "postgres".to_string()
}

fn default_password() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

impl Default for PgConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: default_database(),
            user: default_user(),
            password: default_password(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

impl fmt::Debug for PgConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish()
    }
}

impl PgConnectionConfig {
    pub fn with_host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// # Panics
    ///
    /// Panics if `max_connections` is zero.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        assert!(max_connections > 0, "max_connections must be > 0");
        self.max_connections = max_connections;
        self
    }

    pub fn with_acquire_timeout_secs(mut self, secs: u64) -> Self {
        self.acquire_timeout_secs = secs;
        self
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
    }
}

/// Configuration for a [`PgVectorStore`] table.
#[derive(Debug, Clone, Deserialize)]
pub struct PgVectorConfig {
    /// Name of the table holding `content`, `metadata` and `embedding`.
    pub table_name: String,
    /// Dimensionality of the `embedding` column.
    pub dimension: usize,
    #[serde(default)]
    pub connection: PgConnectionConfig,
}

impl PgVectorConfig {
    /// Create a new configuration using the default connection settings.
    ///
    /// # Panics
    ///
    /// Panics if `table_name` is empty or `dimension` is zero.
    pub fn new(table_name: impl Into<String>, dimension: usize) -> Self {
        let table_name = table_name.into();
        assert!(!table_name.is_empty(), "table_name must not be empty");
        assert!(dimension > 0, "dimension must be > 0");
        Self {
            table_name,
            dimension,
            connection: PgConnectionConfig::default(),
        }
    }

    pub fn with_connection(mut self, connection: PgConnectionConfig) -> Self {
        self.connection = connection;
        self
    }
}

// ---------------------------------------------------------------------------
// PgVectorStore
// ---------------------------------------------------------------------------

/// A [`DocumentStore`] backed by PostgreSQL with the pgvector extension.
///
/// The table must already exist with at least these columns:
/// - `content TEXT NOT NULL`
/// - `metadata JSONB NOT NULL`
/// - `embedding vector(<dimension>)`
///
/// Each batch passed to [`add_documents`](DocumentStore::add_documents) is
/// inserted in a single transaction: either every row lands or none does.
/// Document ids are not stored.
pub struct PgVectorStore {
    pool: PgPool,
    config: PgVectorConfig,
    embeddings: Arc<dyn Embeddings>,
}

impl PgVectorStore {
    /// Create a store from an existing connection pool.
    pub fn new(pool: PgPool, config: PgVectorConfig, embeddings: Arc<dyn Embeddings>) -> Self {
        Self {
            pool,
            config,
            embeddings,
        }
    }

    /// Open a pool from `config.connection` and create a store over it.
    pub async fn connect(
        config: PgVectorConfig,
        embeddings: Arc<dyn Embeddings>,
    ) -> Result<Self, UltragError> {
        validate_table_name(&config.table_name)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.connection.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection.acquire_timeout_secs))
            .connect_with(config.connection.connect_options())
            .await
            .map_err(|e| {
                UltragError::Connection(format!(
                    "failed to connect to PostgreSQL at {}:{}: {e}",
                    config.connection.host, config.connection.port
                ))
            })?;
        tracing::debug!(
            host = %config.connection.host,
            database = %config.connection.database,
            table = %config.table_name,
            "connected pgvector store"
        );
        Ok(Self::new(pool, config, embeddings))
    }

    /// Return a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Return a reference to the configuration.
    pub fn config(&self) -> &PgVectorConfig {
        &self.config
    }
}

#[async_trait]
impl DocumentStore for PgVectorStore {
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
        validate_table_name(&self.config.table_name)?;

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

        let insert_sql = format!(
            "INSERT INTO {table} (content, metadata, embedding) VALUES ($1, $2, $3)",
            table = self.config.table_name,
        );

        let rows = docs
            .into_iter()
            .zip(vectors)
            .map(|(doc, vector)| {
                let metadata = serde_json::to_value(&doc.metadata).map_err(|e| {
                    UltragError::BackendQuery(format!("failed to serialize metadata: {e}"))
                })?;
                Ok((doc.content, metadata, Vector::from(vector)))
            })
            .collect::<Result<Vec<_>, UltragError>>()?;

        let count = rows.len();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| sql_error("begin transaction", e))?;

        for (content, metadata, embedding) in rows {
            let inserted = sqlx::query(&insert_sql)
                .bind(content)
                .bind(metadata)
                .bind(embedding)
                .execute(&mut *tx)
                .await;

            if let Err(e) = inserted {
                let err = sql_error("insert", e);
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                tracing::warn!(
                    table = %self.config.table_name,
                    count,
                    error = %err,
                    "batch insert rolled back"
                );
                return Err(err);
            }
        }

        tx.commit().await.map_err(|e| sql_error("commit", e))?;

        tracing::info!(
            table = %self.config.table_name,
            count,
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
        validate_table_name(&self.config.table_name)?;

        let predicate = match filter {
            Some(filter) => compile_sql(filter, 2)?,
            None => CompiledSql::default(),
        };
        let limit_placeholder = 2 + predicate.params.len();
        let sql = search_sql(
            &self.config.table_name,
            &predicate.clause,
            limit_placeholder,
            with_embeddings,
        );

        tracing::debug!(
            table = %self.config.table_name,
            k,
            filtered = !predicate.is_empty(),
            with_embeddings,
            "pgvector similarity query"
        );

        let query = bind_params(
            sqlx::query(&sql).bind(Vector::from(embedding.to_vec())),
            predicate.params,
        )
        .bind(k as i64);

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| sql_error("acquire connection", e))?;
        let rows = query
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| sql_error("similarity search", e))?;

        rows.iter()
            .map(|row| row_to_match(row, with_embeddings))
            .collect()
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: Vec<SqlParam>,
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Text(text) => query.bind(text),
            SqlParam::Json(value) => query.bind(value),
        };
    }
    query
}

/// Build the nearest-neighbour query. `$1` is the query vector.
fn search_sql(table: &str, predicate: &str, limit_placeholder: usize, with_embeddings: bool) -> String {
    let mut sql = String::from("SELECT content, metadata, (embedding <=> $1)::float4 AS distance");
    if with_embeddings {
        sql.push_str(", embedding");
    }
    sql.push_str(&format!(" FROM {table}"));
    if !predicate.is_empty() {
        sql.push_str(&format!(" WHERE {predicate}"));
    }
    // The bare operator expression lets an ivfflat/hnsw index drive the scan.
    sql.push_str(&format!(" ORDER BY embedding <=> $1 LIMIT ${limit_placeholder}"));
    sql
}

fn row_to_match(row: &PgRow, with_embeddings: bool) -> Result<EmbeddedMatch, UltragError> {
    let decode = |e: sqlx::Error| UltragError::BackendQuery(format!("failed to decode row: {e}"));

    let content: String = row.try_get("content").map_err(decode)?;
    let metadata: Value = row.try_get("metadata").map_err(decode)?;
    let distance: f32 = row.try_get("distance").map_err(decode)?;
    let embedding = if with_embeddings {
        let vector: Option<Vector> = row.try_get("embedding").map_err(decode)?;
        vector.map(|v| v.to_vec())
    } else {
        None
    };

    let metadata: HashMap<String, Value> = match metadata {
        Value::Object(map) => map.into_iter().collect(),
        _ => HashMap::new(),
    };

    Ok(EmbeddedMatch {
        document: Document::with_metadata(content, metadata),
        distance,
        embedding,
    })
}

/// Map a driver error, separating connectivity failures from query failures.
fn sql_error(context: &str, e: sqlx::Error) -> UltragError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => UltragError::Connection(format!("{context}: {e}")),
        other => UltragError::BackendQuery(format!("{context}: {other}")),
    }
}

/// Validate that a table name is safe to interpolate into SQL.
///
/// Allows alphanumeric ASCII characters, underscores, and one dot for
/// schema-qualified names like `public.documents`.
fn validate_table_name(name: &str) -> Result<(), UltragError> {
    let valid_part = |part: &str| {
        !part.is_empty()
            && !part.starts_with(|c: char| c.is_ascii_digit())
            && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 || !parts.iter().all(|p| valid_part(p)) {
        return Err(UltragError::Config(format!(
            "invalid table name '{name}': expected an identifier or schema.identifier"
        )));
    }
    Ok(())
}
