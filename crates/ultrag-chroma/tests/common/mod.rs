//! In-process stand-in for a Chroma collection.
//!
//! Evaluates the `where` documents produced by `compile_where` and ranks by
//! cosine distance, so store behaviour can be tested without a server.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use ultrag_chroma::{IndexCollection, IndexQuery, IndexRecord, Include, QueryResult};
use ultrag_core::UltragError;

#[derive(Default)]
pub struct InMemoryCollection {
    records: Mutex<Vec<IndexRecord>>,
    queries: Mutex<Vec<IndexQuery>>,
    add_calls: Mutex<usize>,
    /// Fail the add call with this zero-based index.
    fail_add_call: Option<usize>,
}

impl InMemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on_add_call(call: usize) -> Self {
        Self {
            fail_add_call: Some(call),
            ..Self::default()
        }
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn add_calls(&self) -> usize {
        *self.add_calls.lock().await
    }

    pub async fn last_query(&self) -> Option<IndexQuery> {
        self.queries.lock().await.last().cloned()
    }
}

#[async_trait]
impl IndexCollection for InMemoryCollection {
    async fn add(&self, records: Vec<IndexRecord>) -> Result<(), UltragError> {
        let mut calls = self.add_calls.lock().await;
        let call = *calls;
        *calls += 1;
        if self.fail_add_call == Some(call) {
            return Err(UltragError::BackendQuery("injected add failure".to_string()));
        }
        self.records.lock().await.extend(records);
        Ok(())
    }

    async fn query(&self, query: IndexQuery) -> Result<QueryResult, UltragError> {
        self.queries.lock().await.push(query.clone());
        let records = self.records.lock().await;

        let mut hits: Vec<(f32, &IndexRecord)> = records
            .iter()
            .filter(|r| {
                query
                    .where_clause
                    .as_ref()
                    .is_none_or(|w| matches_where(w, &r.metadata))
            })
            .map(|r| (cosine_distance(&query.embedding, &r.embedding), r))
            .collect();
        hits.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(query.n_results);

        let with = |field: Include| query.include.contains(&field);
        Ok(QueryResult {
            ids: hits.iter().map(|(_, r)| r.id.clone()).collect(),
            documents: hits
                .iter()
                .map(|(_, r)| with(Include::Documents).then(|| r.document.clone()))
                .collect(),
            metadatas: hits
                .iter()
                .map(|(_, r)| with(Include::Metadatas).then(|| r.metadata.clone()))
                .collect(),
            embeddings: with(Include::Embeddings)
                .then(|| hits.iter().map(|(_, r)| r.embedding.clone()).collect()),
            distances: hits.iter().map(|(d, _)| *d).collect(),
        })
    }
}

fn matches_where(clause: &Value, metadata: &Map<String, Value>) -> bool {
    let Some(object) = clause.as_object() else {
        return false;
    };
    object.iter().all(|(key, operand)| match key.as_str() {
        "$and" => operand
            .as_array()
            .is_some_and(|cs| cs.iter().all(|c| matches_where(c, metadata))),
        "$or" => operand
            .as_array()
            .is_some_and(|cs| cs.iter().any(|c| matches_where(c, metadata))),
        field => metadata.get(field) == operand.get("$eq"),
    })
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}
