//! In-process vector store with brute-force cosine search.
//!
//! Mirrors the external store's semantics — idempotent upserts keyed by
//! id, metadata pre-filtering, per-namespace isolation — so pipeline and
//! property tests run without a network. Fine for local corpora (linear
//! scan per query).

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{Filter, QueryMatch, VectorRecord, VectorStore};
use crate::error::StoreError;

/// In-memory [`VectorStore`] implementation.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    namespaces: RwLock<HashMap<String, HashMap<String, VectorRecord>>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a namespace.
    #[must_use]
    pub fn count(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .map(|ns| ns.get(namespace).map_or(0, HashMap::len))
            .unwrap_or(0)
    }

    /// Returns all record ids in a namespace, unordered.
    #[must_use]
    pub fn ids(&self, namespace: &str) -> Vec<String> {
        self.namespaces
            .read()
            .map(|ns| {
                ns.get(namespace)
                    .map(|records| records.keys().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn lock_poisoned() -> StoreError {
        StoreError::Permanent {
            message: "store lock poisoned".to_string(),
        }
    }
}

/// Cosine similarity between two equal-length vectors.
///
/// Inputs are unit-norm by the embedder contract, so this is the dot
/// product; the norms are still folded in to stay correct for raw input.
fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom <= f32::EPSILON { 0.0 } else { dot / denom }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn upsert(
        &self,
        namespace: &str,
        records: Vec<VectorRecord>,
    ) -> Result<usize, StoreError> {
        for record in &records {
            if record.vector.iter().any(|v| !v.is_finite()) {
                return Err(StoreError::Permanent {
                    message: format!("record {} contains non-finite values", record.id),
                });
            }
        }

        let mut guard = self.namespaces.write().map_err(|_| Self::lock_poisoned())?;
        let ns = guard.entry(namespace.to_string()).or_default();
        let count = records.len();
        for record in records {
            ns.insert(record.id.clone(), record);
        }
        Ok(count)
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<QueryMatch>, StoreError> {
        let guard = self.namespaces.read().map_err(|_| Self::lock_poisoned())?;
        let Some(ns) = guard.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<QueryMatch> = ns
            .values()
            .filter(|record| filter.is_none_or(|f| f.matches(&record.payload)))
            .map(|record| QueryMatch {
                id: record.id.clone(),
                score: cosine(vector, &record.vector),
                payload: record.payload.clone(),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), StoreError> {
        let mut guard = self.namespaces.write().map_err(|_| Self::lock_poisoned())?;
        guard.remove(namespace);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, vector: Vec<f32>, category: &str, depth: u32) -> VectorRecord {
        let serde_json::Value::Object(payload) = json!({
            "category": category,
            "depth": depth,
        }) else {
            unreachable!()
        };
        VectorRecord {
            id: id.to_string(),
            vector,
            payload,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = InMemoryStore::new();
        let batch = vec![record("a", vec![1.0, 0.0], "code", 0)];
        store.upsert("ns", batch.clone()).await.unwrap_or_default();
        store.upsert("ns", batch).await.unwrap_or_default();
        assert_eq!(store.count("ns"), 1);
    }

    #[tokio::test]
    async fn test_query_ranks_by_cosine() {
        let store = InMemoryStore::new();
        store
            .upsert(
                "ns",
                vec![
                    record("near", vec![1.0, 0.0], "code", 0),
                    record("far", vec![0.0, 1.0], "code", 0),
                    record("mid", vec![0.7, 0.7], "code", 0),
                ],
            )
            .await
            .unwrap_or_default();

        let matches = store
            .query("ns", &[1.0, 0.0], 3, None)
            .await
            .unwrap_or_default();
        let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);
    }

    #[tokio::test]
    async fn test_query_applies_prefilter() {
        let store = InMemoryStore::new();
        store
            .upsert(
                "ns",
                vec![
                    record("a", vec![1.0, 0.0], "code", 0),
                    record("b", vec![1.0, 0.0], "docs", 3),
                ],
            )
            .await
            .unwrap_or_default();

        let filter = Filter::new().eq("category", "code");
        let matches = store
            .query("ns", &[1.0, 0.0], 10, Some(&filter))
            .await
            .unwrap_or_default();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "a");
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = InMemoryStore::new();
        store
            .upsert("one", vec![record("a", vec![1.0], "code", 0)])
            .await
            .unwrap_or_default();

        let matches = store.query("two", &[1.0], 10, None).await.unwrap_or_default();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_delete_namespace() {
        let store = InMemoryStore::new();
        store
            .upsert("ns", vec![record("a", vec![1.0], "code", 0)])
            .await
            .unwrap_or_default();
        store.delete_namespace("ns").await.unwrap_or_default();
        assert_eq!(store.count("ns"), 0);
    }

    #[tokio::test]
    async fn test_nan_vector_rejected_as_permanent() {
        let store = InMemoryStore::new();
        let result = store
            .upsert("ns", vec![record("bad", vec![f32::NAN], "code", 0)])
            .await;
        assert!(matches!(result, Err(StoreError::Permanent { .. })));
    }
}
