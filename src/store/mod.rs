//! Vector store abstraction.
//!
//! The engine consumes a narrow contract — `upsert`, `query`,
//! `delete_namespace` — with metadata pre-filtering. [`RestVectorStore`]
//! speaks it over HTTP; [`InMemoryStore`] implements the same semantics
//! in-process for tests and local runs.

mod filter;
mod memory;
mod rest;

pub use filter::{Filter, FilterOp};
pub use memory::InMemoryStore;
pub use rest::RestVectorStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::StoreError;
use crate::types::Chunk;

/// Payload keys indexed by the store for server-side pre-filtering.
pub const INDEXED_KEYS: [&str; 4] = ["category", "language", "depth", "size_category"];

/// A record as stored: key, embedding, and a JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Content-derived chunk id.
    pub id: String,
    /// Unit-norm embedding.
    pub vector: Vec<f32>,
    /// Metadata payload: indexed pre-filter keys, unindexed attributes,
    /// and display fields.
    pub payload: serde_json::Map<String, Value>,
}

impl VectorRecord {
    /// Builds the stored record for a chunk.
    ///
    /// The payload carries the pre-filter attributes under the
    /// [`INDEXED_KEYS`], the post-filter attributes (flags, complexity,
    /// word count), and the display fields used for citations.
    #[must_use]
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        let payload = json!({
            "category": chunk.category.as_str(),
            "language": chunk.language.as_str(),
            "depth": chunk.depth,
            "size_category": chunk.size_category.as_str(),
            "has_class_def": chunk.has_class_def,
            "has_fn_def": chunk.has_fn_def,
            "has_imports": chunk.has_imports,
            "has_tests": chunk.has_tests,
            "complexity": chunk.complexity,
            "word_count": chunk.word_count,
            "text": chunk.text,
            "path": chunk.path,
            "start_line": chunk.start_line,
            "end_line": chunk.end_line,
        });
        let Value::Object(payload) = payload else {
            unreachable!("json! object literal")
        };
        Self {
            id: chunk.id.clone(),
            vector,
            payload,
        }
    }
}

/// A ranked match returned by [`VectorStore::query`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMatch {
    /// Chunk id.
    pub id: String,
    /// Similarity score (cosine, higher is better).
    pub score: f32,
    /// Stored payload.
    pub payload: serde_json::Map<String, Value>,
}

/// The vector store contract the engine consumes.
///
/// Upserts are idempotent on `id`: re-sending an unchanged batch leaves
/// the store in the same state. Concurrent upserts to distinct keys are
/// independent.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Inserts or replaces records under a namespace. Returns the number
    /// of records acknowledged.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on transport failure or payload rejection.
    async fn upsert(
        &self,
        namespace: &str,
        records: Vec<VectorRecord>,
    ) -> Result<usize, StoreError>;

    /// Runs an approximate-nearest-neighbor search with optional
    /// server-side metadata pre-filtering.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on transport failure.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<QueryMatch>, StoreError>;

    /// Deletes every record in a namespace.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on transport failure.
    async fn delete_namespace(&self, namespace: &str) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, Language, SizeCategory};

    fn sample_chunk() -> Chunk {
        Chunk {
            id: "abc123".to_string(),
            repo_id: "repo".to_string(),
            text: "def main(): pass".to_string(),
            path: "src/main.py".to_string(),
            start_line: 1,
            end_line: 1,
            category: Category::Code,
            language: Language::Python,
            depth: 1,
            size_category: SizeCategory::Small,
            has_class_def: false,
            has_fn_def: true,
            has_imports: false,
            has_tests: false,
            complexity: 1,
            word_count: 3,
        }
    }

    #[test]
    fn test_record_payload_has_indexed_keys() {
        let record = VectorRecord::from_chunk(&sample_chunk(), vec![0.0; 4]);
        for key in INDEXED_KEYS {
            assert!(record.payload.contains_key(key), "missing {key}");
        }
        assert_eq!(record.payload["language"], "python");
        assert_eq!(record.payload["has_fn_def"], true);
        assert_eq!(record.payload["path"], "src/main.py");
    }

    #[test]
    fn test_record_id_matches_chunk() {
        let chunk = sample_chunk();
        let record = VectorRecord::from_chunk(&chunk, vec![1.0]);
        assert_eq!(record.id, chunk.id);
    }
}
