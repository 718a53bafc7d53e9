//! Lexical retrieval: per-namespace BM25 over an in-memory inverted index.
//!
//! The [`SparseRegistry`] keeps one corpus per active namespace, fed by
//! the indexer during ingestion. The inverted index itself is built
//! lazily on first search and rebuilt under a write lock when the chunk
//! count drifts materially (>5%) or on explicit invalidation. Reads take
//! a shared lock.
//!
//! Each document carries the chunk's store payload, so sparse-only
//! candidates still have the metadata the post-filter and citation
//! stages need, and the registry doubles as the query planner's
//! selectivity oracle.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;
use unicode_segmentation::UnicodeSegmentation;

use crate::store::Filter;

/// BM25 term-frequency saturation parameter.
const BM25_K1: f64 = 1.2;
/// BM25 length-normalization parameter.
const BM25_B: f64 = 0.75;
/// Fractional corpus drift that triggers an index rebuild.
const REBUILD_DRIFT: f64 = 0.05;

/// One document in the sparse corpus: a chunk's id, its tokens, and its
/// store payload.
#[derive(Debug, Clone)]
pub struct SparseDoc {
    /// Chunk id (matches the vector store key).
    pub id: String,
    /// Lowercased word tokens of the chunk text.
    pub tokens: Vec<String>,
    /// Store payload mirrored at ingest time.
    pub payload: serde_json::Map<String, Value>,
}

/// Splits text into lowercase word tokens.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words().map(str::to_lowercase).collect()
}

/// Immutable BM25 index over one namespace's corpus.
#[derive(Debug, Default)]
struct Bm25Index {
    /// token → postings of (doc index, term frequency).
    postings: HashMap<String, Vec<(usize, u32)>>,
    /// Document lengths in tokens.
    doc_lens: Vec<usize>,
    avg_doc_len: f64,
}

impl Bm25Index {
    fn build(docs: &[SparseDoc]) -> Self {
        let mut postings: HashMap<String, Vec<(usize, u32)>> = HashMap::new();
        let mut doc_lens = Vec::with_capacity(docs.len());

        for (idx, doc) in docs.iter().enumerate() {
            doc_lens.push(doc.tokens.len());
            let mut tf: HashMap<&str, u32> = HashMap::new();
            for token in &doc.tokens {
                *tf.entry(token.as_str()).or_insert(0) += 1;
            }
            for (token, count) in tf {
                postings
                    .entry(token.to_string())
                    .or_default()
                    .push((idx, count));
            }
        }

        let total: usize = doc_lens.iter().sum();
        let avg_doc_len = if doc_lens.is_empty() {
            0.0
        } else {
            total as f64 / doc_lens.len() as f64
        };

        Self {
            postings,
            doc_lens,
            avg_doc_len,
        }
    }

    fn search(
        &self,
        query_tokens: &[String],
        top_k: usize,
        allowed: Option<&[bool]>,
    ) -> Vec<(usize, f64)> {
        let n = self.doc_lens.len();
        if n == 0 || query_tokens.is_empty() {
            return Vec::new();
        }

        let mut scores: HashMap<usize, f64> = HashMap::new();
        for token in query_tokens {
            let Some(posting) = self.postings.get(token) else {
                continue;
            };
            let df = posting.len() as f64;
            let idf = ((n as f64 - df + 0.5) / (df + 0.5) + 1.0).ln();
            for &(doc_idx, tf) in posting {
                if allowed.is_some_and(|mask| !mask.get(doc_idx).copied().unwrap_or(false)) {
                    continue;
                }
                let tf = f64::from(tf);
                let len_norm = 1.0 - BM25_B
                    + BM25_B * self.doc_lens[doc_idx] as f64 / self.avg_doc_len.max(1.0);
                let term = idf * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * len_norm);
                *scores.entry(doc_idx).or_insert(0.0) += term;
            }
        }

        let mut ranked: Vec<(usize, f64)> = scores.into_iter().filter(|(_, s)| *s > 0.0).collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(top_k);
        ranked
    }
}

/// Per-namespace corpus plus its lazily built index.
#[derive(Debug, Default)]
struct NamespaceEntry {
    /// Corpus keyed by chunk id (idempotent on re-ingest).
    docs: HashMap<String, SparseDoc>,
    /// Built index and the materialized doc order it was built from.
    index: Option<(Bm25Index, Vec<SparseDoc>)>,
    /// Corpus size when the index was last built.
    built_count: usize,
}

impl NamespaceEntry {
    fn needs_rebuild(&self) -> bool {
        if self.index.is_none() {
            return true;
        }
        let current = self.docs.len();
        if current == self.built_count {
            return false;
        }
        let base = self.built_count.max(1) as f64;
        let drift = (current as f64 - self.built_count as f64).abs() / base;
        drift > REBUILD_DRIFT
    }

    fn rebuild(&mut self) {
        let mut docs: Vec<SparseDoc> = self.docs.values().cloned().collect();
        // Deterministic order so scores and tie-breaks are reproducible.
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        let index = Bm25Index::build(&docs);
        self.built_count = self.docs.len();
        self.index = Some((index, docs));
    }
}

/// A ranked lexical match.
#[derive(Debug, Clone)]
pub struct SparseMatch {
    /// Chunk id.
    pub id: String,
    /// BM25 score (unbounded, higher is better).
    pub score: f64,
    /// Store payload of the matched chunk.
    pub payload: serde_json::Map<String, Value>,
}

/// Process-wide registry of per-namespace sparse indexes.
#[derive(Debug, Default)]
pub struct SparseRegistry {
    namespaces: RwLock<HashMap<String, NamespaceEntry>>,
}

impl SparseRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces documents in a namespace's corpus.
    ///
    /// Called by the indexer as chunks are acknowledged. Idempotent on
    /// id; the index is rebuilt lazily on the next search that observes
    /// material drift.
    pub fn insert(&self, namespace: &str, docs: Vec<SparseDoc>) {
        let Ok(mut guard) = self.namespaces.write() else {
            return;
        };
        let entry = guard.entry(namespace.to_string()).or_default();
        for doc in docs {
            entry.docs.insert(doc.id.clone(), doc);
        }
    }

    /// Drops a namespace's corpus and index.
    pub fn remove(&self, namespace: &str) {
        if let Ok(mut guard) = self.namespaces.write() {
            guard.remove(namespace);
        }
    }

    /// Forces the next search to rebuild the namespace's index.
    pub fn invalidate(&self, namespace: &str) {
        if let Ok(mut guard) = self.namespaces.write()
            && let Some(entry) = guard.get_mut(namespace)
        {
            entry.index = None;
        }
    }

    /// Number of documents in a namespace's corpus.
    #[must_use]
    pub fn doc_count(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .map(|g| g.get(namespace).map_or(0, |e| e.docs.len()))
            .unwrap_or(0)
    }

    /// BM25 search over a namespace. Builds the index on first use.
    ///
    /// When a filter is supplied, only documents matching it score —
    /// the same pre-filter the dense leg runs server-side.
    #[must_use]
    pub fn search(
        &self,
        namespace: &str,
        query: &str,
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Vec<SparseMatch> {
        let query_tokens = tokenize(query);
        let run = |index: &Bm25Index, docs: &[SparseDoc]| {
            let mask: Option<Vec<bool>> = filter
                .filter(|f| !f.is_empty())
                .map(|f| docs.iter().map(|d| f.matches(&d.payload)).collect());
            Self::materialize(index.search(&query_tokens, top_k, mask.as_deref()), docs)
        };

        // Fast path: shared lock when the index is current.
        if let Ok(guard) = self.namespaces.read()
            && let Some(entry) = guard.get(namespace)
            && !entry.needs_rebuild()
            && let Some((index, docs)) = &entry.index
        {
            return run(index, docs);
        }

        // Slow path: rebuild under the write lock, then search.
        let Ok(mut guard) = self.namespaces.write() else {
            return Vec::new();
        };
        let Some(entry) = guard.get_mut(namespace) else {
            return Vec::new();
        };
        if entry.needs_rebuild() {
            tracing::debug!(namespace, docs = entry.docs.len(), "rebuilding sparse index");
            entry.rebuild();
        }
        entry
            .index
            .as_ref()
            .map(|(index, docs)| run(index, docs))
            .unwrap_or_default()
    }

    fn materialize(ranked: Vec<(usize, f64)>, docs: &[SparseDoc]) -> Vec<SparseMatch> {
        ranked
            .into_iter()
            .filter_map(|(idx, score)| {
                docs.get(idx).map(|doc| SparseMatch {
                    id: doc.id.clone(),
                    score,
                    payload: doc.payload.clone(),
                })
            })
            .collect()
    }

    /// Estimates the fraction of the namespace's corpus matching a
    /// pre-filter, from the per-document payload histogram.
    ///
    /// Returns `None` when the corpus is empty (no basis to estimate).
    #[must_use]
    pub fn selectivity(&self, namespace: &str, filter: &Filter) -> Option<f64> {
        let guard = self.namespaces.read().ok()?;
        let entry = guard.get(namespace)?;
        let total = entry.docs.len();
        if total == 0 {
            return None;
        }
        let matching = entry
            .docs
            .values()
            .filter(|doc| filter.matches(&doc.payload))
            .count();
        Some(matching as f64 / total as f64)
    }
}
