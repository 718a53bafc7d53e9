//! Durable chunk indexing with bounded fan-out.
//!
//! Chunks flow through in micro-batches: a fixed-size pool embeds and
//! upserts each batch, gated by a token semaphore so at most a configured
//! number of upserts are in flight. Per-chunk permanent failures are
//! skipped and counted; a run of consecutive failures aborts the ingest.
//! Progress is reported fractionally after every completed batch.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::embed::Embedder;
use crate::error::{EmbedError, Error, IndexError, StoreError};
use crate::sparse::{SparseDoc, SparseRegistry, tokenize};
use crate::store::{VectorRecord, VectorStore};
use crate::types::Chunk;

/// Outcome of one indexing run.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexOutcome {
    /// Chunks acknowledged by the vector store.
    pub indexed: usize,
    /// Chunks skipped due to permanent per-chunk failures.
    pub skipped: usize,
}

/// Result of one micro-batch, collected as tasks complete.
struct BatchResult {
    indexed: usize,
    skipped: usize,
    /// Fatal error that aborts the whole run.
    fatal: Option<IndexError>,
}

/// Embeds and upserts chunks into the vector store for one namespace.
pub struct Indexer {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    sparse: Arc<SparseRegistry>,
    config: Arc<EngineConfig>,
}

impl Indexer {
    /// Creates an indexer over the shared pipeline services.
    #[must_use]
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        sparse: Arc<SparseRegistry>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            embedder,
            sparse,
            config,
        }
    }

    /// Indexes `chunks` under `namespace`.
    ///
    /// `progress` receives `(fraction, stage)` after each micro-batch;
    /// fractions are monotone non-decreasing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] when the token fires,
    /// [`Error::Index`] on exhausted transient retries or too many
    /// consecutive per-chunk failures.
    pub async fn run(
        &self,
        namespace: &str,
        chunks: Vec<Chunk>,
        progress: &(dyn Fn(f64, String) + Send + Sync),
        cancel: &CancellationToken,
    ) -> Result<IndexOutcome, Error> {
        let total = chunks.len();
        if total == 0 {
            progress(1.0, "No chunks to index".to_string());
            return Ok(IndexOutcome::default());
        }

        let batch_size = self.config.effective_micro_batch();
        let semaphore = Arc::new(Semaphore::new(self.config.max_inflight));
        let processed = Arc::new(AtomicUsize::new(0));
        let mut tasks: JoinSet<BatchResult> = JoinSet::new();

        tracing::info!(namespace, total, batch_size, "indexing chunks");

        let batches: Vec<Vec<Chunk>> = chunks
            .chunks(batch_size)
            .map(<[Chunk]>::to_vec)
            .collect();

        let mut outcome = IndexOutcome::default();
        let mut consecutive_failures = 0usize;

        let mut pending = batches.into_iter();
        loop {
            if cancel.is_cancelled() {
                tasks.abort_all();
                return Err(Error::Cancelled);
            }

            // Keep the pool full without spawning every batch up front:
            // backpressure comes from the semaphore inside each task.
            while tasks.len() < self.config.max_inflight.max(1) {
                let Some(batch) = pending.next() else { break };
                let permit_source = Arc::clone(&semaphore);
                let store = Arc::clone(&self.store);
                let embedder = Arc::clone(&self.embedder);
                let sparse = Arc::clone(&self.sparse);
                let config = Arc::clone(&self.config);
                let namespace = namespace.to_string();

                tasks.spawn(async move {
                    let Ok(_permit) = permit_source.acquire().await else {
                        return BatchResult {
                            indexed: 0,
                            skipped: batch.len(),
                            fatal: None,
                        };
                    };
                    index_batch(&*store, &*embedder, &*sparse, &*config, &namespace, batch).await
                });

                // Memory-release hint between micro-batch submissions.
                tokio::task::yield_now().await;
            }

            if tasks.is_empty() {
                break;
            }

            let result = tokio::select! {
                () = cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(Error::Cancelled);
                }
                joined = tasks.join_next() => joined,
            };

            let Some(joined) = result else { break };
            let batch_result = joined.unwrap_or(BatchResult {
                indexed: 0,
                skipped: 0,
                fatal: Some(IndexError::Store(StoreError::Permanent {
                    message: "indexing task panicked".to_string(),
                })),
            });

            if let Some(fatal) = batch_result.fatal {
                tasks.abort_all();
                return Err(Error::Index(fatal));
            }

            outcome.indexed += batch_result.indexed;
            outcome.skipped += batch_result.skipped;

            if batch_result.indexed == 0 && batch_result.skipped > 0 {
                consecutive_failures += batch_result.skipped;
            } else if batch_result.indexed > 0 {
                consecutive_failures = 0;
            }
            if consecutive_failures >= self.config.max_consecutive_failures {
                tasks.abort_all();
                return Err(Error::Index(IndexError::TooManyFailures {
                    count: consecutive_failures,
                    last: "consecutive per-chunk skips exceeded the abort threshold".to_string(),
                }));
            }

            let done = processed.fetch_add(
                batch_result.indexed + batch_result.skipped,
                Ordering::SeqCst,
            ) + batch_result.indexed
                + batch_result.skipped;
            progress(
                done as f64 / total as f64,
                format!("Indexing chunks ({done}/{total})"),
            );
        }

        tracing::info!(
            namespace,
            indexed = outcome.indexed,
            skipped = outcome.skipped,
            "indexing complete"
        );
        Ok(outcome)
    }
}

/// Embeds and upserts one micro-batch, classifying failures.
///
/// Permanent per-chunk failures (NaN vectors, payload rejection) skip the
/// affected chunks; exhausted transient retries are fatal for the run.
async fn index_batch(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    sparse: &SparseRegistry,
    config: &EngineConfig,
    namespace: &str,
    batch: Vec<Chunk>,
) -> BatchResult {
    let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

    let vectors = match embedder.embed(&texts).await {
        Ok(vectors) => vectors,
        Err(e @ (EmbedError::Transient { .. } | EmbedError::Config(_))) => {
            return BatchResult {
                indexed: 0,
                skipped: 0,
                fatal: Some(IndexError::Embed(e)),
            };
        }
        Err(e) => {
            // Permanent embed failure: skip the whole batch and move on.
            tracing::warn!(namespace, error = %e, skipped = batch.len(), "skipping batch");
            return BatchResult {
                indexed: 0,
                skipped: batch.len(),
                fatal: None,
            };
        }
    };

    // Drop chunks whose embedding came back non-finite.
    let mut records = Vec::with_capacity(batch.len());
    let mut docs = Vec::with_capacity(batch.len());
    let mut skipped = 0usize;
    for (chunk, vector) in batch.iter().zip(vectors) {
        if vector.iter().any(|v| !v.is_finite()) {
            tracing::warn!(namespace, chunk_id = %chunk.id, "embedding produced non-finite values");
            skipped += 1;
            continue;
        }
        let record = VectorRecord::from_chunk(chunk, vector);
        docs.push(SparseDoc {
            id: chunk.id.clone(),
            tokens: tokenize(&chunk.text),
            payload: record.payload.clone(),
        });
        records.push(record);
    }

    if records.is_empty() {
        return BatchResult {
            indexed: 0,
            skipped,
            fatal: None,
        };
    }

    let record_count = records.len();
    let upsert = tokio::time::timeout(config.upsert_timeout, store.upsert(namespace, records)).await;

    match upsert {
        Ok(Ok(acked)) => {
            sparse.insert(namespace, docs);
            BatchResult {
                indexed: acked,
                skipped: skipped + record_count.saturating_sub(acked),
                fatal: None,
            }
        }
        Ok(Err(e @ (StoreError::Transient { .. } | StoreError::Config(_)))) => BatchResult {
            indexed: 0,
            skipped,
            fatal: Some(IndexError::Store(e)),
        },
        Ok(Err(e)) => {
            tracing::warn!(namespace, error = %e, skipped = record_count, "store rejected batch");
            BatchResult {
                indexed: 0,
                skipped: skipped + record_count,
                fatal: None,
            }
        }
        Err(_) => BatchResult {
            indexed: 0,
            skipped,
            fatal: Some(IndexError::Store(StoreError::Timeout {
                seconds: config.upsert_timeout.as_secs(),
            })),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::embed::HashEmbedder;
    use crate::store::InMemoryStore;
    use crate::types::{Category, Language, SizeCategory};

    fn chunk(id: usize) -> Chunk {
        let text = format!("def function_{id}(): return {id}");
        Chunk {
            id: Chunk::derive_id("repo", "main.py", id, id, &text),
            repo_id: "repo".to_string(),
            text,
            path: "main.py".to_string(),
            start_line: id,
            end_line: id,
            category: Category::Code,
            language: Language::Python,
            depth: 0,
            size_category: SizeCategory::Small,
            has_class_def: false,
            has_fn_def: true,
            has_imports: false,
            has_tests: false,
            complexity: 1,
            word_count: 3,
        }
    }

    fn indexer(store: Arc<InMemoryStore>, sparse: Arc<SparseRegistry>) -> Indexer {
        Indexer::new(
            store,
            Arc::new(HashEmbedder::new(64)),
            sparse,
            Arc::new(crate::config::EngineConfig::builder().micro_batch(4).build()),
        )
    }

    #[tokio::test]
    async fn test_indexes_all_chunks() {
        let store = Arc::new(InMemoryStore::new());
        let sparse = Arc::new(SparseRegistry::new());
        let idx = indexer(Arc::clone(&store), Arc::clone(&sparse));

        let chunks: Vec<Chunk> = (1..=20).map(chunk).collect();
        let outcome = idx
            .run("ns", chunks, &|_, _| {}, &CancellationToken::new())
            .await
            .unwrap_or_default();

        assert_eq!(outcome.indexed, 20);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(store.count("ns"), 20);
        assert_eq!(sparse.doc_count("ns"), 20);
    }

    #[tokio::test]
    async fn test_reindex_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let sparse = Arc::new(SparseRegistry::new());
        let idx = indexer(Arc::clone(&store), Arc::clone(&sparse));

        let chunks: Vec<Chunk> = (1..=10).map(chunk).collect();
        idx.run("ns", chunks.clone(), &|_, _| {}, &CancellationToken::new())
            .await
            .unwrap_or_default();
        let first_ids = {
            let mut ids = store.ids("ns");
            ids.sort();
            ids
        };

        idx.run("ns", chunks, &|_, _| {}, &CancellationToken::new())
            .await
            .unwrap_or_default();
        let second_ids = {
            let mut ids = store.ids("ns");
            ids.sort();
            ids
        };

        assert_eq!(first_ids, second_ids);
        assert_eq!(store.count("ns"), 10);
    }

    #[tokio::test]
    async fn test_progress_is_monotone() {
        let store = Arc::new(InMemoryStore::new());
        let sparse = Arc::new(SparseRegistry::new());
        let idx = indexer(store, sparse);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let chunks: Vec<Chunk> = (1..=17).map(chunk).collect();
        idx.run(
            "ns",
            chunks,
            &move |fraction, _| {
                if let Ok(mut guard) = sink.lock() {
                    guard.push(fraction);
                }
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap_or_default();

        let fractions = seen.lock().map(|g| g.clone()).unwrap_or_default();
        assert!(!fractions.is_empty());
        for pair in fractions.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert!((fractions.last().copied().unwrap_or(0.0) - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cancellation_aborts() {
        let store = Arc::new(InMemoryStore::new());
        let sparse = Arc::new(SparseRegistry::new());
        let idx = indexer(store, sparse);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let chunks: Vec<Chunk> = (1..=50).map(chunk).collect();
        let result = idx.run("ns", chunks, &|_, _| {}, &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_empty_input_is_noop() {
        let store = Arc::new(InMemoryStore::new());
        let sparse = Arc::new(SparseRegistry::new());
        let idx = indexer(Arc::clone(&store), sparse);

        let outcome = idx
            .run("ns", Vec::new(), &|_, _| {}, &CancellationToken::new())
            .await
            .unwrap_or_default();
        assert_eq!(outcome.indexed, 0);
        assert_eq!(store.count("ns"), 0);
    }
}
