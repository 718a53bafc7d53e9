//! Process-wide engine wiring.
//!
//! Owns the shared services (vector store, embedder, sparse registry,
//! catalog), the background job controller, and the query engine.
//! External services are constructed lazily behind one-shot cells so a
//! missing secret surfaces as a typed error at first use — the process
//! can boot and serve `/health` without credentials.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::catalog::RepoCatalog;
use crate::config::EngineConfig;
use crate::embed::{Embedder, HashEmbedder, OpenAiEmbedder};
use crate::error::{EmbedError, Error, StoreError};
use crate::ingest::PipelineDeps;
use crate::job::{JobController, JobSnapshot, StartOutcome};
use crate::query::{ChatOutcome, QueryEngine};
use crate::sparse::SparseRegistry;
use crate::store::{Filter, InMemoryStore, QueryMatch, RestVectorStore, VectorRecord, VectorStore};
use crate::types::{RepoDescriptor, repo_id_from_url};

/// Vector store that resolves its credentials on first use.
struct LazyRestStore {
    config: Arc<EngineConfig>,
    inner: OnceCell<RestVectorStore>,
}

impl LazyRestStore {
    async fn store(&self) -> Result<&RestVectorStore, StoreError> {
        self.inner
            .get_or_try_init(|| async move {
                let url = self.config.vector_store_url()?;
                let key = self.config.vector_store_api_key()?;
                let index = self.config.vector_index_name()?;
                RestVectorStore::new(url, index, key, self.config.upsert_timeout)
            })
            .await
    }
}

#[async_trait]
impl VectorStore for LazyRestStore {
    async fn upsert(
        &self,
        namespace: &str,
        records: Vec<VectorRecord>,
    ) -> Result<usize, StoreError> {
        self.store().await?.upsert(namespace, records).await
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<QueryMatch>, StoreError> {
        self.store()
            .await?
            .query(namespace, vector, top_k, filter)
            .await
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), StoreError> {
        self.store().await?.delete_namespace(namespace).await
    }
}

/// Embedder that resolves its credentials on first use.
///
/// The dimension is known from configuration alone, so the pipeline can
/// be wired without touching the secret.
struct LazyOpenAiEmbedder {
    config: Arc<EngineConfig>,
    inner: OnceCell<OpenAiEmbedder>,
}

#[async_trait]
impl Embedder for LazyOpenAiEmbedder {
    fn dimension(&self) -> usize {
        self.config.embed_dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let embedder = self
            .inner
            .get_or_try_init(|| async move {
                let key = self.config.embed_api_key()?;
                Ok::<_, EmbedError>(OpenAiEmbedder::new(
                    key,
                    self.config.embed_base_url(),
                    self.config.embed_model.clone(),
                    self.config.embed_dimension,
                    self.config.embed_timeout,
                ))
            })
            .await?;
        embedder.embed(texts).await
    }
}

/// The assembled retrieval engine.
pub struct Engine {
    config: Arc<EngineConfig>,
    deps: PipelineDeps,
    jobs: Arc<JobController>,
    query: QueryEngine,
}

impl Engine {
    /// Wires the engine against the configured external services.
    ///
    /// Nothing is contacted here; the store and embedder initialize on
    /// first use.
    #[must_use]
    pub fn from_config(config: EngineConfig) -> Self {
        let config = Arc::new(config);
        let store: Arc<dyn VectorStore> = Arc::new(LazyRestStore {
            config: Arc::clone(&config),
            inner: OnceCell::new(),
        });
        let embedder: Arc<dyn Embedder> = Arc::new(LazyOpenAiEmbedder {
            config: Arc::clone(&config),
            inner: OnceCell::new(),
        });
        Self::with_services(config, store, embedder)
    }

    /// Wires the engine against in-process services: brute-force cosine
    /// store and the deterministic hash embedder. No credentials needed.
    #[must_use]
    pub fn local(config: EngineConfig) -> Self {
        let config = Arc::new(config);
        let dimension = config.embed_dimension;
        Self::with_services(
            config,
            Arc::new(InMemoryStore::new()),
            Arc::new(HashEmbedder::new(dimension)),
        )
    }

    /// Wires the engine with explicit service implementations.
    #[must_use]
    pub fn with_services(
        config: Arc<EngineConfig>,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let sparse = Arc::new(SparseRegistry::new());
        let catalog = Arc::new(RepoCatalog::new());
        let deps = PipelineDeps {
            store: Arc::clone(&store),
            embedder: Arc::clone(&embedder),
            sparse: Arc::clone(&sparse),
            catalog: Arc::clone(&catalog),
            config: Arc::clone(&config),
        };
        let jobs = Arc::new(JobController::new(deps.clone()));
        let query = QueryEngine::new(store, embedder, sparse, catalog, Arc::clone(&config));
        Self {
            config,
            deps,
            jobs,
            query,
        }
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared pipeline services (for direct pipeline runs).
    #[must_use]
    pub fn deps(&self) -> &PipelineDeps {
        &self.deps
    }

    /// The query engine.
    #[must_use]
    pub fn query_engine(&self) -> &QueryEngine {
        &self.query
    }

    /// Starts a background ingestion. At most one runs at a time.
    pub fn start_ingest(&self, repo_url: &str) -> StartOutcome {
        let outcome = self.jobs.start(repo_url);
        if outcome == StartOutcome::Accepted {
            // Stale answers for this namespace die with the re-ingest.
            self.query.invalidate(&repo_id_from_url(repo_url));
        }
        outcome
    }

    /// Snapshot of the background job state.
    #[must_use]
    pub fn job_progress(&self) -> JobSnapshot {
        self.jobs.progress()
    }

    /// Requests cancellation of the running ingestion, if any.
    pub fn cancel_ingest(&self) {
        self.jobs.cancel();
    }

    /// Answers a question against an indexed repository.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Answer`] on retrieval or LLM failure.
    pub async fn chat(
        &self,
        query: &str,
        repo_id: Option<&str>,
        model_override: Option<&str>,
    ) -> Result<ChatOutcome, Error> {
        Ok(self.query.chat(query, repo_id, model_override).await?)
    }

    /// Lists indexed repository descriptors.
    #[must_use]
    pub fn list_repos(&self) -> Vec<RepoDescriptor> {
        self.deps.catalog.list()
    }

    /// Deletes a repository: its namespace in the store, its sparse
    /// corpus, its cached answers, and its descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] when the namespace deletion fails; local
    /// state is only dropped after the store acknowledges.
    pub async fn delete_repo(&self, repo_url_or_id: &str) -> Result<(), Error> {
        let id = repo_id_from_url(repo_url_or_id);
        self.deps.store.delete_namespace(&id).await?;
        self.deps.sparse.remove(&id);
        self.query.invalidate(&id);
        self.deps.catalog.remove(&id);
        tracing::info!(repo_id = %id, "repository deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_engine_boots_without_secrets() {
        let engine = Engine::local(EngineConfig::builder().build());
        assert!(engine.list_repos().is_empty());
        assert!(!engine.job_progress().in_progress);
    }

    #[tokio::test]
    async fn test_lazy_store_fails_without_secrets() {
        let engine = Engine::from_config(EngineConfig::builder().build());
        let result = engine.deps().store.query("ns", &[0.0], 1, None).await;
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[tokio::test]
    async fn test_lazy_embedder_reports_dimension_without_secrets() {
        let engine = Engine::from_config(EngineConfig::builder().embed_dimension(384).build());
        assert_eq!(engine.deps().embedder.dimension(), 384);
        let result = engine.deps().embedder.embed(&["x".to_string()]).await;
        assert!(matches!(result, Err(EmbedError::Config(_))));
    }

    #[tokio::test]
    async fn test_delete_repo_clears_state() {
        let engine = Engine::local(EngineConfig::builder().build());
        engine.deps().catalog.upsert(RepoDescriptor {
            id: "example-org-repo".to_string(),
            url: "https://example.org/repo".to_string(),
            revision: None,
            namespace: "example-org-repo".to_string(),
            file_count: 1,
            chunk_count: 1,
            indexed_at: 1,
        });

        engine
            .delete_repo("https://example.org/repo")
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(engine.list_repos().is_empty());
    }
}
