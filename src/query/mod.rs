//! Query pipeline: planning, hybrid retrieval, and answer assembly.
//!
//! The [`QueryEngine`] runs the full staged flow for one question:
//! plan → dense + sparse retrieval → reciprocal rank fusion →
//! post-filter (with recall fallback) → intent rerank → context
//! assembly → one non-streaming LLM call → confidence and citations.
//! Queries run concurrently with each other and with ingestion; the only
//! shared mutable state is the sparse registry behind its own lock.

mod context;
mod fusion;
mod intent;
mod planner;

pub use context::{Citation, Confidence, ConfidenceLevel};
pub use fusion::{Candidate, RRF_K, fuse, post_filter, rerank};
pub use intent::Intent;
pub use planner::{FusionWeights, QueryPlan, plan};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::cache::AnswerCache;
use crate::catalog::RepoCatalog;
use crate::config::EngineConfig;
use crate::embed::Embedder;
use crate::error::{AnswerError, FilterError};
use crate::llm::{self, ChatRequest, LlmProvider, system_message, user_message};
use crate::sparse::SparseRegistry;
use crate::store::VectorStore;

/// The canonical answer when retrieval produces nothing.
pub const NO_INFORMATION_ANSWER: &str = "No relevant information found.";

/// System prompt fixing the answer style.
const ANSWER_SYSTEM_PROMPT: &str = "\
You are a code-repository assistant. Answer strictly from the numbered \
source blocks provided in the user message. Cite sources inline as [S1], \
[S2], etc. If the sources do not contain the answer, say so plainly. \
Never invent file paths, line numbers, or behavior not shown in the \
sources.";

/// A grounded answer with its citations and confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOutcome {
    /// The generated (or canonical fallback) answer.
    pub answer: String,
    /// Sources present in the LLM context, best first.
    pub sources: Vec<Citation>,
    /// Bucketed aggregate of the top fused scores.
    pub confidence: Confidence,
    /// Classified query intent.
    pub intent: Intent,
}

impl ChatOutcome {
    fn no_information(intent: Intent) -> Self {
        Self {
            answer: NO_INFORMATION_ANSWER.to_string(),
            sources: Vec::new(),
            confidence: Confidence::none(),
            intent,
        }
    }
}

/// Executes queries against one or more ingested namespaces.
pub struct QueryEngine {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    sparse: Arc<SparseRegistry>,
    catalog: Arc<RepoCatalog>,
    config: Arc<EngineConfig>,
    llm: OnceCell<Arc<dyn LlmProvider>>,
    cache: AnswerCache<ChatOutcome>,
}

impl QueryEngine {
    /// Creates the engine over the shared services.
    ///
    /// The LLM provider is created lazily at the first answer — a
    /// missing key is a typed error on first use, not a boot failure.
    #[must_use]
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        sparse: Arc<SparseRegistry>,
        catalog: Arc<RepoCatalog>,
        config: Arc<EngineConfig>,
    ) -> Self {
        let cache = AnswerCache::new(config.answer_cache_ttl);
        Self {
            store,
            embedder,
            sparse,
            catalog,
            config,
            llm: OnceCell::new(),
            cache,
        }
    }

    /// Creates the engine with an explicit LLM provider (tests, CLI
    /// dry runs).
    #[must_use]
    pub fn with_provider(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        sparse: Arc<SparseRegistry>,
        catalog: Arc<RepoCatalog>,
        config: Arc<EngineConfig>,
        provider: Arc<dyn LlmProvider>,
    ) -> Self {
        let engine = Self::new(store, embedder, sparse, catalog, config);
        let _ = engine.llm.set(provider);
        engine
    }

    /// Answers a question against `repo_id`, or the most recently
    /// indexed repository when unset.
    ///
    /// # Errors
    ///
    /// Returns [`AnswerError`] on embedding, retrieval, or LLM failure.
    /// An empty retrieval result is *not* an error — it yields the
    /// canonical no-information answer.
    pub async fn chat(
        &self,
        query: &str,
        repo_id: Option<&str>,
        model_override: Option<&str>,
    ) -> Result<ChatOutcome, AnswerError> {
        let intent = Intent::classify(query);

        let Some(namespace) = repo_id
            .map(str::to_string)
            .or_else(|| self.catalog.latest().map(|d| d.namespace))
        else {
            tracing::debug!(query, "no indexed repository to query");
            return Ok(ChatOutcome::no_information(intent));
        };

        if let Some(cached) = self.cache.get(&namespace, query) {
            tracing::debug!(namespace, "answer cache hit");
            return Ok(cached);
        }

        let plan = plan(query, &namespace, &self.sparse);

        // Dense retrieval: embed the query once, pre-filter server-side.
        let query_vector = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let mut dense = match self
            .store
            .query(
                &namespace,
                &query_vector,
                self.config.top_k_dense,
                plan.pre_filter.as_ref(),
            )
            .await
        {
            Ok(matches) => matches,
            Err(e) if plan.pre_filter.is_some() => {
                // A store that rejects the filter plan disables filters
                // and continues rather than failing the query.
                let filter_error = FilterError {
                    message: e.to_string(),
                };
                tracing::warn!(namespace, %filter_error, "retrying dense query unfiltered");
                self.store
                    .query(&namespace, &query_vector, self.config.top_k_dense, None)
                    .await?
            }
            Err(e) => return Err(e.into()),
        };
        dense.retain(|m| m.score >= self.config.min_dense_score);

        // Sparse retrieval over the same namespace, under the same
        // pre-filter the dense leg ran server-side.
        let sparse = self.sparse.search(
            &namespace,
            query,
            self.config.top_k_sparse,
            plan.pre_filter.as_ref(),
        );

        let fused = fuse(&dense, &sparse, plan.rerank_weights);
        let confidence = context::confidence(&fused, plan.rerank_weights);

        let (filtered, fallback_used) =
            post_filter(fused, &plan.post_filter, self.config.min_candidates);
        let reranked = rerank(filtered, plan.intent);

        let window = context::assemble(
            &reranked,
            self.config.context_chunks,
            self.config.context_token_budget,
        );

        // The per-request transcript: ephemeral, logged, never returned.
        tracing::debug!(
            query,
            intent = %plan.intent,
            pre_filter_kept = plan.pre_filter.is_some(),
            dense = dense.len(),
            sparse = sparse.len(),
            fused = reranked.len(),
            fallback_used,
            context = window.included.len(),
            "retrieval complete"
        );

        if window.included.is_empty() {
            return Ok(ChatOutcome::no_information(plan.intent));
        }

        let provider = self.provider().await?;
        let user_prompt = format!(
            "Sources:\n{}\n\nQuestion: {query}\n\nAnswer with citations.",
            window.text
        );
        let request = ChatRequest {
            model: model_override
                .map_or_else(|| self.config.llm_model.clone(), str::to_string),
            messages: vec![
                system_message(ANSWER_SYSTEM_PROMPT),
                user_message(&user_prompt),
            ],
            temperature: self.config.llm_temperature,
            max_tokens: self.config.answer_max_tokens,
        };

        let response = provider.complete(&request).await?;

        let outcome = ChatOutcome {
            answer: response.content,
            sources: context::citations(&window),
            confidence,
            intent: plan.intent,
        };
        self.cache.put(&namespace, query, outcome.clone());
        Ok(outcome)
    }

    /// Invalidates cached answers for a namespace (delete, re-ingest).
    pub fn invalidate(&self, namespace: &str) {
        self.cache.invalidate_namespace(namespace);
        self.sparse.invalidate(namespace);
    }

    async fn provider(&self) -> Result<Arc<dyn LlmProvider>, AnswerError> {
        let config = Arc::clone(&self.config);
        self.llm
            .get_or_try_init(|| async move {
                llm::create_provider(&config).map_err(|e| AnswerError::Llm {
                    message: e.to_string(),
                })
            })
            .await
            .map(Arc::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::embed::HashEmbedder;
    use crate::llm::{ChatResponse, TokenUsage};
    use crate::sparse::{SparseDoc, tokenize};
    use crate::store::{InMemoryStore, VectorRecord};
    use crate::types::RepoDescriptor;

    /// Scripted provider that echoes which sources it saw.
    struct StubProvider;

    #[async_trait]
    impl LlmProvider for StubProvider {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AnswerError> {
            let sources = request
                .messages
                .iter()
                .filter(|m| m.content.contains("[S1]"))
                .count();
            Ok(ChatResponse {
                content: format!("Grounded answer from {sources} prompt(s) [S1]."),
                usage: TokenUsage::default(),
            })
        }
    }

    async fn seeded_engine() -> QueryEngine {
        let store = Arc::new(InMemoryStore::new());
        let embedder = Arc::new(HashEmbedder::new(128));
        let sparse = Arc::new(SparseRegistry::new());
        let catalog = Arc::new(RepoCatalog::new());
        let config = Arc::new(EngineConfig::builder().build());

        // Seed a small corpus: python auth code plus unrelated docs.
        let texts = [
            ("auth", "src/auth.py", "def authenticate(user, password): return check_hash(password)", "python", "code", true),
            ("db", "src/db.py", "def connect(): return pool.acquire()", "python", "code", true),
            ("readme", "README.md", "# Project\nInstallation and usage guide", "markdown", "docs", false),
        ];
        let mut records = Vec::new();
        let mut docs = Vec::new();
        for (id, path, text, language, category, has_fn) in texts {
            let serde_json::Value::Object(payload) = serde_json::json!({
                "category": category,
                "language": language,
                "depth": if path.contains('/') { 1 } else { 0 },
                "size_category": "small",
                "has_class_def": false,
                "has_fn_def": has_fn,
                "has_imports": false,
                "has_tests": false,
                "complexity": 1,
                "word_count": 8,
                "text": text,
                "path": path,
                "start_line": 1,
                "end_line": 2,
            }) else {
                unreachable!()
            };
            let vector = embedder
                .embed(&[text.to_string()])
                .await
                .unwrap_or_default()
                .remove(0);
            records.push(VectorRecord {
                id: id.to_string(),
                vector,
                payload: payload.clone(),
            });
            docs.push(SparseDoc {
                id: id.to_string(),
                tokens: tokenize(text),
                payload,
            });
        }
        let _ = store.upsert("repo", records).await;
        sparse.insert("repo", docs);
        catalog.upsert(RepoDescriptor {
            id: "repo".to_string(),
            url: "https://example.org/repo".to_string(),
            revision: None,
            namespace: "repo".to_string(),
            file_count: 3,
            chunk_count: 3,
            indexed_at: 1,
        });

        QueryEngine::with_provider(store, embedder, sparse, catalog, config, Arc::new(StubProvider))
    }

    #[tokio::test]
    async fn test_chat_returns_grounded_answer_with_citations() {
        let engine = seeded_engine().await;
        let outcome = engine
            .chat("how does authenticate check the password", None, None)
            .await
            .unwrap_or_else(|_| unreachable!());

        assert!(outcome.answer.contains("Grounded answer"));
        assert!(!outcome.sources.is_empty());
        assert!(outcome.sources.iter().any(|s| s.file == "src/auth.py"));
        assert_ne!(outcome.confidence.level, ConfidenceLevel::None);
    }

    #[tokio::test]
    async fn test_chat_without_any_repo_is_no_information() {
        let store = Arc::new(InMemoryStore::new());
        let engine = QueryEngine::with_provider(
            store,
            Arc::new(HashEmbedder::new(64)),
            Arc::new(SparseRegistry::new()),
            Arc::new(RepoCatalog::new()),
            Arc::new(EngineConfig::builder().build()),
            Arc::new(StubProvider),
        );

        let outcome = engine
            .chat("Find authentication logic", None, None)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(outcome.answer, NO_INFORMATION_ANSWER);
        assert!(outcome.sources.is_empty());
        assert_eq!(outcome.confidence.level, ConfidenceLevel::None);
        assert_eq!(outcome.intent, Intent::Implementation);
    }

    #[tokio::test]
    async fn test_chat_empty_namespace_is_no_information() {
        let engine = seeded_engine().await;
        let outcome = engine
            .chat("anything at all", Some("missing-namespace"), None)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(outcome.answer, NO_INFORMATION_ANSWER);
        assert_eq!(outcome.confidence.level, ConfidenceLevel::None);
    }

    #[tokio::test]
    async fn test_overrestrictive_filter_recovers() {
        let engine = seeded_engine().await;
        // haskell never appears: the gate drops the pre-filter and the
        // query still resolves without error.
        let outcome = engine
            .chat("Show me Haskell parsers", None, None)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(
            outcome.answer == NO_INFORMATION_ANSWER || !outcome.sources.is_empty(),
            "query must not error"
        );
    }

    #[tokio::test]
    async fn test_citation_faithfulness() {
        let engine = seeded_engine().await;
        let outcome = engine
            .chat("password authentication function", None, None)
            .await
            .unwrap_or_else(|_| unreachable!());

        let known_paths = ["src/auth.py", "src/db.py", "README.md"];
        for source in &outcome.sources {
            assert!(known_paths.contains(&source.file.as_str()));
            assert_eq!(source.lines, "1-2");
        }
    }
}
