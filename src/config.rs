//! Engine configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment
//! variables → defaults. Secrets are *not* validated at startup — each
//! accessor returns [`ConfigError::MissingSecret`] lazily at first use, so
//! the process can serve `/health` without credentials.

use std::time::Duration;

use crate::error::ConfigError;

/// Default chunk target size in bytes (≈512 embedder tokens).
const DEFAULT_CHUNK_TARGET_BYTES: usize = 2_000;
/// Default hard cap on chunk size in bytes (≈1024 embedder tokens).
const DEFAULT_CHUNK_MAX_BYTES: usize = 4_000;
/// Default overlap between consecutive chunks in characters (~10% of target).
const DEFAULT_CHUNK_OVERLAP: usize = 200;
/// Files below this size become a single chunk.
const DEFAULT_CHUNK_MIN_BYTES: usize = 100;
/// Default per-file size cap for the walker.
const DEFAULT_MAX_FILE_BYTES: u64 = 1_048_576;
/// Default maximum in-flight upserts.
const DEFAULT_MAX_INFLIGHT: usize = 4;
/// Default cap for adaptive micro-batch sizing.
const DEFAULT_MICRO_BATCH_CAP: usize = 32;
/// Consecutive same-class chunk failures before the ingest aborts.
const DEFAULT_MAX_CONSECUTIVE_FAILURES: usize = 50;
/// Default dense retrieval depth.
const DEFAULT_TOP_K_DENSE: usize = 40;
/// Default sparse retrieval depth.
const DEFAULT_TOP_K_SPARSE: usize = 40;
/// Default context window size in chunks.
const DEFAULT_CONTEXT_CHUNKS: usize = 10;
/// Default context token budget.
const DEFAULT_CONTEXT_TOKEN_BUDGET: usize = 8_000;
/// Minimum post-filter survivors before the recall fallback kicks in.
const DEFAULT_MIN_CANDIDATES: usize = 5;
/// Dense matches below this cosine similarity are discarded.
const DEFAULT_MIN_DENSE_SCORE: f32 = 0.1;
/// Default embedding dimension.
const DEFAULT_EMBED_DIMENSION: usize = 768;
/// Default answer token cap.
const DEFAULT_ANSWER_MAX_TOKENS: u32 = 1_024;
/// Default fetch wall-clock budget in seconds.
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 120;
/// Default per-embedding-request budget in seconds.
const DEFAULT_EMBED_TIMEOUT_SECS: u64 = 30;
/// Default per-upsert budget in seconds.
const DEFAULT_UPSERT_TIMEOUT_SECS: u64 = 15;
/// Default per-LLM-call budget in seconds.
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;
/// Default whole-ingestion budget in seconds.
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 600;
/// Default HTTP port.
const DEFAULT_PORT: u16 = 8000;

/// Configuration for the retrieval engine and its pipelines.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Target chunk size in bytes.
    pub chunk_target_bytes: usize,
    /// Hard cap on chunk size in bytes.
    pub chunk_max_bytes: usize,
    /// Overlap between consecutive chunks in characters.
    pub chunk_overlap: usize,
    /// Files below this size become a single chunk.
    pub chunk_min_bytes: usize,
    /// Walker per-file size cap in bytes.
    pub max_file_bytes: u64,
    /// Micro-batch size for embedding + upsert. `None` = adaptive
    /// (derived from available parallelism, floor 1, cap 32).
    pub micro_batch: Option<usize>,
    /// Maximum in-flight upserts.
    pub max_inflight: usize,
    /// Consecutive same-class chunk failures before aborting.
    pub max_consecutive_failures: usize,
    /// Dense retrieval depth.
    pub top_k_dense: usize,
    /// Sparse retrieval depth.
    pub top_k_sparse: usize,
    /// Chunks assembled into the LLM context.
    pub context_chunks: usize,
    /// Context token budget.
    pub context_token_budget: usize,
    /// Minimum post-filter survivors before the recall fallback.
    pub min_candidates: usize,
    /// Dense matches below this cosine similarity are discarded.
    pub min_dense_score: f32,
    /// Embedding model identifier.
    pub embed_model: String,
    /// Embedding vector dimension.
    pub embed_dimension: usize,
    /// Chat model identifier.
    pub llm_model: String,
    /// Sampling temperature for answers (kept deterministic, ≤ 0.3).
    pub llm_temperature: f32,
    /// Hard token cap for answers.
    pub answer_max_tokens: u32,
    /// Fetch wall-clock budget.
    pub fetch_timeout: Duration,
    /// Per-embedding-request budget.
    pub embed_timeout: Duration,
    /// Per-upsert budget.
    pub upsert_timeout: Duration,
    /// Per-LLM-call budget.
    pub llm_timeout: Duration,
    /// Whole-ingestion budget.
    pub job_timeout: Duration,
    /// Answer cache TTL. `None` disables the cache.
    pub answer_cache_ttl: Option<Duration>,
    /// HTTP port for the serving shell.
    pub port: u16,

    vector_store_url: Option<String>,
    vector_store_api_key: Option<String>,
    vector_index_name: Option<String>,
    llm_api_key: Option<String>,
    llm_base_url: Option<String>,
    embed_api_key: Option<String>,
    embed_base_url: Option<String>,
}

impl EngineConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::builder().from_env().build()
    }

    /// Returns the vector store base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSecret`] if `VECTOR_STORE_URL` was
    /// never provided.
    pub fn vector_store_url(&self) -> Result<&str, ConfigError> {
        self.vector_store_url
            .as_deref()
            .ok_or(ConfigError::MissingSecret {
                name: "VECTOR_STORE_URL",
            })
    }

    /// Returns the vector store API key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSecret`] if `VECTOR_STORE_API_KEY`
    /// was never provided.
    pub fn vector_store_api_key(&self) -> Result<&str, ConfigError> {
        self.vector_store_api_key
            .as_deref()
            .ok_or(ConfigError::MissingSecret {
                name: "VECTOR_STORE_API_KEY",
            })
    }

    /// Returns the vector index name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSecret`] if `VECTOR_INDEX_NAME` was
    /// never provided.
    pub fn vector_index_name(&self) -> Result<&str, ConfigError> {
        self.vector_index_name
            .as_deref()
            .ok_or(ConfigError::MissingSecret {
                name: "VECTOR_INDEX_NAME",
            })
    }

    /// Returns the LLM API key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSecret`] if `LLM_API_KEY` was never
    /// provided.
    pub fn llm_api_key(&self) -> Result<&str, ConfigError> {
        self.llm_api_key
            .as_deref()
            .ok_or(ConfigError::MissingSecret { name: "LLM_API_KEY" })
    }

    /// Returns the optional LLM base URL override.
    #[must_use]
    pub fn llm_base_url(&self) -> Option<&str> {
        self.llm_base_url.as_deref()
    }

    /// Returns the embedding API key, falling back to the LLM key when the
    /// provider is shared.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSecret`] if neither `EMBED_API_KEY`
    /// nor `LLM_API_KEY` was provided.
    pub fn embed_api_key(&self) -> Result<&str, ConfigError> {
        self.embed_api_key
            .as_deref()
            .or(self.llm_api_key.as_deref())
            .ok_or(ConfigError::MissingSecret {
                name: "EMBED_API_KEY",
            })
    }

    /// Returns the optional embedding base URL override.
    #[must_use]
    pub fn embed_base_url(&self) -> Option<&str> {
        self.embed_base_url.as_deref()
    }

    /// True when all secrets needed for ingestion and answering are set.
    ///
    /// Used by `/health` to report `env_configured` without failing.
    #[must_use]
    pub fn env_configured(&self) -> bool {
        self.vector_store_url.is_some()
            && self.vector_store_api_key.is_some()
            && self.vector_index_name.is_some()
            && self.llm_api_key.is_some()
    }

    /// Resolves the effective micro-batch size.
    ///
    /// Adaptive sizing scales with available parallelism so small hosts
    /// fall back to single-chunk batches while large ones batch up to 32.
    #[must_use]
    pub fn effective_micro_batch(&self) -> usize {
        self.micro_batch.map_or_else(
            || {
                let cores = std::thread::available_parallelism().map_or(1, std::num::NonZero::get);
                (cores * 2).clamp(1, DEFAULT_MICRO_BATCH_CAP)
            },
            |b| b.clamp(1, DEFAULT_MICRO_BATCH_CAP),
        )
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    chunk_target_bytes: Option<usize>,
    chunk_max_bytes: Option<usize>,
    chunk_overlap: Option<usize>,
    chunk_min_bytes: Option<usize>,
    max_file_bytes: Option<u64>,
    micro_batch: Option<usize>,
    max_inflight: Option<usize>,
    max_consecutive_failures: Option<usize>,
    top_k_dense: Option<usize>,
    top_k_sparse: Option<usize>,
    context_chunks: Option<usize>,
    context_token_budget: Option<usize>,
    min_candidates: Option<usize>,
    min_dense_score: Option<f32>,
    embed_model: Option<String>,
    embed_dimension: Option<usize>,
    llm_model: Option<String>,
    llm_temperature: Option<f32>,
    answer_max_tokens: Option<u32>,
    fetch_timeout: Option<Duration>,
    embed_timeout: Option<Duration>,
    upsert_timeout: Option<Duration>,
    llm_timeout: Option<Duration>,
    job_timeout: Option<Duration>,
    answer_cache_ttl: Option<Duration>,
    port: Option<u16>,
    vector_store_url: Option<String>,
    vector_store_api_key: Option<String>,
    vector_index_name: Option<String>,
    llm_api_key: Option<String>,
    llm_base_url: Option<String>,
    embed_api_key: Option<String>,
    embed_base_url: Option<String>,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl EngineConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.vector_store_url.is_none() {
            self.vector_store_url = std::env::var("VECTOR_STORE_URL").ok();
        }
        if self.vector_store_api_key.is_none() {
            self.vector_store_api_key = std::env::var("VECTOR_STORE_API_KEY").ok();
        }
        if self.vector_index_name.is_none() {
            self.vector_index_name = std::env::var("VECTOR_INDEX_NAME").ok();
        }
        if self.llm_api_key.is_none() {
            self.llm_api_key = std::env::var("LLM_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .ok();
        }
        if self.llm_base_url.is_none() {
            self.llm_base_url = std::env::var("LLM_BASE_URL").ok();
        }
        if self.embed_api_key.is_none() {
            self.embed_api_key = std::env::var("EMBED_API_KEY").ok();
        }
        if self.embed_base_url.is_none() {
            self.embed_base_url = std::env::var("EMBED_BASE_URL").ok();
        }
        if self.embed_model.is_none() {
            self.embed_model = std::env::var("EMBED_MODEL").ok();
        }
        if self.embed_dimension.is_none() {
            self.embed_dimension = env_parse("EMBED_DIMENSION");
        }
        if self.llm_model.is_none() {
            self.llm_model = std::env::var("LLM_MODEL").ok();
        }
        if self.port.is_none() {
            self.port = env_parse("PORT");
        }
        if self.chunk_target_bytes.is_none() {
            self.chunk_target_bytes = env_parse("REPORAG_CHUNK_TARGET_BYTES");
        }
        if self.chunk_overlap.is_none() {
            self.chunk_overlap = env_parse("REPORAG_CHUNK_OVERLAP");
        }
        if self.max_file_bytes.is_none() {
            self.max_file_bytes = env_parse("REPORAG_MAX_FILE_BYTES");
        }
        if self.micro_batch.is_none() {
            self.micro_batch = env_parse("REPORAG_MICRO_BATCH");
        }
        if self.max_inflight.is_none() {
            self.max_inflight = env_parse("REPORAG_MAX_INFLIGHT");
        }
        if self.job_timeout.is_none() {
            self.job_timeout = env_parse("REPORAG_JOB_TIMEOUT_SECS").map(Duration::from_secs);
        }
        if self.answer_cache_ttl.is_none() {
            self.answer_cache_ttl =
                env_parse("REPORAG_ANSWER_CACHE_TTL_SECS").map(Duration::from_secs);
        }
        self
    }

    /// Sets the target chunk size in bytes.
    #[must_use]
    pub const fn chunk_target_bytes(mut self, n: usize) -> Self {
        self.chunk_target_bytes = Some(n);
        self
    }

    /// Sets the chunk overlap in characters.
    #[must_use]
    pub const fn chunk_overlap(mut self, n: usize) -> Self {
        self.chunk_overlap = Some(n);
        self
    }

    /// Sets the walker per-file size cap.
    #[must_use]
    pub const fn max_file_bytes(mut self, n: u64) -> Self {
        self.max_file_bytes = Some(n);
        self
    }

    /// Sets a fixed micro-batch size (clamped to `1..=32`).
    #[must_use]
    pub const fn micro_batch(mut self, n: usize) -> Self {
        self.micro_batch = Some(n);
        self
    }

    /// Sets the maximum in-flight upserts.
    #[must_use]
    pub const fn max_inflight(mut self, n: usize) -> Self {
        self.max_inflight = Some(n);
        self
    }

    /// Sets the dense retrieval depth.
    #[must_use]
    pub const fn top_k_dense(mut self, n: usize) -> Self {
        self.top_k_dense = Some(n);
        self
    }

    /// Sets the sparse retrieval depth.
    #[must_use]
    pub const fn top_k_sparse(mut self, n: usize) -> Self {
        self.top_k_sparse = Some(n);
        self
    }

    /// Sets the context window size in chunks.
    #[must_use]
    pub const fn context_chunks(mut self, n: usize) -> Self {
        self.context_chunks = Some(n);
        self
    }

    /// Sets the minimum dense similarity for a match to count.
    #[must_use]
    pub const fn min_dense_score(mut self, score: f32) -> Self {
        self.min_dense_score = Some(score);
        self
    }

    /// Sets the embedding model.
    #[must_use]
    pub fn embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = Some(model.into());
        self
    }

    /// Sets the embedding dimension.
    #[must_use]
    pub const fn embed_dimension(mut self, n: usize) -> Self {
        self.embed_dimension = Some(n);
        self
    }

    /// Sets the chat model.
    #[must_use]
    pub fn llm_model(mut self, model: impl Into<String>) -> Self {
        self.llm_model = Some(model.into());
        self
    }

    /// Sets the LLM API key.
    #[must_use]
    pub fn llm_api_key(mut self, key: impl Into<String>) -> Self {
        self.llm_api_key = Some(key.into());
        self
    }

    /// Sets the vector store URL.
    #[must_use]
    pub fn vector_store_url(mut self, url: impl Into<String>) -> Self {
        self.vector_store_url = Some(url.into());
        self
    }

    /// Sets the vector store API key.
    #[must_use]
    pub fn vector_store_api_key(mut self, key: impl Into<String>) -> Self {
        self.vector_store_api_key = Some(key.into());
        self
    }

    /// Sets the vector index name.
    #[must_use]
    pub fn vector_index_name(mut self, name: impl Into<String>) -> Self {
        self.vector_index_name = Some(name.into());
        self
    }

    /// Sets the whole-ingestion budget.
    #[must_use]
    pub const fn job_timeout(mut self, d: Duration) -> Self {
        self.job_timeout = Some(d);
        self
    }

    /// Sets the answer cache TTL.
    #[must_use]
    pub const fn answer_cache_ttl(mut self, d: Duration) -> Self {
        self.answer_cache_ttl = Some(d);
        self
    }

    /// Sets the HTTP port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Builds the [`EngineConfig`].
    #[must_use]
    pub fn build(self) -> EngineConfig {
        EngineConfig {
            chunk_target_bytes: self.chunk_target_bytes.unwrap_or(DEFAULT_CHUNK_TARGET_BYTES),
            chunk_max_bytes: self.chunk_max_bytes.unwrap_or(DEFAULT_CHUNK_MAX_BYTES),
            chunk_overlap: self.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP),
            chunk_min_bytes: self.chunk_min_bytes.unwrap_or(DEFAULT_CHUNK_MIN_BYTES),
            max_file_bytes: self.max_file_bytes.unwrap_or(DEFAULT_MAX_FILE_BYTES),
            micro_batch: self.micro_batch,
            max_inflight: self.max_inflight.unwrap_or(DEFAULT_MAX_INFLIGHT),
            max_consecutive_failures: self
                .max_consecutive_failures
                .unwrap_or(DEFAULT_MAX_CONSECUTIVE_FAILURES),
            top_k_dense: self.top_k_dense.unwrap_or(DEFAULT_TOP_K_DENSE),
            top_k_sparse: self.top_k_sparse.unwrap_or(DEFAULT_TOP_K_SPARSE),
            context_chunks: self.context_chunks.unwrap_or(DEFAULT_CONTEXT_CHUNKS),
            context_token_budget: self
                .context_token_budget
                .unwrap_or(DEFAULT_CONTEXT_TOKEN_BUDGET),
            min_candidates: self.min_candidates.unwrap_or(DEFAULT_MIN_CANDIDATES),
            min_dense_score: self.min_dense_score.unwrap_or(DEFAULT_MIN_DENSE_SCORE),
            embed_model: self
                .embed_model
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            embed_dimension: self.embed_dimension.unwrap_or(DEFAULT_EMBED_DIMENSION),
            llm_model: self
                .llm_model
                .unwrap_or_else(|| "gpt-5-mini-2025-08-07".to_string()),
            llm_temperature: self.llm_temperature.unwrap_or(0.2).min(0.3),
            answer_max_tokens: self.answer_max_tokens.unwrap_or(DEFAULT_ANSWER_MAX_TOKENS),
            fetch_timeout: self
                .fetch_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS)),
            embed_timeout: self
                .embed_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_EMBED_TIMEOUT_SECS)),
            upsert_timeout: self
                .upsert_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_UPSERT_TIMEOUT_SECS)),
            llm_timeout: self
                .llm_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS)),
            job_timeout: self
                .job_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS)),
            answer_cache_ttl: self.answer_cache_ttl,
            port: self.port.unwrap_or(DEFAULT_PORT),
            vector_store_url: self.vector_store_url,
            vector_store_api_key: self.vector_store_api_key,
            vector_index_name: self.vector_index_name,
            llm_api_key: self.llm_api_key,
            llm_base_url: self.llm_base_url,
            embed_api_key: self.embed_api_key,
            embed_base_url: self.embed_base_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = EngineConfig::builder().build();
        assert_eq!(config.chunk_target_bytes, DEFAULT_CHUNK_TARGET_BYTES);
        assert_eq!(config.max_inflight, DEFAULT_MAX_INFLIGHT);
        assert_eq!(config.top_k_dense, DEFAULT_TOP_K_DENSE);
        assert_eq!(config.job_timeout, Duration::from_secs(600));
        assert!(config.answer_cache_ttl.is_none());
    }

    #[test]
    fn test_missing_secrets_are_lazy() {
        let config = EngineConfig::builder().build();
        assert!(!config.env_configured());
        assert!(config.vector_store_api_key().is_err());
        assert!(config.llm_api_key().is_err());
    }

    #[test]
    fn test_embed_key_falls_back_to_llm_key() {
        let config = EngineConfig::builder().llm_api_key("shared").build();
        assert_eq!(config.embed_api_key().ok(), Some("shared"));
    }

    #[test]
    fn test_temperature_capped() {
        let mut builder = EngineConfig::builder();
        builder.llm_temperature = Some(0.9);
        let config = builder.build();
        assert!(config.llm_temperature <= 0.3);
    }

    #[test]
    fn test_micro_batch_clamped() {
        let config = EngineConfig::builder().micro_batch(500).build();
        assert_eq!(config.effective_micro_batch(), 32);

        let config = EngineConfig::builder().micro_batch(0).build();
        assert_eq!(config.effective_micro_batch(), 1);

        let config = EngineConfig::builder().build();
        let adaptive = config.effective_micro_batch();
        assert!((1..=32).contains(&adaptive));
    }

    #[test]
    fn test_env_configured_requires_all() {
        let config = EngineConfig::builder()
            .vector_store_url("http://localhost:6333")
            .vector_store_api_key("k")
            .vector_index_name("idx")
            .llm_api_key("k2")
            .build();
        assert!(config.env_configured());
    }
}
