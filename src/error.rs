//! Error types for the ingestion and query pipelines.
//!
//! Each pipeline area has its own `thiserror` enum; the crate-level
//! [`Error`] aggregates them. Errors are surfaced to callers by kind plus
//! a redacted message — stack digests are logged, never returned.

use thiserror::Error;

/// Errors produced while acquiring a repository snapshot.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The clone subprocess could not be spawned or exited non-zero.
    #[error("failed to clone {url}: {message}")]
    CloneFailed {
        /// Repository URL that failed to clone.
        url: String,
        /// Redacted subprocess output.
        message: String,
    },

    /// The requested revision does not exist in the repository.
    #[error("revision not found: {revision}")]
    RevisionNotFound {
        /// Revision that was requested.
        revision: String,
    },

    /// The fetch exceeded its wall-clock budget.
    #[error("fetch timed out after {seconds}s")]
    Timeout {
        /// Elapsed budget in seconds.
        seconds: u64,
    },

    /// Filesystem failure while preparing the snapshot directory.
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced by the embedding provider.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// Transient failure (429, 5xx, network) that exhausted its retries.
    #[error("embedding request failed after {attempts} attempts: {message}")]
    Transient {
        /// Redacted provider message.
        message: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// Permanent failure (invalid payload, auth) — not retried.
    #[error("embedding request rejected: {message}")]
    Permanent {
        /// Redacted provider message.
        message: String,
    },

    /// The provider returned a vector of unexpected dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Dimension actually returned.
        actual: usize,
    },

    /// The provider returned fewer vectors than texts submitted.
    #[error("embedding count mismatch: sent {sent} texts, got {received} vectors")]
    CountMismatch {
        /// Texts submitted.
        sent: usize,
        /// Vectors received.
        received: usize,
    },

    /// A required secret was missing at first use.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors produced by the vector store client.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transient failure (429, 5xx, network) that exhausted its retries.
    #[error("vector store request failed after {attempts} attempts: {message}")]
    Transient {
        /// Redacted store message.
        message: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// Permanent failure (payload rejected, auth) — not retried.
    #[error("vector store rejected request: {message}")]
    Permanent {
        /// Redacted store message.
        message: String,
    },

    /// A single upsert exceeded its per-request budget.
    #[error("vector store request timed out after {seconds}s")]
    Timeout {
        /// Per-request budget in seconds.
        seconds: u64,
    },

    /// A required secret was missing at first use.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Aggregated ingestion failure — terminal for the job.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Too many consecutive per-chunk failures of the same class.
    #[error("aborting after {count} consecutive chunk failures: {last}")]
    TooManyFailures {
        /// Consecutive failure count at abort.
        count: usize,
        /// Last failure message.
        last: String,
    },

    /// The store failed in a way that cannot be skipped per-chunk.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The embedder failed in a way that cannot be skipped per-chunk.
    #[error(transparent)]
    Embed(#[from] EmbedError),
}

/// Malformed retrieval plan — the query continues with filters disabled.
#[derive(Debug, Error)]
#[error("malformed filter plan: {message}")]
pub struct FilterError {
    /// What was malformed.
    pub message: String,
}

/// Errors produced while generating the final answer.
#[derive(Debug, Error)]
pub enum AnswerError {
    /// The LLM call failed (quota, network, provider error).
    #[error("answer generation failed: {message}")]
    Llm {
        /// Redacted provider message.
        message: String,
    },

    /// The LLM call exceeded its budget.
    #[error("answer generation timed out after {seconds}s")]
    Timeout {
        /// Per-call budget in seconds.
        seconds: u64,
    },

    /// The query embedding step failed.
    #[error(transparent)]
    Embed(#[from] EmbedError),

    /// The dense retrieval step failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Configuration errors, raised lazily at first use of a secret.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required secret was not present in the environment.
    #[error("missing required secret: {name}")]
    MissingSecret {
        /// Environment variable name.
        name: &'static str,
    },

    /// A configuration value could not be parsed.
    #[error("invalid configuration value for {name}: {message}")]
    Invalid {
        /// Environment variable name.
        name: &'static str,
        /// Parse failure detail.
        message: String,
    },
}

/// Top-level error type aggregating all pipeline areas.
#[derive(Debug, Error)]
pub enum Error {
    /// Repository acquisition failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Embedding failed.
    #[error(transparent)]
    Embed(#[from] EmbedError),

    /// Vector store interaction failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Ingestion aborted.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Retrieval plan was malformed.
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// Answer generation failed.
    #[error(transparent)]
    Answer(#[from] AnswerError),

    /// An ingestion job is already running.
    #[error("indexing in progress")]
    Conflict,

    /// The job was cancelled cooperatively.
    #[error("cancelled")]
    Cancelled,

    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Coarse error classification surfaced in job state and API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Repository unreachable or revision missing.
    Fetch,
    /// Embedding provider failure.
    Embed,
    /// Vector store upsert failure.
    Upsert,
    /// Aggregated ingestion failure.
    Index,
    /// Malformed filter plan.
    Filter,
    /// LLM failure or timeout.
    Answer,
    /// Concurrent start attempt.
    Conflict,
    /// Cooperative shutdown.
    Cancelled,
    /// Missing or invalid configuration.
    Config,
}

impl Error {
    /// Returns the coarse classification for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Fetch(_) => ErrorKind::Fetch,
            Self::Embed(_) => ErrorKind::Embed,
            Self::Store(_) => ErrorKind::Upsert,
            Self::Index(_) => ErrorKind::Index,
            Self::Filter(_) => ErrorKind::Filter,
            Self::Answer(_) => ErrorKind::Answer,
            Self::Conflict => ErrorKind::Conflict,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Returns a short digest of the debug representation.
    ///
    /// Logged alongside the redacted message so operators can correlate
    /// failures without leaking internals to API clients.
    #[must_use]
    pub fn stack_digest(&self) -> String {
        let repr = format!("{self:?}");
        format!("{:016x}", xxhash_rust::xxh3::xxh3_64(repr.as_bytes()))
    }
}
