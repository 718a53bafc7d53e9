//! # reporag-rs
//!
//! Retrieval-augmented answering for Git repositories.
//!
//! Given a repository URL, the engine ingests it into a persistent
//! vector index: shallow fetch, walk and classify, split into
//! overlapping line-annotated chunks, enrich with filterable metadata,
//! embed, and upsert under a per-repository namespace. Given a
//! natural-language question, it plans a staged retrieval (intent,
//! implicit filters, selectivity gate), fuses dense and BM25 rankings by
//! reciprocal rank, reranks by intent, and returns a grounded, cited
//! answer with a bucketed confidence.
//!
//! Ingestion runs as a single background job behind a poll-based
//! start/progress contract; queries run concurrently. The vector store,
//! embedding model, and LLM are external collaborators behind the
//! [`store::VectorStore`], [`embed::Embedder`], and [`llm::LlmProvider`]
//! traits.
//!
//! ## Quick start
//!
//! ```no_run
//! use reporag_rs::config::EngineConfig;
//! use reporag_rs::engine::Engine;
//!
//! # async fn run() -> Result<(), reporag_rs::error::Error> {
//! let engine = Engine::local(EngineConfig::builder().build());
//! engine.start_ingest("https://github.com/acme/widgets");
//! // ... poll engine.job_progress() until terminal ...
//! let outcome = engine.chat("Where is authentication handled?", None, None).await?;
//! println!("{}", outcome.answer);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod embed;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod job;
pub mod llm;
pub mod query;
pub mod retry;
pub mod server;
pub mod sparse;
pub mod store;
pub mod types;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{Error, ErrorKind};
pub use query::{ChatOutcome, Intent};
pub use types::{Category, Chunk, Language, RepoDescriptor};
