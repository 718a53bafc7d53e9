//! The ingestion pipeline: fetch → walk → chunk → enrich → embed → index.
//!
//! Each stage advances the caller-supplied progress sink and observes the
//! cancellation token, so a cancelled job stops at the next stage
//! boundary (or mid-indexing) and the snapshot directory is always
//! released. CPU-bound stages run on the blocking pool.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::chunker::{ChunkerConfig, chunk};
use super::enrich::enrich;
use super::fetcher::fetch;
use super::indexer::Indexer;
use super::walker::walk;
use crate::catalog::{RepoCatalog, unix_now};
use crate::config::EngineConfig;
use crate::embed::Embedder;
use crate::error::Error;
use crate::sparse::SparseRegistry;
use crate::store::VectorStore;
use crate::types::{Chunk, RepoDescriptor, SourceFile, repo_id_from_url};

/// Progress range consumed by each stage, as `(start, end)` percents.
const FETCH_RANGE: (u8, u8) = (0, 10);
const WALK_RANGE: (u8, u8) = (10, 20);
const CHUNK_RANGE: (u8, u8) = (20, 30);
const INDEX_RANGE: (u8, u8) = (30, 99);

/// Shared services the pipeline runs against.
#[derive(Clone)]
pub struct PipelineDeps {
    /// Vector store client.
    pub store: Arc<dyn VectorStore>,
    /// Embedding provider.
    pub embedder: Arc<dyn Embedder>,
    /// Per-namespace sparse corpus registry.
    pub sparse: Arc<SparseRegistry>,
    /// Repository descriptor catalog.
    pub catalog: Arc<RepoCatalog>,
    /// Engine configuration.
    pub config: Arc<EngineConfig>,
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestReport {
    /// Repository id / namespace.
    pub repo_id: String,
    /// Files accepted by the walker.
    pub file_count: usize,
    /// Chunks acknowledged by the vector store.
    pub chunk_count: usize,
    /// Chunks skipped by the per-chunk failure policy.
    pub skipped_count: usize,
}

/// Runs the full ingestion pipeline for one repository URL.
///
/// `progress` receives `(percent, stage)` updates; percents are monotone
/// non-decreasing across the whole run and reach 100 only on success.
///
/// # Errors
///
/// Returns the first stage error, or [`Error::Cancelled`] when the token
/// fires at a stage boundary.
pub async fn run(
    deps: &PipelineDeps,
    url: &str,
    revision: Option<&str>,
    progress: &(dyn Fn(u8, String) + Send + Sync),
    cancel: &CancellationToken,
) -> Result<IngestReport, Error> {
    let repo_id = repo_id_from_url(url);
    let namespace = repo_id.clone();

    // Stage 1: fetch. The snapshot's tempdir is dropped on every exit
    // path, including cancellation and errors below.
    progress(FETCH_RANGE.0, "Cloning repository".to_string());
    let snapshot = tokio::select! {
        () = cancel.cancelled() => return Err(Error::Cancelled),
        fetched = fetch(url, revision, deps.config.fetch_timeout) => fetched?,
    };

    // Stage 2: walk + classify (blocking filesystem work).
    progress(WALK_RANGE.0, "Scanning files".to_string());
    let root = snapshot.root().to_path_buf();
    let max_file_bytes = deps.config.max_file_bytes;
    let files = tokio::select! {
        () = cancel.cancelled() => return Err(Error::Cancelled),
        walked = tokio::task::spawn_blocking(move || walk(&root, max_file_bytes)) => {
            walked.unwrap_or_default()
        }
    };
    let file_count = files.len();
    tracing::info!(repo_id, file_count, "walk complete");

    // Stage 3: chunk + enrich (CPU-bound).
    progress(CHUNK_RANGE.0, "Chunking files".to_string());
    let chunker_config = ChunkerConfig {
        target_bytes: deps.config.chunk_target_bytes,
        max_bytes: deps.config.chunk_max_bytes,
        overlap: deps.config.chunk_overlap,
        min_bytes: deps.config.chunk_min_bytes,
    };
    let chunk_repo_id = repo_id.clone();
    let chunks = tokio::select! {
        () = cancel.cancelled() => return Err(Error::Cancelled),
        chunked = tokio::task::spawn_blocking(move || {
            chunk_files(&chunk_repo_id, &files, &chunker_config)
        }) => chunked.unwrap_or_default(),
    };
    tracing::info!(repo_id, chunks = chunks.len(), "chunking complete");

    // Stage 4: embed + index with bounded fan-out.
    progress(INDEX_RANGE.0, "Embedding and indexing chunks".to_string());
    let indexer = Indexer::new(
        Arc::clone(&deps.store),
        Arc::clone(&deps.embedder),
        Arc::clone(&deps.sparse),
        Arc::clone(&deps.config),
    );
    let span = f64::from(INDEX_RANGE.1 - INDEX_RANGE.0);
    let outcome = indexer
        .run(
            &namespace,
            chunks,
            &move |fraction, stage| {
                let percent = INDEX_RANGE.0 + (fraction * span) as u8;
                progress(percent.min(INDEX_RANGE.1), stage);
            },
            cancel,
        )
        .await?;

    // Finalize: the descriptor records what the store acknowledged.
    let descriptor = RepoDescriptor {
        id: repo_id.clone(),
        url: url.to_string(),
        revision: snapshot.revision().map(str::to_string),
        namespace,
        file_count,
        chunk_count: outcome.indexed,
        indexed_at: unix_now(),
    };
    deps.catalog.upsert(descriptor);
    progress(100, "Complete".to_string());

    Ok(IngestReport {
        repo_id,
        file_count,
        chunk_count: outcome.indexed,
        skipped_count: outcome.skipped,
    })
}

/// Chunks and enriches every file, assigning content-derived ids.
///
/// Chunk id generation order follows file-enumeration order (the walker
/// sorts by path), which keeps id sets reproducible across ingests.
fn chunk_files(repo_id: &str, files: &[SourceFile], config: &ChunkerConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for file in files {
        for span in chunk(&file.contents, file.language, config) {
            let enrichment = enrich(&span.text, file.language);
            chunks.push(Chunk {
                id: Chunk::derive_id(repo_id, &file.path, span.start_line, span.end_line, &span.text),
                repo_id: repo_id.to_string(),
                text: span.text,
                path: file.path.clone(),
                start_line: span.start_line,
                end_line: span.end_line,
                category: file.category,
                language: file.language,
                depth: file.depth,
                size_category: enrichment.size_category,
                has_class_def: enrichment.has_class_def,
                has_fn_def: enrichment.has_fn_def,
                has_imports: enrichment.has_imports,
                has_tests: enrichment.has_tests,
                complexity: enrichment.complexity,
                word_count: enrichment.word_count,
            });
        }
    }
    chunks
}
