//! Ingestion pipeline: fetch, walk, chunk, enrich, embed, index.

mod chunker;
mod enrich;
mod fetcher;
mod indexer;
mod pipeline;
mod walker;

pub use chunker::{ChunkSpan, ChunkerConfig, chunk};
pub use enrich::{Enrichment, enrich};
pub use fetcher::{Snapshot, fetch};
pub use indexer::{IndexOutcome, Indexer};
pub use pipeline::{IngestReport, PipelineDeps, run};
pub use walker::walk;
