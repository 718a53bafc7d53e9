//! Reciprocal rank fusion, post-filtering, and intent-weighted reranking.
//!
//! Fusion is rank-only: each candidate scores `Σ w_list / (k + rank)`
//! over the lists it appears in, which makes dense cosine scores and
//! unbounded BM25 scores commensurable without calibration.

use serde_json::Value;

use super::intent::Intent;
use super::planner::FusionWeights;
use crate::sparse::SparseMatch;
use crate::store::{Filter, QueryMatch};

/// RRF rank-offset constant.
pub const RRF_K: f64 = 60.0;

/// A fused retrieval candidate.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Chunk id.
    pub id: String,
    /// Fused (and later reranked) score.
    pub score: f64,
    /// Store payload, from whichever list supplied it.
    pub payload: serde_json::Map<String, Value>,
}

/// Fuses the dense and sparse rankings by reciprocal rank.
///
/// Candidates appearing in both lists accumulate both contributions.
/// The result is sorted by fused score descending, ties broken by id
/// for determinism.
#[must_use]
pub fn fuse(
    dense: &[QueryMatch],
    sparse: &[SparseMatch],
    weights: FusionWeights,
) -> Vec<Candidate> {
    let mut fused: std::collections::HashMap<&str, Candidate> = std::collections::HashMap::new();

    for (rank, m) in dense.iter().enumerate() {
        let contribution = weights.dense / (RRF_K + (rank + 1) as f64);
        fused
            .entry(m.id.as_str())
            .and_modify(|c| c.score += contribution)
            .or_insert_with(|| Candidate {
                id: m.id.clone(),
                score: contribution,
                payload: m.payload.clone(),
            });
    }

    for (rank, m) in sparse.iter().enumerate() {
        let contribution = weights.sparse / (RRF_K + (rank + 1) as f64);
        fused
            .entry(m.id.as_str())
            .and_modify(|c| c.score += contribution)
            .or_insert_with(|| Candidate {
                id: m.id.clone(),
                score: contribution,
                payload: m.payload.clone(),
            });
    }

    let mut candidates: Vec<Candidate> = fused.into_values().collect();
    sort_descending(&mut candidates);
    candidates
}

/// Applies the post-filter, falling back to the unfiltered fused set
/// when fewer than `min_candidates` survive.
///
/// Returns the surviving candidates and whether the fallback fired.
/// The fallback guarantees recall never drops to zero because of
/// filtering alone.
#[must_use]
pub fn post_filter(
    candidates: Vec<Candidate>,
    filter: &Filter,
    min_candidates: usize,
) -> (Vec<Candidate>, bool) {
    if filter.is_empty() {
        return (candidates, false);
    }

    let surviving: Vec<Candidate> = candidates
        .iter()
        .filter(|c| filter.matches(&c.payload))
        .cloned()
        .collect();

    if surviving.len() < min_candidates {
        tracing::debug!(
            surviving = surviving.len(),
            min_candidates,
            "post-filter fallback to full fused set"
        );
        (candidates, true)
    } else {
        (surviving, false)
    }
}

/// Multiplies each candidate's score by its intent boost, then
/// stable-sorts descending.
#[must_use]
pub fn rerank(mut candidates: Vec<Candidate>, intent: Intent) -> Vec<Candidate> {
    for candidate in &mut candidates {
        candidate.score *= intent.boost(&candidate.payload);
    }
    sort_descending(&mut candidates);
    candidates
}

fn sort_descending(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}
