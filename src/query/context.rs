//! Context assembly, citations, and confidence scoring.
//!
//! The context window is built from the top reranked candidates:
//! numbered source blocks with path and line span, bounded by a token
//! budget (estimated at four characters per token). Citations are
//! exactly the blocks that made it into the window — nothing is ever
//! cited that the model did not see.

use serde::{Deserialize, Serialize};

use super::fusion::{Candidate, RRF_K};
use super::planner::FusionWeights;

/// Characters per estimated token.
const CHARS_PER_TOKEN: usize = 4;
/// Delimiter between context blocks.
const BLOCK_DELIMITER: &str = "\n---\n";
/// Fused scores averaged for the confidence estimate.
const CONFIDENCE_TOP_N: usize = 5;
/// Lower bound of the high confidence bucket.
const HIGH_THRESHOLD: f64 = 0.7;
/// Lower bound of the medium confidence bucket.
const MEDIUM_THRESHOLD: f64 = 0.4;

/// Bucketed confidence level surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    /// Normalized score ≥ 0.7.
    High,
    /// Normalized score ≥ 0.4.
    Medium,
    /// Anything below.
    Low,
    /// No candidates at all.
    None,
}

/// Aggregate confidence for one answer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Confidence {
    /// Normalized mean of the top fused scores, in `[0, 1]`.
    pub score: f64,
    /// Bucketed level.
    pub level: ConfidenceLevel,
}

impl Confidence {
    /// The fixed confidence for an empty candidate set.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            score: 0.0,
            level: ConfidenceLevel::None,
        }
    }
}

/// A cited source entry, deduplicated by `(path, span)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    /// Repository-relative file path.
    pub file: String,
    /// Inclusive line span, formatted `start-end`.
    pub lines: String,
    /// Fused score of the cited chunk.
    pub score: f64,
    /// Chunk category.
    pub category: String,
}

/// The assembled context window and the candidates inside it.
#[derive(Debug, Clone)]
pub struct ContextWindow {
    /// Concatenated source blocks handed to the LLM.
    pub text: String,
    /// Candidates included, in block order.
    pub included: Vec<Candidate>,
}

/// Builds the context window from the top reranked candidates.
///
/// Takes up to `max_chunks` candidates in order; once the estimated
/// token budget is exceeded the tail is dropped.
#[must_use]
pub fn assemble(candidates: &[Candidate], max_chunks: usize, token_budget: usize) -> ContextWindow {
    let char_budget = token_budget.saturating_mul(CHARS_PER_TOKEN);
    let mut text = String::new();
    let mut included = Vec::new();

    for (index, candidate) in candidates.iter().take(max_chunks).enumerate() {
        let path = payload_str(candidate, "path");
        let start = payload_u64(candidate, "start_line");
        let end = payload_u64(candidate, "end_line");
        let body = payload_str(candidate, "text");

        let block = format!("[S{}] {path} (L{start}-{end}): {body}", index + 1);
        let added = block.len() + if text.is_empty() { 0 } else { BLOCK_DELIMITER.len() };
        if !text.is_empty() && text.len() + added > char_budget {
            break;
        }

        if !text.is_empty() {
            text.push_str(BLOCK_DELIMITER);
        }
        text.push_str(&block);
        included.push(candidate.clone());
    }

    ContextWindow { text, included }
}

/// Derives citations from the context window's candidates.
///
/// Deduplicates by `(path, span)` keeping the best-scored occurrence,
/// then sorts by descending fused score.
#[must_use]
pub fn citations(window: &ContextWindow) -> Vec<Citation> {
    let mut seen = std::collections::HashSet::new();
    let mut citations: Vec<Citation> = Vec::new();

    for candidate in &window.included {
        let file = payload_str(candidate, "path");
        let lines = format!(
            "{}-{}",
            payload_u64(candidate, "start_line"),
            payload_u64(candidate, "end_line")
        );
        if !seen.insert((file.clone(), lines.clone())) {
            continue;
        }
        citations.push(Citation {
            file,
            lines,
            score: candidate.score,
            category: payload_str(candidate, "category"),
        });
    }

    citations.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.file.cmp(&b.file))
    });
    citations
}

/// Computes the bucketed confidence from the fused candidate scores.
///
/// The mean of the top five fused scores is normalized against the best
/// score a candidate could achieve under the active weights (rank 1 in
/// both lists), keeping the estimate in `[0, 1]` and monotone in every
/// input score.
#[must_use]
pub fn confidence(candidates: &[Candidate], weights: FusionWeights) -> Confidence {
    if candidates.is_empty() {
        return Confidence::none();
    }

    let top: Vec<f64> = candidates
        .iter()
        .take(CONFIDENCE_TOP_N)
        .map(|c| c.score)
        .collect();
    let mean = top.iter().sum::<f64>() / top.len() as f64;

    let ceiling = (weights.dense + weights.sparse) / (RRF_K + 1.0);
    let score = if ceiling > 0.0 {
        (mean / ceiling).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let level = if score >= HIGH_THRESHOLD {
        ConfidenceLevel::High
    } else if score >= MEDIUM_THRESHOLD {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    };

    Confidence { score, level }
}

fn payload_str(candidate: &Candidate, key: &str) -> String {
    candidate
        .payload
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn payload_u64(candidate: &Candidate, key: &str) -> u64 {
    candidate
        .payload
        .get(key)
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(0)
}
