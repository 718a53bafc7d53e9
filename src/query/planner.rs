//! Query planning: intent, implicit filters, and the selectivity gate.
//!
//! Transforms a natural-language query into a staged retrieval plan. The
//! pre-filter rides the dense query server-side; the post-filter runs
//! client-side on fused candidates. A pre-filter is kept only when the
//! per-namespace histogram estimates it covers 10–50% of the corpus —
//! narrower risks missing answers, broader buys nothing.

use super::intent::Intent;
use crate::sparse::SparseRegistry;
use crate::store::Filter;

/// Selectivity band a pre-filter must land in to be kept.
const SELECTIVITY_MIN: f64 = 0.10;
/// Upper bound of the selectivity band.
const SELECTIVITY_MAX: f64 = 0.50;

/// Default fusion weights (dense, sparse).
const DEFAULT_WEIGHTS: FusionWeights = FusionWeights {
    dense: 1.0,
    sparse: 0.5,
};

/// Language tokens recognized in queries, with their filter value.
const LANGUAGE_TOKENS: [(&str, &str); 19] = [
    ("python", "python"),
    ("javascript", "javascript"),
    ("js", "javascript"),
    ("typescript", "typescript"),
    ("ts", "typescript"),
    ("java", "java"),
    ("golang", "go"),
    ("go", "go"),
    ("rust", "rust"),
    ("c++", "cpp"),
    ("cpp", "cpp"),
    ("ruby", "ruby"),
    ("php", "php"),
    ("markdown", "markdown"),
    ("yaml", "yaml"),
    ("json", "json"),
    ("toml", "toml"),
    ("shell", "shell"),
    ("bash", "shell"),
];

/// File-kind tokens recognized in queries, with their category value.
const CATEGORY_TOKENS: [(&str, &str); 9] = [
    ("test", "test"),
    ("spec", "test"),
    ("config", "config"),
    ("configuration", "config"),
    ("doc", "docs"),
    ("docs", "docs"),
    ("readme", "docs"),
    ("build", "build"),
    ("code", "code"),
];

/// Tokens implying a shallow-path constraint.
const ROOT_TOKENS: [&str; 4] = ["main", "root", "top-level", "top level"];

/// List-combination weights for reciprocal rank fusion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    /// Weight of the dense (vector) ranking.
    pub dense: f64,
    /// Weight of the sparse (BM25) ranking.
    pub sparse: f64,
}

/// A staged retrieval plan for one query.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    /// Classified intent.
    pub intent: Intent,
    /// Server-side filter for the dense query. `None` when the gate
    /// dropped it.
    pub pre_filter: Option<Filter>,
    /// Client-side filter applied to fused candidates.
    pub post_filter: Filter,
    /// Fusion weights, possibly adjusted by intent.
    pub rerank_weights: FusionWeights,
}

/// Builds the retrieval plan for a query against one namespace.
///
/// Filter extraction never fails; a query with no recognizable tokens
/// yields an empty plan that retrieves unfiltered.
#[must_use]
pub fn plan(query: &str, namespace: &str, registry: &SparseRegistry) -> QueryPlan {
    let intent = Intent::classify(query);
    let lowered = query.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric() && c != '+' && c != '-')
        .filter(|w| !w.is_empty())
        .collect();
    let has_word = |token: &str| {
        if token.contains(' ') {
            lowered.contains(token)
        } else {
            words.contains(&token)
        }
    };

    // Implicit pre-filter: language, file kind, shallow path.
    let mut pre_filter = Filter::new();
    if let Some((_, language)) = LANGUAGE_TOKENS.iter().find(|(t, _)| has_word(t)) {
        pre_filter = pre_filter.eq("language", *language);
    }
    if let Some((_, category)) = CATEGORY_TOKENS.iter().find(|(t, _)| has_word(t)) {
        pre_filter = pre_filter.eq("category", *category);
    }
    if ROOT_TOKENS.iter().any(|t| has_word(t)) {
        pre_filter = pre_filter.lte("depth", 2.0);
    }

    // Post-filter: structural flags live outside the store's index.
    let mut post_filter = Filter::new();
    if has_word("class") || has_word("classes") {
        post_filter = post_filter.eq("has_class_def", true);
    }
    if has_word("function") || has_word("functions") || has_word("method") || has_word("methods") {
        post_filter = post_filter.eq("has_fn_def", true);
    }

    // Selectivity gate: keep the pre-filter only inside the useful band.
    let pre_filter = if pre_filter.is_empty() {
        None
    } else {
        match registry.selectivity(namespace, &pre_filter) {
            Some(estimate) if (SELECTIVITY_MIN..=SELECTIVITY_MAX).contains(&estimate) => {
                tracing::debug!(namespace, estimate, "keeping pre-filter");
                Some(pre_filter)
            }
            estimate => {
                tracing::debug!(namespace, ?estimate, "dropping pre-filter outside band");
                None
            }
        }
    };

    // Lexical-heavy intents lean harder on BM25: error strings and doc
    // phrases match literally more often than semantically.
    let rerank_weights = match intent {
        Intent::Debugging | Intent::Documentation => FusionWeights {
            dense: 1.0,
            sparse: 0.75,
        },
        _ => DEFAULT_WEIGHTS,
    };

    QueryPlan {
        intent,
        pre_filter,
        post_filter,
        rerank_weights,
    }
}
