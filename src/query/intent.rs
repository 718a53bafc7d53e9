//! Query intent classification.
//!
//! A closed-set rule table over phrase triggers. Intent biases the
//! retrieval plan's filter defaults and the rerank weights — it never
//! hard-filters on its own.

use serde::{Deserialize, Serialize};

/// Coarse semantic class of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Looking for where/how something is implemented.
    Implementation,
    /// Chasing an error, crash, or unexpected behavior.
    Debugging,
    /// Asking about structure, flow, or high-level design.
    Architecture,
    /// Asking about docs, README, usage text.
    Documentation,
    /// Everything else.
    General,
}

/// Trigger phrases per intent, checked in declaration order.
const DEBUGGING_TRIGGERS: [&str; 9] = [
    "debug",
    "error",
    "stack trace",
    "traceback",
    "exception",
    "crash",
    "bug",
    "broken",
    "failing",
];

const ARCHITECTURE_TRIGGERS: [&str; 7] = [
    "architecture",
    "flow",
    "diagram",
    "structure",
    "overview",
    "high-level",
    "design",
];

const DOCUMENTATION_TRIGGERS: [&str; 6] = [
    "readme",
    "documentation",
    "docs",
    "changelog",
    "getting started",
    "usage",
];

const IMPLEMENTATION_TRIGGERS: [&str; 9] = [
    "implement",
    "how does",
    "where is",
    "logic",
    "code",
    "function",
    "method",
    "class",
    "algorithm",
];

impl Intent {
    /// Classifies a query by its trigger phrases.
    ///
    /// Precedence: debugging → architecture → documentation →
    /// implementation → general. The more specific intents win so
    /// "debug the parser code" reads as debugging, not implementation.
    #[must_use]
    pub fn classify(query: &str) -> Self {
        let lowered = query.to_lowercase();
        let hit = |triggers: &[&str]| triggers.iter().any(|t| lowered.contains(t));

        if hit(&DEBUGGING_TRIGGERS) {
            Self::Debugging
        } else if hit(&ARCHITECTURE_TRIGGERS) {
            Self::Architecture
        } else if hit(&DOCUMENTATION_TRIGGERS) {
            Self::Documentation
        } else if hit(&IMPLEMENTATION_TRIGGERS) {
            Self::Implementation
        } else {
            Self::General
        }
    }

    /// Returns the lowercase string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Implementation => "implementation",
            Self::Debugging => "debugging",
            Self::Architecture => "architecture",
            Self::Documentation => "documentation",
            Self::General => "general",
        }
    }

    /// Rerank multiplier for a candidate payload under this intent.
    ///
    /// Boosts candidates whose metadata matches what the intent is
    /// usually after; everything else passes through at 1.0.
    #[must_use]
    pub fn boost(self, payload: &serde_json::Map<String, serde_json::Value>) -> f64 {
        let category = payload.get("category").and_then(|v| v.as_str());
        let depth = payload.get("depth").and_then(serde_json::Value::as_u64);
        let has_fn = payload
            .get("has_fn_def")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        match self {
            Self::Implementation if category == Some("code") && has_fn => 1.25,
            Self::Architecture if depth.is_some_and(|d| d <= 2) => 1.20,
            Self::Debugging if matches!(category, Some("code" | "test")) => 1.15,
            Self::Documentation if category == Some("docs") => 1.20,
            _ => 1.0,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case("Find authentication logic", Intent::Implementation)]
    #[test_case("Python authentication code", Intent::Implementation)]
    #[test_case("Why does this error happen?", Intent::Debugging)]
    #[test_case("decode this stack trace", Intent::Debugging)]
    #[test_case("Give me the architecture overview", Intent::Architecture)]
    #[test_case("what does the readme say", Intent::Documentation)]
    #[test_case("tell me about this repository", Intent::General)]
    fn test_classify(query: &str, expected: Intent) {
        assert_eq!(Intent::classify(query), expected);
    }

    #[test]
    fn test_debugging_outranks_implementation() {
        assert_eq!(Intent::classify("debug the parser code"), Intent::Debugging);
    }

    #[test]
    fn test_boost_table() {
        let code_fn = json!({"category": "code", "has_fn_def": true, "depth": 3});
        let root_doc = json!({"category": "docs", "depth": 0});
        let deep_code = json!({"category": "code", "has_fn_def": false, "depth": 5});

        let as_map = |v: &serde_json::Value| v.as_object().cloned().unwrap_or_default();

        assert!((Intent::Implementation.boost(&as_map(&code_fn)) - 1.25).abs() < 1e-9);
        assert!((Intent::Architecture.boost(&as_map(&root_doc)) - 1.20).abs() < 1e-9);
        assert!((Intent::Debugging.boost(&as_map(&deep_code)) - 1.15).abs() < 1e-9);
        assert!((Intent::Documentation.boost(&as_map(&root_doc)) - 1.20).abs() < 1e-9);
        assert!((Intent::General.boost(&as_map(&code_fn)) - 1.0).abs() < 1e-9);
        assert!((Intent::Implementation.boost(&as_map(&deep_code)) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&Intent::Implementation).unwrap_or_default();
        assert_eq!(json, "\"implementation\"");
    }
}
