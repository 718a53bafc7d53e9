//! Metadata filters matching the vector store contract.
//!
//! A [`Filter`] is a conjunction of per-field clauses using the operators
//! the store supports server-side (`$eq`, `$in`, `$lte`, `$gte`, `$lt`,
//! `$gt`). The same type is evaluated client-side for post-filtering, so
//! both filter stages share one set of operator semantics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single comparison against one payload field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterOp {
    /// Field equals the value.
    #[serde(rename = "$eq")]
    Eq(Value),
    /// Field is one of the values.
    #[serde(rename = "$in")]
    In(Vec<Value>),
    /// Numeric field ≤ bound.
    #[serde(rename = "$lte")]
    Lte(f64),
    /// Numeric field ≥ bound.
    #[serde(rename = "$gte")]
    Gte(f64),
    /// Numeric field < bound.
    #[serde(rename = "$lt")]
    Lt(f64),
    /// Numeric field > bound.
    #[serde(rename = "$gt")]
    Gt(f64),
}

impl FilterOp {
    /// Evaluates the operator against a payload value.
    ///
    /// Missing fields never match; numeric comparisons against
    /// non-numeric values never match.
    #[must_use]
    pub fn matches(&self, value: Option<&Value>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match self {
            Self::Eq(expected) => value == expected,
            Self::In(allowed) => allowed.contains(value),
            Self::Lte(bound) => value.as_f64().is_some_and(|v| v <= *bound),
            Self::Gte(bound) => value.as_f64().is_some_and(|v| v >= *bound),
            Self::Lt(bound) => value.as_f64().is_some_and(|v| v < *bound),
            Self::Gt(bound) => value.as_f64().is_some_and(|v| v > *bound),
        }
    }
}

/// A conjunction of field clauses. Empty filters match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter {
    clauses: BTreeMap<String, FilterOp>,
}

impl Filter {
    /// Creates an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality clause.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.insert(field.into(), FilterOp::Eq(value.into()));
        self
    }

    /// Adds a membership clause.
    #[must_use]
    pub fn is_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.clauses.insert(field.into(), FilterOp::In(values));
        self
    }

    /// Adds a `≤` clause.
    #[must_use]
    pub fn lte(mut self, field: impl Into<String>, bound: f64) -> Self {
        self.clauses.insert(field.into(), FilterOp::Lte(bound));
        self
    }

    /// Adds a `≥` clause.
    #[must_use]
    pub fn gte(mut self, field: impl Into<String>, bound: f64) -> Self {
        self.clauses.insert(field.into(), FilterOp::Gte(bound));
        self
    }

    /// Adds a `<` clause.
    #[must_use]
    pub fn lt(mut self, field: impl Into<String>, bound: f64) -> Self {
        self.clauses.insert(field.into(), FilterOp::Lt(bound));
        self
    }

    /// Adds a `>` clause.
    #[must_use]
    pub fn gt(mut self, field: impl Into<String>, bound: f64) -> Self {
        self.clauses.insert(field.into(), FilterOp::Gt(bound));
        self
    }

    /// Returns `true` when no clauses are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Number of clauses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    /// Iterates over `(field, op)` clauses.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterOp)> {
        self.clauses.iter()
    }

    /// Evaluates the conjunction against a payload map.
    #[must_use]
    pub fn matches(&self, payload: &serde_json::Map<String, Value>) -> bool {
        self.clauses
            .iter()
            .all(|(field, op)| op.matches(payload.get(field)))
    }
}
