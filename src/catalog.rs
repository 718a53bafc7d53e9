//! In-process catalog of indexed repositories.
//!
//! The vector store is the only durable state; descriptors here exist so
//! queries can resolve a namespace and the selectivity gate can find its
//! corpus. Descriptors are created by the indexer on first successful
//! ingest and replaced wholesale on re-ingest.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::RepoDescriptor;

/// Registry of [`RepoDescriptor`]s keyed by repository id.
#[derive(Debug, Default)]
pub struct RepoCatalog {
    repos: RwLock<HashMap<String, RepoDescriptor>>,
}

impl RepoCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a descriptor.
    pub fn upsert(&self, descriptor: RepoDescriptor) {
        if let Ok(mut guard) = self.repos.write() {
            guard.insert(descriptor.id.clone(), descriptor);
        }
    }

    /// Returns a copy of the descriptor for `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<RepoDescriptor> {
        self.repos.read().ok()?.get(id).cloned()
    }

    /// Returns all descriptors, ordered by id.
    #[must_use]
    pub fn list(&self) -> Vec<RepoDescriptor> {
        let mut repos: Vec<RepoDescriptor> = self
            .repos
            .read()
            .map(|g| g.values().cloned().collect())
            .unwrap_or_default();
        repos.sort_by(|a, b| a.id.cmp(&b.id));
        repos
    }

    /// Removes a descriptor. Returns `true` if it existed.
    pub fn remove(&self, id: &str) -> bool {
        self.repos
            .write()
            .map(|mut g| g.remove(id).is_some())
            .unwrap_or(false)
    }

    /// The most recently indexed descriptor, if any.
    ///
    /// Queries that do not name a repository fall back to this one.
    #[must_use]
    pub fn latest(&self) -> Option<RepoDescriptor> {
        self.repos
            .read()
            .ok()?
            .values()
            .max_by_key(|r| r.indexed_at)
            .cloned()
    }
}

/// Current Unix timestamp in seconds.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str, indexed_at: u64) -> RepoDescriptor {
        RepoDescriptor {
            id: id.to_string(),
            url: format!("https://example.org/{id}"),
            revision: None,
            namespace: id.to_string(),
            file_count: 1,
            chunk_count: 2,
            indexed_at,
        }
    }

    #[test]
    fn test_upsert_and_get() {
        let catalog = RepoCatalog::new();
        catalog.upsert(descriptor("a", 1));
        assert_eq!(catalog.get("a").map(|d| d.chunk_count), Some(2));
        assert!(catalog.get("b").is_none());
    }

    #[test]
    fn test_upsert_replaces() {
        let catalog = RepoCatalog::new();
        catalog.upsert(descriptor("a", 1));
        let mut updated = descriptor("a", 2);
        updated.chunk_count = 9;
        catalog.upsert(updated);
        assert_eq!(catalog.get("a").map(|d| d.chunk_count), Some(9));
        assert_eq!(catalog.list().len(), 1);
    }

    #[test]
    fn test_latest_by_indexed_at() {
        let catalog = RepoCatalog::new();
        catalog.upsert(descriptor("old", 10));
        catalog.upsert(descriptor("new", 20));
        assert_eq!(catalog.latest().map(|d| d.id), Some("new".to_string()));
    }

    #[test]
    fn test_remove() {
        let catalog = RepoCatalog::new();
        catalog.upsert(descriptor("a", 1));
        assert!(catalog.remove("a"));
        assert!(!catalog.remove("a"));
        assert!(catalog.list().is_empty());
    }
}
