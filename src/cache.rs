//! Optional answer memoization.
//!
//! A pure cache keyed by `(namespace, query)` with a TTL. Disabled
//! unless a TTL is configured; only latency changes when it is on —
//! entries are exact previous outcomes, never synthesized.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// TTL-bounded memoization of answer outcomes.
#[derive(Debug)]
pub struct AnswerCache<T> {
    ttl: Option<Duration>,
    entries: Mutex<HashMap<(String, String), (Instant, T)>>,
}

impl<T: Clone> AnswerCache<T> {
    /// Creates a cache. `None` disables it entirely.
    #[must_use]
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a cached value if present and fresh.
    #[must_use]
    pub fn get(&self, namespace: &str, query: &str) -> Option<T> {
        let ttl = self.ttl?;
        let guard = self.entries.lock().ok()?;
        let (inserted, value) = guard.get(&(namespace.to_string(), query.to_string()))?;
        (inserted.elapsed() < ttl).then(|| value.clone())
    }

    /// Stores a value. No-op when the cache is disabled.
    pub fn put(&self, namespace: &str, query: &str, value: T) {
        if self.ttl.is_none() {
            return;
        }
        if let Ok(mut guard) = self.entries.lock() {
            // Opportunistic expiry sweep keeps the map bounded.
            if let Some(ttl) = self.ttl {
                guard.retain(|_, (inserted, _)| inserted.elapsed() < ttl);
            }
            guard.insert(
                (namespace.to_string(), query.to_string()),
                (Instant::now(), value),
            );
        }
    }

    /// Drops every entry for a namespace (after delete or re-ingest).
    pub fn invalidate_namespace(&self, namespace: &str) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.retain(|(ns, _), _| ns != namespace);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let cache: AnswerCache<String> = AnswerCache::new(None);
        cache.put("ns", "q", "answer".to_string());
        assert!(cache.get("ns", "q").is_none());
    }

    #[test]
    fn test_hit_within_ttl() {
        let cache = AnswerCache::new(Some(Duration::from_secs(60)));
        cache.put("ns", "q", 42);
        assert_eq!(cache.get("ns", "q"), Some(42));
        assert!(cache.get("ns", "other").is_none());
        assert!(cache.get("other", "q").is_none());
    }

    #[test]
    fn test_expiry() {
        let cache = AnswerCache::new(Some(Duration::from_millis(1)));
        cache.put("ns", "q", 1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("ns", "q").is_none());
    }

    #[test]
    fn test_namespace_invalidation() {
        let cache = AnswerCache::new(Some(Duration::from_secs(60)));
        cache.put("a", "q", 1);
        cache.put("b", "q", 2);
        cache.invalidate_namespace("a");
        assert!(cache.get("a", "q").is_none());
        assert_eq!(cache.get("b", "q"), Some(2));
    }
}
