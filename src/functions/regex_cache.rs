//! Compiled-regex cache
//!
//! Evaluations of one compiled expression may run in parallel, so the cache
//! sits behind a lock and is bounded with least-recently-used eviction.

use indexmap::IndexMap;
use regex_lite::Regex;
use std::sync::{Arc, Mutex};
use tracing::trace;

use crate::error::{JsltError, Result};

pub const DEFAULT_REGEX_CACHE_SIZE: usize = 256;

pub trait RegexCache: Send + Sync {
    /// Compiled form of `pattern`; malformed patterns are runtime errors.
    fn get(&self, pattern: &str) -> Result<Arc<Regex>>;
}

#[derive(Debug)]
pub struct LruRegexCache {
    capacity: usize,
    entries: Mutex<IndexMap<String, Arc<Regex>>>,
}

impl LruRegexCache {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: Mutex::new(IndexMap::new()) }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LruRegexCache {
    fn default() -> Self {
        Self::new(DEFAULT_REGEX_CACHE_SIZE)
    }
}

impl RegexCache for LruRegexCache {
    fn get(&self, pattern: &str) -> Result<Arc<Regex>> {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        // most recently used entries live at the back
        if let Some(index) = entries.get_index_of(pattern) {
            let last = entries.len() - 1;
            entries.move_index(index, last);
            if let Some((_, regex)) = entries.get_index(last) {
                return Ok(regex.clone());
            }
        }

        let regex = Regex::new(pattern).map_err(|e| {
            JsltError::runtime(format!("Regular expression syntax error in '{}': {}", pattern, e))
        })?;
        let regex = Arc::new(regex);
        entries.insert(pattern.to_string(), regex.clone());
        while entries.len() > self.capacity {
            if let Some((evicted, _)) = entries.shift_remove_index(0) {
                trace!(pattern = %evicted, "evicted regex from cache");
            }
        }
        Ok(regex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caches_compiled_patterns() {
        let cache = LruRegexCache::new(4);
        let a = cache.get("a+").unwrap();
        let b = cache.get("a+").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = LruRegexCache::new(2);
        let first = cache.get("x").unwrap();
        cache.get("y").unwrap();
        // touch x so y becomes the eviction candidate
        cache.get("x").unwrap();
        cache.get("z").unwrap();
        assert_eq!(cache.len(), 2);
        assert!(Arc::ptr_eq(&first, &cache.get("x").unwrap()));
    }

    #[test]
    fn test_malformed_pattern_is_error() {
        let cache = LruRegexCache::default();
        let err = cache.get("(unclosed").unwrap_err();
        assert!(err.message().contains("Regular expression"));
        assert!(cache.is_empty());
    }
}
