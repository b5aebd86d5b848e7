//! Parse cache for compiled expressions
//!
//! Keyed by the exact source text. Entries carry a logical access stamp from a
//! shared clock; once the cache grows past its capacity the entries with the
//! oldest stamps are evicted. Lookups and inserts from many threads only
//! contend on the shard that holds the key.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::errors::ScriptResult;
use crate::parser::CompiledExpression;

struct Entry {
    compiled: Arc<CompiledExpression>,
    stamp: AtomicU64,
}

/// Bounded, concurrent LRU cache of compiled expressions
pub struct ParseCache {
    capacity: usize,
    entries: DashMap<Arc<str>, Entry>,
    clock: AtomicU64,
}

impl Default for ParseCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl ParseCache {
    pub const DEFAULT_CAPACITY: usize = 100;

    /// Create a cache holding at most `capacity` entries; 0 disables caching
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: DashMap::new(),
            clock: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Look up `source`, marking the entry as recently used
    pub fn get(&self, source: &str) -> Option<Arc<CompiledExpression>> {
        let entry = self.entries.get(source)?;
        entry.stamp.store(self.tick(), Ordering::Relaxed);
        Some(Arc::clone(&entry.compiled))
    }

    /// Store a compiled expression, evicting the least recently used entries
    /// when the cache is over capacity
    pub fn insert(&self, compiled: Arc<CompiledExpression>) {
        if !self.is_enabled() {
            return;
        }
        let key = Arc::clone(&compiled.source);
        let stamp = AtomicU64::new(self.tick());
        self.entries.insert(key, Entry { compiled, stamp });
        self.evict();
    }

    /// Return the cached entry for `source`, or compile and cache it
    pub fn get_or_try_insert_with<F>(
        &self,
        source: &str,
        compile: F,
    ) -> ScriptResult<Arc<CompiledExpression>>
    where
        F: FnOnce() -> ScriptResult<CompiledExpression>,
    {
        if let Some(hit) = self.get(source) {
            debug!(len = source.len(), "parse cache hit");
            return Ok(hit);
        }
        if self.is_enabled() {
            debug!(len = source.len(), "parse cache miss");
        }
        let compiled = Arc::new(compile()?);
        self.insert(Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
        debug!("parse cache cleared");
    }

    fn evict(&self) {
        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().stamp.load(Ordering::Relaxed))
                .map(|entry| Arc::clone(entry.key()));
            let Some(key) = oldest else {
                break;
            };
            if self.entries.remove(&key).is_some() {
                debug!(len = key.len(), "parse cache evicted least recently used entry");
            }
        }
    }
}

impl std::fmt::Debug for ParseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseCache")
            .field("capacity", &self.capacity)
            .field("len", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::Expr;

    fn compiled(source: &str) -> CompiledExpression {
        CompiledExpression::new(source, Expr::null())
    }

    #[test]
    fn test_miss_then_hit() {
        let cache = ParseCache::new(4);
        let mut compiles = 0;
        for _ in 0..3 {
            cache
                .get_or_try_insert_with("a + 1", || {
                    compiles += 1;
                    Ok(compiled("a + 1"))
                })
                .unwrap();
        }
        assert_eq!(compiles, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_same_entry_is_shared() {
        let cache = ParseCache::new(4);
        let first = cache.get_or_try_insert_with("x", || Ok(compiled("x"))).unwrap();
        let second = cache.get_or_try_insert_with("x", || Ok(compiled("x"))).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = ParseCache::new(2);
        cache.insert(Arc::new(compiled("a")));
        cache.insert(Arc::new(compiled("b")));
        // touch "a" so "b" becomes the oldest
        assert!(cache.get("a").is_some());
        cache.insert(Arc::new(compiled("c")));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_zero_capacity_disables_caching() {
        let cache = ParseCache::new(0);
        let mut compiles = 0;
        for _ in 0..2 {
            cache
                .get_or_try_insert_with("1", || {
                    compiles += 1;
                    Ok(compiled("1"))
                })
                .unwrap();
        }
        assert_eq!(compiles, 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_failed_compile_is_not_cached() {
        let cache = ParseCache::new(4);
        let result = cache.get_or_try_insert_with("(", || {
            Err(crate::errors::ScriptError::evaluation("boom"))
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let cache = ParseCache::default();
        cache.insert(Arc::new(compiled("a")));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), ParseCache::DEFAULT_CAPACITY);
    }

    #[test]
    fn test_concurrent_inserts_respect_capacity() {
        let cache = Arc::new(ParseCache::new(8));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let source = format!("{} + {}", t, i % 12);
                        let source_for_compile = source.clone();
                        cache
                            .get_or_try_insert_with(&source, move || {
                                Ok(compiled(&source_for_compile))
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 8);
    }
}
