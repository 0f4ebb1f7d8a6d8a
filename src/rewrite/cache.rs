//! Bounded rewrite cache.
//!
//! Keyed on the full input string, so two distinct inputs can never alias
//! each other's output. The rule-set version is checked on every lookup; a
//! version change wipes the cache wholesale, which keeps the contract
//! "never serve a result computed under an older rule table" without
//! widening the key. Eviction and wipe only ever cost recomputation.

use std::num::NonZeroUsize;

use lru::LruCache;

pub const DEFAULT_CACHE_CAPACITY: usize = 512;

/// A memoized engine result.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedRewrite {
    pub changed: bool,
    pub output: String,
}

pub struct RewriteCache {
    entries: LruCache<String, CachedRewrite>,
    version: u64,
    hits: u64,
    misses: u64,
}

impl RewriteCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .unwrap_or_else(|| NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap());
        Self {
            entries: LruCache::new(capacity),
            version: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Look up `text` under `version`. A stale version is treated as a
    /// cache-wide miss and clears the old generation's entries.
    pub fn get(&mut self, version: u64, text: &str) -> Option<CachedRewrite> {
        if version != self.version {
            self.entries.clear();
            self.version = version;
        }
        match self.entries.get(text) {
            Some(entry) => {
                self.hits += 1;
                Some(entry.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn put(&mut self, version: u64, text: &str, result: CachedRewrite) {
        if version != self.version {
            self.entries.clear();
            self.version = version;
        }
        self.entries.put(text.to_string(), result);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
