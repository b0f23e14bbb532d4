//! Hot cache for backend reads
//!
//! Memoizes the latest known raw value of every physical key, including
//! confirmed absence, so repeated reads never re-enter a backend. The cache
//! is advisory: dropping it only costs a re-read.

use crate::sync::MutexExt;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Default number of entries kept by the hot cache
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Cache strategy for the hot cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStrategy {
    /// Keep every entry ever read or written
    Full,
    /// LRU cache with maximum entries
    Lru(usize),
    /// No caching - every read goes to the backend
    None,
}

impl Default for CacheStrategy {
    fn default() -> Self {
        CacheStrategy::Lru(DEFAULT_CACHE_CAPACITY)
    }
}

impl CacheStrategy {
    /// Validate cache strategy configuration
    ///
    /// # Errors
    ///
    /// Returns error if LRU size is 0 (would panic on NonZeroUsize)
    pub fn validate(&self) -> crate::Result<()> {
        match self {
            CacheStrategy::Lru(0) => Err(crate::Error::InvalidCacheStrategy(
                "LRU cache size must be greater than 0".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// A cached backend value
///
/// `value: None` records that the key was looked up and is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub value: Option<String>,
}

impl CacheEntry {
    pub fn present(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
        }
    }

    pub fn absent() -> Self {
        Self { value: None }
    }
}

/// LRU-bounded map from `"{store}:{key}"` to [`CacheEntry`]
pub struct HotCache {
    entries: Option<Mutex<LruCache<String, CacheEntry>>>,
}

impl HotCache {
    /// Create a cache for the given strategy
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCacheStrategy` for `CacheStrategy::Lru(0)`.
    pub fn new(strategy: CacheStrategy) -> crate::Result<Self> {
        strategy.validate()?;

        let entries = match strategy {
            CacheStrategy::Full => Some(LruCache::unbounded()),
            CacheStrategy::Lru(size) => NonZeroUsize::new(size).map(LruCache::new),
            CacheStrategy::None => None,
        };

        Ok(Self {
            entries: entries.map(Mutex::new),
        })
    }

    /// Composite cache key for a physical slot
    #[must_use]
    pub fn cache_key(store: &str, key: &str) -> String {
        format!("{store}:{key}")
    }

    /// Look up a slot; `None` means "not looked up yet"
    pub fn get(&self, store: &str, key: &str) -> Option<CacheEntry> {
        let entries = self.entries.as_ref()?;
        entries
            .lock_recovered()
            .get(&Self::cache_key(store, key))
            .cloned()
    }

    /// Record the latest known value of a slot and mark it most recently used
    pub fn put(&self, store: &str, key: &str, entry: CacheEntry) {
        if let Some(entries) = &self.entries {
            entries.lock_recovered().put(Self::cache_key(store, key), entry);
        }
    }

    /// Forget a slot
    pub fn evict(&self, store: &str, key: &str) {
        if let Some(entries) = &self.entries {
            entries.lock_recovered().pop(&Self::cache_key(store, key));
        }
    }

    /// Forget every slot of one store
    pub fn evict_store(&self, store: &str) {
        let Some(entries) = &self.entries else {
            return;
        };

        let prefix = format!("{store}:");
        let mut entries = entries.lock_recovered();
        let stale: Vec<String> = entries
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            entries.pop(&key);
        }
    }

    /// Drop all entries
    pub fn clear(&self) {
        if let Some(entries) = &self.entries {
            entries.lock_recovered().clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .as_ref()
            .map_or(0, |entries| entries.lock_recovered().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
