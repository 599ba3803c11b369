//! Paginated View Cache
//!
//! Caches ordered page slices keyed by `(page, size)`.
//!
//! Any mutation can shift page boundaries, so the whole cache is dropped on
//! every successful write rather than invalidating single keys. A generation
//! counter, bumped under the same lock as the clear, keeps a page computed
//! before an invalidation from being inserted after it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::DEFAULT_PAGE_CACHE_ENTRIES;
use crate::error::{Error, Result};
use crate::metrics;
use crate::model::Transaction;

/// Cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageKey {
    /// Zero-based page index
    pub page: usize,
    /// Records per page
    pub size: usize,
}

impl PageKey {
    /// Create a key
    pub fn new(page: usize, size: usize) -> Self {
        Self { page, size }
    }

    /// Slice bounds into a sequence of `len` records, or `None` when the
    /// page starts past the end
    pub fn bounds(&self, len: usize) -> Option<(usize, usize)> {
        let start = self.page.checked_mul(self.size)?;
        if start >= len {
            return None;
        }
        let end = start.saturating_add(self.size).min(len);
        Some((start, end))
    }

    /// Cut this page out of an ordered record list
    pub fn slice(&self, mut ordered: Vec<Transaction>) -> Vec<Transaction> {
        match self.bounds(ordered.len()) {
            Some((start, end)) => {
                ordered.truncate(end);
                ordered.drain(..start);
                ordered
            }
            None => Vec::new(),
        }
    }
}

/// A cached page
#[derive(Debug, Clone)]
pub struct CachedPage {
    /// Key this page was computed for
    pub key: PageKey,
    /// Records on the page, ascending by id
    pub items: Vec<Transaction>,
    /// Cache generation at compute time
    pub generation: u64,
}

/// Page cache configuration
#[derive(Debug, Clone)]
pub struct PageCacheConfig {
    /// Maximum cached pages; further pages are computed but not kept
    pub max_entries: usize,
}

impl Default for PageCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_PAGE_CACHE_ENTRIES,
        }
    }
}

/// Page cache statistics
#[derive(Debug, Clone, PartialEq)]
pub struct PageCacheStats {
    /// Cached pages
    pub entries: usize,
    /// Current generation
    pub generation: u64,
    /// Hit count
    pub hits: u64,
    /// Miss count
    pub misses: u64,
    /// Whole-cache invalidations
    pub invalidations: u64,
    /// Computed pages discarded because a write raced them
    pub stale_discards: u64,
    /// Hit ratio (0.0 - 1.0)
    pub hit_ratio: f64,
}

/// Explicit page cache with whole-cache invalidation
pub struct PageCache {
    entries: RwLock<HashMap<PageKey, Arc<CachedPage>>>,
    generation: AtomicU64,
    config: PageCacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    stale_discards: AtomicU64,
}

impl PageCache {
    /// Create a cache with default configuration
    pub fn new() -> Self {
        Self::with_config(PageCacheConfig::default())
    }

    /// Create a cache with custom configuration
    pub fn with_config(config: PageCacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            stale_discards: AtomicU64::new(0),
        }
    }

    /// Look up a cached page
    pub fn get(&self, key: &PageKey) -> Option<Arc<CachedPage>> {
        let found = self.entries.read().get(key).cloned();
        match found {
            Some(page) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                metrics::PAGE_CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
                Some(page)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                metrics::PAGE_CACHE_LOOKUPS.with_label_values(&["miss"]).inc();
                None
            }
        }
    }

    /// Return the cached page for `key`, computing it on a miss.
    ///
    /// `compute` runs without any cache lock held. Its result is cached only
    /// if no invalidation happened since the lookup started and the cache is
    /// below `max_entries`.
    pub fn get_or_compute<F>(&self, key: PageKey, compute: F) -> Arc<CachedPage>
    where
        F: FnOnce() -> Vec<Transaction>,
    {
        if let Some(page) = self.get(&key) {
            return page;
        }

        let generation = self.generation.load(Ordering::Acquire);
        let page = Arc::new(CachedPage {
            key,
            items: compute(),
            generation,
        });

        let mut entries = self.entries.write();
        if self.generation.load(Ordering::Acquire) != generation {
            // A write landed while we computed; serve it once, don't keep it
            self.stale_discards.fetch_add(1, Ordering::Relaxed);
            trace!(page = key.page, size = key.size, "discarding stale page");
            return page;
        }
        if let Some(existing) = entries.get(&key) {
            return Arc::clone(existing);
        }
        if entries.len() < self.config.max_entries {
            entries.insert(key, Arc::clone(&page));
        }
        page
    }

    /// Fallible variant used by the store: rejects a zero page size
    pub fn try_get_or_compute<F>(&self, key: PageKey, compute: F) -> Result<Arc<CachedPage>>
    where
        F: FnOnce() -> Vec<Transaction>,
    {
        if key.size == 0 {
            return Err(Error::Validation(
                "Page size must be greater than zero".to_string(),
            ));
        }
        Ok(self.get_or_compute(key, compute))
    }

    /// Drop every cached page
    pub fn invalidate_all(&self) {
        let mut entries = self.entries.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.clear();
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        metrics::PAGE_CACHE_INVALIDATIONS.inc();
    }

    /// Number of cached pages
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Check if a page is cached, without touching hit counters
    pub fn contains(&self, key: &PageKey) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Current generation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Get cache statistics
    pub fn stats(&self) -> PageCacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        PageCacheStats {
            entries: self.len(),
            generation: self.generation(),
            hits,
            misses,
            invalidations: self.invalidations.load(Ordering::Relaxed),
            stale_discards: self.stale_discards.load(Ordering::Relaxed),
            hit_ratio: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn records(n: usize) -> Vec<Transaction> {
        (0..n)
            .map(|i| Transaction::new(format!("{:03}", i), "item", i as f64))
            .collect()
    }

    #[test]
    fn test_bounds() {
        assert_eq!(PageKey::new(0, 10).bounds(15), Some((0, 10)));
        assert_eq!(PageKey::new(1, 10).bounds(15), Some((10, 15)));
        assert_eq!(PageKey::new(2, 10).bounds(15), None);
        assert_eq!(PageKey::new(0, 10).bounds(0), None);
        // No overflow on absurd page numbers
        assert_eq!(PageKey::new(usize::MAX, 10).bounds(15), None);
        assert_eq!(PageKey::new(1, usize::MAX).bounds(15), None);
    }

    #[test]
    fn test_slice() {
        let page = PageKey::new(1, 4).slice(records(10));
        let ids: Vec<_> = page.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["004", "005", "006", "007"]);

        assert!(PageKey::new(3, 4).slice(records(10)).is_empty());
        assert_eq!(PageKey::new(2, 4).slice(records(10)).len(), 2);
    }

    #[test]
    fn test_get_or_compute_caches() {
        let cache = PageCache::new();
        let key = PageKey::new(0, 5);

        let first = cache.get_or_compute(key, || records(5));
        assert_eq!(first.items.len(), 5);
        assert!(cache.contains(&key));

        let second = cache.get_or_compute(key, || panic!("should hit the cache"));
        assert!(Arc::ptr_eq(&first, &second));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_ratio, 0.5);
    }

    #[test]
    fn test_invalidate_all_clears_every_key() {
        let cache = PageCache::new();
        cache.get_or_compute(PageKey::new(0, 5), || records(5));
        cache.get_or_compute(PageKey::new(1, 5), || records(5));
        cache.get_or_compute(PageKey::new(0, 20), || records(5));
        assert_eq!(cache.len(), 3);

        cache.invalidate_all();
        assert!(cache.is_empty());
        assert_eq!(cache.generation(), 1);
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn test_page_computed_across_invalidation_is_not_kept() {
        let cache = PageCache::new();
        let key = PageKey::new(0, 5);

        let page = cache.get_or_compute(key, || {
            // a write completes while the page is being built
            cache.invalidate_all();
            records(5)
        });

        assert_eq!(page.items.len(), 5);
        assert!(!cache.contains(&key));
        assert_eq!(cache.stats().stale_discards, 1);
    }

    #[test]
    fn test_max_entries_bound() {
        let cache = PageCache::with_config(PageCacheConfig { max_entries: 2 });
        for page in 0..5 {
            cache.get_or_compute(PageKey::new(page, 1), || records(1));
        }
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_zero_size_rejected() {
        let cache = PageCache::new();
        let result = cache.try_get_or_compute(PageKey::new(0, 0), Vec::new);
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(cache.is_empty());
    }
}
