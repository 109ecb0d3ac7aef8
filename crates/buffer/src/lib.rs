//! LRU page cache layered over a [`PageStore`].
//!
//! Pages are immutable once allocated, so the cache never has to write back
//! or invalidate on update:
//! - `read` serves hits from memory and fills misses from the inner store
//! - `allocate` writes through and caches the new page
//! - `free` releases the page in the inner store and drops any cached copy
//!
//! # Example
//!
//! ```
//! use buffer::PageCache;
//! use storage::{MemStore, PageStore};
//!
//! let mut cache = PageCache::new(MemStore::new(), 16);
//! let pid = cache.allocate(b"hello").unwrap();
//!
//! let page = cache.read(pid).unwrap();
//! assert_eq!(&page.data[..5], b"hello");
//! assert_eq!(cache.stats().hits, 1);
//! ```

#[cfg(test)]
mod tests;

use common::{Config, DbResult, PageId};
use lru::LruCache;
use std::num::NonZeroUsize;
use storage::{Page, PageStore};
use tracing::trace;

/// Hit and miss counters for a [`PageCache`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Read-through page cache with LRU eviction.
#[derive(Debug)]
pub struct PageCache<S> {
    inner: S,
    cache: LruCache<PageId, Page>,
    stats: CacheStats,
}

impl<S: PageStore> PageCache<S> {
    /// Wrap `inner`, keeping at most `max_pages` pages resident.
    ///
    /// # Panics
    ///
    /// Panics if `max_pages` is 0.
    pub fn new(inner: S, max_pages: usize) -> Self {
        let capacity = NonZeroUsize::new(max_pages).expect("max_pages must be > 0");
        Self {
            inner,
            cache: LruCache::new(capacity),
            stats: CacheStats::default(),
        }
    }

    /// Wrap `inner` using `config.cache_pages` as the capacity.
    pub fn with_config(inner: S, config: &Config) -> Self {
        Self::new(inner, config.cache_pages)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Number of pages currently resident.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn contains(&self, pid: PageId) -> bool {
        self.cache.contains(&pid)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: PageStore> PageStore for PageCache<S> {
    fn read(&mut self, pid: PageId) -> DbResult<Page> {
        if let Some(page) = self.cache.get(&pid) {
            self.stats.hits += 1;
            return Ok(page.clone());
        }

        self.stats.misses += 1;
        let page = self.inner.read(pid)?;
        self.cache.put(pid, page.clone());
        Ok(page)
    }

    fn allocate(&mut self, data: &[u8]) -> DbResult<PageId> {
        let pid = self.inner.allocate(data)?;
        // Store the padded page so hits look exactly like inner reads.
        self.cache.put(pid, Page::from_bytes(pid, data)?);
        Ok(pid)
    }

    fn free(&mut self, pid: PageId) -> DbResult<()> {
        self.inner.free(pid)?;
        if self.cache.pop(&pid).is_some() {
            trace!(page = pid.0, "evicted freed page from cache");
        }
        Ok(())
    }
}
