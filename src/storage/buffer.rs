pub mod lru;
pub mod replacer;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use parking_lot::Mutex;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{Page, PageId};
use lru::LruReplacer;
use replacer::Replacer;

/// Destination for dirty pages forced out of the cache.
pub trait PageSink {
    fn write_back(&mut self, page: &Page) -> StorageResult<()>;
}

/// Counters for cache effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Bounded map from page id to page with LRU eviction.
///
/// Lookups take `&self` so they can run under a shared lock; recency is
/// tracked behind an internal mutex. Structural changes take `&mut self`.
pub struct PageCache {
    pages: HashMap<PageId, Page>,
    replacer: Mutex<Box<dyn Replacer>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl PageCache {
    pub fn new(capacity: usize) -> Self {
        Self::with_replacer(capacity, Box::new(LruReplacer::new(capacity)))
    }

    pub fn with_replacer(capacity: usize, replacer: Box<dyn Replacer>) -> Self {
        Self {
            pages: HashMap::with_capacity(capacity),
            replacer: Mutex::new(replacer),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Looks up a page, updating recency and hit/miss counters.
    pub fn get(&self, page_id: PageId) -> Option<&Page> {
        match self.pages.get(&page_id) {
            Some(page) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.replacer.lock().record_access(page_id);
                Some(page)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Looks up a page without touching recency or counters.
    pub fn peek(&self, page_id: PageId) -> Option<&Page> {
        self.pages.get(&page_id)
    }

    pub fn get_mut(&mut self, page_id: PageId) -> Option<&mut Page> {
        let page = self.pages.get_mut(&page_id)?;
        self.replacer.get_mut().record_access(page_id);
        Some(page)
    }

    /// Inserts or replaces a page, evicting first when the cache is full.
    ///
    /// Returns the id of the evicted page, if any. When every cached page
    /// is dirty the least recently used one is written through `sink`
    /// before it is dropped; if that write fails nothing changes.
    pub fn put(&mut self, page: Page, sink: &mut dyn PageSink) -> StorageResult<Option<PageId>> {
        let page_id = page.id();
        if let Some(slot) = self.pages.get_mut(&page_id) {
            *slot = page;
            self.replacer.get_mut().record_access(page_id);
            return Ok(None);
        }

        let evicted = if self.pages.len() >= self.capacity {
            Some(self.evict_one(sink)?)
        } else {
            None
        };

        self.pages.insert(page_id, page);
        self.replacer.get_mut().record_access(page_id);
        Ok(evicted)
    }

    /// Drops a page without writing it anywhere.
    pub fn remove(&mut self, page_id: PageId) -> Option<Page> {
        let page = self.pages.remove(&page_id)?;
        self.replacer.get_mut().remove(page_id);
        Some(page)
    }

    /// Clears the dirty flag after a successful write-back without
    /// touching recency.
    pub fn mark_clean(&mut self, page_id: PageId) -> bool {
        match self.pages.get_mut(&page_id) {
            Some(page) => {
                page.mark_clean();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.pages.contains_key(&page_id)
    }

    pub fn size(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached page ids in ascending order.
    pub fn page_ids(&self) -> Vec<PageId> {
        let mut ids: Vec<PageId> = self.pages.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Dirty page ids in ascending order.
    pub fn dirty_page_ids(&self) -> Vec<PageId> {
        let mut ids: Vec<PageId> = self
            .pages
            .values()
            .filter(|page| page.is_dirty())
            .map(|page| page.id())
            .collect();
        ids.sort();
        ids
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn evict_one(&mut self, sink: &mut dyn PageSink) -> StorageResult<PageId> {
        let order = self.replacer.get_mut().eviction_order();
        let victim = order
            .iter()
            .copied()
            .find(|id| self.pages.get(id).is_some_and(|page| !page.is_dirty()))
            .or_else(|| order.first().copied())
            .ok_or_else(|| StorageError::Cache("no page available for eviction".to_string()))?;

        let page = self.pages.get(&victim).ok_or_else(|| {
            StorageError::Cache(format!("replacer tracks page {} missing from cache", victim))
        })?;

        if page.is_dirty() {
            debug!("evicting dirty page {}, writing back first", victim);
            sink.write_back(page)?;
        } else {
            debug!("evicting clean page {}", victim);
        }

        self.pages.remove(&victim);
        self.replacer.get_mut().remove(victim);
        self.evictions.fetch_add(1, Ordering::Relaxed);
        Ok(victim)
    }
}
