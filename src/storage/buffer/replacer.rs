use std::fmt::Debug;

use crate::storage::page::PageId;

/// Recency bookkeeping for the page cache.
pub trait Replacer: Send + Sync + Debug {
    /// Mark a page as just used.
    fn record_access(&mut self, page_id: PageId);

    /// Stop tracking a page.
    fn remove(&mut self, page_id: PageId);

    /// Tracked pages, least recently used first.
    fn eviction_order(&self) -> Vec<PageId>;

    /// Get the number of tracked pages.
    fn size(&self) -> usize;
}
