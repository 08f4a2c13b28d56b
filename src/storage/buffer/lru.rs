use std::collections::{BTreeMap, HashMap};

use super::replacer::Replacer;
use crate::storage::page::PageId;

#[derive(Debug, Default)]
pub struct LruReplacer {
    /// Logical clock, bumped on every access.
    clock: u64,
    /// Last access tick per page.
    last_access: HashMap<PageId, u64>,
    /// Ticks in ascending order (least recently used first).
    by_tick: BTreeMap<u64, PageId>,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            clock: 0,
            last_access: HashMap::with_capacity(capacity),
            by_tick: BTreeMap::new(),
        }
    }
}

impl Replacer for LruReplacer {
    fn record_access(&mut self, page_id: PageId) {
        if let Some(old_tick) = self.last_access.get(&page_id) {
            self.by_tick.remove(old_tick);
        }
        self.clock += 1;
        self.last_access.insert(page_id, self.clock);
        self.by_tick.insert(self.clock, page_id);
    }

    fn remove(&mut self, page_id: PageId) {
        if let Some(tick) = self.last_access.remove(&page_id) {
            self.by_tick.remove(&tick);
        }
    }

    fn eviction_order(&self) -> Vec<PageId> {
        self.by_tick.values().copied().collect()
    }

    fn size(&self) -> usize {
        self.last_access.len()
    }
}
