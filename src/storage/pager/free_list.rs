//! Deallocated page ids awaiting reuse.
//!
//! Free pages are threaded through their own slots: each one is overwritten
//! by a stub page flagged free whose `next_page_id` points at the entry
//! below it. The file header records the top of the chain.

use std::collections::HashSet;

use crate::storage::page::{Page, PageId};

/// LIFO stack of free page ids.
#[derive(Debug, Default)]
pub(crate) struct FreeList {
    /// Bottom first; the last element is the head.
    stack: Vec<PageId>,
    members: HashSet<PageId>,
    /// Entries whose stub has not been written to the data file yet.
    unpersisted: HashSet<PageId>,
}

impl FreeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the list from a chain read off disk, head first.
    pub fn from_chain(chain: Vec<PageId>) -> Self {
        let members = chain.iter().copied().collect();
        let mut stack = chain;
        stack.reverse();
        Self {
            stack,
            members,
            unpersisted: HashSet::new(),
        }
    }

    /// Returns false if the id is already free.
    pub fn push(&mut self, page_id: PageId) -> bool {
        if !self.members.insert(page_id) {
            return false;
        }
        self.stack.push(page_id);
        self.unpersisted.insert(page_id);
        true
    }

    pub fn pop(&mut self) -> Option<PageId> {
        let page_id = self.stack.pop()?;
        self.members.remove(&page_id);
        self.unpersisted.remove(&page_id);
        Some(page_id)
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.members.contains(&page_id)
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Top of the chain, `PageId::INVALID` when empty.
    pub fn head(&self) -> PageId {
        self.stack.last().copied().unwrap_or(PageId::INVALID)
    }

    /// Stub pages that still need writing, each linked to the entry below it.
    pub fn stubs_to_write(&self) -> Vec<Page> {
        self.stack
            .iter()
            .enumerate()
            .filter(|(_, page_id)| self.unpersisted.contains(page_id))
            .map(|(i, &page_id)| {
                let next = if i == 0 { PageId::INVALID } else { self.stack[i - 1] };
                Page::free_stub(page_id, next)
            })
            .collect()
    }

    pub fn mark_persisted(&mut self) {
        self.unpersisted.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifo_reuse() {
        let mut free_list = FreeList::new();
        assert_eq!(free_list.head(), PageId::INVALID);
        assert!(free_list.push(PageId(3)));
        assert!(free_list.push(PageId(5)));
        assert!(!free_list.push(PageId(3)));

        assert_eq!(free_list.len(), 2);
        assert_eq!(free_list.head(), PageId(5));
        assert_eq!(free_list.pop(), Some(PageId(5)));
        assert_eq!(free_list.pop(), Some(PageId(3)));
        assert_eq!(free_list.pop(), None);
        assert!(free_list.is_empty());
    }

    #[test]
    fn test_stubs_link_downwards() {
        let mut free_list = FreeList::from_chain(vec![PageId(4), PageId(2)]);
        assert!(free_list.stubs_to_write().is_empty());

        free_list.push(PageId(9));
        let stubs = free_list.stubs_to_write();
        assert_eq!(stubs.len(), 1);
        assert_eq!(stubs[0].id(), PageId(9));
        assert_eq!(stubs[0].header().next_page_id, PageId(4));
        assert!(stubs[0].is_free());

        free_list.mark_persisted();
        assert!(free_list.stubs_to_write().is_empty());
    }

    #[test]
    fn test_chain_order_restored() {
        let mut free_list = FreeList::from_chain(vec![PageId(7), PageId(1)]);
        assert_eq!(free_list.head(), PageId(7));
        assert!(free_list.contains(PageId(1)));
        assert_eq!(free_list.pop(), Some(PageId(7)));
        assert_eq!(free_list.head(), PageId(1));
    }

    #[test]
    fn test_popped_before_flush_needs_no_stub() {
        let mut free_list = FreeList::new();
        free_list.push(PageId(6));
        free_list.pop();
        assert!(free_list.stubs_to_write().is_empty());
    }
}
