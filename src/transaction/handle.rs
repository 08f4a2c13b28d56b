//! Transaction handle.

use log::debug;

use super::id::TransactionId;
use super::state::TransactionState;
use crate::storage::error::StorageResult;
use crate::storage::page::PageId;
use crate::storage::pager::Pager;

/// A logged write waiting for commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingWrite {
    pub page_id: PageId,
    pub offset: usize,
    pub data: Vec<u8>,
}

/// An open transaction on a [`Pager`].
///
/// Dropping an active transaction rolls it back.
pub struct Transaction<'a> {
    pager: &'a Pager,
    id: TransactionId,
    state: TransactionState,
    writes: Vec<PendingWrite>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(pager: &'a Pager, id: TransactionId) -> Self {
        Self {
            pager,
            id,
            state: TransactionState::Active,
            writes: Vec::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Logs a write of `data` at `offset` in the page body.
    ///
    /// The page itself is untouched until commit.
    pub fn write(&mut self, page_id: PageId, offset: usize, data: &[u8]) -> StorageResult<()> {
        let (page_type, mut before) = self.pager.page_region(page_id, offset, data.len())?;
        overlay(&mut before, page_id, offset, &self.writes);
        self.pager
            .log_write(self.id, page_id, page_type, offset, before, data.to_vec())?;
        self.writes.push(PendingWrite {
            page_id,
            offset,
            data: data.to_vec(),
        });
        Ok(())
    }

    /// Reads a body region as this transaction sees it, own writes included.
    pub fn read(&self, page_id: PageId, offset: usize, len: usize) -> StorageResult<Vec<u8>> {
        let (_, mut region) = self.pager.page_region(page_id, offset, len)?;
        overlay(&mut region, page_id, offset, &self.writes);
        Ok(region)
    }

    /// Makes every write durable and visible.
    pub fn commit(mut self) -> StorageResult<()> {
        self.pager.commit_transaction(self.id, &self.writes)?;
        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Discards every write. The WAL keeps the entries but no Commit.
    pub fn rollback(mut self) {
        self.discard();
    }

    fn discard(&mut self) {
        debug!("rolled back {} ({} writes)", self.id, self.writes.len());
        self.writes.clear();
        self.state = TransactionState::RolledBack;
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state.is_active() {
            self.discard();
        }
        self.pager.end_transaction();
    }
}

/// Copies the parts of `writes` that overlap `region` into it, oldest first.
fn overlay(region: &mut [u8], page_id: PageId, offset: usize, writes: &[PendingWrite]) {
    let end = offset + region.len();
    for write in writes.iter().filter(|w| w.page_id == page_id) {
        let write_end = write.offset + write.data.len();
        let start = offset.max(write.offset);
        let stop = end.min(write_end);
        if start >= stop {
            continue;
        }
        region[start - offset..stop - offset]
            .copy_from_slice(&write.data[start - write.offset..stop - write.offset]);
    }
}
