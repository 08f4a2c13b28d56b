//! The pager: page allocation, caching and persistence for one data file.
//!
//! Lock order is `state` → `wal` → `data_file`. Nothing acquires `state`
//! while holding either mutex.

mod free_list;

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::config::PagerConfig;
use crate::recovery::{RecoveryStats, RedoPlan};
use crate::storage::buffer::{CacheStats, PageCache, PageSink};
use crate::storage::disk::{DataFile, FileHeader};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{Page, PageId, PageType};
use crate::storage::wal::{WalEntry, WriteAheadLog};
use crate::transaction::{PendingWrite, Transaction, TransactionId, TransactionIdGenerator};
use free_list::FreeList;

/// Point-in-time view of pager internals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagerStats {
    pub cache: CacheStats,
    pub cached_pages: usize,
    pub dirty_pages: usize,
    pub capacity: usize,
    pub next_page_id: PageId,
    pub free_pages: usize,
    pub active_transactions: usize,
}

struct PagerState {
    cache: PageCache,
    /// Allocation bound: every id below it has been handed out.
    next_page_id: PageId,
    free_list: FreeList,
}

impl PagerState {
    fn check_live(&self, page_id: PageId) -> StorageResult<()> {
        if !page_id.is_valid() || page_id >= self.next_page_id {
            return Err(StorageError::OutOfRange {
                page_id,
                bound: self.next_page_id,
            });
        }
        if self.free_list.contains(page_id) {
            return Err(StorageError::PageFreed(page_id));
        }
        Ok(())
    }

    fn file_header(&self) -> FileHeader {
        let mut header = FileHeader::new();
        header.next_page_id = self.next_page_id;
        header.free_list_head = self.free_list.head();
        header.free_count = self.free_list.len() as u64;
        header
    }
}

/// Writes evicted dirty pages, flushing the WAL first.
struct WriteBack<'a> {
    wal: &'a Mutex<WriteAheadLog>,
    data_file: &'a Mutex<DataFile>,
}

impl PageSink for WriteBack<'_> {
    fn write_back(&mut self, page: &Page) -> StorageResult<()> {
        self.wal.lock().flush()?;
        self.data_file.lock().write_page(page)
    }
}

/// Page store over a single data file and its write-ahead log.
pub struct Pager {
    config: PagerConfig,
    state: RwLock<PagerState>,
    data_file: Mutex<DataFile>,
    wal: Mutex<WriteAheadLog>,
    txn_ids: TransactionIdGenerator,
    active_txns: AtomicUsize,
    closed: AtomicBool,
    recovery: RecoveryStats,
}

impl Pager {
    /// Opens or creates the data file and recovers committed WAL state.
    pub fn open(config: PagerConfig) -> StorageResult<Self> {
        config.validate()?;

        let mut data_file = DataFile::open(&config.file_path, config.read_only)?;
        let mut wal = WriteAheadLog::new(config.wal_path(), config.sync_on_commit);
        let txn_ids = TransactionIdGenerator::new();

        let header = if data_file.slot_count()? == 0 {
            let header = FileHeader::new();
            if !config.read_only {
                data_file.write_page(&header.to_page()?)?;
                data_file.sync()?;
                info!("initialized data file {}", config.file_path.display());
            }
            header
        } else {
            FileHeader::from_page(&data_file.read_page(PageId::INVALID)?)?
        };

        let (recovery, redo_bound) = if config.read_only {
            let pending = wal.replay()?.len();
            if pending > 0 {
                warn!(
                    "read-only open skips recovery of {} WAL entries in {}",
                    pending,
                    wal.path().display()
                );
            }
            (RecoveryStats::default(), PageId::FIRST)
        } else {
            recover(&mut data_file, &mut wal, &txn_ids)?
        };

        let next_page_id = header
            .next_page_id
            .max(PageId(data_file.slot_count()?))
            .max(redo_bound)
            .max(PageId::FIRST);
        let free_list = load_free_list(
            &mut data_file,
            header.free_list_head,
            next_page_id,
            &recovery.reclaimed,
        );

        info!(
            "opened pager on {} ({} pages allocated, {} free)",
            config.file_path.display(),
            next_page_id.0 - 1,
            free_list.len()
        );

        Ok(Pager {
            state: RwLock::new(PagerState {
                cache: PageCache::new(config.max_cache_size),
                next_page_id,
                free_list,
            }),
            data_file: Mutex::new(data_file),
            wal: Mutex::new(wal),
            txn_ids,
            active_txns: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            recovery,
            config,
        })
    }

    pub fn config(&self) -> &PagerConfig {
        &self.config
    }

    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    /// What recovery did when this pager was opened.
    pub fn recovery_stats(&self) -> &RecoveryStats {
        &self.recovery
    }

    /// Runs `f` against a borrowed page, loading it into the cache on a miss.
    ///
    /// `f` runs with the pager's state lock held. It must not call back into
    /// this pager: a writer queued on the lock would deadlock against it.
    pub fn with_page<R>(&self, page_id: PageId, f: impl FnOnce(&Page) -> R) -> StorageResult<R> {
        self.ensure_open()?;
        {
            let state = self.state.read();
            state.check_live(page_id)?;
            if let Some(page) = state.cache.get(page_id) {
                return Ok(f(page));
            }
        }

        let mut state = self.state.write();
        state.check_live(page_id)?;
        let page = self.load_locked(&mut state, page_id)?;
        Ok(f(page))
    }

    /// Returns a copy of the page.
    pub fn read_page(&self, page_id: PageId) -> StorageResult<Page> {
        self.with_page(page_id, Page::clone)
    }

    /// Hands out a fresh zeroed page, reusing a freed id when one exists.
    pub fn allocate_page(&self, page_type: PageType) -> StorageResult<Page> {
        self.ensure_writable("allocate_page")?;
        let mut state = self.state.write();

        let recycled = state.free_list.pop();
        let page_id = recycled.unwrap_or(state.next_page_id);
        let mut page = Page::new(page_id, page_type);
        page.mark_dirty();

        if let Err(e) = state.cache.put(page.clone(), &mut self.write_back()) {
            if let Some(page_id) = recycled {
                state.free_list.push(page_id);
            }
            return Err(e);
        }
        if recycled.is_none() {
            state.next_page_id = page_id.next();
        }

        debug!("allocated {} page {}", page_type, page_id);
        Ok(page)
    }

    /// Replaces the cached copy of a page and marks it dirty.
    ///
    /// Durability is the caller's concern; use [`Pager::begin`] to have the
    /// change logged first.
    pub fn write_page(&self, mut page: Page) -> StorageResult<()> {
        self.ensure_writable("write_page")?;
        let mut state = self.state.write();
        state.check_live(page.id())?;

        page.seal();
        page.mark_dirty();
        state.cache.put(page, &mut self.write_back())?;
        Ok(())
    }

    /// Writes one page if it is cached and dirty.
    pub fn flush_page(&self, page_id: PageId) -> StorageResult<()> {
        self.ensure_open()?;
        if self.config.read_only {
            return Ok(());
        }
        let mut state = self.state.write();
        state.check_live(page_id)?;

        let Some(page) = state.cache.peek(page_id).filter(|page| page.is_dirty()) else {
            return Ok(());
        };
        self.wal.lock().flush()?;
        self.data_file.lock().write_page(page)?;
        state.cache.mark_clean(page_id);
        debug!("flushed page {}", page_id);
        Ok(())
    }

    /// Flushes the WAL, then every dirty page, free stub and the file header.
    pub fn flush_all(&self) -> StorageResult<()> {
        self.ensure_open()?;
        if self.config.read_only {
            return Ok(());
        }
        let mut state = self.state.write();
        self.flush_locked(&mut state)
    }

    /// Returns a page to the free list. Its cached copy is dropped unwritten.
    pub fn deallocate_page(&self, page_id: PageId) -> StorageResult<()> {
        self.ensure_writable("deallocate_page")?;
        let mut state = self.state.write();
        state.check_live(page_id)?;

        state.cache.remove(page_id);
        state.free_list.push(page_id);
        debug!("deallocated page {}", page_id);
        Ok(())
    }

    /// Flushes everything and truncates the WAL when no transaction is open.
    ///
    /// Returns whether the WAL was truncated.
    pub fn checkpoint(&self) -> StorageResult<bool> {
        self.ensure_writable("checkpoint")?;
        let mut state = self.state.write();
        self.flush_locked(&mut state)?;
        self.truncate_wal_if_idle()
    }

    /// Flushes all dirty state and releases both files.
    ///
    /// On a flush failure the pager stays open so the call can be retried.
    pub fn close(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut state = self.state.write();
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }

        if !self.config.read_only {
            self.flush_locked(&mut state)?;
            self.truncate_wal_if_idle()?;
        }
        self.closed.store(true, Ordering::Release);

        let wal_result = self.wal.lock().close();
        let file_result = self.data_file.lock().close();
        state.cache = PageCache::new(self.config.max_cache_size);
        wal_result?;
        file_result?;

        info!("closed pager on {}", self.config.file_path.display());
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Starts a transaction whose writes are logged before they are applied.
    pub fn begin(&self) -> StorageResult<Transaction<'_>> {
        self.ensure_writable("begin")?;
        let _wal = self.wal.lock();
        self.active_txns.fetch_add(1, Ordering::SeqCst);
        let txn_id = self.txn_ids.next();
        debug!("began {}", txn_id);
        Ok(Transaction::new(self, txn_id))
    }

    pub fn stats(&self) -> PagerStats {
        let state = self.state.read();
        PagerStats {
            cache: state.cache.stats(),
            cached_pages: state.cache.size(),
            dirty_pages: state.cache.dirty_page_ids().len(),
            capacity: state.cache.capacity(),
            next_page_id: state.next_page_id,
            free_pages: state.free_list.len(),
            active_transactions: self.active_txns.load(Ordering::SeqCst),
        }
    }

    /// Number of ids handed out so far, free ones included.
    pub fn page_count(&self) -> u64 {
        self.state.read().next_page_id.0 - 1
    }

    pub fn is_free(&self, page_id: PageId) -> bool {
        self.state.read().free_list.contains(page_id)
    }

    pub fn cached_page_ids(&self) -> Vec<PageId> {
        self.state.read().cache.page_ids()
    }

    /// Decodes a page straight from the data file, bypassing the cache.
    pub fn verify_page(&self, page_id: PageId) -> StorageResult<Page> {
        self.ensure_open()?;
        self.state.read().check_live(page_id)?;
        self.data_file.lock().read_page(page_id)
    }

    /// Logs one write for `txn_id`; `before` is the region's current contents.
    pub(crate) fn log_write(
        &self,
        txn_id: TransactionId,
        page_id: PageId,
        page_type: PageType,
        offset: usize,
        before: Vec<u8>,
        after: Vec<u8>,
    ) -> StorageResult<()> {
        self.ensure_open()?;
        let offset = u32::try_from(offset).map_err(|_| StorageError::InvalidWrite {
            offset,
            len: after.len(),
        })?;
        let entry = WalEntry::write(txn_id, page_id, offset, before, after)?.with_page_type(page_type);
        self.wal.lock().append(&entry)
    }

    /// The page's type and a copy of one body region.
    pub(crate) fn page_region(
        &self,
        page_id: PageId,
        offset: usize,
        len: usize,
    ) -> StorageResult<(PageType, Vec<u8>)> {
        self.with_page(page_id, |page| -> StorageResult<(PageType, Vec<u8>)> {
            let region = page.read(offset, len)?.to_vec();
            Ok((page.page_type(), region))
        })?
    }

    /// Makes a transaction durable, then applies its writes to the cache.
    ///
    /// The state lock is held from the Commit append through the apply, so
    /// the cache sees commits in the same order as the WAL.
    pub(crate) fn commit_transaction(
        &self,
        txn_id: TransactionId,
        writes: &[PendingWrite],
    ) -> StorageResult<()> {
        self.ensure_open()?;
        if writes.is_empty() {
            return Ok(());
        }
        let mut state = self.state.write();
        {
            let mut wal = self.wal.lock();
            wal.append(&WalEntry::commit(txn_id))?;
            wal.flush()?;
        }

        for write in writes {
            if state.check_live(write.page_id).is_err() {
                warn!(
                    "{} wrote page {} which is no longer allocated; skipping",
                    txn_id, write.page_id
                );
                continue;
            }
            let page = self.load_locked(&mut state, write.page_id)?;
            page.write(write.offset, &write.data)?;
        }
        debug!("committed {} ({} writes)", txn_id, writes.len());
        Ok(())
    }

    pub(crate) fn end_transaction(&self) {
        self.active_txns.fetch_sub(1, Ordering::SeqCst);
    }

    fn load_locked<'s>(&self, state: &'s mut PagerState, page_id: PageId) -> StorageResult<&'s mut Page> {
        if !state.cache.contains(page_id) {
            let page = self.data_file.lock().read_page(page_id)?;
            state.cache.put(page, &mut self.write_back())?;
        }
        state
            .cache
            .get_mut(page_id)
            .ok_or_else(|| StorageError::Cache(format!("page {} vanished after load", page_id)))
    }

    fn flush_locked(&self, state: &mut PagerState) -> StorageResult<()> {
        self.wal.lock().flush()?;

        let dirty = state.cache.dirty_page_ids();
        let stubs = state.free_list.stubs_to_write();
        {
            let mut data_file = self.data_file.lock();
            for page_id in &dirty {
                if let Some(page) = state.cache.peek(*page_id) {
                    data_file.write_page(page)?;
                }
            }
            for stub in &stubs {
                data_file.write_page(stub)?;
            }
            data_file.write_page(&state.file_header().to_page()?)?;
            data_file.sync()?;
        }

        for page_id in &dirty {
            state.cache.mark_clean(*page_id);
        }
        state.free_list.mark_persisted();
        if !dirty.is_empty() || !stubs.is_empty() {
            debug!("flushed {} pages and {} free stubs", dirty.len(), stubs.len());
        }
        Ok(())
    }

    fn truncate_wal_if_idle(&self) -> StorageResult<bool> {
        let mut wal = self.wal.lock();
        if self.active_txns.load(Ordering::SeqCst) > 0 {
            debug!("keeping WAL: transactions still active");
            return Ok(false);
        }
        wal.reset()?;
        Ok(true)
    }

    fn write_back(&self) -> WriteBack<'_> {
        WriteBack {
            wal: &self.wal,
            data_file: &self.data_file,
        }
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed("pager"));
        }
        Ok(())
    }

    fn ensure_writable(&self, op: &'static str) -> StorageResult<()> {
        self.ensure_open()?;
        if self.config.read_only {
            return Err(StorageError::ReadOnly { op });
        }
        Ok(())
    }
}

impl Drop for Pager {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(
                "failed to close pager on {}: {}",
                self.config.file_path.display(),
                e
            );
        }
    }
}

/// Redoes committed WAL transactions against the data file, then empties
/// the log. Returns the stats and the lowest id redo left untouched.
fn recover(
    data_file: &mut DataFile,
    wal: &mut WriteAheadLog,
    txn_ids: &TransactionIdGenerator,
) -> StorageResult<(RecoveryStats, PageId)> {
    let entries = wal.replay()?;
    if entries.is_empty() {
        return Ok((RecoveryStats::default(), PageId::FIRST));
    }

    let plan = RedoPlan::build(entries);
    if let Some(max) = plan.max_txn_id() {
        txn_ids.advance_past(max);
    }
    let redo_bound = plan
        .touched_pages()
        .last()
        .map_or(PageId::FIRST, |page_id| page_id.next());

    let stats = plan.apply(data_file)?;
    data_file.sync()?;
    wal.reset()?;
    Ok((stats, redo_bound))
}

/// Walks the persisted free chain, stopping at the first inconsistency.
///
/// Entries that recovery handed back to a committed write are skipped; the
/// chain continues at the successor their stub recorded.
fn load_free_list(
    data_file: &mut DataFile,
    head: PageId,
    bound: PageId,
    reclaimed: &BTreeMap<PageId, PageId>,
) -> FreeList {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor = head;

    while cursor.is_valid() {
        if cursor >= bound || !seen.insert(cursor) {
            warn!("free list entry {} is out of range or repeated; truncating", cursor);
            break;
        }
        if let Some(&next) = reclaimed.get(&cursor) {
            debug!("free list entry {} was reallocated before the crash", cursor);
            cursor = next;
            continue;
        }
        match data_file.read_page(cursor) {
            Ok(page) if page.is_free() => {
                chain.push(cursor);
                cursor = page.header().next_page_id;
            }
            Ok(_) => {
                warn!("free list entry {} was reused; truncating", cursor);
                break;
            }
            Err(e) => {
                warn!("free list entry {} unreadable ({}); truncating", cursor, e);
                break;
            }
        }
    }

    FreeList::from_chain(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_pager(cache_size: usize) -> (Pager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = PagerConfig::new(temp_dir.path().join("test.db"))
            .with_cache_size(cache_size)
            .with_sync_on_commit(false);
        let pager = Pager::open(config).unwrap();
        (pager, temp_dir)
    }

    fn reopen(temp_dir: &TempDir, cache_size: usize) -> Pager {
        let config = PagerConfig::new(temp_dir.path().join("test.db"))
            .with_cache_size(cache_size)
            .with_sync_on_commit(false);
        Pager::open(config).unwrap()
    }

    #[test]
    fn test_open_initializes_header() {
        let (pager, temp_dir) = create_test_pager(4);
        assert_eq!(pager.page_count(), 0);
        assert_eq!(pager.stats().next_page_id, PageId::FIRST);

        let len = std::fs::metadata(temp_dir.path().join("test.db")).unwrap().len();
        assert_eq!(len, crate::storage::page::PAGE_SIZE as u64);
    }

    #[test]
    fn test_allocation_is_monotonic() {
        let (pager, _temp_dir) = create_test_pager(8);
        let ids: Vec<PageId> = (0..3)
            .map(|_| pager.allocate_page(PageType::Data).unwrap().id())
            .collect();
        assert_eq!(ids, vec![PageId(1), PageId(2), PageId(3)]);
        assert!(pager.allocate_page(PageType::Index).unwrap().is_dirty());
        assert_eq!(pager.page_count(), 4);
    }

    #[test]
    fn test_out_of_range_reads() {
        let (pager, _temp_dir) = create_test_pager(4);
        pager.allocate_page(PageType::Data).unwrap();

        assert!(matches!(
            pager.read_page(PageId::INVALID),
            Err(StorageError::OutOfRange { .. })
        ));
        assert!(matches!(
            pager.read_page(PageId(2)),
            Err(StorageError::OutOfRange { page_id: PageId(2), bound: PageId(2) })
        ));
    }

    #[test]
    fn test_write_then_read() {
        let (pager, _temp_dir) = create_test_pager(4);
        let mut page = pager.allocate_page(PageType::Data).unwrap();
        page.write(10, b"payload").unwrap();
        pager.write_page(page).unwrap();

        let read = pager.read_page(PageId(1)).unwrap();
        assert_eq!(read.read(10, 7).unwrap(), b"payload");
        assert!(read.is_dirty());
    }

    #[test]
    fn test_flush_page_clears_dirty() {
        let (pager, _temp_dir) = create_test_pager(4);
        let mut page = pager.allocate_page(PageType::Data).unwrap();
        page.write(0, b"x").unwrap();
        pager.write_page(page).unwrap();

        pager.flush_page(PageId(1)).unwrap();

        assert_eq!(pager.stats().dirty_pages, 0);
        assert_eq!(pager.verify_page(PageId(1)).unwrap().read(0, 1).unwrap(), b"x");
    }

    #[test]
    fn test_eviction_writes_back_dirty_pages() {
        let (pager, _temp_dir) = create_test_pager(2);
        for _ in 0..3 {
            pager.allocate_page(PageType::Data).unwrap();
        }

        assert_eq!(pager.cached_page_ids(), vec![PageId(2), PageId(3)]);
        let reloaded = pager.read_page(PageId(1)).unwrap();
        assert!(!reloaded.is_dirty());
        assert_eq!(pager.stats().cache.evictions, 2);
    }

    #[test]
    fn test_deallocate_and_reuse() {
        let (pager, _temp_dir) = create_test_pager(4);
        for _ in 0..3 {
            pager.allocate_page(PageType::Data).unwrap();
        }

        pager.deallocate_page(PageId(2)).unwrap();
        assert!(pager.is_free(PageId(2)));
        assert!(matches!(pager.read_page(PageId(2)), Err(StorageError::PageFreed(PageId(2)))));
        assert!(matches!(
            pager.deallocate_page(PageId(2)),
            Err(StorageError::PageFreed(_))
        ));

        let reused = pager.allocate_page(PageType::Overflow).unwrap();
        assert_eq!(reused.id(), PageId(2));
        assert_eq!(reused.page_type(), PageType::Overflow);
        assert_eq!(pager.page_count(), 3);
    }

    #[test]
    fn test_free_list_survives_reopen() {
        let (pager, temp_dir) = create_test_pager(4);
        for _ in 0..4 {
            pager.allocate_page(PageType::Data).unwrap();
        }
        pager.deallocate_page(PageId(1)).unwrap();
        pager.deallocate_page(PageId(3)).unwrap();
        pager.close().unwrap();
        drop(pager);

        let pager = reopen(&temp_dir, 4);
        assert_eq!(pager.page_count(), 4);
        assert!(pager.is_free(PageId(1)));
        assert!(pager.is_free(PageId(3)));
        assert_eq!(pager.allocate_page(PageType::Data).unwrap().id(), PageId(3));
        assert_eq!(pager.allocate_page(PageType::Data).unwrap().id(), PageId(1));
        assert_eq!(pager.allocate_page(PageType::Data).unwrap().id(), PageId(5));
    }

    #[test]
    fn test_transaction_applies_on_commit() {
        let (pager, _temp_dir) = create_test_pager(4);
        pager.allocate_page(PageType::Data).unwrap();

        let mut txn = pager.begin().unwrap();
        txn.write(PageId(1), 0, b"abc").unwrap();
        assert_eq!(txn.read(PageId(1), 0, 3).unwrap(), b"abc");
        assert_eq!(pager.read_page(PageId(1)).unwrap().read(0, 3).unwrap(), [0, 0, 0]);
        assert_eq!(pager.stats().active_transactions, 1);

        txn.commit().unwrap();

        assert_eq!(pager.read_page(PageId(1)).unwrap().read(0, 3).unwrap(), b"abc");
        assert_eq!(pager.stats().active_transactions, 0);
    }

    #[test]
    fn test_rollback_discards_writes() {
        let (pager, _temp_dir) = create_test_pager(4);
        pager.allocate_page(PageType::Data).unwrap();

        let mut txn = pager.begin().unwrap();
        txn.write(PageId(1), 0, b"gone").unwrap();
        txn.rollback();

        assert_eq!(pager.read_page(PageId(1)).unwrap().read(0, 4).unwrap(), [0; 4]);
        assert_eq!(pager.stats().active_transactions, 0);
    }

    #[test]
    fn test_checkpoint_truncates_wal() {
        let (pager, temp_dir) = create_test_pager(4);
        pager.allocate_page(PageType::Data).unwrap();
        let mut txn = pager.begin().unwrap();
        txn.write(PageId(1), 0, b"cp").unwrap();
        txn.commit().unwrap();
        let wal_path = temp_dir.path().join("test.db.wal");
        assert!(std::fs::metadata(&wal_path).unwrap().len() > 0);

        assert!(pager.checkpoint().unwrap());

        assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), 0);
        assert_eq!(pager.stats().dirty_pages, 0);
    }

    #[test]
    fn test_checkpoint_keeps_wal_with_active_transaction() {
        let (pager, _temp_dir) = create_test_pager(4);
        pager.allocate_page(PageType::Data).unwrap();
        let mut txn = pager.begin().unwrap();
        txn.write(PageId(1), 0, b"open").unwrap();

        assert!(!pager.checkpoint().unwrap());
        drop(txn);
        assert!(pager.checkpoint().unwrap());
    }

    #[test]
    fn test_failed_flush_keeps_pages_dirty_for_retry() {
        let (pager, temp_dir) = create_test_pager(4);
        let path = temp_dir.path().join("test.db");
        let mut page = pager.allocate_page(PageType::Data).unwrap();
        page.write(0, b"retry").unwrap();
        pager.write_page(page).unwrap();
        assert_eq!(pager.stats().dirty_pages, 1);

        // A handle without write access makes every page write fail
        *pager.data_file.lock() = DataFile::open(&path, true).unwrap();

        assert!(matches!(pager.flush_page(PageId(1)), Err(StorageError::ReadOnly { .. })));
        assert!(matches!(pager.flush_all(), Err(StorageError::ReadOnly { .. })));
        assert!(matches!(pager.close(), Err(StorageError::ReadOnly { .. })));
        assert!(!pager.is_closed());
        assert_eq!(pager.stats().dirty_pages, 1);
        assert_eq!(pager.read_page(PageId(1)).unwrap().read(0, 5).unwrap(), b"retry");

        *pager.data_file.lock() = DataFile::open(&path, false).unwrap();
        pager.close().unwrap();
        assert!(pager.is_closed());
        drop(pager);

        let pager = reopen(&temp_dir, 4);
        assert_eq!(pager.read_page(PageId(1)).unwrap().read(0, 5).unwrap(), b"retry");
    }

    #[test]
    fn test_closed_pager_rejects_calls() {
        let (pager, _temp_dir) = create_test_pager(4);
        pager.allocate_page(PageType::Data).unwrap();
        pager.close().unwrap();
        pager.close().unwrap();

        assert!(pager.is_closed());
        assert!(matches!(pager.read_page(PageId(1)), Err(StorageError::Closed(_))));
        assert!(matches!(
            pager.allocate_page(PageType::Data),
            Err(StorageError::Closed(_))
        ));
    }
}
