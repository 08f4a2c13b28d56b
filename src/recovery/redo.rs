use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;

use log::{debug, info, warn};

use crate::storage::disk::DataFile;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{Page, PageId, PageType};
use crate::storage::wal::WalEntry;
use crate::transaction::TransactionId;

/// Outcome of a recovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Number of WAL entries read.
    pub entries_replayed: usize,
    /// Transactions whose writes were redone.
    pub committed_transactions: usize,
    /// Transactions ignored for lack of a Commit entry.
    pub discarded_transactions: usize,
    /// Write entries applied to pages.
    pub writes_applied: usize,
    /// Target pages rebuilt from scratch because their slot was unreadable
    /// or held an image older than the page's allocation.
    pub pages_rebuilt: usize,
    /// Free-list stubs overwritten by committed writes, each mapped to the
    /// next entry of the on-disk free chain.
    pub reclaimed: BTreeMap<PageId, PageId>,
}

/// A transaction whose Commit entry was found, with its writes in log order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedTransaction {
    pub txn_id: TransactionId,
    pub writes: Vec<WalEntry>,
}

/// The committed subset of a replayed log.
#[derive(Debug, Default)]
pub struct RedoPlan {
    committed: Vec<CommittedTransaction>,
    discarded: Vec<TransactionId>,
    max_txn_id: Option<TransactionId>,
    entries_replayed: usize,
}

impl RedoPlan {
    /// Groups entries by transaction, keeping only committed groups.
    pub fn build(entries: Vec<WalEntry>) -> Self {
        let entries_replayed = entries.len();
        let mut pending: HashMap<TransactionId, Vec<WalEntry>> = HashMap::new();
        let mut committed = Vec::new();
        let mut max_txn_id = None;

        for entry in entries {
            max_txn_id = max_txn_id.max(Some(entry.txn_id));
            if entry.is_commit() {
                let writes = pending.remove(&entry.txn_id).unwrap_or_default();
                committed.push(CommittedTransaction {
                    txn_id: entry.txn_id,
                    writes,
                });
            } else {
                pending.entry(entry.txn_id).or_default().push(entry);
            }
        }

        let mut discarded: Vec<TransactionId> = pending.into_keys().collect();
        discarded.sort();

        RedoPlan {
            committed,
            discarded,
            max_txn_id,
            entries_replayed,
        }
    }

    pub fn committed(&self) -> &[CommittedTransaction] {
        &self.committed
    }

    pub fn discarded(&self) -> &[TransactionId] {
        &self.discarded
    }

    /// Highest transaction id seen in the log, committed or not.
    pub fn max_txn_id(&self) -> Option<TransactionId> {
        self.max_txn_id
    }

    /// Committed writes in the order they must be applied.
    pub fn writes(&self) -> impl Iterator<Item = &WalEntry> {
        self.committed.iter().flat_map(|txn| txn.writes.iter())
    }

    pub fn touched_pages(&self) -> BTreeSet<PageId> {
        self.writes().map(|entry| entry.page_id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.writes().next().is_none()
    }

    /// Applies every committed write to the data file.
    ///
    /// Redo is idempotent: each write stores its after-image, so running
    /// the same plan twice leaves the same bytes. The caller syncs.
    pub fn apply(&self, data_file: &mut DataFile) -> StorageResult<RecoveryStats> {
        let mut stats = RecoveryStats {
            entries_replayed: self.entries_replayed,
            committed_transactions: self.committed.len(),
            discarded_transactions: self.discarded.len(),
            ..Default::default()
        };

        for txn_id in &self.discarded {
            debug!("discarding uncommitted {}", txn_id);
        }

        let mut pages: BTreeMap<PageId, Page> = BTreeMap::new();
        for entry in self.writes() {
            if !entry.page_id.is_valid() {
                warn!("skipping {} write to reserved page 0", entry.txn_id);
                continue;
            }
            if !pages.contains_key(&entry.page_id) {
                let page = load_or_rebuild(data_file, entry, &mut stats)?;
                pages.insert(entry.page_id, page);
            }
            if let Some(page) = pages.get_mut(&entry.page_id) {
                page.write(entry.offset as usize, &entry.new_data)?;
                stats.writes_applied += 1;
            }
        }

        for page in pages.values() {
            data_file.write_page(page)?;
        }

        info!(
            "recovery redid {} writes from {} committed transactions ({} discarded)",
            stats.writes_applied, stats.committed_transactions, stats.discarded_transactions
        );
        Ok(stats)
    }
}

/// Loads the first write's target page.
///
/// A page allocated after the last flush has no usable image on disk: its
/// slot is missing, holds a free-list stub, or holds an earlier page of
/// another type. Those are rebuilt zeroed with the logged type, which is
/// what allocation produced.
fn load_or_rebuild(
    data_file: &mut DataFile,
    entry: &WalEntry,
    stats: &mut RecoveryStats,
) -> StorageResult<Page> {
    let page_id = entry.page_id;
    match data_file.read_page(page_id) {
        Ok(page) if page.is_free() => {
            debug!("page {} was reallocated from the free list", page_id);
            stats.reclaimed.insert(page_id, page.header().next_page_id);
            stats.pages_rebuilt += 1;
            Ok(Page::new(page_id, entry.page_type))
        }
        Ok(page) if page.page_type() != entry.page_type => {
            warn!(
                "page {} is a {} page on disk but was logged as {}; rebuilding",
                page_id,
                page.page_type(),
                entry.page_type
            );
            stats.pages_rebuilt += 1;
            Ok(Page::new(page_id, entry.page_type))
        }
        Ok(page) => Ok(page),
        Err(e) if e.is_corruption() || is_past_end(&e) => {
            warn!("rebuilding page {} during recovery: {}", page_id, e);
            stats.pages_rebuilt += 1;
            Ok(Page::new(page_id, entry.page_type))
        }
        Err(e) => Err(e),
    }
}

fn is_past_end(err: &StorageError) -> bool {
    matches!(err, StorageError::Io { source, .. } if source.kind() == io::ErrorKind::UnexpectedEof)
}
