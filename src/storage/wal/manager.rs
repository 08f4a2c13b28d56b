//! WAL file management.
//!
//! The log moves through three states: `Empty` (no handle yet; the file is
//! created lazily on the first append), `Open` (appending through a
//! buffered writer) and `Closed` (terminal).

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use super::record::{WalEntry, WAL_ENTRY_SIZE};
use crate::storage::error::{IoContext, StorageError, StorageResult};

/// Size of the in-memory write buffer in front of the WAL file.
const WAL_BUFFER_SIZE: usize = 64 * WAL_ENTRY_SIZE;

enum WalState {
    Empty,
    Open(BufWriter<File>),
    Closed,
}

/// Append-only write-ahead log.
pub struct WriteAheadLog {
    path: PathBuf,
    state: WalState,
    /// fsync on every flush.
    sync_on_flush: bool,
    /// Entries appended since the last successful flush.
    pending: usize,
}

impl WriteAheadLog {
    /// Prepares a log at `path` without touching the filesystem.
    pub fn new(path: impl Into<PathBuf>, sync_on_flush: bool) -> Self {
        Self {
            path: path.into(),
            state: WalState::Empty,
            sync_on_flush,
            pending: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, WalState::Open(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, WalState::Closed)
    }

    /// Entries buffered but not yet flushed.
    pub fn pending_entries(&self) -> usize {
        self.pending
    }

    /// Buffers an entry, creating the file on first use.
    pub fn append(&mut self, entry: &WalEntry) -> StorageResult<()> {
        let encoded = entry.encode();
        let writer = self.writer()?;
        writer.write_all(&encoded).io_context("wal_append")?;
        self.pending += 1;
        Ok(())
    }

    /// Pushes buffered entries to stable storage.
    pub fn flush(&mut self) -> StorageResult<()> {
        let sync = self.sync_on_flush;
        match &mut self.state {
            WalState::Empty => Ok(()),
            WalState::Closed => Err(StorageError::Closed("write-ahead log")),
            WalState::Open(writer) => {
                writer.flush().io_context("wal_flush")?;
                if sync {
                    writer.get_ref().sync_data().io_context("wal_flush")?;
                }
                if self.pending > 0 {
                    debug!("flushed {} WAL entries", self.pending);
                }
                self.pending = 0;
                Ok(())
            }
        }
    }

    /// Reads every complete entry from the start of the file.
    ///
    /// Only flushed entries are visible. A short trailing record or a
    /// record failing its CRC ends the replay; everything before it is
    /// returned.
    pub fn replay(&self) -> StorageResult<Vec<WalEntry>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io("wal_replay", e)),
        };

        let mut entries = Vec::new();
        let mut record = vec![0u8; WAL_ENTRY_SIZE];
        loop {
            let read = read_full(&mut file, &mut record).io_context("wal_replay")?;
            if read == 0 {
                break;
            }
            if read < WAL_ENTRY_SIZE {
                warn!(
                    "discarding truncated WAL record at entry {} ({} of {} bytes)",
                    entries.len(),
                    read,
                    WAL_ENTRY_SIZE
                );
                break;
            }
            match WalEntry::decode(&record) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!("stopping WAL replay at entry {}: {}", entries.len(), e);
                    break;
                }
            }
        }

        debug!("replayed {} WAL entries from {}", entries.len(), self.path.display());
        Ok(entries)
    }

    /// Truncates the log after its contents are reflected in the data file.
    pub fn reset(&mut self) -> StorageResult<()> {
        match &mut self.state {
            WalState::Closed => return Err(StorageError::Closed("write-ahead log")),
            WalState::Open(writer) => {
                writer.flush().io_context("wal_reset")?;
                let file = writer.get_ref();
                file.set_len(0).io_context("wal_reset")?;
                file.sync_all().io_context("wal_reset")?;
            }
            WalState::Empty => {
                if self.path.exists() {
                    let file = OpenOptions::new()
                        .write(true)
                        .truncate(true)
                        .open(&self.path)
                        .io_context("wal_reset")?;
                    file.sync_all().io_context("wal_reset")?;
                }
            }
        }
        self.pending = 0;
        Ok(())
    }

    /// Size of the log file on disk, 0 when it does not exist.
    pub fn file_len(&self) -> StorageResult<u64> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(StorageError::io("wal_stat", e)),
        }
    }

    /// Flushes and releases the file handle. Later calls are no-ops.
    pub fn close(&mut self) -> StorageResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        let result = self.flush();
        self.state = WalState::Closed;
        result
    }

    fn writer(&mut self) -> StorageResult<&mut BufWriter<File>> {
        if let WalState::Empty = self.state {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .io_context("wal_create")?;
            debug!("opened WAL file {}", self.path.display());
            self.state = WalState::Open(BufWriter::with_capacity(WAL_BUFFER_SIZE, file));
        }
        match &mut self.state {
            WalState::Open(writer) => Ok(writer),
            _ => Err(StorageError::Closed("write-ahead log")),
        }
    }
}

/// Fills `buf` as far as the file allows, returning the number of bytes read.
fn read_full(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::PageId;
    use crate::transaction::TransactionId;
    use tempfile::TempDir;

    fn create_test_wal() -> (WriteAheadLog, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let wal = WriteAheadLog::new(temp_dir.path().join("test.wal"), false);
        (wal, temp_dir)
    }

    fn write_entry(txn: u64, page: u64, byte: u8) -> WalEntry {
        WalEntry::write(TransactionId(txn), PageId(page), 0, vec![0], vec![byte]).unwrap()
    }

    #[test]
    fn test_lazy_creation() {
        let (mut wal, _temp_dir) = create_test_wal();
        assert!(!wal.path().exists());
        assert!(wal.replay().unwrap().is_empty());

        // Flushing an empty log does not create the file
        wal.flush().unwrap();
        assert!(!wal.path().exists());

        wal.append(&write_entry(1, 1, 9)).unwrap();
        assert!(wal.is_open());
        assert!(wal.path().exists());
    }

    #[test]
    fn test_append_flush_replay() {
        let (mut wal, _temp_dir) = create_test_wal();
        let entries = vec![
            write_entry(1, 1, 10),
            write_entry(1, 2, 20),
            WalEntry::commit(TransactionId(1)),
        ];
        for entry in &entries {
            wal.append(entry).unwrap();
        }
        assert_eq!(wal.pending_entries(), 3);

        wal.flush().unwrap();

        assert_eq!(wal.pending_entries(), 0);
        assert_eq!(wal.file_len().unwrap(), 3 * WAL_ENTRY_SIZE as u64);
        assert_eq!(wal.replay().unwrap(), entries);
    }

    #[test]
    fn test_unflushed_entries_invisible_to_replay() {
        let (mut wal, _temp_dir) = create_test_wal();
        wal.append(&write_entry(1, 1, 1)).unwrap();
        assert!(wal.replay().unwrap().is_empty());
    }

    #[test]
    fn test_truncated_trailing_record_discarded() {
        let (mut wal, _temp_dir) = create_test_wal();
        wal.append(&write_entry(1, 1, 1)).unwrap();
        wal.append(&WalEntry::commit(TransactionId(1))).unwrap();
        wal.close().unwrap();

        // Simulate a crash half way through a third append
        let partial = write_entry(2, 1, 2).encode();
        let mut file = OpenOptions::new().append(true).open(wal.path()).unwrap();
        file.write_all(&partial[..WAL_ENTRY_SIZE / 2]).unwrap();
        drop(file);

        let replayed = wal.replay().unwrap();
        assert_eq!(replayed.len(), 2);
        assert!(replayed[1].is_commit());
    }

    #[test]
    fn test_corrupt_record_ends_replay() {
        let (mut wal, _temp_dir) = create_test_wal();
        for i in 0..3 {
            wal.append(&write_entry(1, i + 1, i as u8)).unwrap();
        }
        wal.close().unwrap();

        let mut bytes = std::fs::read(wal.path()).unwrap();
        bytes[WAL_ENTRY_SIZE + 40] ^= 0xff;
        std::fs::write(wal.path(), &bytes).unwrap();

        let replayed = wal.replay().unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].page_id, PageId(1));
    }

    #[test]
    fn test_reset_truncates() {
        let (mut wal, _temp_dir) = create_test_wal();
        wal.append(&write_entry(1, 1, 1)).unwrap();
        wal.flush().unwrap();

        wal.reset().unwrap();
        assert_eq!(wal.file_len().unwrap(), 0);

        // Appending after a reset starts from the beginning again
        wal.append(&write_entry(2, 1, 2)).unwrap();
        wal.flush().unwrap();
        let replayed = wal.replay().unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].txn_id, TransactionId(2));
    }

    #[test]
    fn test_reset_existing_file_while_empty() {
        let (mut wal, temp_dir) = create_test_wal();
        wal.append(&write_entry(1, 1, 1)).unwrap();
        wal.close().unwrap();

        let mut reopened = WriteAheadLog::new(temp_dir.path().join("test.wal"), false);
        assert_eq!(reopened.replay().unwrap().len(), 1);
        reopened.reset().unwrap();
        assert!(reopened.replay().unwrap().is_empty());
        assert!(!reopened.is_open());
    }

    #[test]
    fn test_closed_rejects_appends() {
        let (mut wal, _temp_dir) = create_test_wal();
        wal.append(&write_entry(1, 1, 1)).unwrap();
        wal.close().unwrap();
        wal.close().unwrap();

        assert!(wal.is_closed());
        assert!(matches!(
            wal.append(&write_entry(1, 1, 1)),
            Err(StorageError::Closed(_))
        ));
        assert!(matches!(wal.flush(), Err(StorageError::Closed(_))));
        // Close flushed the buffered entry
        assert_eq!(wal.replay().unwrap().len(), 1);
    }

    #[test]
    fn test_uncommitted_group_still_replayed_raw() {
        let (mut wal, _temp_dir) = create_test_wal();
        wal.append(&write_entry(7, 1, 1)).unwrap();
        wal.append(&write_entry(7, 2, 2)).unwrap();
        wal.flush().unwrap();

        let replayed = wal.replay().unwrap();
        assert_eq!(replayed.len(), 2);
        assert!(replayed.iter().all(|e| !e.is_commit()));
    }
}
