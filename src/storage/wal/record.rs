//! WAL entry types and their fixed-size encoding.
//!
//! Every entry occupies exactly [`WAL_ENTRY_SIZE`] bytes so replay can walk
//! the file in fixed strides:
//!
//! ```text
//! crc32 u32 | kind u8 | page_type u8 | reserved [2] | txn_id u64 | page_id u64 | offset u32 | len u32
//! old_data [BODY_SIZE] | new_data [BODY_SIZE]
//! ```
//!
//! The CRC covers everything after itself. Data regions are zero-padded
//! past `len`. `page_type` is the type of the target page when the write
//! was logged, so redo can rebuild a page that never reached the data file.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

use crate::storage::error::{IntegrityFault, StorageError, StorageResult};
use crate::storage::page::{PageId, PageType, BODY_SIZE};
use crate::transaction::TransactionId;

pub const WAL_ENTRY_HEADER_SIZE: usize = 32;
pub const WAL_ENTRY_SIZE: usize = WAL_ENTRY_HEADER_SIZE + 2 * BODY_SIZE;

/// WAL entry kinds. Zero is deliberately unused so a zeroed region never decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalEntryKind {
    /// Before/after image of a body region.
    Write = 1,
    /// Closes the group of writes sharing a transaction id.
    Commit = 2,
}

impl TryFrom<u8> for WalEntryKind {
    type Error = IntegrityFault;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(WalEntryKind::Write),
            2 => Ok(WalEntryKind::Commit),
            other => Err(IntegrityFault::UnknownEntryKind(other)),
        }
    }
}

impl fmt::Display for WalEntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalEntryKind::Write => write!(f, "Write"),
            WalEntryKind::Commit => write!(f, "Commit"),
        }
    }
}

/// One logged mutation or commit marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    pub txn_id: TransactionId,
    pub kind: WalEntryKind,
    /// Target page; `PageId::INVALID` for commits.
    pub page_id: PageId,
    pub page_type: PageType,
    /// Byte offset within the page body.
    pub offset: u32,
    pub old_data: Vec<u8>,
    pub new_data: Vec<u8>,
}

impl WalEntry {
    /// Create a Write entry. Both images must cover the same body range.
    pub fn write(
        txn_id: TransactionId,
        page_id: PageId,
        offset: u32,
        old_data: Vec<u8>,
        new_data: Vec<u8>,
    ) -> StorageResult<Self> {
        if old_data.len() != new_data.len() {
            return Err(StorageError::Size {
                what: "WAL before-image",
                expected: new_data.len(),
                actual: old_data.len(),
            });
        }
        check_range(offset, new_data.len())?;
        Ok(WalEntry {
            txn_id,
            kind: WalEntryKind::Write,
            page_id,
            page_type: PageType::Data,
            offset,
            old_data,
            new_data,
        })
    }

    /// Create a Commit entry.
    pub fn commit(txn_id: TransactionId) -> Self {
        WalEntry {
            txn_id,
            kind: WalEntryKind::Commit,
            page_id: PageId::INVALID,
            page_type: PageType::Data,
            offset: 0,
            old_data: Vec::new(),
            new_data: Vec::new(),
        }
    }

    /// Sets the type of the page the write targets.
    pub fn with_page_type(mut self, page_type: PageType) -> Self {
        self.page_type = page_type;
        self
    }

    pub fn is_commit(&self) -> bool {
        self.kind == WalEntryKind::Commit
    }

    /// Length of the patched region.
    pub fn len(&self) -> usize {
        self.new_data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.new_data.is_empty()
    }

    /// Serialize into a fixed-size record.
    pub fn encode(&self) -> Bytes {
        let len = self.new_data.len();
        let mut buf = BytesMut::with_capacity(WAL_ENTRY_SIZE);
        buf.put_u32_le(0);
        buf.put_u8(self.kind as u8);
        buf.put_u8(self.page_type as u8);
        buf.put_bytes(0, 2);
        buf.put_u64_le(self.txn_id.0);
        buf.put_u64_le(self.page_id.0);
        buf.put_u32_le(self.offset);
        buf.put_u32_le(len as u32);
        buf.put_slice(&self.old_data);
        buf.put_bytes(0, BODY_SIZE - self.old_data.len());
        buf.put_slice(&self.new_data);
        buf.put_bytes(0, BODY_SIZE - len);
        debug_assert_eq!(buf.len(), WAL_ENTRY_SIZE);

        let crc = crc32fast::hash(&buf[4..]);
        buf[..4].copy_from_slice(&crc.to_le_bytes());
        buf.freeze()
    }

    /// Deserialize a fixed-size record, verifying its CRC.
    pub fn decode(buf: &[u8]) -> StorageResult<Self> {
        if buf.len() != WAL_ENTRY_SIZE {
            return Err(StorageError::Size {
                what: "WAL entry",
                expected: WAL_ENTRY_SIZE,
                actual: buf.len(),
            });
        }

        let mut cursor = buf;
        let stored = cursor.get_u32_le();
        let computed = crc32fast::hash(&buf[4..]);
        if stored != computed {
            return Err(wal_integrity(IntegrityFault::ChecksumMismatch { stored, computed }));
        }

        let kind = WalEntryKind::try_from(cursor.get_u8()).map_err(wal_integrity)?;
        let page_type = PageType::try_from(cursor.get_u8()).map_err(wal_integrity)?;
        cursor.advance(2);
        let txn_id = TransactionId(cursor.get_u64_le());
        let page_id = PageId(cursor.get_u64_le());
        let offset = cursor.get_u32_le();
        let len = cursor.get_u32_le() as usize;
        check_range(offset, len)?;

        let old_data = cursor[..len].to_vec();
        cursor.advance(BODY_SIZE);
        let new_data = cursor[..len].to_vec();

        Ok(WalEntry {
            txn_id,
            kind,
            page_id,
            page_type,
            offset,
            old_data,
            new_data,
        })
    }
}

fn check_range(offset: u32, len: usize) -> StorageResult<()> {
    let offset = offset as usize;
    match offset.checked_add(len) {
        Some(end) if end <= BODY_SIZE => Ok(()),
        _ => Err(StorageError::InvalidWrite { offset, len }),
    }
}

fn wal_integrity(fault: IntegrityFault) -> StorageError {
    StorageError::Integrity {
        context: "WAL entry".to_string(),
        fault,
    }
}
