//! Storage layer error types.

use std::io;

use thiserror::Error;

use crate::storage::page::PageId;

/// The specific reason an integrity check rejected a page or WAL record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityFault {
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("torn write: header checksum {header:#010x} != footer checksum {footer:#010x}")]
    TornWrite { header: u32, footer: u32 },

    #[error("bad integrity marker {found:#010x}")]
    BadMarker { found: u32 },

    #[error("unknown page type tag {0}")]
    UnknownPageType(u8),

    #[error("unknown WAL entry kind {0}")]
    UnknownEntryKind(u8),

    #[error("slot holds page {found}")]
    MisplacedPage { found: PageId },

    #[error("bad file header: {0}")]
    BadFileHeader(String),
}

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error during {op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Size error: {what} must be {expected} bytes, got {actual}")]
    Size {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Integrity error ({context}): {fault}")]
    Integrity {
        context: String,
        fault: IntegrityFault,
    },

    #[error("Page {page_id} is out of range (allocation bound: {bound})")]
    OutOfRange { page_id: PageId, bound: PageId },

    #[error("Page {0} has been deallocated")]
    PageFreed(PageId),

    #[error("Invalid write: {len} bytes at offset {offset} exceed the page body")]
    InvalidWrite { offset: usize, len: usize },

    #[error("Pager is read-only: {op} rejected")]
    ReadOnly { op: &'static str },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("{0} is closed")]
    Closed(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

impl StorageError {
    pub(crate) fn io(op: &'static str, source: io::Error) -> Self {
        StorageError::Io { op, source }
    }

    pub(crate) fn page_integrity(page_id: PageId, fault: IntegrityFault) -> Self {
        StorageError::Integrity {
            context: format!("page {}", page_id),
            fault,
        }
    }

    /// True when the error indicates on-disk corruption rather than a
    /// transient failure.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StorageError::Integrity { .. } | StorageError::Size { .. }
        )
    }
}

/// Attaches an operation name to raw I/O results.
pub(crate) trait IoContext<T> {
    fn io_context(self, op: &'static str) -> StorageResult<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context(self, op: &'static str) -> StorageResult<T> {
        self.map_err(|source| StorageError::io(op, source))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_context_keeps_operation() {
        let result: io::Result<()> = Err(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let err = result.io_context("read_page").unwrap_err();
        assert!(matches!(err, StorageError::Io { op: "read_page", .. }));
        assert!(err.to_string().contains("read_page"));
        assert!(!err.is_corruption());
    }

    #[test]
    fn test_integrity_is_corruption() {
        let err = StorageError::page_integrity(PageId(3), IntegrityFault::BadMarker { found: 0 });
        assert!(err.is_corruption());
        assert!(err.to_string().contains("page 3"));
    }
}
