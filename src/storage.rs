//! Storage layer implementation.
//!
//! This module provides the foundation for persistent data storage using a page-based
//! architecture. Key components:
//!
//! - **Page**: Fixed-size (4KB) blocks with checksummed header and footer
//! - **Codec**: Serializes pages to and from their on-disk image
//! - **PageCache**: Bounded in-memory cache of pages with LRU eviction
//! - **DataFile**: Reads and writes page slots in the backing file
//! - **WriteAheadLog**: Append-only log of page mutations
//! - **Pager**: Coordinates all of the above
//!
//! Pages are never written to the data file before the WAL commit covering
//! them is durable.

pub mod buffer;
pub mod disk;
pub mod error;
pub mod page;
pub mod pager;
pub mod wal;

pub use buffer::{CacheStats, PageCache, PageSink};
pub use disk::{DataFile, FileHeader};
pub use error::{IntegrityFault, StorageError, StorageResult};
pub use page::{Page, PageId, PageType, BODY_SIZE, PAGE_SIZE};
pub use pager::{Pager, PagerStats};
pub use wal::{WalEntry, WalEntryKind, WriteAheadLog};
