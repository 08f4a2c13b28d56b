//! Write-Ahead Logging (WAL) module.
//!
//! This module implements the write-ahead log that makes multi-page writes
//! atomic:
//! - Fixed-size entry encoding with per-entry CRC
//! - Buffered appends with lazy file creation
//! - Flushing to stable storage
//! - Sequential replay that tolerates a torn tail

pub mod manager;
pub mod record;

pub use manager::WriteAheadLog;
pub use record::{WalEntry, WalEntryKind, WAL_ENTRY_SIZE};
