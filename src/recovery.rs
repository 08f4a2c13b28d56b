//! Crash recovery.
//!
//! At open time the pager replays the WAL and redoes every transaction
//! whose Commit entry made it to disk:
//! - Writes are grouped by transaction id
//! - Groups are applied in commit order, directly against the data file
//! - Groups without a Commit entry are discarded

pub mod redo;

pub use redo::{CommittedTransaction, RecoveryStats, RedoPlan};
