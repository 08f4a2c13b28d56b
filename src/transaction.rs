//! Transactions over pager writes.
//!
//! A transaction groups body writes under one id. Each write is appended to
//! the WAL as it is made; commit appends the Commit entry, flushes the log
//! and only then applies the writes to cached pages. Rollback writes
//! nothing more, so recovery ignores the group.

pub mod handle;
pub mod id;
pub mod state;

pub use handle::Transaction;
pub(crate) use handle::PendingWrite;
pub use id::{TransactionId, TransactionIdGenerator};
pub use state::TransactionState;
