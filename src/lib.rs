pub mod config;
pub mod recovery;
pub mod storage;
pub mod transaction;

pub use config::PagerConfig;
pub use storage::{Page, PageId, PageType, Pager, StorageError, StorageResult};
pub use transaction::{Transaction, TransactionId};
