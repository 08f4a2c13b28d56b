//! Pager configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::storage::error::{StorageError, StorageResult};

/// Default number of pages held in memory.
pub const DEFAULT_CACHE_SIZE: usize = 256;

/// Pager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagerConfig {
    /// Path of the backing data file.
    pub file_path: PathBuf,
    /// Maximum number of pages held in the cache.
    pub max_cache_size: usize,
    /// Open without write access and reject every mutating call.
    pub read_only: bool,
    /// WAL location, `<file_path>.wal` when unset.
    pub wal_path: Option<PathBuf>,
    /// Whether to fsync the WAL on every flush.
    pub sync_on_commit: bool,
}

impl Default for PagerConfig {
    fn default() -> Self {
        PagerConfig {
            file_path: PathBuf::new(),
            max_cache_size: DEFAULT_CACHE_SIZE,
            read_only: false,
            wal_path: None,
            sync_on_commit: true,
        }
    }
}

impl PagerConfig {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        PagerConfig {
            file_path: file_path.into(),
            ..Default::default()
        }
    }

    pub fn with_cache_size(mut self, max_cache_size: usize) -> Self {
        self.max_cache_size = max_cache_size;
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_wal_path(mut self, wal_path: impl Into<PathBuf>) -> Self {
        self.wal_path = Some(wal_path.into());
        self
    }

    pub fn with_sync_on_commit(mut self, sync_on_commit: bool) -> Self {
        self.sync_on_commit = sync_on_commit;
        self
    }

    /// Resolved WAL path.
    pub fn wal_path(&self) -> PathBuf {
        match &self.wal_path {
            Some(path) => path.clone(),
            None => {
                let mut os_string = self.file_path.as_os_str().to_owned();
                os_string.push(".wal");
                PathBuf::from(os_string)
            }
        }
    }

    pub fn validate(&self) -> StorageResult<()> {
        if self.file_path.as_os_str().is_empty() {
            return Err(StorageError::Config("filepath cannot be empty".to_string()));
        }
        if self.max_cache_size == 0 {
            return Err(StorageError::Config(
                "max cache size must be at least 1 page".to_string(),
            ));
        }
        if self.wal_path.as_ref() == Some(&self.file_path) {
            return Err(StorageError::Config(
                "WAL path must differ from the data file path".to_string(),
            ));
        }
        Ok(())
    }
}
