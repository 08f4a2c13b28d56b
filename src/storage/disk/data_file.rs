use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::storage::error::{IntegrityFault, IoContext, StorageError, StorageResult};
use crate::storage::page::{codec, Page, PageId, PAGE_SIZE};

/// The backing data file: a flat array of `PAGE_SIZE` slots.
pub struct DataFile {
    path: PathBuf,
    file: Option<File>,
    read_only: bool,
}

impl DataFile {
    /// Opens `path`, creating it unless `read_only` is set.
    pub fn open(path: &Path, read_only: bool) -> StorageResult<Self> {
        let opened = if read_only {
            OpenOptions::new().read(true).open(path)
        } else {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)
        };
        let file = opened.map_err(|source| {
            StorageError::io(
                "open",
                io::Error::new(
                    source.kind(),
                    format!("unable to open file `{}`: {}", path.display(), source),
                ),
            )
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            read_only,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn len(&self) -> StorageResult<u64> {
        let file = self.file.as_ref().ok_or(StorageError::Closed("data file"))?;
        Ok(file.metadata().io_context("stat")?.len())
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of whole slots currently in the file, slot 0 included.
    pub fn slot_count(&self) -> StorageResult<u64> {
        Ok(self.len()? / PAGE_SIZE as u64)
    }

    pub fn read_slot(&mut self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> StorageResult<()> {
        let offset = page_id.file_offset();
        let len = self.len()?;
        if offset + PAGE_SIZE as u64 > len {
            return Err(StorageError::io(
                "read_page",
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("page {} lies beyond end of file ({} bytes)", page_id, len),
                ),
            ));
        }

        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(offset)).io_context("read_page")?;
        file.read_exact(buf).io_context("read_page")?;
        Ok(())
    }

    /// Reads and decodes the page stored in `page_id`'s slot.
    pub fn read_page(&mut self, page_id: PageId) -> StorageResult<Page> {
        let mut buf = [0u8; PAGE_SIZE];
        self.read_slot(page_id, &mut buf)?;
        let page = codec::decode(&buf)?;
        if page.id() != page_id {
            return Err(StorageError::page_integrity(
                page_id,
                IntegrityFault::MisplacedPage { found: page.id() },
            ));
        }
        Ok(page)
    }

    pub fn write_slot(&mut self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly { op: "write_page" });
        }
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(page_id.file_offset()))
            .io_context("write_page")?;
        file.write_all(buf).io_context("write_page")?;
        Ok(())
    }

    pub fn write_page(&mut self, page: &Page) -> StorageResult<()> {
        self.write_slot(page.id(), &codec::encode(page))
    }

    pub fn sync(&mut self) -> StorageResult<()> {
        if self.read_only {
            return Ok(());
        }
        self.file_mut()?.sync_all().io_context("sync")
    }

    /// Syncs and releases the handle. Later calls are no-ops.
    pub fn close(&mut self) -> StorageResult<()> {
        if let Some(file) = self.file.take() {
            if !self.read_only {
                file.sync_all().io_context("close")?;
            }
        }
        Ok(())
    }

    fn file_mut(&mut self) -> StorageResult<&mut File> {
        self.file.as_mut().ok_or(StorageError::Closed("data file"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::PageType;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_create_and_reopen() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("test.db");

        {
            let file = DataFile::open(&path, false)?;
            assert_eq!(file.slot_count()?, 0);
            assert!(file.is_empty()?);
        }

        let file = DataFile::open(&path, true)?;
        assert!(file.is_read_only());
        assert_eq!(file.slot_count()?, 0);
        Ok(())
    }

    #[test]
    fn test_write_and_read_page() -> Result<()> {
        let dir = tempdir()?;
        let mut file = DataFile::open(&dir.path().join("test.db"), false)?;

        let mut page = Page::new(PageId(3), PageType::Data);
        page.write(10, b"payload")?;
        file.write_page(&page)?;

        // Writing slot 3 grows the file to four slots
        assert_eq!(file.slot_count()?, 4);
        let read = file.read_page(PageId(3))?;
        assert_eq!(read, page);
        Ok(())
    }

    #[test]
    fn test_read_beyond_end_is_io_error() -> Result<()> {
        let dir = tempdir()?;
        let mut file = DataFile::open(&dir.path().join("test.db"), false)?;

        let err = file.read_page(PageId(1)).unwrap_err();
        assert!(matches!(err, StorageError::Io { op: "read_page", .. }));
        Ok(())
    }

    #[test]
    fn test_misplaced_page_detected() -> Result<()> {
        let dir = tempdir()?;
        let mut file = DataFile::open(&dir.path().join("test.db"), false)?;

        let page = Page::new(PageId(2), PageType::Data);
        file.write_slot(PageId(1), &codec::encode(&page))?;

        let err = file.read_page(PageId(1)).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Integrity {
                fault: IntegrityFault::MisplacedPage { found: PageId(2) },
                ..
            }
        ));
        Ok(())
    }

    #[test]
    fn test_read_only_rejects_writes() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("test.db");
        DataFile::open(&path, false)?;

        let mut file = DataFile::open(&path, true)?;
        let err = file.write_page(&Page::new(PageId(1), PageType::Data)).unwrap_err();
        assert!(matches!(err, StorageError::ReadOnly { .. }));
        Ok(())
    }

    #[test]
    fn test_read_only_missing_file_fails() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("missing.db");

        let err = DataFile::open(&path, true).err().expect("open should fail");
        assert!(matches!(err, StorageError::Io { op: "open", .. }));
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_close_is_idempotent() -> Result<()> {
        let dir = tempdir()?;
        let mut file = DataFile::open(&dir.path().join("test.db"), false)?;
        file.close()?;
        file.close()?;
        assert!(matches!(file.len(), Err(StorageError::Closed(_))));
        Ok(())
    }
}
