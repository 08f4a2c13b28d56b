//! File header stored in slot 0 of the data file.

use serde::{Deserialize, Serialize};

use crate::storage::error::{IntegrityFault, StorageError, StorageResult};
use crate::storage::page::{Page, PageId, PageType, PAGE_SIZE};

const FILE_MAGIC: u64 = u64::from_le_bytes(*b"PGSTORE\0");
const FILE_VERSION: u32 = 1;

/// Allocation state that must survive a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    magic: u64,
    version: u32,
    page_size: u32,
    /// Next never-used page id.
    pub next_page_id: PageId,
    /// Top of the persisted free list, `PageId::INVALID` when empty.
    pub free_list_head: PageId,
    pub free_count: u64,
}

impl FileHeader {
    pub fn new() -> Self {
        Self {
            magic: FILE_MAGIC,
            version: FILE_VERSION,
            page_size: PAGE_SIZE as u32,
            next_page_id: PageId::FIRST,
            free_list_head: PageId::INVALID,
            free_count: 0,
        }
    }

    /// Wraps the header in a metadata page for slot 0.
    pub fn to_page(&self) -> StorageResult<Page> {
        let bytes = bincode::serialize(self)?;
        let mut page = Page::new(PageId::INVALID, PageType::Metadata);
        page.write(0, &bytes)?;
        page.set_record_count(1);
        Ok(page)
    }

    pub fn from_page(page: &Page) -> StorageResult<Self> {
        if page.page_type() != PageType::Metadata {
            return Err(bad_header(format!(
                "slot 0 holds a {} page",
                page.page_type()
            )));
        }
        let header: FileHeader = bincode::deserialize(&page.body()[..])?;
        if header.magic != FILE_MAGIC {
            return Err(bad_header(format!("magic {:#018x}", header.magic)));
        }
        if header.version != FILE_VERSION {
            return Err(bad_header(format!("unsupported version {}", header.version)));
        }
        if header.page_size as usize != PAGE_SIZE {
            return Err(bad_header(format!(
                "page size {} differs from {}",
                header.page_size, PAGE_SIZE
            )));
        }
        Ok(header)
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new()
    }
}

fn bad_header(reason: String) -> StorageError {
    StorageError::page_integrity(PageId::INVALID, IntegrityFault::BadFileHeader(reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::codec;

    #[test]
    fn test_header_through_page_codec() {
        let mut header = FileHeader::new();
        header.next_page_id = PageId(17);
        header.free_list_head = PageId(9);
        header.free_count = 3;

        let page = codec::decode(&codec::encode(&header.to_page().unwrap())).unwrap();

        assert_eq!(page.id(), PageId::INVALID);
        assert_eq!(FileHeader::from_page(&page).unwrap(), header);
    }

    #[test]
    fn test_rejects_non_metadata_page() {
        let page = Page::new(PageId::INVALID, PageType::Data);
        let err = FileHeader::from_page(&page).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_rejects_foreign_magic() {
        let mut page = Page::new(PageId::INVALID, PageType::Metadata);
        page.write(0, b"definitely not a header").unwrap();
        assert!(FileHeader::from_page(&page).is_err());
    }
}
