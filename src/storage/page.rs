//! Fixed-size pages: the unit of storage, caching and I/O.
//!
//! Every page serializes to exactly [`PAGE_SIZE`] bytes:
//!
//! ```text
//! +----------------+------------------------------+---------------+
//! | header (64 B)  | body (4000 B, caller-owned)  | footer (32 B) |
//! +----------------+------------------------------+---------------+
//! ```
//!
//! The header and the footer each carry a copy of the page checksum so a
//! write torn between them is detected on read. See [`codec`] for the byte
//! layout.

pub mod codec;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::storage::error::{IntegrityFault, StorageError, StorageResult};

pub const PAGE_SIZE: usize = 4096;
pub const HEADER_SIZE: usize = 64;
pub const FOOTER_SIZE: usize = 32;
pub const BODY_SIZE: usize = PAGE_SIZE - HEADER_SIZE - FOOTER_SIZE;

/// Marker written into every footer.
pub const PAGE_INTEGRITY_MARKER: u32 = 0x5047_5354;

/// Header flag set on deallocated pages threaded onto the free list.
pub(crate) const FLAG_FREE: u8 = 0x01;

/// Logical page identifier. 0 is reserved; allocation starts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PageId(pub u64);

impl PageId {
    pub const INVALID: PageId = PageId(0);
    pub const FIRST: PageId = PageId(1);

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }

    pub fn next(&self) -> PageId {
        PageId(self.0 + 1)
    }

    /// Byte offset of this page's slot in the data file.
    pub fn file_offset(&self) -> u64 {
        self.0 * PAGE_SIZE as u64
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How callers interpret the body. The pager treats every body as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PageType {
    Data = 0,
    Index = 1,
    Metadata = 2,
    Overflow = 3,
}

impl TryFrom<u8> for PageType {
    type Error = IntegrityFault;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(PageType::Data),
            1 => Ok(PageType::Index),
            2 => Ok(PageType::Metadata),
            3 => Ok(PageType::Overflow),
            other => Err(IntegrityFault::UnknownPageType(other)),
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageType::Data => "data",
            PageType::Index => "index",
            PageType::Metadata => "metadata",
            PageType::Overflow => "overflow",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub page_id: PageId,
    pub page_type: PageType,
    pub record_count: u32,
    pub free_space: u32,
    /// Chain links, `PageId::INVALID` when absent.
    pub next_page_id: PageId,
    pub prev_page_id: PageId,
    /// Checksum over header (minus this field) and body.
    pub checksum: u32,
    pub flags: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFooter {
    pub checksum: u32,
    pub integrity: u32,
}

/// An in-memory page.
///
/// Every mutator reseals the checksum, so a page is always eligible for
/// flushing. The dirty flag is transient and never persisted.
#[derive(Debug, Clone)]
pub struct Page {
    header: PageHeader,
    body: Box<[u8; BODY_SIZE]>,
    footer: PageFooter,
    dirty: bool,
}

impl Page {
    /// Creates a zeroed, clean page of the given type.
    pub fn new(page_id: PageId, page_type: PageType) -> Self {
        let mut page = Page {
            header: PageHeader {
                page_id,
                page_type,
                record_count: 0,
                free_space: BODY_SIZE as u32,
                next_page_id: PageId::INVALID,
                prev_page_id: PageId::INVALID,
                checksum: 0,
                flags: 0,
            },
            body: Box::new([0u8; BODY_SIZE]),
            footer: PageFooter {
                checksum: 0,
                integrity: PAGE_INTEGRITY_MARKER,
            },
            dirty: false,
        };
        page.seal();
        page
    }

    pub(crate) fn from_parts(header: PageHeader, body: Box<[u8; BODY_SIZE]>, footer: PageFooter) -> Self {
        Page {
            header,
            body,
            footer,
            dirty: false,
        }
    }

    /// A stub written in place of a deallocated page.
    pub(crate) fn free_stub(page_id: PageId, next_free: PageId) -> Self {
        let mut page = Page::new(page_id, PageType::Data);
        page.header.flags |= FLAG_FREE;
        page.header.free_space = 0;
        page.header.next_page_id = next_free;
        page.seal();
        page
    }

    pub fn id(&self) -> PageId {
        self.header.page_id
    }

    pub fn page_type(&self) -> PageType {
        self.header.page_type
    }

    pub fn header(&self) -> &PageHeader {
        &self.header
    }

    pub fn footer(&self) -> &PageFooter {
        &self.footer
    }

    pub fn body(&self) -> &[u8; BODY_SIZE] {
        &self.body
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn is_free(&self) -> bool {
        self.header.flags & FLAG_FREE != 0
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Reads `len` body bytes starting at `offset`.
    pub fn read(&self, offset: usize, len: usize) -> StorageResult<&[u8]> {
        check_body_range(offset, len)?;
        Ok(&self.body[offset..offset + len])
    }

    /// Overwrites body bytes at `offset` and reseals the checksum.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> StorageResult<()> {
        check_body_range(offset, data.len())?;
        self.body[offset..offset + data.len()].copy_from_slice(data);
        self.touch();
        Ok(())
    }

    pub fn set_record_count(&mut self, count: u32) {
        self.header.record_count = count;
        self.touch();
    }

    pub fn set_free_space(&mut self, free_space: u32) {
        self.header.free_space = free_space;
        self.touch();
    }

    pub fn set_next_page_id(&mut self, next: PageId) {
        self.header.next_page_id = next;
        self.touch();
    }

    pub fn set_prev_page_id(&mut self, prev: PageId) {
        self.header.prev_page_id = prev;
        self.touch();
    }

    /// Recomputes the checksum into both header and footer.
    pub fn seal(&mut self) {
        let checksum = codec::checksum(&self.header, &self.body);
        self.header.checksum = checksum;
        self.footer.checksum = checksum;
        self.footer.integrity = PAGE_INTEGRITY_MARKER;
    }

    /// Verifies the stored checksums against the current contents.
    pub fn validate(&self) -> StorageResult<()> {
        if self.footer.integrity != PAGE_INTEGRITY_MARKER {
            return Err(StorageError::page_integrity(
                self.id(),
                IntegrityFault::BadMarker {
                    found: self.footer.integrity,
                },
            ));
        }
        if self.header.checksum != self.footer.checksum {
            return Err(StorageError::page_integrity(
                self.id(),
                IntegrityFault::TornWrite {
                    header: self.header.checksum,
                    footer: self.footer.checksum,
                },
            ));
        }
        let computed = codec::checksum(&self.header, &self.body);
        if computed != self.header.checksum {
            return Err(StorageError::page_integrity(
                self.id(),
                IntegrityFault::ChecksumMismatch {
                    stored: self.header.checksum,
                    computed,
                },
            ));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.seal();
        self.dirty = true;
    }
}

impl PartialEq for Page {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.body[..] == other.body[..] && self.footer == other.footer
    }
}

impl Eq for Page {}

fn check_body_range(offset: usize, len: usize) -> StorageResult<()> {
    match offset.checked_add(len) {
        Some(end) if end <= BODY_SIZE => Ok(()),
        _ => Err(StorageError::InvalidWrite { offset, len }),
    }
}
