//! Page serialization.
//!
//! All integers are little-endian at fixed offsets:
//!
//! | offset | size | field            |
//! |--------|------|------------------|
//! | 0      | 8    | page id          |
//! | 8      | 8    | next page id     |
//! | 16     | 8    | prev page id     |
//! | 24     | 4    | record count     |
//! | 28     | 4    | free space       |
//! | 32     | 4    | checksum         |
//! | 36     | 1    | page type        |
//! | 37     | 1    | flags            |
//! | 38     | 26   | reserved (zero)  |
//! | 64     | 4000 | body             |
//! | 4064   | 4    | footer checksum  |
//! | 4068   | 4    | integrity marker |
//! | 4072   | 24   | reserved (zero)  |

use byteorder::{ByteOrder, LittleEndian};

use super::{
    Page, PageFooter, PageHeader, PageId, PageType, BODY_SIZE, HEADER_SIZE, PAGE_INTEGRITY_MARKER,
    PAGE_SIZE,
};
use crate::storage::error::{IntegrityFault, StorageError, StorageResult};

const PAGE_ID_OFFSET: usize = 0;
const NEXT_PAGE_ID_OFFSET: usize = 8;
const PREV_PAGE_ID_OFFSET: usize = 16;
const RECORD_COUNT_OFFSET: usize = 24;
const FREE_SPACE_OFFSET: usize = 28;
const CHECKSUM_OFFSET: usize = 32;
const PAGE_TYPE_OFFSET: usize = 36;
const FLAGS_OFFSET: usize = 37;

const BODY_OFFSET: usize = HEADER_SIZE;
const FOOTER_OFFSET: usize = HEADER_SIZE + BODY_SIZE;
const FOOTER_CHECKSUM_OFFSET: usize = FOOTER_OFFSET;
const FOOTER_MARKER_OFFSET: usize = FOOTER_OFFSET + 4;

/// Serializes a page into its on-disk image.
///
/// The checksum is recomputed here rather than trusted from the header, so
/// the image is always self-consistent.
pub fn encode(page: &Page) -> [u8; PAGE_SIZE] {
    let mut buf = [0u8; PAGE_SIZE];
    write_header(&mut buf[..HEADER_SIZE], page.header());
    buf[BODY_OFFSET..FOOTER_OFFSET].copy_from_slice(page.body());

    let checksum = checksum_of_image(&buf);
    LittleEndian::write_u32(&mut buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4], checksum);
    LittleEndian::write_u32(
        &mut buf[FOOTER_CHECKSUM_OFFSET..FOOTER_CHECKSUM_OFFSET + 4],
        checksum,
    );
    LittleEndian::write_u32(
        &mut buf[FOOTER_MARKER_OFFSET..FOOTER_MARKER_OFFSET + 4],
        PAGE_INTEGRITY_MARKER,
    );
    buf
}

/// Parses and verifies an on-disk page image.
pub fn decode(buf: &[u8]) -> StorageResult<Page> {
    if buf.len() != PAGE_SIZE {
        return Err(StorageError::Size {
            what: "page buffer",
            expected: PAGE_SIZE,
            actual: buf.len(),
        });
    }

    let page_id = PageId(LittleEndian::read_u64(&buf[PAGE_ID_OFFSET..]));
    let header_checksum = LittleEndian::read_u32(&buf[CHECKSUM_OFFSET..]);
    let footer = PageFooter {
        checksum: LittleEndian::read_u32(&buf[FOOTER_CHECKSUM_OFFSET..]),
        integrity: LittleEndian::read_u32(&buf[FOOTER_MARKER_OFFSET..]),
    };

    if footer.integrity != PAGE_INTEGRITY_MARKER {
        return Err(StorageError::page_integrity(
            page_id,
            IntegrityFault::BadMarker {
                found: footer.integrity,
            },
        ));
    }
    if header_checksum != footer.checksum {
        return Err(StorageError::page_integrity(
            page_id,
            IntegrityFault::TornWrite {
                header: header_checksum,
                footer: footer.checksum,
            },
        ));
    }
    let computed = checksum_of_image(buf);
    if computed != header_checksum {
        return Err(StorageError::page_integrity(
            page_id,
            IntegrityFault::ChecksumMismatch {
                stored: header_checksum,
                computed,
            },
        ));
    }

    let page_type = PageType::try_from(buf[PAGE_TYPE_OFFSET])
        .map_err(|fault| StorageError::page_integrity(page_id, fault))?;

    let header = PageHeader {
        page_id,
        page_type,
        record_count: LittleEndian::read_u32(&buf[RECORD_COUNT_OFFSET..]),
        free_space: LittleEndian::read_u32(&buf[FREE_SPACE_OFFSET..]),
        next_page_id: PageId(LittleEndian::read_u64(&buf[NEXT_PAGE_ID_OFFSET..])),
        prev_page_id: PageId(LittleEndian::read_u64(&buf[PREV_PAGE_ID_OFFSET..])),
        checksum: header_checksum,
        flags: buf[FLAGS_OFFSET],
    };

    let mut body = Box::new([0u8; BODY_SIZE]);
    body.copy_from_slice(&buf[BODY_OFFSET..FOOTER_OFFSET]);

    Ok(Page::from_parts(header, body, footer))
}

/// CRC32 over the header (excluding its checksum field) followed by the body.
pub fn checksum(header: &PageHeader, body: &[u8; BODY_SIZE]) -> u32 {
    let mut header_buf = [0u8; HEADER_SIZE];
    write_header(&mut header_buf, header);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&header_buf[..CHECKSUM_OFFSET]);
    hasher.update(&header_buf[CHECKSUM_OFFSET + 4..]);
    hasher.update(body);
    hasher.finalize()
}

fn checksum_of_image(buf: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&buf[..CHECKSUM_OFFSET]);
    hasher.update(&buf[CHECKSUM_OFFSET + 4..HEADER_SIZE]);
    hasher.update(&buf[BODY_OFFSET..FOOTER_OFFSET]);
    hasher.finalize()
}

// Leaves the checksum field zeroed.
fn write_header(buf: &mut [u8], header: &PageHeader) {
    LittleEndian::write_u64(&mut buf[PAGE_ID_OFFSET..], header.page_id.0);
    LittleEndian::write_u64(&mut buf[NEXT_PAGE_ID_OFFSET..], header.next_page_id.0);
    LittleEndian::write_u64(&mut buf[PREV_PAGE_ID_OFFSET..], header.prev_page_id.0);
    LittleEndian::write_u32(&mut buf[RECORD_COUNT_OFFSET..], header.record_count);
    LittleEndian::write_u32(&mut buf[FREE_SPACE_OFFSET..], header.free_space);
    buf[PAGE_TYPE_OFFSET] = header.page_type as u8;
    buf[FLAGS_OFFSET] = header.flags;
}
