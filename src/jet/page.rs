//! Page classification and data-page row carving.
//!
//! A Jet file is a flat array of fixed-size pages. The first two bytes of a
//! page tag it: `01 01` is a data page, `02 01` a table-definition page.
//! Data pages carry a slot array growing up from the header while record
//! bytes fill in from the page end, so consecutive live slot offsets form a
//! descending sequence whose gaps are the record byte ranges.
//!
//! Slot words flag two special cases: bit `0x8000` marks a deleted record
//! (the offset still bounds the previous live record), and bit `0x4000`
//! marks an overflow pointer whose 4-byte record pointer is chased with
//! [`resolve_overflow`].

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::jet::constants::*;
use crate::jet::version::JetVersion;
use crate::MdbError;

/// Page classification by magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PageKind {
    /// Data page (`01 01`).
    Data,
    /// Table-definition page (`02 01`).
    TableDef,
    /// Anything else (free space, index, system pages).
    Other,
}

impl PageKind {
    /// Classify a page by its first two bytes.
    pub fn of(page: &[u8]) -> Self {
        if page.len() < 2 {
            return PageKind::Other;
        }
        if page[..2] == PAGE_MAGIC_DATA {
            PageKind::Data
        } else if page[..2] == PAGE_MAGIC_TDEF {
            PageKind::TableDef
        } else {
            PageKind::Other
        }
    }
}

/// Byte offsets of each page kind within the buffer.
#[derive(Debug, Default)]
pub struct PageMap {
    /// Offsets of data pages.
    pub data_pages: Vec<usize>,
    /// Offsets of table-definition pages.
    pub table_defs: Vec<usize>,
    /// Total page count.
    pub page_count: usize,
}

impl PageMap {
    /// Split the buffer into pages and classify each one.
    ///
    /// Fails with [`MdbError::MalformedBuffer`] if the buffer length is not
    /// a whole multiple of the page size.
    pub fn classify(buf: &[u8], page_size: usize) -> Result<Self, MdbError> {
        if buf.len() % page_size != 0 {
            return Err(MdbError::MalformedBuffer(format!(
                "buffer length {} is not a multiple of page size {:#x}",
                buf.len(),
                page_size
            )));
        }

        let mut map = PageMap {
            page_count: buf.len() / page_size,
            ..Default::default()
        };
        for offset in (0..buf.len()).step_by(page_size) {
            match PageKind::of(&buf[offset..offset + page_size]) {
                PageKind::Data => map.data_pages.push(offset),
                PageKind::TableDef => map.table_defs.push(offset),
                PageKind::Other => {}
            }
        }
        Ok(map)
    }
}

/// Parsed data page header.
#[derive(Debug, Clone, Serialize)]
pub struct DataPageHeader {
    /// Page number of the owning TDEF page.
    pub owner: u32,
    /// Number of record slots on this page (live, deleted and overflow).
    pub row_count: u16,
}

impl DataPageHeader {
    /// Parse a data page header. Returns `None` if the page is not a data
    /// page or is too short.
    pub fn parse(page: &[u8], version: JetVersion) -> Option<Self> {
        let rc_off = version.data_row_count_offset();
        if PageKind::of(page) != PageKind::Data || page.len() < rc_off + 2 {
            return None;
        }
        Some(DataPageHeader {
            owner: LittleEndian::read_u32(&page[DATA_PAGE_OWNER..]),
            row_count: LittleEndian::read_u16(&page[rc_off..]),
        })
    }
}

/// One live record produced by the slot walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordSlot {
    /// Inline record spanning `[start, end)` within the page.
    Inline { start: usize, end: usize },
    /// Overflow pointer to a record stored on another data page.
    Overflow { pointer: u32 },
}

/// Walk the slot array of a data page and carve out record locations.
///
/// Deleted slots are skipped but still move the end boundary used by the
/// next live record. Overflow slots yield the 32-bit record pointer stored
/// at the slot's offset instead of inline bytes.
pub fn carve_records(page: &[u8], version: JetVersion) -> Vec<RecordSlot> {
    let mut out = Vec::new();
    let Some(header) = DataPageHeader::parse(page, version) else {
        log::warn!("data page header unparseable, skipping page");
        return out;
    };

    let slots_off = version.data_slots_offset();
    let mut last_offset: Option<usize> = None;

    for i in 0..header.row_count as usize {
        let at = slots_off + 2 * i;
        if at + 2 > page.len() {
            log::warn!("slot array overruns page, stopping at slot {}", i);
            break;
        }
        let slot = LittleEndian::read_u16(&page[at..]);
        let offset = (slot & SLOT_OFFSET_MASK) as usize;

        if slot & SLOT_DELETED != 0 {
            // still the end boundary of the previous live record
            last_offset = Some(offset);
            continue;
        }

        if slot & SLOT_OVERFLOW != 0 {
            if offset + 4 <= page.len() {
                out.push(RecordSlot::Overflow {
                    pointer: LittleEndian::read_u32(&page[offset..]),
                });
            } else {
                log::warn!("overflow pointer at {:#06x} overruns page", offset);
            }
            last_offset = Some(offset);
            continue;
        }

        let end = last_offset.unwrap_or(page.len());
        if offset < end && end <= page.len() {
            out.push(RecordSlot::Inline { start: offset, end });
        } else {
            log::warn!(
                "record slot {} has non-descending bounds ({} >= {}), skipping",
                i,
                offset,
                end
            );
        }
        last_offset = Some(offset);
    }

    out
}

/// Chase a packed record pointer to the record bytes it names.
///
/// The pointer packs the target page in the high 24 bits and the slot index
/// on that page in the low 8 bits. Any inconsistency (out-of-range page,
/// non-data page, bad slot) yields `None`; callers substitute a fallback
/// rather than failing the row.
pub fn resolve_overflow(
    buf: &[u8],
    page_size: usize,
    pointer: u32,
    version: JetVersion,
) -> Option<&[u8]> {
    let page_number = (pointer >> 8) as usize;
    let slot = (pointer & 0xFF) as usize;

    let start = page_number.checked_mul(page_size)?;
    let page = buf.get(start..start + page_size)?;
    let header = DataPageHeader::parse(page, version)?;
    if slot >= header.row_count as usize {
        return None;
    }

    let slots_off = version.data_slots_offset();
    let word = LittleEndian::read_u16(&page[slots_off + 2 * slot..]);
    if word & SLOT_DELETED != 0 {
        return None;
    }
    let rec_start = (word & SLOT_OFFSET_MASK) as usize;

    let rec_end = if slot == 0 {
        page_size
    } else {
        let prev = LittleEndian::read_u16(&page[slots_off + 2 * (slot - 1)..]);
        (prev & SLOT_OFFSET_MASK) as usize
    };

    if rec_start >= rec_end || rec_end > page.len() {
        return None;
    }
    Some(&page[rec_start..rec_end])
}
