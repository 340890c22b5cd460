//! Table-definition (TDEF) page parsing.
//!
//! A TDEF page carries the table header (row count, column counts, index
//! counts), real-index metadata, an array of column descriptors and finally
//! a name table. Long definitions chain across pages through the
//! `next page` pointer at offset 4; continuation pages contribute their
//! payload after an 8-byte prefix, and the concatenation is parsed as one
//! logical byte stream.
//!
//! Columns carry two identities: a positional `column_index` and a stable
//! `column_id` (the bit position inside each record's null bitmap). The
//! column map is keyed on `column_index - min(column_index)` first and falls
//! back to `column_id` when that keying collides, because some files reuse
//! positional indexes but keep IDs stable.

use std::collections::HashSet;

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::jet::constants::*;
use crate::jet::value::text_to_string;
use crate::jet::version::JetVersion;
use crate::MdbError;

/// Parsed TDEF header fields.
#[derive(Debug, Clone, Serialize)]
pub struct TableHeader {
    /// Row count recorded in the definition.
    pub row_count: u32,
    /// Total column count.
    pub num_cols: u16,
    /// Number of variable-length columns.
    pub var_cols: u16,
    /// Index count (logical).
    pub num_idx: u32,
    /// Real index count; sizes the index metadata block before the
    /// descriptor array.
    pub num_real_idx: u32,
}

/// One column descriptor zipped with its name.
#[derive(Debug, Clone, Serialize)]
pub struct Column {
    /// Column name from the TDEF name table.
    pub name: String,
    /// Jet type code (see [`crate::jet::value`]).
    pub type_code: u8,
    /// Raw descriptor flags.
    pub flags: u8,
    /// Byte offset of the value within the fixed-length region. Meaningful
    /// only for fixed-length columns.
    pub fixed_offset: u16,
    /// Positional column index.
    pub column_index: u16,
    /// Stable column ID; indexes the record null bitmap.
    pub column_id: u16,
    /// Slot in the record's variable-length offset table; the storage
    /// order of variable fields, independent of the column map.
    pub var_index: u16,
    /// Declared length in bytes.
    pub length: u16,
}

impl Column {
    /// True when the value lives in the fixed-length region.
    pub fn is_fixed(&self) -> bool {
        self.flags & COL_FLAG_FIXED != 0
    }

    /// True when the column admits NULL.
    pub fn is_nullable(&self) -> bool {
        self.flags & COL_FLAG_NULLABLE != 0
    }
}

/// A fully parsed table definition.
#[derive(Debug, Clone, Serialize)]
pub struct TableDef {
    /// Header fields.
    pub header: TableHeader,
    /// Columns in column-map order.
    pub columns: Vec<Column>,
}

impl TableDef {
    /// Parse the TDEF chain starting at `tdef_offset` into a table
    /// definition.
    pub fn parse(
        buf: &[u8],
        tdef_offset: usize,
        page_size: usize,
        version: JetVersion,
    ) -> Result<TableDef, MdbError> {
        let stream = assemble_chain(buf, tdef_offset, page_size)?;
        let (header, cursor) = parse_header(&stream, version)?;
        let columns = parse_columns(&stream, cursor, &header, version)?;
        let columns = order_columns(columns, header.num_cols as usize)?;
        Ok(TableDef { header, columns })
    }
}

/// Concatenate the payloads of a TDEF continuation chain into one logical
/// byte stream.
fn assemble_chain(buf: &[u8], tdef_offset: usize, page_size: usize) -> Result<Vec<u8>, MdbError> {
    let first = buf
        .get(tdef_offset..tdef_offset + page_size)
        .ok_or_else(|| MdbError::TableHeaderCorrupt("TDEF offset out of range".to_string()))?;
    if first[..2] != PAGE_MAGIC_TDEF {
        return Err(MdbError::TableHeaderCorrupt(format!(
            "page at {:#x} is not a table definition",
            tdef_offset
        )));
    }

    let mut stream = first.to_vec();
    let mut next = LittleEndian::read_u32(&first[TDEF_NEXT_PAGE..]);
    let max_pages = buf.len() / page_size;
    let mut visited = 1;

    while next != 0 {
        visited += 1;
        if visited > max_pages {
            return Err(MdbError::TableHeaderCorrupt(
                "TDEF continuation chain loops".to_string(),
            ));
        }
        let offset = next as usize * page_size;
        let page = buf.get(offset..offset + page_size).ok_or_else(|| {
            MdbError::TableHeaderCorrupt(format!("TDEF continuation page {} out of range", next))
        })?;
        if page[..2] != PAGE_MAGIC_TDEF {
            return Err(MdbError::TableHeaderCorrupt(format!(
                "TDEF continuation page {} has wrong magic",
                next
            )));
        }
        stream.extend_from_slice(&page[TDEF_PREFIX_SIZE..]);
        next = LittleEndian::read_u32(&page[TDEF_NEXT_PAGE..]);
    }

    Ok(stream)
}

/// Parse the dialect-specific header block. Returns the header and the
/// cursor position of the first column descriptor.
fn parse_header(stream: &[u8], version: JetVersion) -> Result<(TableHeader, usize), MdbError> {
    let (rc, vc, nc, ni, nri, idx_meta, idx_entry) = if version.is_jet3() {
        (
            TDEF3_ROW_COUNT,
            TDEF3_VAR_COLS,
            TDEF3_NUM_COLS,
            TDEF3_NUM_IDX,
            TDEF3_NUM_REAL_IDX,
            TDEF3_IDX_META,
            TDEF3_IDX_META_ENTRY,
        )
    } else {
        (
            TDEF4_ROW_COUNT,
            TDEF4_VAR_COLS,
            TDEF4_NUM_COLS,
            TDEF4_NUM_IDX,
            TDEF4_NUM_REAL_IDX,
            TDEF4_IDX_META,
            TDEF4_IDX_META_ENTRY,
        )
    };

    if stream.len() < idx_meta {
        return Err(MdbError::TableHeaderCorrupt(
            "TDEF header block truncated".to_string(),
        ));
    }

    let header = TableHeader {
        row_count: LittleEndian::read_u32(&stream[rc..]),
        var_cols: LittleEndian::read_u16(&stream[vc..]),
        num_cols: LittleEndian::read_u16(&stream[nc..]),
        num_idx: LittleEndian::read_u32(&stream[ni..]),
        num_real_idx: LittleEndian::read_u32(&stream[nri..]),
    };

    // index metadata sits between the header block and the descriptors
    let cursor = idx_meta + header.num_real_idx as usize * idx_entry;
    Ok((header, cursor))
}

/// Parse the descriptor array and the trailing name table, zipping both by
/// position.
fn parse_columns(
    stream: &[u8],
    mut cursor: usize,
    header: &TableHeader,
    version: JetVersion,
) -> Result<Vec<Column>, MdbError> {
    let desc_size = if version.is_jet3() {
        TDEF3_COL_DESC_SIZE
    } else {
        TDEF4_COL_DESC_SIZE
    };
    let num_cols = header.num_cols as usize;

    let mut columns = Vec::with_capacity(num_cols);
    for i in 0..num_cols {
        let desc = stream.get(cursor..cursor + desc_size).ok_or_else(|| {
            MdbError::TableHeaderCorrupt(format!("column descriptor {} truncated", i))
        })?;
        columns.push(parse_descriptor(desc, version));
        cursor += desc_size;
    }

    for (i, column) in columns.iter_mut().enumerate() {
        let (name, next) = parse_name(stream, cursor, version).ok_or_else(|| {
            MdbError::TableHeaderCorrupt(format!("column name {} truncated", i))
        })?;
        column.name = name;
        cursor = next;
    }

    Ok(columns)
}

fn parse_descriptor(desc: &[u8], version: JetVersion) -> Column {
    let (t, id, vi, ix, fl, fo, ln) = if version.is_jet3() {
        (
            COL3_TYPE,
            COL3_ID,
            COL3_VAR_INDEX,
            COL3_INDEX,
            COL3_FLAGS,
            COL3_FIXED_OFFSET,
            COL3_LEN,
        )
    } else {
        (
            COL4_TYPE,
            COL4_ID,
            COL4_VAR_INDEX,
            COL4_INDEX,
            COL4_FLAGS,
            COL4_FIXED_OFFSET,
            COL4_LEN,
        )
    };
    Column {
        name: String::new(),
        type_code: desc[t],
        flags: desc[fl],
        fixed_offset: LittleEndian::read_u16(&desc[fo..]),
        column_index: LittleEndian::read_u16(&desc[ix..]),
        column_id: LittleEndian::read_u16(&desc[id..]),
        var_index: LittleEndian::read_u16(&desc[vi..]),
        length: LittleEndian::read_u16(&desc[ln..]),
    }
}

/// Read one entry of the name table: u8 length + bytes on Jet 3, u16 LE
/// length + UTF-16LE bytes on Jet 4+.
fn parse_name(stream: &[u8], cursor: usize, version: JetVersion) -> Option<(String, usize)> {
    if version.is_jet3() {
        let len = *stream.get(cursor)? as usize;
        let bytes = stream.get(cursor + 1..cursor + 1 + len)?;
        Some((text_to_string(bytes, version), cursor + 1 + len))
    } else {
        let raw = stream.get(cursor..cursor + 2)?;
        let len = LittleEndian::read_u16(raw) as usize;
        let bytes = stream.get(cursor + 2..cursor + 2 + len)?;
        Some((text_to_string(bytes, version), cursor + 2 + len))
    }
}

/// Order the column map: positional keying first, column-ID fallback on
/// collision. Either keying must recover exactly `num_cols` entries.
fn order_columns(mut columns: Vec<Column>, num_cols: usize) -> Result<Vec<Column>, MdbError> {
    if columns.len() != num_cols {
        return Err(MdbError::TableHeaderCorrupt(format!(
            "descriptor count {} does not match column count {}",
            columns.len(),
            num_cols
        )));
    }

    let min_index = columns.iter().map(|c| c.column_index).min().unwrap_or(0);
    let positional: HashSet<u16> = columns.iter().map(|c| c.column_index - min_index).collect();
    if positional.len() == num_cols {
        columns.sort_by_key(|c| c.column_index - min_index);
        return Ok(columns);
    }

    let by_id: HashSet<u16> = columns.iter().map(|c| c.column_id).collect();
    if by_id.len() == num_cols {
        columns.sort_by_key(|c| c.column_id);
        return Ok(columns);
    }

    Err(MdbError::TableHeaderCorrupt(format!(
        "column map recovers {} positional / {} by-ID keys for {} columns",
        positional.len(),
        by_id.len(),
        num_cols
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jet::value::{TYPE_INT16, TYPE_TEXT};

    const PS: usize = SIZE_PAGE_JET3;

    struct TestCol {
        name: &'static str,
        type_code: u8,
        flags: u8,
        fixed_offset: u16,
        column_index: u16,
        column_id: u16,
        var_index: u16,
        length: u16,
    }

    fn write_jet3_tdef(page: &mut [u8], cols: &[TestCol], var_cols: u16, next_page: u32) {
        page[..2].copy_from_slice(&PAGE_MAGIC_TDEF);
        LittleEndian::write_u32(&mut page[TDEF_NEXT_PAGE..], next_page);
        LittleEndian::write_u32(&mut page[TDEF3_ROW_COUNT..], 0);
        LittleEndian::write_u16(&mut page[TDEF3_MAX_COLS..], cols.len() as u16);
        LittleEndian::write_u16(&mut page[TDEF3_VAR_COLS..], var_cols);
        LittleEndian::write_u16(&mut page[TDEF3_NUM_COLS..], cols.len() as u16);
        LittleEndian::write_u32(&mut page[TDEF3_NUM_IDX..], 0);
        LittleEndian::write_u32(&mut page[TDEF3_NUM_REAL_IDX..], 0);

        let mut cursor = TDEF3_IDX_META;
        for c in cols {
            page[cursor + COL3_TYPE] = c.type_code;
            LittleEndian::write_u16(&mut page[cursor + COL3_ID..], c.column_id);
            LittleEndian::write_u16(&mut page[cursor + COL3_VAR_INDEX..], c.var_index);
            LittleEndian::write_u16(&mut page[cursor + COL3_INDEX..], c.column_index);
            page[cursor + COL3_FLAGS] = c.flags;
            LittleEndian::write_u16(&mut page[cursor + COL3_FIXED_OFFSET..], c.fixed_offset);
            LittleEndian::write_u16(&mut page[cursor + COL3_LEN..], c.length);
            cursor += TDEF3_COL_DESC_SIZE;
        }
        for c in cols {
            page[cursor] = c.name.len() as u8;
            page[cursor + 1..cursor + 1 + c.name.len()].copy_from_slice(c.name.as_bytes());
            cursor += 1 + c.name.len();
        }
    }

    fn two_columns() -> Vec<TestCol> {
        vec![
            TestCol {
                name: "name",
                type_code: TYPE_TEXT,
                flags: COL_FLAG_NULLABLE,
                fixed_offset: 0,
                column_index: 0,
                column_id: 0,
                var_index: 0,
                length: 50,
            },
            TestCol {
                name: "age",
                type_code: TYPE_INT16,
                flags: COL_FLAG_FIXED,
                fixed_offset: 0,
                column_index: 1,
                column_id: 1,
                var_index: 0,
                length: 2,
            },
        ]
    }

    #[test]
    fn test_parse_single_page_tdef() {
        let mut buf = vec![0u8; 2 * PS];
        write_jet3_tdef(&mut buf[PS..2 * PS], &two_columns(), 1, 0);

        let def = TableDef::parse(&buf, PS, PS, JetVersion::Jet3).unwrap();
        assert_eq!(def.header.num_cols, 2);
        assert_eq!(def.header.var_cols, 1);
        assert_eq!(def.columns[0].name, "name");
        assert_eq!(def.columns[0].type_code, TYPE_TEXT);
        assert!(!def.columns[0].is_fixed());
        assert_eq!(def.columns[1].name, "age");
        assert!(def.columns[1].is_fixed());
    }

    #[test]
    fn test_parse_chained_tdef() {
        // a large index-metadata block pushes the descriptor array across
        // the page boundary: descriptors and names land on the chain page
        let cols = two_columns();
        let num_real_idx = 250u32; // 2000 bytes of index metadata

        let mut stream = vec![0u8; 2 * PS];
        stream[..2].copy_from_slice(&PAGE_MAGIC_TDEF);
        LittleEndian::write_u16(&mut stream[TDEF3_MAX_COLS..], 2);
        LittleEndian::write_u16(&mut stream[TDEF3_VAR_COLS..], 1);
        LittleEndian::write_u16(&mut stream[TDEF3_NUM_COLS..], 2);
        LittleEndian::write_u32(&mut stream[TDEF3_NUM_REAL_IDX..], num_real_idx);

        let mut cursor = TDEF3_IDX_META + num_real_idx as usize * TDEF3_IDX_META_ENTRY;
        assert!(cursor + TDEF3_COL_DESC_SIZE > PS); // straddles the boundary
        for c in &cols {
            stream[cursor + COL3_TYPE] = c.type_code;
            LittleEndian::write_u16(&mut stream[cursor + COL3_ID..], c.column_id);
            LittleEndian::write_u16(&mut stream[cursor + COL3_INDEX..], c.column_index);
            stream[cursor + COL3_FLAGS] = c.flags;
            LittleEndian::write_u16(&mut stream[cursor + COL3_FIXED_OFFSET..], c.fixed_offset);
            LittleEndian::write_u16(&mut stream[cursor + COL3_LEN..], c.length);
            cursor += TDEF3_COL_DESC_SIZE;
        }
        for c in &cols {
            stream[cursor] = c.name.len() as u8;
            stream[cursor + 1..cursor + 1 + c.name.len()].copy_from_slice(c.name.as_bytes());
            cursor += 1 + c.name.len();
        }

        // split the logical stream: page 1 carries the first PS bytes and
        // chains to page 2, which carries the tail after its own prefix
        let mut buf = vec![0u8; 3 * PS];
        buf[PS..2 * PS].copy_from_slice(&stream[..PS]);
        LittleEndian::write_u32(&mut buf[PS + TDEF_NEXT_PAGE..], 2);
        buf[2 * PS..2 * PS + 2].copy_from_slice(&PAGE_MAGIC_TDEF);
        let tail = &stream[PS..cursor];
        buf[2 * PS + TDEF_PREFIX_SIZE..2 * PS + TDEF_PREFIX_SIZE + tail.len()]
            .copy_from_slice(tail);

        let def = TableDef::parse(&buf, PS, PS, JetVersion::Jet3).unwrap();
        assert_eq!(def.columns.len(), 2);
        assert_eq!(def.columns[0].name, "name");
        assert_eq!(def.columns[1].name, "age");
    }

    #[test]
    fn test_column_map_falls_back_to_column_id() {
        let mut cols = two_columns();
        // duplicate positional indexes, distinct IDs
        cols[0].column_index = 5;
        cols[1].column_index = 5;
        cols[0].column_id = 1;
        cols[1].column_id = 0;

        let mut buf = vec![0u8; 2 * PS];
        write_jet3_tdef(&mut buf[PS..2 * PS], &cols, 1, 0);

        let def = TableDef::parse(&buf, PS, PS, JetVersion::Jet3).unwrap();
        // ordered by column_id: "age" (id 0) first
        assert_eq!(def.columns[0].name, "age");
        assert_eq!(def.columns[1].name, "name");
    }

    #[test]
    fn test_column_map_unrecoverable() {
        let mut cols = two_columns();
        cols[0].column_index = 5;
        cols[1].column_index = 5;
        cols[0].column_id = 9;
        cols[1].column_id = 9;

        let mut buf = vec![0u8; 2 * PS];
        write_jet3_tdef(&mut buf[PS..2 * PS], &cols, 1, 0);

        assert!(matches!(
            TableDef::parse(&buf, PS, PS, JetVersion::Jet3),
            Err(MdbError::TableHeaderCorrupt(_))
        ));
    }

    #[test]
    fn test_not_a_tdef_page() {
        let buf = vec![0u8; 2 * PS];
        assert!(matches!(
            TableDef::parse(&buf, PS, PS, JetVersion::Jet3),
            Err(MdbError::TableHeaderCorrupt(_))
        ));
    }

    #[test]
    fn test_chain_loop_detected() {
        let mut buf = vec![0u8; 2 * PS];
        write_jet3_tdef(&mut buf[PS..2 * PS], &two_columns(), 1, 1);
        // page 1 chains to itself
        assert!(matches!(
            TableDef::parse(&buf, PS, PS, JetVersion::Jet3),
            Err(MdbError::TableHeaderCorrupt(_))
        ));
    }
}
