//! Row-level record decoding.
//!
//! A record is laid out as: dialect prefix (1 byte on Jet 3, 2 on Jet 4+),
//! the fixed-length field region, the variable-length data region, the
//! variable-length metadata, and a trailing null bitmap of one bit per
//! column (LSB-first, indexed by stable column ID, set bit = value present).
//!
//! The variable-length metadata is parsed backward from the null bitmap:
//! a field count, then (Jet 3 only) the jump table, then `count + 1`
//! record-start-relative offsets whose last entry marks the end of data.
//! Jet 3 stores offsets as single bytes, so records longer than 256 bytes
//! carry the jump table: a list of **field indices** at which `0x100` starts
//! being added to subsequent offsets.
//!
//! The count parse is deliberately forgiving: when the decoded count does
//! not match the table header, the last ten bytes of the record are scanned
//! for the dialect's encoding of the expected count (a single byte on
//! Jet 3, u16 LE on Jet 4+) and the parse re-anchors there. Real files rely
//! on this.

use std::collections::HashMap;

use byteorder::{ByteOrder, LittleEndian};

use crate::jet::memo::decode_memo;
use crate::jet::tdef::{Column, TableDef};
use crate::jet::value::{decode_value, Value, TYPE_BOOL, TYPE_MEMO};
use crate::jet::version::JetVersion;
use crate::MdbError;

/// Variable-length metadata carved from a record trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
struct VarMeta {
    /// Offsets of each variable field from the record start, plus one final
    /// end-of-data entry.
    offsets: Vec<usize>,
    /// Jet 3 jump table: field indices at which +0x100 starts applying.
    jumps: Vec<usize>,
}

/// Decode one carved record into a column-name -> value map.
///
/// Returns `Ok(None)` when the row is dropped for a recoverable reason
/// (logged); structural problems with the schema itself are errors.
pub fn decode_record(
    record: &[u8],
    table: &TableDef,
    version: JetVersion,
    buf: &[u8],
    page_size: usize,
) -> Result<Option<HashMap<String, Value>>, MdbError> {
    let num_cols = table.header.num_cols as usize;
    let null_bytes = num_cols.div_ceil(8);
    let prefix = version.record_prefix_len();

    if record.len() < prefix + null_bytes {
        log::warn!(
            "record of {} bytes too short for {} columns, dropping row",
            record.len(),
            num_cols
        );
        return Ok(None);
    }

    let bitmap = &record[record.len() - null_bytes..];
    for column in &table.columns {
        if column.column_id as usize >= null_bytes * 8 {
            return Err(MdbError::TableHeaderCorrupt(format!(
                "column {} has ID {} outside the {}-bit null bitmap",
                column.name,
                column.column_id,
                null_bytes * 8
            )));
        }
    }
    let has_value =
        |id: u16| bitmap[id as usize / 8] & (1u8 << (id as usize % 8)) != 0;

    let body = &record[prefix..];
    let mut out = HashMap::with_capacity(num_cols);

    // fixed-length pass
    for column in &table.columns {
        if !column.is_fixed() {
            continue;
        }
        // booleans have no payload; the bitmap bit is the value
        if column.type_code == TYPE_BOOL {
            out.insert(column.name.clone(), Value::Bool(has_value(column.column_id)));
            continue;
        }
        if !has_value(column.column_id) {
            out.insert(column.name.clone(), Value::Null);
            continue;
        }
        let start = column.fixed_offset as usize;
        let end = (start + column.length as usize).min(body.len());
        if start >= end {
            log::warn!(
                "fixed column {} at offset {} overruns record, emitting null",
                column.name,
                start
            );
            out.insert(column.name.clone(), Value::Null);
            continue;
        }
        out.insert(
            column.name.clone(),
            decode_value(column.type_code, &body[start..end], version),
        );
    }

    // variable-length pass
    let expected = table.header.var_cols as usize;
    if expected > 0 {
        let Some(meta) = parse_var_meta(record, null_bytes, expected, version) else {
            log::warn!(
                "variable-length metadata does not match {} expected fields, dropping row",
                expected
            );
            return Ok(None);
        };

        // the descriptor's variable-column index names each field's slot in
        // the offset table; walk in that storage order so the Jet 3 jump
        // bias accumulates correctly even when the column map was re-keyed
        let mut var_columns: Vec<&Column> =
            table.columns.iter().filter(|c| !c.is_fixed()).collect();
        var_columns.sort_by_key(|c| c.var_index);

        let mut jump_add = 0usize;
        for column in var_columns {
            let index = column.var_index as usize;
            if version.is_jet3() && meta.jumps.contains(&index) {
                jump_add += 0x100;
            }
            if !has_value(column.column_id) {
                out.insert(column.name.clone(), Value::Null);
                continue;
            }

            let mut start = meta.offsets.get(index).copied().unwrap_or(0) + jump_add;
            let mut end = meta.offsets.get(index + 1).copied().unwrap_or(expected) + jump_add;
            if !version.is_jet3() {
                // recover 8-bit truncation
                if start > record.len() {
                    start &= 0xFF;
                }
                if end > record.len() {
                    end &= 0xFF;
                }
            }

            if start == end {
                out.insert(column.name.clone(), Value::Text(String::new()));
                continue;
            }
            if start > end || end > record.len() {
                log::warn!(
                    "variable column {} has bad bounds {}..{}, emitting null",
                    column.name,
                    start,
                    end
                );
                out.insert(column.name.clone(), Value::Null);
                continue;
            }

            let slice = &record[start..end];
            let value = if column.type_code == TYPE_MEMO {
                decode_memo(slice, buf, page_size, version)
            } else {
                decode_value(column.type_code, slice, version)
            };
            out.insert(column.name.clone(), value);
        }
    }

    Ok(Some(out))
}

/// Parse the variable-length metadata from the record trailer.
///
/// `pos` walks backward from the start of the null bitmap. On Jet 4+ a zero
/// pad byte may separate the count from the bitmap; a wrong count triggers
/// the 10-byte rescan for the expected value.
fn parse_var_meta(
    record: &[u8],
    null_bytes: usize,
    expected: usize,
    version: JetVersion,
) -> Option<VarMeta> {
    let mut pos = record.len().checked_sub(null_bytes)?;

    if version.is_jet3() {
        if pos < 1 {
            return None;
        }
        let mut count_at = pos - 1;
        if record[count_at] as usize != expected {
            count_at = rescan_count(record, pos, expected, version)?;
        }
        let count = expected;

        // records longer than 256 bytes carry the jump table
        let jump_len = (record.len() - 1) / 256;
        let offsets_end = count_at.checked_sub(jump_len)?;
        // entries are stored back-to-front, matching this backward parse
        let jumps: Vec<usize> = (0..jump_len)
            .map(|k| record[count_at - 1 - k] as usize)
            .collect();

        let table_len = count + 1;
        let offsets_start = offsets_end.checked_sub(table_len)?;
        let offsets: Vec<usize> = record[offsets_start..offsets_end]
            .iter()
            .map(|&b| b as usize)
            .collect();
        Some(VarMeta { offsets, jumps })
    } else {
        // a zero pad byte may sit between the count and the bitmap
        if pos >= 1 && record[pos - 1] == 0 {
            pos -= 1;
        }
        if pos < 2 {
            return None;
        }
        let mut count_at = pos - 2;
        if LittleEndian::read_u16(&record[count_at..]) as usize != expected {
            count_at = rescan_count(record, record.len() - null_bytes, expected, version)?;
        }
        let count = expected;

        let table_len = 2 * (count + 1);
        let offsets_start = count_at.checked_sub(table_len)?;
        let offsets: Vec<usize> = (0..count + 1)
            .map(|i| LittleEndian::read_u16(&record[offsets_start + 2 * i..]) as usize)
            .collect();
        Some(VarMeta {
            offsets,
            jumps: Vec::new(),
        })
    }
}

/// Scan the last ten bytes before the null bitmap for the expected count,
/// encoded at the dialect's width (u8 on Jet 3, u16 LE on Jet 4+). Returns
/// the count's position on a hit.
fn rescan_count(
    record: &[u8],
    bitmap_start: usize,
    expected: usize,
    version: JetVersion,
) -> Option<usize> {
    for back in 2..=10 {
        let at = bitmap_start.checked_sub(back)?;
        let hit = if version.is_jet3() {
            record[at] as usize == expected
        } else {
            LittleEndian::read_u16(&record[at..]) as usize == expected
        };
        if hit {
            return Some(at);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jet::tdef::{Column, TableHeader};
    use crate::jet::value::{TYPE_INT16, TYPE_INT32, TYPE_TEXT};

    fn column(
        name: &str,
        type_code: u8,
        flags: u8,
        fixed_offset: u16,
        id: u16,
        length: u16,
    ) -> Column {
        Column {
            name: name.to_string(),
            type_code,
            flags,
            fixed_offset,
            column_index: id,
            column_id: id,
            var_index: 0,
            length,
        }
    }

    fn table(mut columns: Vec<Column>) -> TableDef {
        let mut var_index = 0u16;
        for column in columns.iter_mut() {
            if !column.is_fixed() {
                column.var_index = var_index;
                var_index += 1;
            }
        }
        TableDef {
            header: TableHeader {
                row_count: 0,
                num_cols: columns.len() as u16,
                var_cols: var_index,
                num_idx: 0,
                num_real_idx: 0,
            },
            columns,
        }
    }


    /// Assemble a short (< 256 byte) Jet 3 record: prefix, fixed bytes,
    /// var data, offsets, count, null bitmap.
    fn jet3_record(fixed: &[u8], vars: &[&[u8]], bitmap: &[u8]) -> Vec<u8> {
        let mut rec = vec![0u8];
        rec.extend_from_slice(fixed);
        let mut offsets = Vec::new();
        for v in vars {
            offsets.push(rec.len());
            rec.extend_from_slice(v);
        }
        offsets.push(rec.len());
        for &o in &offsets {
            rec.push(o as u8);
        }
        rec.push(vars.len() as u8);
        rec.extend_from_slice(bitmap);
        assert!(rec.len() < 256);
        rec
    }

    #[test]
    fn test_fixed_columns_and_null_bitmap() {
        let t = table(vec![
            column("a", TYPE_INT16, 0x01, 0, 0, 2),
            column("b", TYPE_INT32, 0x01, 2, 1, 4),
        ]);
        // prefix + 6 fixed bytes + bitmap (bit 0 set, bit 1 clear)
        let mut rec = vec![0u8; 7];
        LittleEndian::write_i16(&mut rec[1..3], -7);
        LittleEndian::write_i32(&mut rec[3..7], 99);
        rec.push(0b0000_0001);

        let row = decode_record(&rec, &t, JetVersion::Jet3, &[], 0x800)
            .unwrap()
            .unwrap();
        assert_eq!(row["a"], Value::Int(-7));
        assert_eq!(row["b"], Value::Null);
    }

    #[test]
    fn test_boolean_carried_by_bitmap() {
        let t = table(vec![
            column("on", TYPE_BOOL, 0x01, 0, 0, 0),
            column("off", TYPE_BOOL, 0x01, 0, 1, 0),
        ]);
        let rec = vec![0u8, 0b0000_0001];
        let row = decode_record(&rec, &t, JetVersion::Jet3, &[], 0x800)
            .unwrap()
            .unwrap();
        assert_eq!(row["on"], Value::Bool(true));
        assert_eq!(row["off"], Value::Bool(false));
    }

    #[test]
    fn test_column_id_outside_bitmap_is_fatal() {
        let t = table(vec![column("a", TYPE_INT16, 0x01, 0, 9, 2)]);
        let rec = vec![0u8; 8];
        assert!(matches!(
            decode_record(&rec, &t, JetVersion::Jet3, &[], 0x800),
            Err(MdbError::TableHeaderCorrupt(_))
        ));
    }

    #[test]
    fn test_variable_column_jet3() {
        let t = table(vec![
            column("age", TYPE_INT16, 0x01, 0, 1, 2),
            column("name", TYPE_TEXT, 0x02, 0, 0, 50),
        ]);
        let mut fixed = [0u8; 2];
        LittleEndian::write_i16(&mut fixed, 23);
        let rec = jet3_record(&fixed, &[b"John"], &[0b0000_0011]);

        let row = decode_record(&rec, &t, JetVersion::Jet3, &[], 0x800)
            .unwrap()
            .unwrap();
        assert_eq!(row["age"], Value::Int(23));
        assert_eq!(row["name"], Value::Text("John".to_string()));
    }

    #[test]
    fn test_empty_string_sentinel() {
        let t = table(vec![column("name", TYPE_TEXT, 0x02, 0, 0, 50)]);
        let rec = jet3_record(&[], &[b""], &[0b0000_0001]);
        let row = decode_record(&rec, &t, JetVersion::Jet3, &[], 0x800)
            .unwrap()
            .unwrap();
        assert_eq!(row["name"], Value::Text(String::new()));
    }

    #[test]
    fn test_null_variable_column() {
        let t = table(vec![column("name", TYPE_TEXT, 0x02, 0, 0, 50)]);
        let rec = jet3_record(&[], &[b"ignored"], &[0b0000_0000]);
        let row = decode_record(&rec, &t, JetVersion::Jet3, &[], 0x800)
            .unwrap()
            .unwrap();
        assert_eq!(row["name"], Value::Null);
    }

    #[test]
    fn test_jet3_jump_table_applies_bias() {
        // three variable fields; the third sits wholly past byte 256, so its
        // stored 8-bit offsets wrap and only the jump-table bias recovers it
        let t = table(vec![
            column("a", TYPE_TEXT, 0x02, 0, 0, 255),
            column("b", TYPE_TEXT, 0x02, 0, 1, 255),
            column("c", TYPE_TEXT, 0x02, 0, 2, 255),
        ]);

        let mut rec = vec![0u8]; // prefix
        rec.extend_from_slice(&vec![b'a'; 9]); // field a: 1..10
        rec.extend_from_slice(&vec![b'b'; 271]); // field b: 10..281
        rec.extend_from_slice(b"tail"); // field c: 281..285
        for o in [1usize, 10, 281, 285] {
            rec.push((o & 0xFF) as u8);
        }
        // one jump entry (record is just over 256 bytes): the bias starts
        // applying at field index 2
        rec.push(2);
        rec.push(3); // var count
        rec.push(0b0000_0111); // bitmap

        let row = decode_record(&rec, &t, JetVersion::Jet3, &[], 0x800)
            .unwrap()
            .unwrap();
        assert_eq!(row["a"], Value::Text("a".repeat(9)));
        assert_eq!(row["c"], Value::Text("tail".to_string()));
    }

    #[test]
    fn test_var_index_orders_the_offset_table() {
        // column-map order lists "beta" first, but the descriptors say
        // "alpha" owns slot 0 of the offset table
        let mut beta = column("beta", TYPE_TEXT, 0x02, 0, 0, 50);
        let mut alpha = column("alpha", TYPE_TEXT, 0x02, 0, 1, 50);
        beta.var_index = 1;
        alpha.var_index = 0;
        let t = TableDef {
            header: TableHeader {
                row_count: 0,
                num_cols: 2,
                var_cols: 2,
                num_idx: 0,
                num_real_idx: 0,
            },
            columns: vec![beta, alpha],
        };

        let rec = jet3_record(&[], &[b"first", b"second"], &[0b0000_0011]);
        let row = decode_record(&rec, &t, JetVersion::Jet3, &[], 0x800)
            .unwrap()
            .unwrap();
        assert_eq!(row["alpha"], Value::Text("first".to_string()));
        assert_eq!(row["beta"], Value::Text("second".to_string()));
    }

    #[test]
    fn test_jet3_count_rescan_recovers_shifted_metadata() {
        // a stray byte between the count and the bitmap: the direct 1-byte
        // read misses, the rescan re-anchors on the count one byte back
        let t = table(vec![column("name", TYPE_TEXT, 0x02, 0, 0, 50)]);
        let mut rec = jet3_record(&[], &[b"John"], &[]);
        rec.push(0x77); // stray
        rec.push(0b0000_0001); // bitmap

        let row = decode_record(&rec, &t, JetVersion::Jet3, &[], 0x800)
            .unwrap()
            .unwrap();
        assert_eq!(row["name"], Value::Text("John".to_string()));
    }

    #[test]
    fn test_var_count_mismatch_drops_row() {
        // two variable fields, so the expected count (2) appears nowhere in
        // the trailer and the rescan cannot re-anchor
        let t = table(vec![
            column("first", TYPE_TEXT, 0x02, 0, 0, 50),
            column("last", TYPE_TEXT, 0x02, 0, 1, 50),
        ]);
        let mut rec = jet3_record(&[], &[b"Jo", b"hn"], &[0b0000_0011]);
        // corrupt the count byte (just before the bitmap)
        let n = rec.len();
        rec[n - 2] = 42;
        let row = decode_record(&rec, &t, JetVersion::Jet3, &[], 0x800).unwrap();
        assert!(row.is_none());
    }

    #[test]
    fn test_jet4_metadata_with_pad_byte() {
        let t = table(vec![
            column("id", TYPE_INT32, 0x01, 0, 0, 4),
            column("name", TYPE_TEXT, 0x02, 0, 1, 100),
        ]);
        let mut rec = vec![0u8, 0u8]; // 2-byte prefix
        let mut id = [0u8; 4];
        LittleEndian::write_i32(&mut id, 1234);
        rec.extend_from_slice(&id);
        let start = rec.len();
        let name: Vec<u8> = "Ada".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        rec.extend_from_slice(&name);
        let eod = rec.len();
        // offsets (count + 1), count, pad, bitmap
        for v in [start as u16, eod as u16, 1u16] {
            let mut word = [0u8; 2];
            LittleEndian::write_u16(&mut word, v);
            rec.extend_from_slice(&word);
        }
        rec.push(0); // pad
        rec.push(0b0000_0011);

        let row = decode_record(&rec, &t, JetVersion::Jet4, &[], 0x1000)
            .unwrap()
            .unwrap();
        assert_eq!(row["id"], Value::Int(1234));
        assert_eq!(row["name"], Value::Text("Ada".to_string()));
    }

    #[test]
    fn test_jet4_count_rescan_recovers_shifted_metadata() {
        // no pad byte and an extra stray byte after the count: the direct
        // read misses, the 10-byte rescan re-anchors on the expected count
        let t = table(vec![column("name", TYPE_TEXT, 0x02, 0, 0, 100)]);
        let mut rec = vec![0u8, 0u8];
        let start = rec.len();
        let name: Vec<u8> = "ok".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        rec.extend_from_slice(&name);
        let eod = rec.len();
        for v in [start as u16, eod as u16, 1u16] {
            let mut word = [0u8; 2];
            LittleEndian::write_u16(&mut word, v);
            rec.extend_from_slice(&word);
        }
        rec.push(0x77); // stray non-zero byte between count and bitmap
        rec.push(0b0000_0001);

        let row = decode_record(&rec, &t, JetVersion::Jet4, &[], 0x1000)
            .unwrap()
            .unwrap();
        assert_eq!(row["name"], Value::Text("ok".to_string()));
    }
}
