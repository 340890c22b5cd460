//! Memo (LVAL) field decoding.
//!
//! A memo value starts with a 12-byte header: a u32 length whose top two
//! bits select the storage class, a packed record pointer, and an unused
//! word. Inline memos carry their payload right after the header; type-1
//! LVALs store it in a single record on another data page, reached through
//! the record pointer. Type-2 LVALs chain across multiple pages and are not
//! assembled here; they degrade to a best-effort decode of the local bytes.
//!
//! Memo parsing never fails a row: any inconsistency falls back to a lossy
//! UTF-8 decode of the raw slice.

use byteorder::{ByteOrder, LittleEndian};

use crate::jet::constants::*;
use crate::jet::page::resolve_overflow;
use crate::jet::value::{decode_text, decode_value, Value, TYPE_MEMO};
use crate::jet::version::JetVersion;

/// Decode a memo column slice, chasing the LVAL pointer when needed.
pub fn decode_memo(slice: &[u8], buf: &[u8], page_size: usize, version: JetVersion) -> Value {
    match parse_memo(slice, buf, page_size, version) {
        Some(value) => value,
        None => {
            log::warn!("memo parse failed, falling back to raw UTF-8");
            Value::Text(String::from_utf8_lossy(slice).into_owned())
        }
    }
}

fn parse_memo(slice: &[u8], buf: &[u8], page_size: usize, version: JetVersion) -> Option<Value> {
    if slice.len() < MEMO_HEADER_SIZE {
        return None;
    }
    let len_flags = LittleEndian::read_u32(&slice[0..4]);
    let pointer = LittleEndian::read_u32(&slice[4..8]);
    let memo_len = (len_flags & MEMO_LEN_MASK) as usize;

    if len_flags & MEMO_INLINE != 0 {
        let payload = &slice[MEMO_HEADER_SIZE..];
        let n = memo_len.min(payload.len());
        return Some(decode_text(&payload[..n], version));
    }

    if len_flags & MEMO_LVAL_TYPE_1 != 0 {
        let record = resolve_overflow(buf, page_size, pointer, version)?;
        let n = memo_len.min(record.len());
        return Some(decode_text(&record[..n], version));
    }

    // multi-page LVAL chains are not assembled; decode the local bytes as
    // the declared type instead
    log::warn!(
        "unsupported multi-page LVAL of {} bytes, decoding header slice",
        memo_len
    );
    Some(decode_value(TYPE_MEMO, slice, version))
}
