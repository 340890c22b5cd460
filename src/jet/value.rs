//! Field-level value decoding for Jet records.
//!
//! Decodes raw little-endian bytes into typed values given a Jet type code
//! and the file dialect. Handles the engine's internal encodings: the
//! 64-bit fixed-point currency split, the 1899-12-30 date serial, raw-order
//! GUID stringification, and the Jet 4+ compressed-Unicode text marker.
//!
//! # Supported types
//!
//! | Code | Jet type | Decoder |
//! |------|----------|---------|
//! | 1  | Boolean   | carried by the null bitmap, no payload |
//! | 2  | Byte      | signed 8-bit |
//! | 3  | Integer   | signed 16-bit LE |
//! | 4  | Long      | signed 32-bit LE |
//! | 5  | Currency  | 64-bit fixed point, scale 1/10000 |
//! | 6  | Single    | IEEE 754 32-bit LE |
//! | 7  | Double    | IEEE 754 64-bit LE |
//! | 8  | DateTime  | f64 day serial since 1899-12-30T12:00:00Z |
//! | 9  | Binary    | UTF-8 passthrough |
//! | 10 | Text      | dialect-dependent, see [`decode_text`] |
//! | 11 | OLE       | binary passthrough |
//! | 12 | Memo      | LVAL, resolved in the record decoder |
//! | 15 | GUID      | 16 bytes as `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` |
//! | 16 | Fixed17   | UTF-8 of the first 17 bytes |
//! | 18 | Complex   | signed 32-bit LE side-table identifier |

use byteorder::{ByteOrder, LittleEndian};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use encoding_rs::{UTF_16LE, WINDOWS_1252};
use serde::Serialize;

use crate::jet::constants::*;
use crate::jet::version::JetVersion;

// Jet column type codes
pub const TYPE_BOOL: u8 = 1;
pub const TYPE_INT8: u8 = 2;
pub const TYPE_INT16: u8 = 3;
pub const TYPE_INT32: u8 = 4;
pub const TYPE_MONEY: u8 = 5;
pub const TYPE_FLOAT32: u8 = 6;
pub const TYPE_FLOAT64: u8 = 7;
pub const TYPE_DATETIME: u8 = 8;
pub const TYPE_BINARY: u8 = 9;
pub const TYPE_TEXT: u8 = 10;
pub const TYPE_OLE: u8 = 11;
pub const TYPE_MEMO: u8 = 12;
pub const TYPE_GUID: u8 = 15;
pub const TYPE_FIXED17: u8 = 16;
pub const TYPE_COMPLEX: u8 = 18;

/// Decoded field value from a Jet record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL (cleared bit in the record's null bitmap).
    Null,
    /// Boolean, decoded from the null bitmap itself.
    Bool(bool),
    /// Signed integer (Byte, Integer, Long, Complex).
    Int(i64),
    /// Floating number (Single, Double, Currency).
    Double(f64),
    /// Text, timestamp, GUID, or passthrough binary.
    Text(String),
}

/// Decode a field value from raw bytes based on the Jet type code.
pub fn decode_value(type_code: u8, data: &[u8], version: JetVersion) -> Value {
    match type_code {
        // Presence is carried by the null bitmap; a payload only reaches the
        // registry for a set bit.
        TYPE_BOOL => Value::Bool(true),
        TYPE_INT8 => decode_int(data, 1),
        TYPE_INT16 => decode_int(data, 2),
        TYPE_INT32 | TYPE_COMPLEX => decode_int(data, 4),
        TYPE_MONEY => decode_money(data),
        TYPE_FLOAT32 => decode_float32(data),
        TYPE_FLOAT64 => decode_float64(data),
        TYPE_DATETIME => decode_datetime_field(data),
        TYPE_BINARY | TYPE_OLE => Value::Text(String::from_utf8_lossy(data).into_owned()),
        TYPE_TEXT | TYPE_MEMO => decode_text(data, version),
        TYPE_GUID => decode_guid(data),
        TYPE_FIXED17 => {
            let n = data.len().min(17);
            Value::Text(String::from_utf8_lossy(&data[..n]).into_owned())
        }
        _ => decode_hex(data),
    }
}

/// Decode a signed little-endian integer of 1, 2 or 4 bytes.
fn decode_int(data: &[u8], size: usize) -> Value {
    if data.len() < size {
        return decode_hex(data);
    }
    let val = match size {
        1 => data[0] as i8 as i64,
        2 => LittleEndian::read_i16(data) as i64,
        _ => LittleEndian::read_i32(data) as i64,
    };
    Value::Int(val)
}

/// Decode a Currency value.
///
/// 64-bit fixed point: low 32 bits unsigned, high 32 bits signed,
/// value = (low + high * 2^32) / 10000.
fn decode_money(data: &[u8]) -> Value {
    if data.len() < 8 {
        return decode_hex(data);
    }
    let low = LittleEndian::read_u32(&data[0..4]) as i64;
    let high = LittleEndian::read_i32(&data[4..8]) as i64;
    let scaled = (high << 32) + low;
    Value::Double(scaled as f64 / 10000.0)
}

fn decode_float32(data: &[u8]) -> Value {
    if data.len() < 4 {
        return decode_hex(data);
    }
    Value::Double(LittleEndian::read_f32(data) as f64)
}

fn decode_float64(data: &[u8]) -> Value {
    if data.len() < 8 {
        return decode_hex(data);
    }
    Value::Double(LittleEndian::read_f64(data))
}

fn decode_datetime_field(data: &[u8]) -> Value {
    if data.len() < 8 {
        return decode_hex(data);
    }
    Value::Text(decode_datetime(LittleEndian::read_f64(data)))
}

/// Convert a Jet date serial to an ISO-8601 timestamp string.
///
/// The serial counts days since 1899-12-30T12:00:00Z. The integer part is
/// added as whole days; the hour/minute/second derived from the fractional
/// part (successive x24, x60, x60 with floor) step backwards from that noon
/// anchor, so a serial of 1.5 lands on 1899-12-31T00:00:00.000Z.
pub fn decode_datetime(serial: f64) -> String {
    let days = serial.trunc();
    let frac = (serial - days).abs();
    let hours = (frac * 24.0).floor();
    let rem = frac * 24.0 - hours;
    let minutes = (rem * 60.0).floor();
    let seconds = ((rem * 60.0 - minutes) * 60.0).floor();

    let dt = jet_epoch() + Duration::days(days as i64)
        - Duration::hours(hours as i64)
        - Duration::minutes(minutes as i64)
        - Duration::seconds(seconds as i64);
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn jet_epoch() -> NaiveDateTime {
    // 1899-12-30 noon is always representable
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

/// Decode a Text value per the file dialect.
///
/// Jet 3 stores text as plain bytes, decoded as UTF-8. Jet 4+ stores either
/// UTF-16LE, or windows-1252 behind a two-byte compressed-Unicode marker
/// (`FE FF` / `FF FE`).
pub fn decode_text(data: &[u8], version: JetVersion) -> Value {
    Value::Text(text_to_string(data, version))
}

pub(crate) fn text_to_string(data: &[u8], version: JetVersion) -> String {
    if version.is_jet3() {
        return String::from_utf8_lossy(data).into_owned();
    }
    if data.len() >= 2 && (data[..2] == TEXT_MARK_FEFF || data[..2] == TEXT_MARK_FFFE) {
        let (text, _) = WINDOWS_1252.decode_without_bom_handling(&data[2..]);
        return text.into_owned();
    }
    let (text, _) = UTF_16LE.decode_without_bom_handling(data);
    text.into_owned()
}

/// Format 16 GUID bytes as `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`.
///
/// Byte order is taken as read; the first three groups are NOT flipped the
/// way RFC 4122 renders little-endian GUIDs.
fn decode_guid(data: &[u8]) -> Value {
    if data.len() < 16 {
        return decode_hex(data);
    }
    Value::Text(format!(
        "{}-{}-{}-{}-{}",
        hex(&data[0..4]),
        hex(&data[4..6]),
        hex(&data[6..8]),
        hex(&data[8..10]),
        hex(&data[10..16])
    ))
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Hex-encode bytes as a fallback for unknown type codes.
fn decode_hex(data: &[u8]) -> Value {
    Value::Text(format!("0x{}", hex(data)))
}
