//! Jet dialect identification.
//!
//! The file header on page 0 carries a one-byte dialect code. The dialect
//! governs the page size, the record prefix length, the width of the
//! variable-length metadata fields, and the default text encoding.

use serde::Serialize;
use std::fmt;

use crate::jet::constants::*;

/// Jet storage-engine dialect, derived from the file-header version byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JetVersion {
    /// Jet 3 (Access 97). 2 KiB pages, single-byte record layout fields.
    Jet3,
    /// Jet 4 (Access 2000-2003). 4 KiB pages, two-byte layout fields.
    Jet4,
    /// Jet 5 / ACE 12 (Access 2007).
    Jet5,
    /// ACE 14 (Access 2010).
    Jet2010,
}

impl JetVersion {
    /// Map the file-header code byte to a dialect.
    ///
    /// # Examples
    ///
    /// ```
    /// use mdb::jet::version::JetVersion;
    ///
    /// assert_eq!(JetVersion::from_code(0), Some(JetVersion::Jet3));
    /// assert_eq!(JetVersion::from_code(1), Some(JetVersion::Jet4));
    /// assert_eq!(JetVersion::from_code(9), None);
    /// ```
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(JetVersion::Jet3),
            1 => Some(JetVersion::Jet4),
            2 => Some(JetVersion::Jet5),
            3 => Some(JetVersion::Jet2010),
            _ => None,
        }
    }

    /// Page size in bytes for this dialect.
    pub fn page_size(self) -> usize {
        match self {
            JetVersion::Jet3 => SIZE_PAGE_JET3,
            _ => SIZE_PAGE_JET4,
        }
    }

    /// The numeric version exposed to callers (3, 4, 5 or 2010).
    pub fn as_number(self) -> u16 {
        match self {
            JetVersion::Jet3 => 3,
            JetVersion::Jet4 => 4,
            JetVersion::Jet5 => 5,
            JetVersion::Jet2010 => 2010,
        }
    }

    /// True for the Jet 3 dialect, which uses the compact single-byte layouts.
    pub fn is_jet3(self) -> bool {
        matches!(self, JetVersion::Jet3)
    }

    /// Bytes of record prefix preceding the fixed-length field region.
    pub fn record_prefix_len(self) -> usize {
        if self.is_jet3() {
            1
        } else {
            2
        }
    }

    /// Offset of the row-count word in a data page header.
    pub fn data_row_count_offset(self) -> usize {
        if self.is_jet3() {
            DATA_ROW_COUNT_JET3
        } else {
            DATA_ROW_COUNT_JET4
        }
    }

    /// Offset of the first record slot in a data page header.
    pub fn data_slots_offset(self) -> usize {
        if self.is_jet3() {
            DATA_SLOTS_JET3
        } else {
            DATA_SLOTS_JET4
        }
    }
}

impl fmt::Display for JetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JetVersion::Jet3 => write!(f, "Jet 3"),
            JetVersion::Jet4 => write!(f, "Jet 4"),
            JetVersion::Jet5 => write!(f, "Jet 5"),
            JetVersion::Jet2010 => write!(f, "Jet 2010"),
        }
    }
}
