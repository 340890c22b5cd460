//! File header (page 0) parsing.
//!
//! The first page of a Jet file starts with the fixed signature
//! `00 01 00 00` followed by the format identifier string ("Standard Jet DB"
//! family). Byte `0x14` carries the dialect code, which selects the page
//! size and all dialect-dependent layouts.

use serde::Serialize;

use crate::jet::constants::*;
use crate::jet::version::JetVersion;
use crate::MdbError;

/// Parsed file header.
#[derive(Debug, Clone, Serialize)]
pub struct DbHeader {
    /// Jet dialect decoded from the version byte.
    pub version: JetVersion,
}

impl DbHeader {
    /// Parse the file header from the start of the buffer.
    ///
    /// Fails with [`MdbError::MalformedBuffer`] if the signature does not
    /// match, or [`MdbError::UnknownVersion`] for an unrecognized dialect
    /// code.
    pub fn parse(buf: &[u8]) -> Result<Self, MdbError> {
        if buf.len() <= HEADER_VERSION {
            return Err(MdbError::MalformedBuffer(format!(
                "file header truncated at {} bytes",
                buf.len()
            )));
        }
        if buf[..HEADER_SIGNATURE.len()] != HEADER_SIGNATURE {
            return Err(MdbError::MalformedBuffer(
                "missing Jet file signature".to_string(),
            ));
        }

        let code = buf[HEADER_VERSION];
        let version = JetVersion::from_code(code).ok_or(MdbError::UnknownVersion(code))?;

        Ok(DbHeader { version })
    }
}
