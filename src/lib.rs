pub mod jet;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MdbError {
    #[error("malformed buffer: {0}")]
    MalformedBuffer(String),

    #[error("unknown Jet version code {0:#04x}")]
    UnknownVersion(u8),

    #[error("table definition corrupt: {0}")]
    TableHeaderCorrupt(String),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("table has no data pages: {0}")]
    EmptyTable(String),

    #[error("catalog error: {0}")]
    Catalog(String),
}
