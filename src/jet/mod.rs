//! Jet / Access binary format parsing.
//!
//! This module contains types and functions for reading the on-disk
//! structures of the Microsoft Jet storage engine (`.mdb` / `.accdb`
//! files): the file header, page classification, table-definition (TDEF)
//! chains, data-page record carving, record decoding with null bitmaps and
//! variable-length metadata, and memo (LVAL) overflow chasing.
//!
//! Start with [`db::MdbFile`] to open an in-memory buffer, then use
//! [`db::MdbFile::table_names`] and [`db::MdbFile::parse_table`].
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`db`] | Parser facade: construction pipeline, table listing, row parsing |
//! | [`header`] | File header (page 0): signature check, dialect detection |
//! | [`version`] | Jet dialect enum mapping the header code byte to layouts |
//! | [`page`] | Page classification, data-page headers, slot walk, overflow resolution |
//! | [`tdef`] | Table-definition chains, column descriptors, column-map keying |
//! | [`record`] | Row-level decoding: null bitmap, fixed and variable passes |
//! | [`memo`] | Memo (LVAL) headers: inline, single-page, multi-page fallback |
//! | [`catalog`] | MSysObjects row filtering into the user-table catalog |
//! | [`value`] | Typed value decoding per Jet type code and dialect |
//! | [`constants`] | Jet page/file structure constants |

pub mod catalog;
pub mod constants;
pub mod db;
pub mod header;
pub mod memo;
pub mod page;
pub mod record;
pub mod tdef;
pub mod value;
pub mod version;
