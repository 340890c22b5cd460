//! Parser facade: open a Jet buffer, list tables, parse rows.
//!
//! Construction runs the full pipeline once: read the file header, classify
//! every page, attach each data page to the TDEF page its owner field names,
//! then parse the MSysObjects catalog. Row parsing happens lazily per table.
//!
//! The parser borrows the input buffer for its lifetime and never copies
//! page bytes except where logical contiguity forces it (TDEF chains).
//! `parse_table` takes `&self` and keeps its accumulator on the stack, so
//! separate parser instances over the same buffer can run concurrently.

use std::collections::HashMap;

use serde::Serialize;

use crate::jet::catalog::build_catalog;
use crate::jet::constants::*;
use crate::jet::header::DbHeader;
use crate::jet::page::{carve_records, resolve_overflow, DataPageHeader, PageMap, RecordSlot};
use crate::jet::record::decode_record;
use crate::jet::tdef::TableDef;
use crate::jet::value::Value;
use crate::jet::version::JetVersion;
use crate::MdbError;

/// A TDEF page together with the data pages owned by it.
#[derive(Debug, Clone, Default)]
struct TableObject {
    data_pages: Vec<usize>,
}

/// One decoded row.
#[derive(Debug, Clone, Serialize)]
pub struct Row {
    /// Column name to value mapping.
    pub data: HashMap<String, Value>,
    /// 1-based position in scan order. Deleted records are not numbered.
    #[serde(rename = "rowNumber")]
    pub row_number: usize,
}

/// An opened Jet database backed by an immutable byte buffer.
pub struct MdbFile<'a> {
    buf: &'a [u8],
    version: JetVersion,
    page_size: usize,
    tables: HashMap<usize, TableObject>,
    catalog: HashMap<String, u32>,
}

impl<'a> MdbFile<'a> {
    /// Open a Jet file from an in-memory buffer.
    ///
    /// Verifies the header, classifies pages, links data pages to their
    /// owning table definitions, and reads the MSysObjects catalog. Any
    /// failure here leaves no usable parser.
    pub fn parse(buf: &'a [u8]) -> Result<Self, MdbError> {
        let header = DbHeader::parse(buf)?;
        let version = header.version;
        let page_size = version.page_size();

        let pages = PageMap::classify(buf, page_size)?;

        let mut tables: HashMap<usize, TableObject> = pages
            .table_defs
            .iter()
            .map(|&offset| (offset, TableObject::default()))
            .collect();

        for &offset in &pages.data_pages {
            let page = &buf[offset..offset + page_size];
            let Some(data_header) = DataPageHeader::parse(page, version) else {
                log::warn!("data page at {:#x} has no parseable header", offset);
                continue;
            };
            let owner_offset = data_header.owner as usize * page_size;
            if let Some(object) = tables.get_mut(&owner_offset) {
                object.data_pages.push(offset);
            }
        }

        let mut db = MdbFile {
            buf,
            version,
            page_size,
            tables,
            catalog: HashMap::new(),
        };

        let catalog_offset = CATALOG_PAGE * page_size;
        if !db.tables.contains_key(&catalog_offset) {
            return Err(MdbError::Catalog(format!(
                "no table definition at catalog page {}",
                CATALOG_PAGE
            )));
        }
        let rows = db.scan_table(catalog_offset)?;
        db.catalog = build_catalog(&rows)?;

        Ok(db)
    }

    /// The detected Jet dialect.
    pub fn version(&self) -> JetVersion {
        self.version
    }

    /// Page size selected by the dialect.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Names of the user tables in the catalog, sorted.
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.catalog.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Parse every row of the named user table.
    ///
    /// Rows are numbered 1-based in data-page scan order; deleted records
    /// do not consume numbers.
    pub fn parse_table(&self, name: &str) -> Result<Vec<Row>, MdbError> {
        let root = *self
            .catalog
            .get(name)
            .ok_or_else(|| MdbError::UnknownTable(name.to_string()))?;
        let tdef_offset = root as usize * self.page_size;

        let object = self.tables.get(&tdef_offset).ok_or_else(|| {
            MdbError::TableHeaderCorrupt(format!(
                "catalog entry for {} points at page {} which is not a table definition",
                name, root
            ))
        })?;
        if object.data_pages.is_empty() {
            return Err(MdbError::EmptyTable(name.to_string()));
        }

        let rows = self.scan_table(tdef_offset)?;
        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(i, data)| Row {
                data,
                row_number: i + 1,
            })
            .collect())
    }

    /// Decode all records of the table defined at `tdef_offset`.
    fn scan_table(&self, tdef_offset: usize) -> Result<Vec<HashMap<String, Value>>, MdbError> {
        let table = TableDef::parse(self.buf, tdef_offset, self.page_size, self.version)?;
        let Some(object) = self.tables.get(&tdef_offset) else {
            return Ok(Vec::new());
        };

        let mut rows = Vec::new();
        for &page_offset in &object.data_pages {
            let page = &self.buf[page_offset..page_offset + self.page_size];
            for slot in carve_records(page, self.version) {
                let record: &[u8] = match slot {
                    RecordSlot::Inline { start, end } => &page[start..end],
                    RecordSlot::Overflow { pointer } => {
                        match resolve_overflow(self.buf, self.page_size, pointer, self.version) {
                            Some(record) => record,
                            None => {
                                log::warn!(
                                    "dangling overflow pointer {:#010x}, skipping record",
                                    pointer
                                );
                                continue;
                            }
                        }
                    }
                };
                if let Some(data) =
                    decode_record(record, &table, self.version, self.buf, self.page_size)?
                {
                    rows.push(data);
                }
            }
        }
        Ok(rows)
    }
}
