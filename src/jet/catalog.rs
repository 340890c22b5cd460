//! MSysObjects catalog extraction.
//!
//! The Jet catalog is itself an ordinary table whose definition sits at a
//! fixed page. Each row names an object, its type, its flags, and the root
//! page it lives on. User tables are the rows with `Type == 1` and clean
//! flags; everything else (system tables, queries, relationships) is
//! filtered out.

use std::collections::HashMap;

use crate::jet::constants::*;
use crate::jet::value::Value;
use crate::MdbError;

/// Build the `table name -> root page` map from parsed MSysObjects rows.
///
/// Every row must carry the `Name`, `Type`, `Flags` and `Id` columns;
/// a row missing one of them fails catalog construction.
pub fn build_catalog(rows: &[HashMap<String, Value>]) -> Result<HashMap<String, u32>, MdbError> {
    let mut catalog = HashMap::new();

    for row in rows {
        let name = match row.get("Name") {
            Some(Value::Text(name)) => name,
            _ => {
                return Err(MdbError::Catalog(
                    "MSysObjects row missing Name".to_string(),
                ))
            }
        };
        let object_type = required_int(row, "Type")?;
        let flags = required_int(row, "Flags")?;
        let id = required_int(row, "Id")?;

        if object_type != CATALOG_USER_TABLE_TYPE {
            continue;
        }
        if flags != 0 || SYSTEM_FLAG_VALUES.contains(&flags) {
            continue;
        }

        catalog.insert(name.clone(), id as u32);
    }

    Ok(catalog)
}

fn required_int(row: &HashMap<String, Value>, field: &str) -> Result<i64, MdbError> {
    match row.get(field) {
        Some(Value::Int(v)) => Ok(*v),
        _ => Err(MdbError::Catalog(format!(
            "MSysObjects row missing {}",
            field
        ))),
    }
}
