//! Convert between a FeatureCollection and its flat table form.
//!
//! # Table layout
//!
//! ```text
//! ┌─────────────┬───────────────────────────────────────┬──────┬──────┐
//! │ _feature_id │ geometry_json                         │ name │ kind │  ← first-seen order
//! ├─────────────┼───────────────────────────────────────┼──────┼──────┤
//! │ f1          │ {"type":"Point","coordinates":[1,2]}  │ A    │      │
//! │ feature_1   │                                       │ B    │ shop │
//! └─────────────┴───────────────────────────────────────┴──────┴──────┘
//! ```
//!
//! Geometry is never interpreted, only serialized to and parsed from
//! `geometry_json`. A property whose key collides with a reserved column is
//! stored under a `prop_` prefixed name.
//!
//! # Lossy edges
//!
//! [`decode`] drops blank cells (`""`, `NaN`, `NaT`, `None`, `null`) from the
//! property bag entirely, so a property whose value was the empty string does
//! not survive `decode(encode(fc))`.
//!
//! Ids are the exception: an empty-string `_feature_id` stays an `""` id so
//! that `id: ""` round-trips. Only null and the sentinel tokens leave a
//! feature without an id.

use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

use super::normalize::is_absent;
use crate::error::{CodecError, GeometryParseError};
use crate::models::{
    Feature, FeatureCollection, FeatureId, Table, FEATURE_ID_COLUMN, GEOMETRY_COLUMN,
    RESERVED_COLUMNS,
};

/// Prefix for property keys that collide with an already used column name.
pub const COLLISION_PREFIX: &str = "prop_";

/// Result of [`decode`]: the collection plus per-row geometry problems.
#[derive(Debug, Clone, Default)]
pub struct DecodeOutput {
    pub collection: FeatureCollection,
    pub geometry_errors: Vec<GeometryParseError>,
}

impl DecodeOutput {
    /// True when every geometry cell parsed.
    pub fn is_clean(&self) -> bool {
        self.geometry_errors.is_empty()
    }
}

/// Flatten a FeatureCollection into a table.
///
/// Never fails. Runs in two passes: the first assigns every property a
/// column name and collects the ordered union of names, the second builds
/// each row against that fixed column list.
pub fn encode(collection: &FeatureCollection) -> Table {
    // Pass 1: column assignment per feature + first-seen union
    let mut property_columns: Vec<String> = Vec::new();
    let mut known: HashSet<String> = HashSet::new();
    let mut assignments: Vec<Vec<(String, &Value)>> = Vec::with_capacity(collection.len());

    for feature in &collection.features {
        let mut taken: HashSet<String> = RESERVED_COLUMNS.iter().map(|c| c.to_string()).collect();
        let mut assigned = Vec::with_capacity(feature.properties.len());

        for (key, value) in &feature.properties {
            let name = disambiguate(key, &taken);
            taken.insert(name.clone());
            if known.insert(name.clone()) {
                property_columns.push(name.clone());
            }
            assigned.push((name, value));
        }
        assignments.push(assigned);
    }

    let mut columns: Vec<String> = RESERVED_COLUMNS.iter().map(|c| c.to_string()).collect();
    columns.extend(property_columns);
    let index: HashMap<&str, usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_str(), i))
        .collect();

    // Pass 2: materialize rows
    let width = columns.len();
    let mut rows = Vec::with_capacity(collection.len());
    for (i, (feature, assigned)) in collection.features.iter().zip(assignments).enumerate() {
        let mut cells = vec![Value::Null; width];
        cells[0] = match feature.id {
            Some(ref id) => id.to_value(),
            None => Value::String(format!("feature_{}", i)),
        };
        cells[1] = match feature.geometry {
            Some(ref geometry) if !geometry.is_null() => Value::String(geometry.to_string()),
            _ => Value::Null,
        };
        for (name, value) in assigned {
            cells[index[name.as_str()]] = value.clone();
        }
        rows.push(cells);
    }

    Table::from_rows(columns, rows)
}

/// Rebuild a FeatureCollection from a (possibly edited) table.
///
/// Fails only when `geometry_json` is missing. Geometry cells that do not
/// parse are reported in [`DecodeOutput::geometry_errors`] and the feature
/// is emitted with a null geometry.
pub fn decode(table: &Table) -> Result<DecodeOutput, CodecError> {
    let geometry_col = table
        .column_index(GEOMETRY_COLUMN)
        .ok_or_else(|| CodecError::MissingColumn(GEOMETRY_COLUMN.to_string()))?;
    let id_col = table.column_index(FEATURE_ID_COLUMN);

    let property_cols: Vec<(usize, &String)> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, name)| !RESERVED_COLUMNS.contains(&name.as_str()))
        .collect();

    let mut output = DecodeOutput::default();

    for (row_idx, row) in table.rows().iter().enumerate() {
        let id = id_col
            .and_then(|c| row.get(c))
            .filter(|v| v.as_str() == Some("") || !is_absent(v))
            .and_then(FeatureId::from_value);

        let geometry = match parse_geometry(&row.cells()[geometry_col]) {
            Ok(geometry) => geometry,
            Err(message) => {
                output.geometry_errors.push(GeometryParseError {
                    row: row_idx,
                    feature_id: id.as_ref().map(|id| id.to_string()).unwrap_or_default(),
                    message,
                });
                None
            }
        };

        let mut properties = Map::new();
        for &(col, name) in &property_cols {
            let value = &row.cells()[col];
            if !is_absent(value) {
                properties.insert(name.clone(), value.clone());
            }
        }

        output
            .collection
            .features
            .push(Feature::new(id, geometry, properties));
    }

    Ok(output)
}

/// Pick a column name for `key` that is not yet taken in this row.
fn disambiguate(key: &str, taken: &HashSet<String>) -> String {
    let mut name = key.to_string();
    while taken.contains(&name) {
        name = format!("{}{}", COLLISION_PREFIX, name);
    }
    name
}

/// Parse one `geometry_json` cell.
///
/// Blank cells mean "no geometry"; already structured cells (tables built
/// in memory) are taken as is.
fn parse_geometry(cell: &Value) -> Result<Option<Value>, String> {
    match cell {
        v if is_absent(v) => Ok(None),
        Value::String(text) if text.trim().is_empty() => Ok(None),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Null) => Ok(None),
            Ok(geometry) => Ok(Some(geometry)),
            Err(e) => Err(e.to_string()),
        },
        other => Ok(Some(other.clone())),
    }
}
