//! Domain models for the GeoSheet conversion pipeline.
//!
//! This module contains the core data structures used throughout the pipeline:
//!
//! - [`FeatureCollection`] - ordered GeoJSON features
//! - [`Feature`] - one opaque geometry plus an open property bag
//! - [`FeatureId`] - string or numeric feature identifier
//! - [`Table`] / [`Row`] - the flat, spreadsheet-shaped counterpart
//!
//! Geometry is never interpreted: it is carried as raw JSON from input to
//! output. Property values are kept as JSON values so nested objects and
//! numbers survive an in-memory round trip unchanged.

use serde::de::Deserializer;
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

use crate::error::DocumentError;

/// Reserved column holding a copy of the feature id.
pub const FEATURE_ID_COLUMN: &str = "_feature_id";

/// Reserved column holding the minified geometry JSON.
pub const GEOMETRY_COLUMN: &str = "geometry_json";

/// Both reserved columns, in output order.
pub const RESERVED_COLUMNS: [&str; 2] = [FEATURE_ID_COLUMN, GEOMETRY_COLUMN];

/// Type marker a document must carry to be accepted.
pub const FEATURE_COLLECTION_TYPE: &str = "FeatureCollection";

// =============================================================================
// Feature Identification
// =============================================================================

/// Identifier of a feature.
///
/// GeoJSON allows either a string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureId {
    String(String),
    Number(Number),
}

impl FeatureId {
    /// Build an id from a JSON cell. Only strings and numbers qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Number(n) => Some(Self::Number(n.clone())),
            _ => None,
        }
    }

    /// The id as a JSON value, for table cells.
    pub fn to_value(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Number(n) => Value::Number(n.clone()),
        }
    }

    /// Ids that are present but carry nothing (`""`).
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::String(s) if s.is_empty())
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for FeatureId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FeatureId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for FeatureId {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

// =============================================================================
// Feature
// =============================================================================

/// One geometry plus its property bag.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Feature {
    /// Stable identifier, if the source had one.
    #[serde(default)]
    pub id: Option<FeatureId>,

    /// Opaque geometry object, `None` when absent or `null`.
    #[serde(default)]
    pub geometry: Option<Value>,

    /// Open bag of properties, insertion order preserved.
    #[serde(default, deserialize_with = "null_as_empty_map")]
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn new(id: Option<FeatureId>, geometry: Option<Value>, properties: Map<String, Value>) -> Self {
        Self {
            id,
            geometry,
            properties,
        }
    }

    /// The id unless it is absent or an empty string.
    pub fn effective_id(&self) -> Option<&FeatureId> {
        self.id.as_ref().filter(|id| !id.is_empty())
    }
}

/// Output shape: `{"type":"Feature","properties":{..},"geometry":..,"id":..}`.
impl Serialize for Feature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.id.is_some() { 4 } else { 3 };
        let mut state = serializer.serialize_struct("Feature", len)?;
        state.serialize_field("type", "Feature")?;
        state.serialize_field("properties", &self.properties)?;
        state.serialize_field("geometry", &self.geometry)?;
        if let Some(ref id) = self.id {
            state.serialize_field("id", id)?;
        }
        state.end()
    }
}

fn null_as_empty_map<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// Feature Collection
// =============================================================================

/// Ordered sequence of features.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Accept a parsed JSON document as a FeatureCollection.
    ///
    /// Only checks the type marker; shape checks live in
    /// [`crate::validation`].
    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        match value.get("type").and_then(Value::as_str) {
            Some(FEATURE_COLLECTION_TYPE) => {}
            Some(other) => {
                return Err(DocumentError::invalid(format!("type is '{}'", other)));
            }
            None => return Err(DocumentError::invalid("missing \"type\" member")),
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_value(&self) -> Value {
        // Serializing a map of JSON values cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for FeatureCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FeatureCollection", 2)?;
        state.serialize_field("type", FEATURE_COLLECTION_TYPE)?;
        state.serialize_field("features", &self.features)?;
        state.end()
    }
}

// =============================================================================
// Table
// =============================================================================

/// One table row: exactly one cell per table column, `Null` when blank.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    cells: Vec<Value>,
}

impl Row {
    pub fn new(cells: Vec<Value>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[Value] {
        &self.cells
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.cells.get(index)
    }
}

/// Rows sharing a fixed, ordered column set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from column names and raw rows.
    ///
    /// Short rows are padded with `Null`, long rows truncated, so every row
    /// always has one cell per column.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let mut table = Self::new(columns);
        for cells in rows {
            table.push_row(cells);
        }
        table
    }

    pub fn push_row(&mut self, mut cells: Vec<Value>) {
        cells.resize(self.columns.len(), Value::Null);
        self.rows.push(Row::new(cells));
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cell at `row` in column `name`.
    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let col = self.column_index(name)?;
        self.rows.get(row)?.get(col)
    }

    /// All cells of one column, in row order.
    pub fn column_values<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a Value> + 'a> {
        let col = self.column_index(name)?;
        Some(self.rows.iter().map(move |r| &r.cells[col]))
    }

    /// First `n` rows as JSON objects.
    pub fn head(&self, n: usize) -> Vec<Value> {
        self.rows
            .iter()
            .take(n)
            .map(|row| {
                let obj: Map<String, Value> = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.cells.iter().cloned())
                    .collect();
                Value::Object(obj)
            })
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_feature_serialization_order() {
        let feature = Feature::new(
            Some("f1".into()),
            Some(json!({"type": "Point", "coordinates": [1, 2]})),
            json!({"name": "A"}).as_object().unwrap().clone(),
        );
        let text = serde_json::to_string(&feature).unwrap();
        assert_eq!(
            text,
            r#"{"type":"Feature","properties":{"name":"A"},"geometry":{"type":"Point","coordinates":[1,2]},"id":"f1"}"#
        );
    }

    #[test]
    fn test_feature_without_id_or_geometry() {
        let feature = Feature::default();
        let value = serde_json::to_value(&feature).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["geometry"], Value::Null);
        assert_eq!(value["properties"], json!({}));
    }

    #[test]
    fn test_null_properties_and_geometry() {
        let feature: Feature =
            serde_json::from_value(json!({"type": "Feature", "properties": null, "geometry": null}))
                .unwrap();
        assert!(feature.properties.is_empty());
        assert!(feature.geometry.is_none());
        assert!(feature.id.is_none());
    }

    #[test]
    fn test_numeric_id_kept_numeric() {
        let feature: Feature = serde_json::from_value(json!({"id": 42})).unwrap();
        assert_eq!(feature.id, Some(FeatureId::from(42)));
        assert_eq!(feature.id.unwrap().to_string(), "42");
    }

    #[test]
    fn test_collection_type_marker() {
        let ok = FeatureCollection::from_value(json!({"type": "FeatureCollection"})).unwrap();
        assert!(ok.is_empty());

        let err = FeatureCollection::from_value(json!({"type": "Feature"})).unwrap_err();
        assert!(err.to_string().contains("'Feature'"));

        assert!(FeatureCollection::from_value(json!({"features": []})).is_err());
    }

    #[test]
    fn test_property_order_preserved() {
        let feature: Feature =
            serde_json::from_str(r#"{"properties": {"z": 1, "a": 2, "m": 3}}"#).unwrap();
        let keys: Vec<_> = feature.properties.keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_table_pads_short_rows() {
        let table = Table::from_rows(
            vec!["a".into(), "b".into()],
            vec![vec![json!("1")], vec![json!("2"), json!("3"), json!("x")]],
        );
        assert_eq!(table.rows()[0].cells(), &[json!("1"), Value::Null]);
        assert_eq!(table.rows()[1].cells().len(), 2);
        assert_eq!(table.get(1, "b"), Some(&json!("3")));
    }

    #[test]
    fn test_table_records() {
        let table = Table::from_rows(
            vec!["a".into(), "b".into()],
            vec![vec![json!("1"), Value::Null]],
        );
        assert_eq!(table.head(5), vec![json!({"a": "1", "b": null})]);
    }
}
