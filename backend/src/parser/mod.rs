//! Tabular source loading: raw bytes in, tables or collections out.
//!
//! - [`tabular`] - CSV with encoding fallback and delimiter detection
//! - [`spreadsheet`] - first worksheet of an XLSX workbook
//! - [`geojson`] - FeatureCollection documents
//!
//! [`load_table`] picks the reader from the file name, so both sides of an
//! attribute join can be a CSV, an XLSX or a GeoJSON file.

pub mod geojson;
pub mod spreadsheet;
pub mod tabular;

use serde::Serialize;

pub use geojson::{parse_geojson_bytes, parse_geojson_value, write_geojson};
pub use spreadsheet::parse_xlsx_bytes;
pub use tabular::{
    decode_with_fallback, detect_delimiter, parse_csv_bytes, parse_csv_file_auto, parse_csv_str,
    write_csv, CsvParseResult,
};

use crate::error::LoadError;
use crate::models::Table;
use crate::transform::codec::encode;

/// Kind of file a table was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Csv,
    Xlsx,
    GeoJson,
}

impl SourceKind {
    /// Resolve from a file name's extension (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self, LoadError> {
        let lower = name.to_lowercase();
        if lower.ends_with(".csv") {
            Ok(Self::Csv)
        } else if lower.ends_with(".xlsx") {
            Ok(Self::Xlsx)
        } else if lower.ends_with(".geojson") || lower.ends_with(".json") {
            Ok(Self::GeoJson)
        } else {
            Err(LoadError::UnsupportedFormat(name.to_string()))
        }
    }
}

/// A table plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub table: Table,
    pub kind: SourceKind,
    /// Encoding used, CSV only
    pub encoding: Option<String>,
    /// Delimiter used, CSV only
    pub delimiter: Option<char>,
}

/// Load any supported file as a table.
///
/// GeoJSON files are flattened with [`encode`], so their geometry travels
/// in `geometry_json`.
pub fn load_table(name: &str, bytes: &[u8], delimiter: Option<char>) -> Result<LoadedTable, LoadError> {
    match SourceKind::from_name(name)? {
        SourceKind::Csv => {
            let parsed = parse_csv_bytes(bytes, delimiter)?;
            Ok(LoadedTable {
                table: parsed.table,
                kind: SourceKind::Csv,
                encoding: Some(parsed.encoding),
                delimiter: Some(parsed.delimiter),
            })
        }
        SourceKind::Xlsx => Ok(LoadedTable {
            table: parse_xlsx_bytes(bytes)?,
            kind: SourceKind::Xlsx,
            encoding: None,
            delimiter: None,
        }),
        SourceKind::GeoJson => {
            let collection = parse_geojson_bytes(bytes)?;
            Ok(LoadedTable {
                table: encode(&collection),
                kind: SourceKind::GeoJson,
                encoding: None,
                delimiter: None,
            })
        }
    }
}
