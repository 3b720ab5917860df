//! High-level pipeline API for the GeoJSON ⇄ CSV workflow.
//!
//! Each function is one step of the editing workflow, bytes in and bytes
//! out, logging progress through the log broadcaster:
//!
//! | Step | Function | Input | Output |
//! |------|----------|-------|--------|
//! | combine | [`combine_files`] | several GeoJSON files | one GeoJSON |
//! | export | [`export_geojson`] | GeoJSON | CSV for a spreadsheet |
//! | import | [`import_csv`] | edited CSV | GeoJSON |
//! | join | [`join_files`] | main + attribute file | CSV (+ GeoJSON) |
//!
//! # Example
//!
//! ```rust,ignore
//! use geosheet::transform::pipeline::{export_geojson, ExportOptions};
//!
//! let bytes = std::fs::read("parcels.geojson")?;
//! let result = export_geojson(&bytes, &ExportOptions::default())?;
//! std::fs::write("parcels.csv", &result.csv)?;
//! println!("Exported {} rows", result.table_info.row_count);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use super::codec::{decode, encode};
use super::joiner::join;
use super::merger::{merge_documents, DuplicateIdRenamed};
use crate::api::logs::{
    log_error, log_info, log_info_indent, log_success, log_warning, log_warning_indent,
};
use crate::error::{CodecError, DocumentError, GeometryParseError, PipelineError, PipelineResult};
use crate::models::{FeatureCollection, Table, GEOMETRY_COLUMN};
use crate::parser::tabular::UTF8_BOM;
use crate::parser::{load_table, parse_csv_bytes, parse_geojson_bytes, write_csv, write_geojson, SourceKind};

/// How many diagnostics are echoed to the log before summarizing.
const LOGGED_DIAGNOSTICS: usize = 3;

// =============================================================================
// Inputs
// =============================================================================

/// An uploaded or read file: its name picks the reader.
#[derive(Debug, Clone)]
pub struct NamedInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl NamedInput {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Read a file from disk, keeping its file name for format resolution.
pub fn read_named(path: &Path) -> PipelineResult<NamedInput> {
    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    Ok(NamedInput { name, bytes })
}

// =============================================================================
// Options
// =============================================================================

/// Options for [`export_geojson`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Output CSV delimiter
    pub delimiter: char,

    /// Prepend a UTF-8 byte order mark
    pub bom: bool,

    /// Number of rows included in the preview
    pub preview_rows: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            bom: false,
            preview_rows: 10,
        }
    }
}

/// Options for [`import_csv`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Force a delimiter instead of detecting it
    pub delimiter: Option<char>,
}

/// Options for [`join_files`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinOptions {
    /// Force a delimiter when reading CSV inputs
    pub input_delimiter: Option<char>,

    /// Output CSV delimiter
    pub output_delimiter: char,

    /// Prepend a UTF-8 byte order mark to the CSV output
    pub bom: bool,

    /// Number of rows included in the preview
    pub preview_rows: usize,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            input_delimiter: None,
            output_delimiter: ',',
            bom: false,
            preview_rows: 10,
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// Shape of a produced table, for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub columns: Vec<String>,
    pub row_count: usize,
    /// First rows as column -> cell objects
    pub preview: Vec<Value>,
}

impl TableInfo {
    pub fn from_table(table: &Table, preview_rows: usize) -> Self {
        Self {
            columns: table.columns().to_vec(),
            row_count: table.len(),
            preview: table.head(preview_rows),
        }
    }
}

/// CSV file information
#[derive(Debug, Clone, Serialize)]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
    pub row_count: usize,
}

/// Result of [`export_geojson`]
#[derive(Debug, Clone)]
pub struct ExportResult {
    /// CSV bytes, UTF-8
    pub csv: Vec<u8>,
    pub table_info: TableInfo,
}

/// Result of [`import_csv`]
#[derive(Debug, Clone)]
pub struct ImportResult {
    /// Pretty-printed GeoJSON bytes
    pub geojson: Vec<u8>,
    pub collection: FeatureCollection,
    /// Rows whose geometry could not be parsed (emitted with null geometry)
    pub geometry_errors: Vec<GeometryParseError>,
    pub csv_info: CsvInfo,
}

/// A file left out of a combine.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedFile {
    pub name: String,
    pub reason: String,
}

/// Features contributed by one combined file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCount {
    pub name: String,
    pub features: usize,
}

/// Result of [`combine_files`]
#[derive(Debug, Clone)]
pub struct CombineResult {
    /// Pretty-printed GeoJSON bytes
    pub geojson: Vec<u8>,
    pub collection: FeatureCollection,
    pub renamed: Vec<DuplicateIdRenamed>,
    pub rejected: Vec<RejectedFile>,
    /// Accepted files in input order
    pub per_file_counts: Vec<FileCount>,
}

/// Result of [`join_files`]
#[derive(Debug, Clone)]
pub struct JoinFilesResult {
    /// Joined table as CSV bytes
    pub csv: Vec<u8>,
    /// Joined GeoJSON, only when the main file was GeoJSON
    pub geojson: Option<Vec<u8>>,
    pub table: Table,
    pub table_info: TableInfo,
    /// Main rows without a matching addition row
    pub unmatched: Vec<usize>,
    /// Main rows duplicated by several matches
    pub fanned_out: Vec<usize>,
    /// Addition columns dropped because main already had them
    pub dropped_columns: Vec<String>,
    pub geometry_errors: Vec<GeometryParseError>,
}

// =============================================================================
// Steps
// =============================================================================

/// Combine several GeoJSON files into one FeatureCollection.
///
/// Files that are not JSON or not FeatureCollections are rejected one by
/// one; the rest are merged in input order with duplicate ids renamed.
/// Fails only when no file is acceptable.
pub fn combine_files(files: Vec<NamedInput>) -> PipelineResult<CombineResult> {
    let total = files.len();
    log_info(format!("🔄 Combining {} file(s)...", total));

    let mut names = Vec::with_capacity(total);
    let mut documents = Vec::with_capacity(total);
    let mut rejected = Vec::new();

    for file in files {
        let bytes = file.bytes.strip_prefix(UTF8_BOM).unwrap_or(&file.bytes);
        match serde_json::from_slice::<Value>(bytes) {
            Ok(document) => {
                names.push(file.name);
                documents.push(document);
            }
            Err(e) => {
                let reason = DocumentError::from(e).to_string();
                log_warning(format!("Skipping {}: {}", file.name, reason));
                rejected.push(RejectedFile { name: file.name, reason });
            }
        }
    }

    let (output, invalid) = merge_documents(documents);
    let mut invalid_indices = Vec::with_capacity(invalid.len());
    for doc in invalid {
        let name = names[doc.index].clone();
        let reason = doc.error.to_string();
        log_warning(format!("Skipping {}: {}", name, reason));
        invalid_indices.push(doc.index);
        rejected.push(RejectedFile { name, reason });
    }

    if output.per_input_counts.is_empty() {
        log_error("No valid FeatureCollection to combine");
        return Err(PipelineError::NoValidDocuments(total));
    }

    let per_file_counts: Vec<FileCount> = names
        .iter()
        .enumerate()
        .filter(|(idx, _)| !invalid_indices.contains(idx))
        .map(|(_, name)| name)
        .zip(&output.per_input_counts)
        .map(|(name, &features)| FileCount {
            name: name.clone(),
            features,
        })
        .collect();

    for count in &per_file_counts {
        log_info_indent(format!("{}: {} features", count.name, count.features), 1);
    }
    if !output.renamed.is_empty() {
        log_warning(format!("{} duplicate id(s) renamed", output.renamed.len()));
        for notice in output.renamed.iter().take(LOGGED_DIAGNOSTICS) {
            log_warning_indent(format!("{} → {}", notice.original, notice.renamed), 1);
        }
    }

    let geojson = write_geojson(&output.collection)?;
    log_success(format!(
        "Combined {} features from {} file(s)",
        output.collection.len(),
        per_file_counts.len()
    ));

    Ok(CombineResult {
        geojson,
        collection: output.collection,
        renamed: output.renamed,
        rejected,
        per_file_counts,
    })
}

/// Convert GeoJSON bytes into a CSV for spreadsheet editing.
pub fn export_geojson(bytes: &[u8], options: &ExportOptions) -> PipelineResult<ExportResult> {
    log_info("📖 Reading GeoJSON...");
    let collection = parse_geojson_bytes(bytes)?;
    log_success(format!("Read {} features", collection.len()));
    export_collection(&collection, options)
}

/// Convert an already loaded collection into CSV.
pub fn export_collection(
    collection: &FeatureCollection,
    options: &ExportOptions,
) -> PipelineResult<ExportResult> {
    let table = encode(collection);
    log_info(format!("📋 Table has {} columns:", table.columns().len()));
    for (i, col) in table.columns().iter().enumerate() {
        log_info_indent(format!("[{:2}] {}", i + 1, col), 1);
    }

    let csv = write_csv(&table, options.delimiter, options.bom)?;
    log_success(format!(
        "Wrote {} rows (separator '{}')",
        table.len(),
        format_delimiter(options.delimiter)
    ));

    Ok(ExportResult {
        csv,
        table_info: TableInfo::from_table(&table, options.preview_rows),
    })
}

/// Rebuild GeoJSON from an edited CSV.
///
/// Fails before decoding when the CSV has no `geometry_json` column. Rows
/// with unparseable geometry are kept with a null geometry and reported.
pub fn import_csv(bytes: &[u8], options: &ImportOptions) -> PipelineResult<ImportResult> {
    log_info("📖 Reading CSV file...");
    log_info("Detecting encoding and separator...");
    let parsed = parse_csv_bytes(bytes, options.delimiter)?;
    log_success(format!("Detected encoding: {}", parsed.encoding));
    log_success(format!("Detected separator: '{}'", format_delimiter(parsed.delimiter)));
    log_success(format!("Read {} rows", parsed.table.len()));

    let csv_info = CsvInfo {
        encoding: parsed.encoding,
        delimiter: parsed.delimiter,
        headers: parsed.table.columns().to_vec(),
        row_count: parsed.table.len(),
    };

    if !parsed.table.has_column(GEOMETRY_COLUMN) {
        log_error(format!("CSV has no '{}' column", GEOMETRY_COLUMN));
        return Err(CodecError::MissingColumn(GEOMETRY_COLUMN.to_string()).into());
    }

    log_info("⚙️  Rebuilding features...");
    let decoded = decode(&parsed.table)?;
    report_geometry_errors(&decoded.geometry_errors);

    let geojson = write_geojson(&decoded.collection)?;
    log_success(format!("Built {} features", decoded.collection.len()));

    Ok(ImportResult {
        geojson,
        collection: decoded.collection,
        geometry_errors: decoded.geometry_errors,
        csv_info,
    })
}

/// Left-join an attribute file onto a main file by `key`.
///
/// Either file may be CSV or GeoJSON. When the main file is GeoJSON its
/// geometry rides along in `geometry_json` and a joined GeoJSON is
/// produced as well.
pub fn join_files(
    main: &NamedInput,
    addition: &NamedInput,
    key: &str,
    options: &JoinOptions,
) -> PipelineResult<JoinFilesResult> {
    log_info(format!("📖 Loading main file {}...", main.name));
    let main_loaded = load_table(&main.name, &main.bytes, options.input_delimiter)?;
    log_success(format!("{} rows, {} columns", main_loaded.table.len(), main_loaded.table.columns().len()));

    log_info(format!("📖 Loading attribute file {}...", addition.name));
    let addition_loaded = load_table(&addition.name, &addition.bytes, options.input_delimiter)?;
    log_success(format!(
        "{} rows, {} columns",
        addition_loaded.table.len(),
        addition_loaded.table.columns().len()
    ));

    log_info(format!("🔗 Joining on '{}'...", key));
    let output = join(&main_loaded.table, &addition_loaded.table, key).map_err(|e| {
        log_error(e.to_string());
        e
    })?;

    if !output.unmatched.is_empty() {
        log_warning(format!("{} main row(s) without a match", output.unmatched.len()));
    }
    if !output.fanned_out.is_empty() {
        log_warning(format!(
            "{} main row(s) matched several attribute rows and were duplicated",
            output.fanned_out.len()
        ));
    }
    if !output.dropped_columns.is_empty() {
        log_warning(format!(
            "Kept main values for shared column(s): {}",
            output.dropped_columns.join(", ")
        ));
    }

    let csv = write_csv(&output.table, options.output_delimiter, options.bom)?;

    let (geojson, geometry_errors) = if main_loaded.kind == SourceKind::GeoJson {
        let decoded = decode(&output.table)?;
        report_geometry_errors(&decoded.geometry_errors);
        (Some(write_geojson(&decoded.collection)?), decoded.geometry_errors)
    } else {
        (None, Vec::new())
    };

    log_success(format!("Joined table has {} rows", output.table.len()));

    Ok(JoinFilesResult {
        csv,
        geojson,
        table_info: TableInfo::from_table(&output.table, options.preview_rows),
        table: output.table,
        unmatched: output.unmatched,
        fanned_out: output.fanned_out,
        dropped_columns: output.dropped_columns,
        geometry_errors,
    })
}

fn report_geometry_errors(errors: &[GeometryParseError]) {
    if errors.is_empty() {
        log_success("All geometries parsed");
        return;
    }
    log_warning(format!("{} row(s) with invalid geometry (kept with null geometry)", errors.len()));
    for err in errors.iter().take(LOGGED_DIAGNOSTICS) {
        log_error(err.to_string());
    }
}

/// Format delimiter for display
fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "TAB".to_string(),
        other => other.to_string(),
    }
}
