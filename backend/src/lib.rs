//! # geosheet - GeoJSON attribute editing through spreadsheets
//!
//! geosheet flattens a GeoJSON FeatureCollection into a CSV table that can be
//! edited in any spreadsheet program, then rebuilds the GeoJSON from the
//! edited table without touching the geometry. It can also combine several
//! collections and join external attribute tables onto features.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  GeoJSON /  │────▶│   Parser    │────▶│  Transform  │────▶│  CSV /      │
//! │  CSV bytes  │     │  (auto-enc) │     │ (codec,     │     │  GeoJSON    │
//! └─────────────┘     └─────────────┘     │ merge, join)│     └─────────────┘
//!                                         └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use geosheet::{export_geojson, import_csv, ExportOptions, ImportOptions};
//!
//! let exported = export_geojson(&std::fs::read("roads.geojson")?, &ExportOptions::default())?;
//! // ... edit the CSV ...
//! let imported = import_csv(&exported.csv, &ImportOptions::default())?;
//! println!("Rebuilt {} features", imported.collection.len());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Features, collections and tables
//! - [`parser`] - CSV, XLSX and GeoJSON reading/writing with auto-detection
//! - [`transform`] - Codec, merger, joiner and pipeline
//! - [`validation`] - FeatureCollection schema validation
//! - [`session`] - Per-client active document
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Transformation
pub mod transform;

// Validation
pub mod validation;

// Sessions
pub mod session;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    CodecError, CsvError, DocumentError, GeometryParseError, JoinError, JoinSide, LoadError,
    PipelineError, PipelineResult, ServerError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    Feature, FeatureCollection, FeatureId, Row, Table, FEATURE_ID_COLUMN, GEOMETRY_COLUMN,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{is_feature_collection, is_valid, validate, validate_feature_collection};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{
    detect_delimiter, load_table, parse_csv_bytes, parse_csv_file_auto, parse_geojson_bytes,
    parse_xlsx_bytes, write_csv, write_geojson, CsvParseResult, LoadedTable, SourceKind,
};

// =============================================================================
// Re-exports - Core transforms
// =============================================================================

pub use transform::{
    decode, encode, join, merge, merge_documents, DecodeOutput, DuplicateIdRenamed, JoinOutput,
    MergeOutput,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    combine_files, export_collection, export_geojson, import_csv, join_files, read_named,
    CombineResult, CsvInfo, ExportOptions, ExportResult, ImportOptions, ImportResult,
    JoinFilesResult, JoinOptions, NamedInput,
};

// =============================================================================
// Re-exports - Sessions
// =============================================================================

pub use session::{Session, SessionStore};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::server::{parse_delimiter, ServerConfig};
pub use api::types::error_response;

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
