//! Error types for the GeoSheet conversion pipeline.
//!
//! This module defines a hierarchy of error types, one per layer:
//!
//! - [`CsvError`] - CSV decoding and parsing errors
//! - [`DocumentError`] - GeoJSON documents that cannot be accepted
//! - [`CodecError`] - table to collection preconditions
//! - [`JoinError`] - attribute join preconditions
//! - [`LoadError`] - tabular source resolution
//! - [`PipelineError`] - Top-level orchestration errors
//! - [`ServerError`] - HTTP layer errors
//!
//! Per-row problems are not errors here: they are collected as diagnostics
//! ([`GeometryParseError`]) and returned next to a well-formed result.
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

// =============================================================================
// CSV Parsing Errors
// =============================================================================

/// Errors during CSV decoding and parsing.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// None of the fallback encodings could decode the bytes.
    #[error("Failed to decode content: {0}")]
    EncodingError(String),

    /// Invalid CSV format.
    #[error("Invalid CSV format at line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// Reader or writer failure from the csv crate.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,
}

impl CsvError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::ParseError {
            line,
            message: message.into(),
        }
    }
}

// =============================================================================
// Document Errors
// =============================================================================

/// Errors for input that claims to be a GeoJSON FeatureCollection.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Not JSON at all.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON, but not an acceptable FeatureCollection.
    #[error("Not a FeatureCollection: {reason}")]
    InvalidDocument { reason: String },
}

impl DocumentError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidDocument {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Codec Errors
// =============================================================================

/// Errors while turning a table back into a FeatureCollection.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A required column is absent from the table.
    #[error("Missing required column: {0}")]
    MissingColumn(String),
}

/// A row whose `geometry_json` cell could not be parsed.
///
/// Not fatal: the feature is still emitted with a null geometry.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("Invalid geometry JSON for feature id={feature_id} (row {row}): {message}")]
pub struct GeometryParseError {
    /// Zero-based row index in the source table.
    pub row: usize,
    /// Display form of the row's `_feature_id`, empty if it had none.
    pub feature_id: String,
    pub message: String,
}

// =============================================================================
// Join Errors
// =============================================================================

/// Which input of a join an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinSide {
    Main,
    Addition,
}

impl fmt::Display for JoinSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinSide::Main => write!(f, "MAIN"),
            JoinSide::Addition => write!(f, "ADDITIONAL"),
        }
    }
}

/// Errors from the attribute joiner.
#[derive(Debug, Error)]
pub enum JoinError {
    /// The join key is not a column of one of the tables.
    #[error("Key '{key}' not found in {side} table (available columns: {})", .available.join(", "))]
    KeyNotFound {
        side: JoinSide,
        key: String,
        available: Vec<String>,
    },
}

// =============================================================================
// Load Errors
// =============================================================================

/// Errors while resolving uploaded bytes into a table or collection.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    #[error("GeoJSON error: {0}")]
    Document(#[from] DocumentError),

    /// Workbook could not be opened or has no usable first sheet.
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    /// File extension not recognised.
    #[error("Unsupported file format: {0} (expected .csv, .xlsx, .geojson or .json)")]
    UnsupportedFormat(String),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the error type returned by the functions in
/// [`crate::transform::pipeline`]. It wraps all lower-level errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    #[error("GeoJSON error: {0}")]
    Document(#[from] DocumentError),

    #[error("{0}")]
    Load(#[from] LoadError),

    #[error("Conversion error: {0}")]
    Codec(#[from] CodecError),

    #[error("Join error: {0}")]
    Join(#[from] JoinError),

    /// Combining was requested but every input was rejected.
    #[error("No valid FeatureCollection among {0} file(s)")]
    NoValidDocuments(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for document parsing.
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let csv_err = CsvError::EmptyFile;
        let pipeline_err: PipelineError = csv_err.into();
        assert!(pipeline_err.to_string().contains("empty"));

        let codec_err = CodecError::MissingColumn("geometry_json".into());
        let pipeline_err: PipelineError = codec_err.into();
        assert!(pipeline_err.to_string().contains("geometry_json"));

        let load_err: LoadError = DocumentError::invalid("type is 'Feature'").into();
        let pipeline_err: PipelineError = load_err.into();
        assert!(pipeline_err.to_string().contains("Not a FeatureCollection"));
    }

    #[test]
    fn test_key_not_found_lists_columns() {
        let err = JoinError::KeyNotFound {
            side: JoinSide::Addition,
            key: "code".into(),
            available: vec!["id".into(), "name".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'code'"));
        assert!(msg.contains("ADDITIONAL"));
        assert!(msg.contains("id, name"));
    }

    #[test]
    fn test_geometry_error_format() {
        let err = GeometryParseError {
            row: 3,
            feature_id: "f4".into(),
            message: "expected value".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("feature id=f4"));
        assert!(msg.contains("row 3"));
    }
}
