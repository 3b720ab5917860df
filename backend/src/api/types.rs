//! REST API types for frontend integration.
//!
//! Every response carries the produced document as text (ready to offer
//! as a download) plus metadata and per-row diagnostics. Field names are
//! camelCase.

use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::GeometryParseError;
use crate::transform::merger::DuplicateIdRenamed;
use crate::transform::pipeline::{
    CombineResult, CsvInfo, ExportResult, FileCount, ImportResult, JoinFilesResult, RejectedFile,
    TableInfo,
};

/// "ready" when the step produced no diagnostics, "warning" otherwise
fn status(clean: bool) -> String {
    if clean { "ready" } else { "warning" }.to_string()
}

fn text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Response for `POST /api/combine`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombineResponse {
    pub job_id: String,
    pub status: String,
    /// Combined FeatureCollection, pretty-printed
    pub geojson: String,
    pub total_features: usize,
    pub renamed: Vec<DuplicateIdRenamed>,
    pub rejected: Vec<RejectedFile>,
    pub per_file_counts: Vec<FileCount>,
    /// Session now holding the result as its active document
    pub session_id: Option<String>,
}

impl From<CombineResult> for CombineResponse {
    fn from(result: CombineResult) -> Self {
        CombineResponse {
            job_id: Uuid::new_v4().to_string(),
            status: status(result.renamed.is_empty() && result.rejected.is_empty()),
            total_features: result.collection.len(),
            geojson: text(result.geojson),
            renamed: result.renamed,
            rejected: result.rejected,
            per_file_counts: result.per_file_counts,
            session_id: None,
        }
    }
}

/// Response for `POST /api/export`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    pub job_id: String,
    pub status: String,
    pub csv: String,
    pub table: TableInfo,
}

impl From<ExportResult> for ExportResponse {
    fn from(result: ExportResult) -> Self {
        ExportResponse {
            job_id: Uuid::new_v4().to_string(),
            status: status(true),
            csv: text(result.csv),
            table: result.table_info,
        }
    }
}

/// CSV file metadata
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvMetadata {
    pub encoding: String,
    pub delimiter: String,
    pub row_count: usize,
    pub columns: Vec<String>,
}

impl From<CsvInfo> for CsvMetadata {
    fn from(info: CsvInfo) -> Self {
        CsvMetadata {
            encoding: info.encoding,
            delimiter: info.delimiter.to_string(),
            row_count: info.row_count,
            columns: info.headers,
        }
    }
}

/// Response for `POST /api/import`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub job_id: String,
    pub status: String,
    pub geojson: String,
    pub total_features: usize,
    /// First rebuilt feature, for a quick visual check
    pub first_feature: Option<Value>,
    pub geometry_errors: Vec<GeometryParseError>,
    pub csv_info: CsvMetadata,
}

impl From<ImportResult> for ImportResponse {
    fn from(result: ImportResult) -> Self {
        let first_feature = result
            .collection
            .features
            .first()
            .and_then(|f| serde_json::to_value(f).ok());

        ImportResponse {
            job_id: Uuid::new_v4().to_string(),
            status: status(result.geometry_errors.is_empty()),
            geojson: text(result.geojson),
            total_features: result.collection.len(),
            first_feature,
            geometry_errors: result.geometry_errors,
            csv_info: result.csv_info.into(),
        }
    }
}

/// Response for `POST /api/join`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub job_id: String,
    pub status: String,
    pub csv: String,
    /// Present only when the main file was GeoJSON
    pub geojson: Option<String>,
    pub table: TableInfo,
    pub unmatched_rows: Vec<usize>,
    pub fanned_out_rows: Vec<usize>,
    pub dropped_columns: Vec<String>,
    pub geometry_errors: Vec<GeometryParseError>,
}

impl From<JoinFilesResult> for JoinResponse {
    fn from(result: JoinFilesResult) -> Self {
        let clean = result.fanned_out.is_empty()
            && result.dropped_columns.is_empty()
            && result.geometry_errors.is_empty();

        JoinResponse {
            job_id: Uuid::new_v4().to_string(),
            status: status(clean),
            csv: text(result.csv),
            geojson: result.geojson.map(text),
            table: result.table_info,
            unmatched_rows: result.unmatched,
            fanned_out_rows: result.fanned_out,
            dropped_columns: result.dropped_columns,
            geometry_errors: result.geometry_errors,
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeatureCollection, Table};

    #[test]
    fn test_combine_response_shape() {
        let result = CombineResult {
            geojson: br#"{"type":"FeatureCollection","features":[]}"#.to_vec(),
            collection: FeatureCollection::default(),
            renamed: vec![DuplicateIdRenamed {
                original: "x".into(),
                renamed: "x_1".into(),
            }],
            rejected: vec![],
            per_file_counts: vec![FileCount {
                name: "a.geojson".into(),
                features: 0,
            }],
        };

        let value = serde_json::to_value(CombineResponse::from(result)).unwrap();
        assert_eq!(value["status"], "warning");
        assert_eq!(value["renamed"][0]["renamed"], "x_1");
        assert_eq!(value["perFileCounts"][0]["name"], "a.geojson");
        assert!(value["sessionId"].is_null());
        assert!(value["geojson"].as_str().unwrap().contains("FeatureCollection"));
    }

    #[test]
    fn test_join_response_status() {
        let table = Table::new(vec!["id".into()]);
        let result = JoinFilesResult {
            csv: b"id\n".to_vec(),
            geojson: None,
            table_info: TableInfo::from_table(&table, 10),
            table,
            unmatched: vec![0],
            fanned_out: vec![],
            dropped_columns: vec![],
            geometry_errors: vec![],
        };

        let value = serde_json::to_value(JoinResponse::from(result)).unwrap();
        // Unmatched rows are expected in a left join
        assert_eq!(value["status"], "ready");
        assert_eq!(value["unmatchedRows"][0], 0);
        assert!(value["geojson"].is_null());
        assert_eq!(value["table"]["rowCount"], 0);
    }

    #[test]
    fn test_csv_metadata_from_info() {
        let meta = CsvMetadata::from(CsvInfo {
            encoding: "latin-1".into(),
            delimiter: ';',
            headers: vec!["a".into()],
            row_count: 4,
        });
        assert_eq!(meta.delimiter, ";");
        assert_eq!(meta.columns, vec!["a".to_string()]);
    }

    #[test]
    fn test_error_response() {
        let value = error_response("Key 'code' not found");
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"], "Key 'code' not found");
        assert!(value["jobId"].is_string());
    }
}
