//! GeoJSON FeatureCollection reading and writing.

use serde_json::Value;

use super::tabular::UTF8_BOM;
use crate::error::DocumentError;
use crate::models::FeatureCollection;
use crate::validation::validate_feature_collection;

/// Accept an already parsed JSON document as a FeatureCollection.
///
/// The document must pass the embedded schema (type marker, features
/// array, scalar ids, object property bags); it is never coerced.
pub fn parse_geojson_value(value: Value) -> Result<FeatureCollection, DocumentError> {
    validate_feature_collection(&value).map_err(|errors| DocumentError::invalid(errors.join("; ")))?;
    FeatureCollection::from_value(value)
}

/// Parse GeoJSON bytes (UTF-8, optional byte order mark).
pub fn parse_geojson_bytes(bytes: &[u8]) -> Result<FeatureCollection, DocumentError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let value: Value = serde_json::from_slice(bytes)?;
    parse_geojson_value(value)
}

/// Serialize a collection as pretty-printed UTF-8 GeoJSON.
///
/// Two-space indentation; non-ASCII text is written as is, not escaped.
pub fn write_geojson(collection: &FeatureCollection) -> Result<Vec<u8>, DocumentError> {
    Ok(serde_json::to_vec_pretty(collection)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeatureId;

    #[test]
    fn test_parse_and_write() {
        let input = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","id":"f1","geometry":{"type":"Point","coordinates":[1,2]},"properties":{"nom":"Café"}}
        ]}"#;

        let fc = parse_geojson_bytes(input.as_bytes()).unwrap();
        assert_eq!(fc.len(), 1);
        assert_eq!(fc.features[0].id, Some(FeatureId::from("f1")));

        let text = String::from_utf8(write_geojson(&fc).unwrap()).unwrap();
        assert!(text.contains("\"nom\": \"Café\""));
        assert!(text.starts_with("{\n  \"type\": \"FeatureCollection\",\n  \"features\": ["));
    }

    #[test]
    fn test_not_json() {
        let err = parse_geojson_bytes(b"{ nope").unwrap_err();
        assert!(matches!(err, DocumentError::Json(_)));
    }

    #[test]
    fn test_not_a_collection() {
        let err = parse_geojson_bytes(br#"{"type":"Feature","properties":{}}"#).unwrap_err();
        assert!(matches!(err, DocumentError::InvalidDocument { .. }));
    }

    #[test]
    fn test_bom_is_ignored() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(br#"{"type":"FeatureCollection","features":[]}"#);
        assert!(parse_geojson_bytes(&bytes).unwrap().is_empty());
    }
}
