//! JSON Schema validation for incoming GeoJSON documents.
//!
//! The converter only needs a document to *be* a FeatureCollection: a
//! `"type": "FeatureCollection"` marker, an optional `features` array of
//! objects, scalar ids and object (or null) property bags. Geometry and
//! property values stay opaque.
//!
//! The schema is embedded at compile time from
//! `schemas/feature-collection.json` and parsed once.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use geosheet::validation::{is_feature_collection, validate_feature_collection};
//!
//! let doc = json!({ "type": "FeatureCollection", "features": [] });
//! assert!(is_feature_collection(&doc));
//!
//! let errors = validate_feature_collection(&json!({ "type": "Feature" })).unwrap_err();
//! assert!(!errors.is_empty());
//! ```

use once_cell::sync::Lazy;
use serde_json::Value;

static FEATURE_COLLECTION_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/feature-collection.json"))
        .expect("Invalid embedded schema")
});

/// Validate a JSON value against a JSON schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with one message per violation otherwise
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Quick true/false check.
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// Validate a document against the FeatureCollection schema.
pub fn validate_feature_collection(data: &Value) -> Result<(), Vec<String>> {
    validate(&FEATURE_COLLECTION_SCHEMA, data)
}

/// Quick check against the FeatureCollection schema.
pub fn is_feature_collection(data: &Value) -> bool {
    is_valid(&FEATURE_COLLECTION_SCHEMA, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_collection() {
        let doc = json!({
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "id": "a", "geometry": null, "properties": { "name": "A" } },
                { "type": "Feature", "id": 7, "geometry": "not even an object", "properties": null }
            ]
        });
        assert!(is_feature_collection(&doc));
    }

    #[test]
    fn test_missing_features_is_accepted() {
        assert!(is_feature_collection(&json!({ "type": "FeatureCollection" })));
    }

    #[test]
    fn test_wrong_type_marker() {
        assert!(!is_feature_collection(&json!({ "type": "Feature", "geometry": null })));
        assert!(!is_feature_collection(&json!({ "features": [] })));
        assert!(!is_feature_collection(&json!([1, 2, 3])));
    }

    #[test]
    fn test_bad_feature_members() {
        let doc = json!({
            "type": "FeatureCollection",
            "features": [ { "id": { "nested": true }, "properties": [] } ]
        });
        let errors = validate_feature_collection(&doc).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
