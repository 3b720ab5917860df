//! Combine several FeatureCollections into one.
//!
//! Features are concatenated in input order. Feature ids stay unique: an id
//! already seen earlier in the same merge is renamed to `<id>_1`, `<id>_2`, …
//! (smallest free suffix). Features without an id are passed through and
//! never take part in deduplication.
//!
//! ```text
//! A: [x, y]     B: [x, -]     C: [x]
//!        ↓ merge([A, B, C])
//! [x, y, x_1, -, x_2]
//! ```

use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

use crate::error::DocumentError;
use crate::models::{FeatureCollection, FeatureId};
use crate::parser::parse_geojson_value;

/// A feature id that had to be changed to stay unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateIdRenamed {
    pub original: String,
    pub renamed: String,
}

/// A document skipped by [`merge_documents`].
#[derive(Debug)]
pub struct RejectedDocument {
    /// Position in the input batch.
    pub index: usize,
    pub error: DocumentError,
}

/// Result of a merge.
#[derive(Debug, Clone, Default)]
pub struct MergeOutput {
    pub collection: FeatureCollection,
    /// One notice per renamed feature, in output order.
    pub renamed: Vec<DuplicateIdRenamed>,
    /// Feature count contributed by each input, in input order.
    pub per_input_counts: Vec<usize>,
}

/// Concatenate collections, renaming duplicate feature ids.
///
/// Pure and deterministic: the same inputs in the same order always give
/// the same output, suffixes included.
pub fn merge(collections: Vec<FeatureCollection>) -> MergeOutput {
    let mut output = MergeOutput::default();
    let mut seen: HashSet<String> = HashSet::new();

    for collection in collections {
        output.per_input_counts.push(collection.len());

        for mut feature in collection.features {
            let original = match feature.effective_id() {
                Some(id) => id.to_string(),
                None => {
                    output.collection.features.push(feature);
                    continue;
                }
            };

            if seen.contains(&original) {
                let renamed = next_free_id(&original, &seen);
                feature.id = Some(FeatureId::String(renamed.clone()));
                seen.insert(renamed.clone());
                output.renamed.push(DuplicateIdRenamed { original, renamed });
            } else {
                seen.insert(original);
            }

            output.collection.features.push(feature);
        }
    }

    output
}

/// Merge a batch of raw JSON documents.
///
/// Each document is checked on its own; documents that are not
/// FeatureCollections are returned as rejected and the rest are merged.
pub fn merge_documents(documents: Vec<Value>) -> (MergeOutput, Vec<RejectedDocument>) {
    let mut accepted = Vec::with_capacity(documents.len());
    let mut rejected = Vec::new();

    for (index, document) in documents.into_iter().enumerate() {
        match parse_geojson_value(document) {
            Ok(collection) => accepted.push(collection),
            Err(error) => rejected.push(RejectedDocument { index, error }),
        }
    }

    (merge(accepted), rejected)
}

fn next_free_id(original: &str, seen: &HashSet<String>) -> String {
    let mut counter = 1usize;
    loop {
        let candidate = format!("{}_{}", original, counter);
        if !seen.contains(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fc(ids: &[Option<&str>]) -> FeatureCollection {
        let features: Vec<Value> = ids
            .iter()
            .map(|id| json!({ "type": "Feature", "id": id, "geometry": null, "properties": {} }))
            .collect();
        FeatureCollection::from_value(json!({ "type": "FeatureCollection", "features": features }))
            .unwrap()
    }

    fn ids(collection: &FeatureCollection) -> Vec<Option<String>> {
        collection
            .features
            .iter()
            .map(|f| f.id.as_ref().map(|id| id.to_string()))
            .collect()
    }

    #[test]
    fn test_two_way_duplicate() {
        let output = merge(vec![fc(&[Some("x")]), fc(&[Some("x")])]);
        assert_eq!(ids(&output.collection), vec![Some("x".into()), Some("x_1".into())]);
        assert_eq!(
            output.renamed,
            vec![DuplicateIdRenamed { original: "x".into(), renamed: "x_1".into() }]
        );
    }

    #[test]
    fn test_three_way_duplicate() {
        let output = merge(vec![fc(&[Some("x")]), fc(&[Some("x")]), fc(&[Some("x")])]);
        assert_eq!(
            ids(&output.collection),
            vec![Some("x".into()), Some("x_1".into()), Some("x_2".into())]
        );
        assert_eq!(output.renamed.len(), 2);
    }

    #[test]
    fn test_suffix_skips_taken_ids() {
        let output = merge(vec![fc(&[Some("x"), Some("x_1")]), fc(&[Some("x")])]);
        assert_eq!(
            ids(&output.collection),
            vec![Some("x".into()), Some("x_1".into()), Some("x_2".into())]
        );
    }

    #[test]
    fn test_order_preserved() {
        let output = merge(vec![fc(&[Some("a"), Some("b")]), fc(&[Some("c")]), fc(&[Some("d")])]);
        assert_eq!(
            ids(&output.collection),
            vec![Some("a".into()), Some("b".into()), Some("c".into()), Some("d".into())]
        );
        assert_eq!(output.per_input_counts, vec![2, 1, 1]);
        assert!(output.renamed.is_empty());
    }

    #[test]
    fn test_missing_ids_pass_through() {
        let output = merge(vec![fc(&[None, Some("a")]), fc(&[None, Some("")])]);
        assert_eq!(
            ids(&output.collection),
            vec![None, Some("a".into()), None, Some("".into())]
        );
        assert!(output.renamed.is_empty());
    }

    #[test]
    fn test_numeric_ids_compare_by_display() {
        let a = FeatureCollection::from_value(json!({
            "type": "FeatureCollection",
            "features": [{ "id": 1 }]
        }))
        .unwrap();
        let b = FeatureCollection::from_value(json!({
            "type": "FeatureCollection",
            "features": [{ "id": "1" }]
        }))
        .unwrap();

        let output = merge(vec![a, b]);
        assert_eq!(output.collection.features[0].id, Some(FeatureId::from(1)));
        assert_eq!(output.collection.features[1].id, Some(FeatureId::from("1_1")));
    }

    #[test]
    fn test_deterministic() {
        let inputs = || vec![fc(&[Some("x"), Some("y")]), fc(&[Some("y"), Some("x")])];
        let first = merge(inputs());
        let second = merge(inputs());
        assert_eq!(first.collection, second.collection);
        assert_eq!(first.renamed, second.renamed);
    }

    #[test]
    fn test_merge_documents_skips_invalid() {
        let docs = vec![
            json!({ "type": "FeatureCollection", "features": [{ "id": "x" }] }),
            json!({ "type": "Feature", "geometry": null }),
            json!({ "type": "FeatureCollection", "features": [{ "id": "x" }] }),
        ];

        let (output, rejected) = merge_documents(docs);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].index, 1);
        assert!(matches!(rejected[0].error, DocumentError::InvalidDocument { .. }));
        assert_eq!(ids(&output.collection), vec![Some("x".into()), Some("x_1".into())]);
    }
}
