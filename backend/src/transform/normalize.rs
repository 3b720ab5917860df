//! Cell value normalization shared by the codec, the joiner and the CSV writer.

use serde_json::Value;

/// Tokens a spreadsheet round trip leaves behind for blank cells.
pub const BLANK_SENTINELS: [&str; 3] = ["NaN", "NaT", "None"];

/// Whether a cell counts as "no value".
///
/// `null`, the empty string and the blank sentinels are absent. Whitespace
/// is significant: `" "` is a value.
pub fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty() || BLANK_SENTINELS.contains(&s.as_str()),
        _ => false,
    }
}

/// Render a cell the way it is written to a CSV file.
///
/// Strings are written verbatim, `null` as an empty cell, anything else
/// (numbers, booleans, nested objects and arrays) as minified JSON.
pub fn cell_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Normalize a join key: string form, surrounding whitespace stripped.
///
/// `123`, `"123"` and `" 123 "` all become `"123"`.
pub fn normalize_key(value: &Value) -> String {
    cell_to_string(value).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_values() {
        assert!(is_absent(&Value::Null));
        assert!(is_absent(&json!("")));
        assert!(is_absent(&json!("NaN")));
        assert!(is_absent(&json!("NaT")));
        assert!(is_absent(&json!("None")));

        assert!(!is_absent(&json!(" ")));
        assert!(!is_absent(&json!("none")));
        assert!(!is_absent(&json!(0)));
        assert!(!is_absent(&json!(false)));
        assert!(!is_absent(&json!([])));
    }

    #[test]
    fn test_cell_to_string() {
        assert_eq!(cell_to_string(&Value::Null), "");
        assert_eq!(cell_to_string(&json!("Société")), "Société");
        assert_eq!(cell_to_string(&json!(12.5)), "12.5");
        assert_eq!(cell_to_string(&json!(true)), "true");
        assert_eq!(cell_to_string(&json!({"a": [1, 2]})), r#"{"a":[1,2]}"#);
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key(&json!(123)), "123");
        assert_eq!(normalize_key(&json!("123")), "123");
        assert_eq!(normalize_key(&json!(" 123 ")), "123");
        assert_eq!(normalize_key(&Value::Null), "");
    }
}
