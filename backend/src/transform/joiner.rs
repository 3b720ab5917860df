//! Left join of an attribute table onto a main table.
//!
//! # Semantics
//!
//! - Keys are compared after [`normalize_key`]: `123`, `"123"` and
//!   `" 123 "` all match. Blank keys never match.
//! - Every main row is kept. Without a match its addition columns are `null`.
//! - **Fan-out**: a main row matched by N addition rows appears N times, one
//!   per match. Spreadsheet users often expect "first match wins"; it does
//!   not. [`JoinOutput::fanned_out`] tells the caller when it happened.
//! - Column collisions: when both tables have a column (other than the key),
//!   main's values are kept and addition's column is dropped.
//! - The addition table never contributes `geometry_json`.

use serde_json::Value;
use std::collections::{HashMap, HashSet};

use super::normalize::normalize_key;
use crate::error::{JoinError, JoinSide};
use crate::models::{Table, GEOMETRY_COLUMN};

/// Result of [`join`].
#[derive(Debug, Clone, Default)]
pub struct JoinOutput {
    pub table: Table,
    /// Main rows (by index) that found no match.
    pub unmatched: Vec<usize>,
    /// Main rows (by index) matched by more than one addition row.
    pub fanned_out: Vec<usize>,
    /// Addition columns dropped because main already had them.
    pub dropped_columns: Vec<String>,
}

/// Left-join `addition` onto `main` on column `key`.
///
/// Neither input is modified. Fails before doing any work when `key` is
/// missing from either table.
pub fn join(main: &Table, addition: &Table, key: &str) -> Result<JoinOutput, JoinError> {
    let main_key = main.column_index(key).ok_or_else(|| key_not_found(JoinSide::Main, key, main))?;
    let addition_key = addition
        .column_index(key)
        .ok_or_else(|| key_not_found(JoinSide::Addition, key, addition))?;

    // Addition columns carried into the result
    let main_columns: HashSet<&str> = main.columns().iter().map(String::as_str).collect();
    let mut carried: Vec<usize> = Vec::new();
    let mut dropped_columns = Vec::new();
    for (idx, name) in addition.columns().iter().enumerate() {
        if idx == addition_key || name == GEOMETRY_COLUMN {
            continue;
        }
        if main_columns.contains(name.as_str()) {
            dropped_columns.push(name.clone());
        } else {
            carried.push(idx);
        }
    }

    // Index addition rows by normalized key, keeping row order per key
    let mut lookup: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, row) in addition.rows().iter().enumerate() {
        let k = normalize_key(&row.cells()[addition_key]);
        if !k.is_empty() {
            lookup.entry(k).or_default().push(idx);
        }
    }

    let mut columns: Vec<String> = main.columns().to_vec();
    columns.extend(carried.iter().map(|&idx| addition.columns()[idx].clone()));
    let mut table = Table::new(columns);
    let mut unmatched = Vec::new();
    let mut fanned_out = Vec::new();

    for (row_idx, row) in main.rows().iter().enumerate() {
        let k = normalize_key(&row.cells()[main_key]);
        let mut base = row.cells().to_vec();
        base[main_key] = Value::String(k.clone());

        let matches = if k.is_empty() { None } else { lookup.get(&k) };
        match matches {
            Some(indices) => {
                if indices.len() > 1 {
                    fanned_out.push(row_idx);
                }
                for &add_idx in indices {
                    let add_row = &addition.rows()[add_idx];
                    let mut cells = base.clone();
                    cells.extend(carried.iter().map(|&c| add_row.cells()[c].clone()));
                    table.push_row(cells);
                }
            }
            None => {
                unmatched.push(row_idx);
                table.push_row(base);
            }
        }
    }

    Ok(JoinOutput {
        table,
        unmatched,
        fanned_out,
        dropped_columns,
    })
}

fn key_not_found(side: JoinSide, key: &str, table: &Table) -> JoinError {
    JoinError::KeyNotFound {
        side,
        key: key.to_string(),
        available: table.columns().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> Table {
        Table::from_rows(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    #[test]
    fn test_left_join_keeps_all_main_rows() {
        let main = table(
            &["code", "name"],
            vec![
                vec![json!("1"), json!("one")],
                vec![json!("2"), json!("two")],
                vec![json!("3"), json!("three")],
            ],
        );
        let addition = table(
            &["code", "population"],
            vec![
                vec![json!("2"), json!("200")],
                vec![json!("3"), json!("300")],
                vec![json!("4"), json!("400")],
            ],
        );

        let output = join(&main, &addition, "code").unwrap();
        let t = &output.table;
        assert_eq!(t.columns(), &["code", "name", "population"]);
        assert_eq!(t.len(), 3);
        let keys: Vec<_> = t.column_values("code").unwrap().cloned().collect();
        assert_eq!(keys, vec![json!("1"), json!("2"), json!("3")]);
        assert_eq!(t.get(0, "population"), Some(&Value::Null));
        assert_eq!(t.get(1, "population"), Some(&json!("200")));
        assert_eq!(t.get(2, "population"), Some(&json!("300")));
        assert_eq!(output.unmatched, vec![0]);
        assert!(output.fanned_out.is_empty());
    }

    #[test]
    fn test_key_normalization() {
        let main = table(&["id", "a"], vec![vec![json!(123), json!("x")]]);
        let addition = table(&["id", "b"], vec![vec![json!(" 123 "), json!("y")]]);

        let output = join(&main, &addition, "id").unwrap();
        assert_eq!(output.table.get(0, "id"), Some(&json!("123")));
        assert_eq!(output.table.get(0, "b"), Some(&json!("y")));
        assert!(output.unmatched.is_empty());
    }

    #[test]
    fn test_main_wins_on_collision() {
        let main = table(&["id", "name"], vec![vec![json!("1"), json!("main name")]]);
        let addition = table(
            &["id", "name", "extra"],
            vec![vec![json!("1"), json!("other name"), json!("e")]],
        );

        let output = join(&main, &addition, "id").unwrap();
        assert_eq!(output.table.columns(), &["id", "name", "extra"]);
        assert_eq!(output.table.get(0, "name"), Some(&json!("main name")));
        assert_eq!(output.dropped_columns, vec!["name".to_string()]);
    }

    #[test]
    fn test_fan_out_on_duplicate_keys() {
        let main = table(&["id"], vec![vec![json!("1")], vec![json!("2")]]);
        let addition = table(
            &["id", "tag"],
            vec![
                vec![json!("1"), json!("a")],
                vec![json!("1"), json!("b")],
                vec![json!("2"), json!("c")],
            ],
        );

        let output = join(&main, &addition, "id").unwrap();
        let tags: Vec<_> = output.table.column_values("tag").unwrap().cloned().collect();
        assert_eq!(tags, vec![json!("a"), json!("b"), json!("c")]);
        assert_eq!(output.fanned_out, vec![0]);
    }

    #[test]
    fn test_addition_geometry_is_ignored() {
        let main = table(&["_feature_id", "geometry_json"], vec![vec![json!("f1"), json!("{}")]]);
        let addition = table(
            &["_feature_id", "geometry_json", "label"],
            vec![vec![json!("f1"), json!(r#"{"type":"Point"}"#), json!("L")]],
        );

        let output = join(&main, &addition, "_feature_id").unwrap();
        assert_eq!(output.table.columns(), &["_feature_id", "geometry_json", "label"]);
        assert_eq!(output.table.get(0, "geometry_json"), Some(&json!("{}")));
        assert!(output.dropped_columns.is_empty());
    }

    #[test]
    fn test_blank_keys_never_match() {
        let main = table(&["id", "a"], vec![vec![Value::Null, json!("x")], vec![json!(""), json!("y")]]);
        let addition = table(&["id", "b"], vec![vec![json!(""), json!("z")]]);

        let output = join(&main, &addition, "id").unwrap();
        assert_eq!(output.table.len(), 2);
        assert!(output.table.column_values("b").unwrap().all(Value::is_null));
        assert_eq!(output.unmatched, vec![0, 1]);
    }

    #[test]
    fn test_missing_key_reports_side_and_columns() {
        let main = table(&["id", "name"], vec![]);
        let addition = table(&["code"], vec![]);

        match join(&main, &addition, "code").unwrap_err() {
            JoinError::KeyNotFound { side, available, .. } => {
                assert_eq!(side, JoinSide::Main);
                assert_eq!(available, vec!["id".to_string(), "name".to_string()]);
            }
        }

        match join(&main, &addition, "id").unwrap_err() {
            JoinError::KeyNotFound { side, available, .. } => {
                assert_eq!(side, JoinSide::Addition);
                assert_eq!(available, vec!["code".to_string()]);
            }
        }
    }

    #[test]
    fn test_inputs_untouched() {
        let main = table(&["id", "a"], vec![vec![json!(" 1"), json!("x")]]);
        let addition = table(&["id", "b"], vec![vec![json!("1"), json!("y")]]);
        let (main_before, addition_before) = (main.clone(), addition.clone());

        join(&main, &addition, "id").unwrap();
        assert_eq!(main, main_before);
        assert_eq!(addition, addition_before);
    }
}
