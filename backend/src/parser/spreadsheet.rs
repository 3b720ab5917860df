//! XLSX workbooks.
//!
//! Only the first worksheet is read. Its first row is the header, named the
//! same way as a CSV header, and every cell comes back as a string so that
//! codes such as `007` survive the way they do in a CSV.

use calamine::{Data, Reader, Xlsx};
use serde_json::Value;
use std::io::Cursor;

use crate::error::LoadError;
use crate::models::Table;
use crate::parser::tabular::header_names;

/// Read the first worksheet of an XLSX workbook.
///
/// Empty cells become null; short rows are padded to the header width.
pub fn parse_xlsx_bytes(bytes: &[u8]) -> Result<Table, LoadError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| LoadError::Spreadsheet(format!("Cannot open workbook: {}", e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| LoadError::Spreadsheet("Workbook has no worksheet".to_string()))?
        .map_err(|e| LoadError::Spreadsheet(format!("Cannot read first worksheet: {}", e)))?;

    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| LoadError::Spreadsheet("First worksheet is empty".to_string()))?;
    let columns = header_names(header.iter().map(render_cell))
        .map_err(|e| LoadError::Spreadsheet(e.to_string()))?;

    let mut table = Table::new(columns);
    for row in rows {
        table.push_row(row.iter().map(cell_value).collect());
    }
    Ok(table)
}

fn render_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        other => Value::String(render_cell(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const OWNERS: &[u8] = include_bytes!("../../tests/fixtures/owners.xlsx");

    #[test]
    fn test_first_sheet_as_strings() {
        let table = parse_xlsx_bytes(OWNERS).unwrap();

        assert_eq!(table.columns(), &["parcel_id", "owner", "area"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "parcel_id"), Some(&json!("101")));
        assert_eq!(table.get(0, "owner"), Some(&json!("Dupont")));
        assert_eq!(table.get(0, "area"), Some(&json!("12.5")));
    }

    #[test]
    fn test_missing_cells_are_null() {
        let table = parse_xlsx_bytes(OWNERS).unwrap();
        assert_eq!(table.get(1, "owner"), Some(&json!("Martin")));
        assert_eq!(table.get(1, "area"), Some(&Value::Null));
    }

    #[test]
    fn test_not_a_workbook() {
        assert!(matches!(
            parse_xlsx_bytes(b"parcel_id,owner\n1,A\n"),
            Err(LoadError::Spreadsheet(_))
        ));
    }
}
