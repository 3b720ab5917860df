//! CSV reading and writing with encoding and delimiter auto-detection.
//!
//! Spreadsheet programs save CSV in whatever encoding the user's locale
//! prefers, so bytes are decoded by trying UTF-8, then Latin-1, then
//! Windows-1252, keeping the first that decodes cleanly. Every cell is
//! read as a string; typing is left to the caller.

use encoding_rs::{mem::decode_latin1, UTF_8, WINDOWS_1252};
use serde_json::Value;
use std::path::Path;

use crate::error::CsvError;
use crate::models::Table;
use crate::transform::normalize::cell_to_string;

pub(crate) const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Encodings tried in order, with the label reported to the caller.
#[derive(Debug, Clone, Copy)]
enum Fallback {
    Utf8,
    Latin1,
    Windows1252,
}

impl Fallback {
    const ORDER: [Fallback; 3] = [Fallback::Utf8, Fallback::Latin1, Fallback::Windows1252];

    fn label(self) -> &'static str {
        match self {
            Fallback::Utf8 => "utf-8",
            Fallback::Latin1 => "latin-1",
            Fallback::Windows1252 => "windows-1252",
        }
    }

    fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Fallback::Utf8 => UTF_8
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| text.into_owned()),
            // ISO-8859-1 maps every byte to the code point of the same value
            Fallback::Latin1 => Some(decode_latin1(bytes).into_owned()),
            Fallback::Windows1252 => WINDOWS_1252
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| text.into_owned()),
        }
    }
}

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct CsvParseResult {
    /// Parsed rows, all cells strings
    pub table: Table,
    /// Encoding that decoded the bytes
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
}

/// Decode bytes with the first fallback encoding that succeeds.
///
/// A UTF-8 byte order mark is dropped. Returns the text and the label of
/// the encoding used.
pub fn decode_with_fallback(bytes: &[u8]) -> Result<(String, String), CsvError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    for fallback in Fallback::ORDER {
        if let Some(text) = fallback.decode(bytes) {
            return Ok((text, fallback.label().to_string()));
        }
    }

    Err(CsvError::EncodingError(format!(
        "tried {}",
        Fallback::ORDER
            .iter()
            .map(|f| f.label())
            .collect::<Vec<_>>()
            .join(", ")
    )))
}

/// Detect the delimiter by counting occurrences in the header line.
///
/// Ties and header lines without any separator fall back to `,`.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse CSV text with an explicit delimiter.
///
/// The first record is the header. Header names are trimmed; empty ones
/// become `column_<n>`. Duplicate header names are rejected since a table
/// column must be addressable by name.
pub fn parse_csv_str(content: &str, delimiter: char) -> Result<Table, CsvError> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_byte(delimiter)?)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = header_names(
        reader
            .headers()
            .map_err(|e| CsvError::parse(1, format!("Cannot read header: {}", e)))?
            .iter(),
    )?;

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let line_num = idx + 2; // +1 for 0-index, +1 for header
        let record = record.map_err(|e| CsvError::parse(line_num, e.to_string()))?;
        rows.push(
            record
                .iter()
                .map(|field| Value::String(field.to_string()))
                .collect(),
        );
    }

    Ok(Table::from_rows(headers, rows))
}

/// Turn a raw header row into column names.
///
/// Names are trimmed, empty ones become `column_<n>` and duplicates are
/// rejected.
pub(crate) fn header_names<I, S>(raw: I) -> Result<Vec<String>, CsvError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let headers: Vec<String> = raw
        .into_iter()
        .enumerate()
        .map(|(i, h)| match h.as_ref().trim() {
            "" => format!("column_{}", i),
            name => name.to_string(),
        })
        .collect();

    if headers.is_empty() {
        return Err(CsvError::NoHeaders);
    }
    for (i, name) in headers.iter().enumerate() {
        if headers[..i].contains(name) {
            return Err(CsvError::parse(1, format!("Duplicate column '{}'", name)));
        }
    }
    Ok(headers)
}

/// Parse CSV bytes, detecting encoding and (unless given) the delimiter.
pub fn parse_csv_bytes(bytes: &[u8], delimiter: Option<char>) -> Result<CsvParseResult, CsvError> {
    let (content, encoding) = decode_with_fallback(bytes)?;
    let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(&content));
    let table = parse_csv_str(&content, delimiter)?;

    Ok(CsvParseResult {
        table,
        encoding,
        delimiter,
    })
}

/// Parse a CSV file with auto-detection of encoding and delimiter.
pub fn parse_csv_file_auto<P: AsRef<Path>>(path: P) -> Result<CsvParseResult, CsvError> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_csv_bytes(&bytes, None)
}

/// Write a table as UTF-8 CSV.
///
/// Cells are rendered with [`cell_to_string`]; fields containing the
/// delimiter, quotes or newlines (typically `geometry_json`) are quoted.
/// `bom` prepends a UTF-8 byte order mark, which some spreadsheet programs
/// need to pick the right encoding on open.
pub fn write_csv(table: &Table, delimiter: char, bom: bool) -> Result<Vec<u8>, CsvError> {
    let mut buffer = Vec::new();
    if bom {
        buffer.extend_from_slice(UTF8_BOM);
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter_byte(delimiter)?)
        .from_writer(buffer);

    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.cells().iter().map(cell_to_string))?;
    }

    writer
        .into_inner()
        .map_err(|e| CsvError::IoError(std::io::Error::new(e.error().kind(), e.error().to_string())))
}

fn delimiter_byte(delimiter: char) -> Result<u8, CsvError> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| CsvError::parse(0, format!("Delimiter '{}' is not a single ASCII character", delimiter)))
}
