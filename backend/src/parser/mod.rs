//! CSV decoding with encoding fallback and delimiter auto-detection.
//!
//! Turns raw bytes into a header row plus [`RawRow`]s. No transaction
//! semantics here.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

use crate::error::{IngestError, IngestResult};
use crate::models::{RawCell, RawRow};

/// Encodings tried in order; the first that decodes cleanly wins.
pub const SUPPORTED_ENCODINGS: [&str; 4] = ["utf-8", "latin-1", "cp1252", "iso-8859-1"];

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Result of parsing with metadata
#[derive(Debug, Clone, Serialize)]
pub struct ParsedTable {
    /// Column headers, in file order
    pub headers: Vec<String>,
    /// Data rows (blank lines dropped)
    pub rows: Vec<RawRow>,
    /// Encoding that decoded the input
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
}

fn encoding_for(label: &str) -> &'static Encoding {
    match label {
        "utf-8" => UTF_8,
        // latin-1 and iso-8859-1 are decoded as their windows-1252 superset
        _ => Encoding::for_label(label.as_bytes()).unwrap_or(WINDOWS_1252),
    }
}

/// Decode bytes with the first supported encoding that succeeds.
///
/// Returns the text and the label of the encoding used.
pub fn decode_with_fallback(bytes: &[u8]) -> IngestResult<(String, &'static str)> {
    decode_with(bytes, &SUPPORTED_ENCODINGS)
}

/// Decode bytes trying `labels` in order.
pub fn decode_with(bytes: &[u8], labels: &[&'static str]) -> IngestResult<(String, &'static str)> {
    for &label in labels {
        let encoding = encoding_for(label);
        let input = if encoding == UTF_8 {
            bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
        } else {
            bytes
        };
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(input) {
            return Ok((text.into_owned(), label));
        }
    }

    Err(IngestError::EncodingFailure {
        tried: labels.iter().map(|l| l.to_string()).collect(),
    })
}

/// Detect the delimiter by counting occurrences in the first line
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

/// Suffix repeated headers with `.1`, `.2`, ... so every column stays
/// addressable. The first occurrence keeps its name.
fn unique_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(headers.len());
    let mut unique = Vec::with_capacity(headers.len());

    for header in headers {
        let mut name = header.clone();
        let mut n = 1;
        while seen.contains(&name) {
            name = format!("{}.{}", header, n);
            n += 1;
        }
        seen.insert(name.clone());
        unique.push(name);
    }
    unique
}

/// Parse decoded CSV text with an explicit delimiter.
pub fn parse_table(content: &str, delimiter: char, encoding: &str) -> IngestResult<ParsedTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let raw_headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    if raw_headers.iter().all(|h| h.is_empty()) {
        return Err(IngestError::NoHeaders);
    }
    let headers = unique_headers(raw_headers);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row = RawRow::from_pairs(
            headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.clone(), record.get(i).unwrap_or(""))),
        );
        if !row.is_blank() {
            rows.push(row);
        }
    }

    Ok(ParsedTable {
        headers,
        rows,
        encoding: encoding.to_string(),
        delimiter,
    })
}

/// Parse CSV bytes with encoding fallback and delimiter auto-detection.
pub fn parse_bytes(bytes: &[u8]) -> IngestResult<ParsedTable> {
    let (content, encoding) = decode_with_fallback(bytes)?;
    let delimiter = detect_delimiter(&content);
    parse_table(&content, delimiter, encoding)
}

/// Parse a CSV file with encoding fallback and delimiter auto-detection.
pub fn parse_file<P: AsRef<Path>>(path: P) -> IngestResult<ParsedTable> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes(&bytes)
}
