//! Row normalization: raw CSV rows to canonical [`Transaction`]s.
//!
//! Per-row problems never abort a batch. A row whose amount cannot be used
//! is skipped, and a date that matches no known format leaves the
//! transaction undated. Both are reported as [`RowIssue`]s.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::api::logs::{log_info, log_warning};
use crate::error::{IngestError, IngestResult};
use crate::matcher::detect_mapping;
use crate::models::{CanonicalField, ColumnMapping, RawCell, RawRow, Transaction};
use crate::parser::{parse_bytes, ParsedTable};

/// Currency symbols, thousands separators and whitespace.
static AMOUNT_NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[£$€¥₹,\s]").expect("valid regex"));

/// Date-only formats, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y"];

/// Formats carrying a time of day, tried after [`DATE_FORMATS`].
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

/// Dash and dot separated formats, tried last.
const LATE_FORMATS: &[&str] = &[
    "%d-%m-%Y",
    "%m-%d-%Y",
    "%d.%m.%Y",
    "%m.%d.%Y",
    "%d-%m-%Y %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
];

// =============================================================================
// Field Parsing
// =============================================================================

/// Parse a monetary string.
///
/// Strips currency symbols, commas and whitespace. A value wrapped in
/// parentheses is negative. Returns `None` when nothing numeric remains.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned = AMOUNT_NOISE.replace_all(raw, "");
    let (negative, body) = match cleaned.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, cleaned.as_ref()),
    };

    let value: f64 = body.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

/// Amount carried by a cell. Blank or unparsable cells count as `0.0`.
pub fn clean_amount(cell: &RawCell) -> f64 {
    match cell {
        RawCell::Number(n) if n.is_finite() => *n,
        RawCell::Number(_) | RawCell::Blank => 0.0,
        RawCell::Text(s) => parse_amount(s).unwrap_or(0.0),
    }
}

/// Smallest year a four-digit `%Y` field can carry. chrono also accepts
/// shorter years, so `3/5/24` would otherwise parse as year 24.
const MIN_YEAR: i32 = 1000;

fn parse_with(raw: &str, format: &str) -> Option<NaiveDate> {
    let date = if format.contains("%H") {
        NaiveDateTime::parse_from_str(raw, format).ok().map(|dt| dt.date())
    } else {
        NaiveDate::parse_from_str(raw, format).ok()
    };
    date.filter(|d| d.year() >= MIN_YEAR)
}

/// Parse a date string against the known formats. First match wins.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .chain(DATETIME_FORMATS)
        .chain(LATE_FORMATS)
        .find_map(|format| parse_with(raw, format))
}

// =============================================================================
// Row Issues
// =============================================================================

/// What went wrong with a single row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueKind {
    /// Amount parsed but its magnitude is below the noise floor. Row skipped.
    NegligibleAmount { amount: f64 },
    /// Amount cell blank or not a number. Row skipped.
    UnparsableAmount { raw: String },
    /// Date matched no known format. Row kept, undated.
    UnparsableDate { raw: String },
}

/// A recovered per-row problem. `row` is the 1-based data row number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowIssue {
    pub row: usize,
    #[serde(flatten)]
    pub kind: IssueKind,
}

impl RowIssue {
    /// Whether the row was dropped from the output.
    pub fn is_skip(&self) -> bool {
        !matches!(self.kind, IssueKind::UnparsableDate { .. })
    }
}

/// Transactions plus every recovered issue, in row order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizeReport {
    pub transactions: Vec<Transaction>,
    pub issues: Vec<RowIssue>,
}

impl NormalizeReport {
    pub fn skipped_rows(&self) -> usize {
        self.issues.iter().filter(|i| i.is_skip()).count()
    }

    pub fn undated_rows(&self) -> usize {
        self.issues.iter().filter(|i| !i.is_skip()).count()
    }
}

// =============================================================================
// Normalization
// =============================================================================

fn cell_text(row: &RawRow, mapping: &ColumnMapping, field: CanonicalField) -> Option<String> {
    mapping
        .get(field)
        .and_then(|header| row.get(header))
        .and_then(RawCell::text)
}

fn normalize_row(
    index: usize,
    row: &RawRow,
    amount_header: &str,
    mapping: &ColumnMapping,
    issues: &mut Vec<RowIssue>,
) -> Option<Transaction> {
    let number = index + 1;
    let cell = row.get(amount_header).unwrap_or(&RawCell::Blank);

    let amount = match cell {
        RawCell::Text(s) => parse_amount(s),
        RawCell::Number(n) => n.is_finite().then_some(*n),
        RawCell::Blank => None,
    };
    let Some(amount) = amount else {
        issues.push(RowIssue {
            row: number,
            kind: IssueKind::UnparsableAmount { raw: cell.text().unwrap_or_default() },
        });
        return None;
    };

    let Some(tx) = Transaction::new(amount) else {
        issues.push(RowIssue { row: number, kind: IssueKind::NegligibleAmount { amount } });
        return None;
    };

    let date = cell_text(row, mapping, CanonicalField::Date);
    let parsed_date = date.as_deref().and_then(parse_date);
    if let (Some(raw), None) = (&date, parsed_date) {
        issues.push(RowIssue {
            row: number,
            kind: IssueKind::UnparsableDate { raw: raw.clone() },
        });
    }

    Some(
        tx.with_vendor(&cell_text(row, mapping, CanonicalField::Vendor).unwrap_or_default())
            .with_category(&cell_text(row, mapping, CanonicalField::Category).unwrap_or_default())
            .with_description(&cell_text(row, mapping, CanonicalField::Description).unwrap_or_default())
            .with_date(parsed_date),
    )
}

/// Normalize raw rows under a column mapping.
///
/// Fails with [`IngestError::MissingAmountColumn`] when the mapping has no
/// amount column or the first row does not carry it. Optional columns that
/// are mapped but absent fall back to their defaults.
pub fn normalize(rows: &[RawRow], mapping: &ColumnMapping) -> IngestResult<NormalizeReport> {
    let available = || {
        rows.first()
            .map(|r| r.headers().map(str::to_string).collect())
            .unwrap_or_default()
    };

    let amount_header = match mapping.get(CanonicalField::Amount) {
        Some(header) if rows.first().map_or(true, |r| r.contains(header)) => header,
        _ => return Err(IngestError::MissingAmountColumn { available: available() }),
    };

    let mut report = NormalizeReport::default();
    for (index, row) in rows.iter().enumerate() {
        if let Some(tx) = normalize_row(index, row, amount_header, mapping, &mut report.issues) {
            report.transactions.push(tx);
        }
    }

    let skipped = report.skipped_rows();
    if skipped > 0 {
        log_warning(format!("Skipped {} row(s) without a usable amount", skipped));
    }
    let undated = report.undated_rows();
    if undated > 0 {
        log_warning(format!("{} transaction(s) have an unrecognized date format", undated));
    }

    Ok(report)
}

/// Build the effective mapping for a header row.
///
/// Runs header detection and lets every field of `explicit` override it.
/// An amount column that is not in `headers` is an error.
pub fn resolve_mapping(
    headers: &[String],
    explicit: Option<&ColumnMapping>,
) -> IngestResult<ColumnMapping> {
    let detected = detect_mapping(headers);
    let mapping = match explicit {
        Some(explicit) => explicit.overlay(&detected),
        None => detected,
    };

    match mapping.get(CanonicalField::Amount) {
        Some(amount) if headers.iter().any(|h| h == amount) => Ok(mapping),
        _ => Err(IngestError::MissingAmountColumn { available: headers.to_vec() }),
    }
}

/// Resolve the mapping for a parsed table and normalize its rows.
pub fn normalize_table(
    table: &ParsedTable,
    explicit: Option<&ColumnMapping>,
) -> IngestResult<(ColumnMapping, NormalizeReport)> {
    let mapping = resolve_mapping(&table.headers, explicit)?;
    for (field, header) in mapping.resolved() {
        log_info(format!("{} <- \"{}\"", field, header));
    }
    let report = normalize(&table.rows, &mapping)?;
    Ok((mapping, report))
}

/// Decode, parse and normalize raw CSV bytes.
pub fn normalize_bytes(
    bytes: &[u8],
    explicit: Option<&ColumnMapping>,
) -> IngestResult<NormalizeReport> {
    let table = parse_bytes(bytes)?;
    normalize_table(&table, explicit).map(|(_, report)| report)
}
