//! Domain models for the SpendScore pipeline.
//!
//! - [`CanonicalField`] - The five normalized transaction attributes
//! - [`RawCell`] / [`RawRow`] - One CSV row keyed by its raw headers
//! - [`ColumnMapping`] - Which raw header supplies each canonical field
//! - [`Transaction`] - A normalized, immutable transaction

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Vendor used when the vendor column is missing or blank.
pub const DEFAULT_VENDOR: &str = "Unknown Vendor";

/// Category used when the category column is missing or blank.
pub const DEFAULT_CATEGORY: &str = "Uncategorized";

/// Smallest magnitude kept as a transaction. Anything below is noise.
pub const MIN_AMOUNT: f64 = 0.01;

// =============================================================================
// Canonical Fields
// =============================================================================

/// A normalized transaction attribute that every CSV format maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalField {
    Vendor,
    Amount,
    Date,
    Category,
    Description,
}

impl CanonicalField {
    /// All fields, in resolution order.
    pub const ALL: [CanonicalField; 5] = [
        Self::Vendor,
        Self::Amount,
        Self::Date,
        Self::Category,
        Self::Description,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vendor => "vendor",
            Self::Amount => "amount",
            Self::Date => "date",
            Self::Category => "category",
            Self::Description => "description",
        }
    }

    /// Parse a field name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "vendor" => Some(Self::Vendor),
            "amount" => Some(Self::Amount),
            "date" => Some(Self::Date),
            "category" => Some(Self::Category),
            "description" => Some(Self::Description),
            _ => None,
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Raw Rows
// =============================================================================

/// A raw cell value as read from a tabular source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawCell {
    Number(f64),
    Text(String),
    Blank,
}

impl RawCell {
    /// Build a cell from text, treating whitespace-only input as blank.
    pub fn from_text(text: &str) -> Self {
        if text.trim().is_empty() {
            Self::Blank
        } else {
            Self::Text(text.to_string())
        }
    }

    /// Trimmed text content, or `None` when blank.
    pub fn text(&self) -> Option<String> {
        match self {
            Self::Number(n) => Some(n.to_string()),
            Self::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Self::Blank => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text().is_none()
    }
}

/// One source row: raw header -> raw cell, in header order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    cells: Vec<(String, RawCell)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from `(header, text)` pairs.
    pub fn from_pairs<H, V>(pairs: impl IntoIterator<Item = (H, V)>) -> Self
    where
        H: Into<String>,
        V: AsRef<str>,
    {
        let mut row = Self::new();
        for (header, value) in pairs {
            row.insert(header, RawCell::from_text(value.as_ref()));
        }
        row
    }

    /// Set a cell. A repeated header keeps its original position.
    pub fn insert(&mut self, header: impl Into<String>, cell: RawCell) {
        let header = header.into();
        match self.cells.iter_mut().find(|(h, _)| *h == header) {
            Some((_, existing)) => *existing = cell,
            None => self.cells.push((header, cell)),
        }
    }

    pub fn with(mut self, header: impl Into<String>, cell: RawCell) -> Self {
        self.insert(header, cell);
        self
    }

    pub fn get(&self, header: &str) -> Option<&RawCell> {
        self.cells.iter().find(|(h, _)| h == header).map(|(_, c)| c)
    }

    pub fn contains(&self, header: &str) -> bool {
        self.get(header).is_some()
    }

    /// Headers in insertion order.
    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(h, _)| h.as_str())
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, c)| c.is_blank())
    }
}

impl Serialize for RawRow {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (header, cell) in &self.cells {
            map.serialize_entry(header, cell)?;
        }
        map.end()
    }
}

// =============================================================================
// Column Mapping
// =============================================================================

/// Canonical field -> raw header. Only `amount` is mandatory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: CanonicalField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    /// Assign a header. Blank headers clear the field.
    pub fn set(&mut self, field: CanonicalField, header: impl Into<String>) {
        let header = header.into();
        *self.slot_mut(field) = (!header.trim().is_empty()).then_some(header);
    }

    pub fn with(mut self, field: CanonicalField, header: impl Into<String>) -> Self {
        self.set(field, header);
        self
    }

    pub fn is_empty(&self) -> bool {
        CanonicalField::ALL.iter().all(|f| self.get(*f).is_none())
    }

    /// Fields that have a header assigned.
    pub fn resolved(&self) -> impl Iterator<Item = (CanonicalField, &str)> {
        CanonicalField::ALL
            .into_iter()
            .filter_map(move |f| self.get(f).map(|h| (f, h)))
    }

    /// Field-wise overlay: every field set in `self` wins, the rest come
    /// from `detected`.
    pub fn overlay(&self, detected: &ColumnMapping) -> ColumnMapping {
        let mut merged = detected.clone();
        for (field, header) in self.resolved() {
            merged.set(field, header);
        }
        merged
    }

    fn slot(&self, field: CanonicalField) -> &Option<String> {
        match field {
            CanonicalField::Vendor => &self.vendor,
            CanonicalField::Amount => &self.amount,
            CanonicalField::Date => &self.date,
            CanonicalField::Category => &self.category,
            CanonicalField::Description => &self.description,
        }
    }

    fn slot_mut(&mut self, field: CanonicalField) -> &mut Option<String> {
        match field {
            CanonicalField::Vendor => &mut self.vendor,
            CanonicalField::Amount => &mut self.amount,
            CanonicalField::Date => &mut self.date,
            CanonicalField::Category => &mut self.category,
            CanonicalField::Description => &mut self.description,
        }
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A normalized transaction.
///
/// Only the magnitude of the source amount is kept, and it is always at
/// least [`MIN_AMOUNT`]. Construction goes through [`Transaction::new`], which
/// enforces that; deserialization does too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TransactionRecord")]
pub struct Transaction {
    amount: f64,
    vendor: String,
    date: Option<NaiveDate>,
    category: String,
    description: String,
}

impl Transaction {
    /// Create a transaction from a signed amount. Returns `None` when the
    /// magnitude is below [`MIN_AMOUNT`] or not finite.
    pub fn new(amount: f64) -> Option<Self> {
        let magnitude = amount.abs();
        if !magnitude.is_finite() || magnitude < MIN_AMOUNT {
            return None;
        }
        Some(Self {
            amount: magnitude,
            vendor: DEFAULT_VENDOR.to_string(),
            date: None,
            category: DEFAULT_CATEGORY.to_string(),
            description: String::new(),
        })
    }

    pub fn with_vendor(mut self, vendor: &str) -> Self {
        self.vendor = non_blank(vendor).unwrap_or(DEFAULT_VENDOR).to_string();
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = non_blank(category).unwrap_or(DEFAULT_CATEGORY).to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.trim().to_string();
        self
    }

    pub fn with_date(mut self, date: Option<NaiveDate>) -> Self {
        self.date = date;
        self
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

fn non_blank(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Wire shape of a transaction, validated into [`Transaction`].
#[derive(Debug, Deserialize)]
struct TransactionRecord {
    amount: f64,
    #[serde(default)]
    vendor: Option<String>,
    #[serde(default)]
    date: Option<NaiveDate>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl TryFrom<TransactionRecord> for Transaction {
    type Error = String;

    fn try_from(record: TransactionRecord) -> Result<Self, Self::Error> {
        let tx = Transaction::new(record.amount)
            .ok_or_else(|| format!("amount {} is below the {} minimum", record.amount, MIN_AMOUNT))?;
        Ok(tx
            .with_vendor(record.vendor.as_deref().unwrap_or(""))
            .with_category(record.category.as_deref().unwrap_or(""))
            .with_description(record.description.as_deref().unwrap_or(""))
            .with_date(record.date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_keeps_magnitude_only() {
        let tx = Transaction::new(-1234.56).unwrap();
        assert_eq!(tx.amount(), 1234.56);
    }

    #[test]
    fn test_transaction_rejects_noise() {
        assert!(Transaction::new(0.0).is_none());
        assert!(Transaction::new(0.009).is_none());
        assert!(Transaction::new(-0.001).is_none());
        assert!(Transaction::new(f64::NAN).is_none());
        assert!(Transaction::new(0.01).is_some());
    }

    #[test]
    fn test_transaction_defaults() {
        let tx = Transaction::new(5.0)
            .unwrap()
            .with_vendor("   ")
            .with_category("");
        assert_eq!(tx.vendor(), DEFAULT_VENDOR);
        assert_eq!(tx.category(), DEFAULT_CATEGORY);
        assert_eq!(tx.description(), "");
        assert_eq!(tx.date(), None);
    }

    #[test]
    fn test_transaction_deserialize_validates() {
        let tx: Transaction = serde_json::from_str(
            r#"{"amount": -42.5, "vendor": "Tesco", "category": "groceries", "date": "2024-03-01"}"#,
        )
        .unwrap();
        assert_eq!(tx.amount(), 42.5);
        assert_eq!(tx.vendor(), "Tesco");
        assert_eq!(tx.date(), NaiveDate::from_ymd_opt(2024, 3, 1));

        let bad = serde_json::from_str::<Transaction>(r#"{"amount": 0.0}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_mapping_overlay_prefers_explicit() {
        let detected = ColumnMapping::new()
            .with(CanonicalField::Amount, "Total")
            .with(CanonicalField::Vendor, "Payee");
        let explicit = ColumnMapping::new().with(CanonicalField::Amount, "Paid Out");

        let merged = explicit.overlay(&detected);
        assert_eq!(merged.get(CanonicalField::Amount), Some("Paid Out"));
        assert_eq!(merged.get(CanonicalField::Vendor), Some("Payee"));
    }

    #[test]
    fn test_mapping_blank_header_clears_field() {
        let mapping = ColumnMapping::new().with(CanonicalField::Date, "  ");
        assert!(mapping.is_empty());
    }

    #[test]
    fn test_mapping_deserializes_partial_json() {
        let mapping: ColumnMapping = serde_json::from_str(r#"{"amount": "Value"}"#).unwrap();
        assert_eq!(mapping.get(CanonicalField::Amount), Some("Value"));
        assert_eq!(mapping.get(CanonicalField::Vendor), None);
    }

    #[test]
    fn test_raw_row_preserves_header_order() {
        let row = RawRow::from_pairs([("b", "1"), ("a", "2"), ("b", "3")]);
        assert_eq!(row.headers().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(row.get("b"), Some(&RawCell::Text("3".into())));
    }

    #[test]
    fn test_raw_cell_blank_detection() {
        assert!(RawCell::from_text("  ").is_blank());
        assert_eq!(RawCell::Number(12.5).text(), Some("12.5".to_string()));
    }
}
