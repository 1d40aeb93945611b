//! Fuzzy header resolution.
//!
//! Maps raw, platform-specific CSV headers onto canonical transaction fields.
//! Resolution runs independently per field, in priority order:
//!
//! 1. Exact match on normalized names
//! 2. Synonym table, earlier synonyms scoring higher
//! 3. Substring / contextual match (currency tokens for `amount`,
//!    temporal tokens for `date`)
//!
//! Ties always go to the header that appears first in the input.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::models::{CanonicalField, ColumnMapping};

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

const VENDOR_SYNONYMS: &[&str] = &[
    "merchant", "payee", "supplier", "description", "counterparty", "recipient",
    "name", "vendor name", "business name", "company", "paid to", "beneficiary",
    "transaction description", "reference", "details",
];

const AMOUNT_SYNONYMS: &[&str] = &[
    "transaction value", "total", "cost", "debit", "credit", "sum", "value",
    "paid out", "paid in", "amount usd", "amount gbp", "amount eur",
    "transaction amount", "net amount", "gross amount", "payment amount",
];

const DATE_SYNONYMS: &[&str] = &[
    "txn date", "transaction date", "posted", "posting date", "completed date",
    "created date", "date", "completion date", "processing date", "value date",
    "booking date", "settlement date", "effective date",
];

const CATEGORY_SYNONYMS: &[&str] = &[
    "type", "classification", "expense type", "account", "reference",
    "category", "class", "transaction type", "expense category", "account type",
    "business category", "expense class",
];

const DESCRIPTION_SYNONYMS: &[&str] = &[
    "details", "memo", "notes", "comment", "reference", "memo description",
    "transaction details", "payment details", "additional info", "remarks",
];

const CURRENCY_TOKENS: &[&str] = &["usd", "gbp", "eur", "dollar", "pound", "euro"];

const TEMPORAL_TOKENS: &[&str] = &["time", "when", "on"];

/// Known synonyms for a canonical field, highest priority first.
pub fn synonyms(field: CanonicalField) -> &'static [&'static str] {
    match field {
        CanonicalField::Vendor => VENDOR_SYNONYMS,
        CanonicalField::Amount => AMOUNT_SYNONYMS,
        CanonicalField::Date => DATE_SYNONYMS,
        CanonicalField::Category => CATEGORY_SYNONYMS,
        CanonicalField::Description => DESCRIPTION_SYNONYMS,
    }
}

/// Lowercase, drop punctuation, trim.
pub fn normalize_header(header: &str) -> String {
    NON_WORD.replace_all(&header.to_lowercase(), "").trim().to_string()
}

/// How a header was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Synonym,
    Contextual,
}

/// A resolved header with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderMatch<'a> {
    pub header: &'a str,
    pub kind: MatchKind,
}

/// Resolves canonical fields against one header row.
#[derive(Debug, Clone)]
pub struct HeaderMatcher<'a> {
    headers: &'a [String],
    normalized: Vec<String>,
}

impl<'a> HeaderMatcher<'a> {
    pub fn new(headers: &'a [String]) -> Self {
        let normalized = headers.iter().map(|h| normalize_header(h)).collect();
        Self { headers, normalized }
    }

    /// Resolve a canonical field.
    pub fn resolve(&self, field: CanonicalField) -> Option<&'a str> {
        self.resolve_with_kind(field).map(|m| m.header)
    }

    /// Resolve a canonical field and report how it matched.
    pub fn resolve_with_kind(&self, field: CanonicalField) -> Option<HeaderMatch<'a>> {
        self.resolve_target(field.as_str(), synonyms(field))
    }

    /// Resolve an arbitrary target name. Names that are not canonical fields
    /// have no synonyms and no contextual tokens.
    pub fn resolve_named(&self, target: &str) -> Option<&'a str> {
        let table = CanonicalField::from_name(target).map(synonyms).unwrap_or(&[]);
        self.resolve_target(target, table).map(|m| m.header)
    }

    /// Run resolution for every canonical field.
    pub fn resolve_all(&self) -> ColumnMapping {
        let mut mapping = ColumnMapping::new();
        for field in CanonicalField::ALL {
            if let Some(header) = self.resolve(field) {
                mapping.set(field, header);
            }
        }
        mapping
    }

    fn resolve_target(&self, target: &str, table: &[&str]) -> Option<HeaderMatch<'a>> {
        let target = normalize_header(target);
        if target.is_empty() {
            return None;
        }

        self.exact(&target)
            .map(|i| self.hit(i, MatchKind::Exact))
            .or_else(|| self.by_synonym(table).map(|i| self.hit(i, MatchKind::Synonym)))
            .or_else(|| self.contextual(&target).map(|i| self.hit(i, MatchKind::Contextual)))
    }

    fn exact(&self, target: &str) -> Option<usize> {
        self.normalized.iter().position(|h| h == target)
    }

    fn by_synonym(&self, table: &[&str]) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;

        for (i, header) in self.normalized.iter().enumerate() {
            let Some(rank) = table.iter().position(|s| normalize_header(s) == *header) else {
                continue;
            };
            let score = table.len() - rank;
            // Strictly greater: the first header keeps a tie.
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((i, score));
            }
        }

        best.map(|(i, _)| i)
    }

    fn contextual(&self, target: &str) -> Option<usize> {
        self.normalized.iter().position(|header| {
            if header.is_empty() {
                return false;
            }
            if header.contains(target) || target.contains(header.as_str()) {
                return true;
            }
            match target {
                "amount" => CURRENCY_TOKENS.iter().any(|t| header.contains(t)),
                "date" => TEMPORAL_TOKENS.iter().any(|t| header.contains(t)),
                _ => false,
            }
        })
    }

    fn hit(&self, index: usize, kind: MatchKind) -> HeaderMatch<'a> {
        HeaderMatch {
            header: self.headers[index].as_str(),
            kind,
        }
    }
}

/// Resolve a single target field against a header row.
pub fn resolve(headers: &[String], target_field: &str) -> Option<String> {
    HeaderMatcher::new(headers)
        .resolve_named(target_field)
        .map(str::to_string)
}

/// Auto-detect a full column mapping for a header row.
pub fn detect_mapping(headers: &[String]) -> ColumnMapping {
    HeaderMatcher::new(headers).resolve_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  Amount ($) "), "amount");
        assert_eq!(normalize_header("Txn-Date"), "txndate");
        assert_eq!(normalize_header("Expense Type"), "expense type");
        assert_eq!(normalize_header("#"), "");
    }

    #[test]
    fn test_exact_match_wins() {
        let h = headers(&["Total", "AMOUNT"]);
        let m = HeaderMatcher::new(&h);
        let hit = m.resolve_with_kind(CanonicalField::Amount).unwrap();
        assert_eq!(hit.header, "AMOUNT");
        assert_eq!(hit.kind, MatchKind::Exact);
    }

    #[test]
    fn test_synonym_priority() {
        // "total" (index 1) outranks "value" (index 6) regardless of column order
        let h = headers(&["Value", "Total"]);
        assert_eq!(resolve(&h, "amount").as_deref(), Some("Total"));
    }

    #[test]
    fn test_synonym_tie_goes_to_first_header() {
        let h = headers(&["Merchant", "merchant!"]);
        assert_eq!(resolve(&h, "vendor").as_deref(), Some("Merchant"));
    }

    #[test]
    fn test_platform_headers_resolve_by_synonym() {
        let h = headers(&["Txn Date", "Merchant", "Transaction Value", "Expense Type"]);
        let m = HeaderMatcher::new(&h);

        for (field, expected) in [
            (CanonicalField::Date, "Txn Date"),
            (CanonicalField::Vendor, "Merchant"),
            (CanonicalField::Amount, "Transaction Value"),
            (CanonicalField::Category, "Expense Type"),
        ] {
            let hit = m.resolve_with_kind(field).unwrap();
            assert_eq!(hit.header, expected, "field {}", field);
            assert_eq!(hit.kind, MatchKind::Synonym);
        }
    }

    #[test]
    fn test_currency_token_for_amount() {
        let h = headers(&["Booked", "Spent (USD)"]);
        let hit = HeaderMatcher::new(&h)
            .resolve_with_kind(CanonicalField::Amount)
            .unwrap();
        assert_eq!(hit.header, "Spent (USD)");
        assert_eq!(hit.kind, MatchKind::Contextual);
    }

    #[test]
    fn test_temporal_token_for_date() {
        let h = headers(&["Charged", "Timestamp"]);
        assert_eq!(resolve(&h, "date").as_deref(), Some("Timestamp"));
    }

    #[test]
    fn test_substring_match() {
        let h = headers(&["Net", "Vendor Id"]);
        assert_eq!(resolve(&h, "vendor").as_deref(), Some("Vendor Id"));
    }

    #[test]
    fn test_empty_header_never_matches() {
        let h = headers(&["###", "Foo"]);
        assert_eq!(resolve(&h, "amount"), None);
    }

    #[test]
    fn test_no_match() {
        let h = headers(&["Foo", "Bar"]);
        assert_eq!(resolve(&h, "amount"), None);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let h = headers(&["Paid Out", "Paid In", "Payee", "Posted"]);
        let first = detect_mapping(&h);
        for _ in 0..10 {
            assert_eq!(detect_mapping(&h), first);
        }
        assert_eq!(first.get(CanonicalField::Amount), Some("Paid Out"));
        assert_eq!(first.get(CanonicalField::Vendor), Some("Payee"));
        assert_eq!(first.get(CanonicalField::Date), Some("Posted"));
    }
}
