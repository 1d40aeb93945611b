//! Descriptive statistics over a transaction set.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::metrics::{median_of_sorted, normalize_category, sorted_amounts};
use crate::models::Transaction;

/// Vendors listed in [`SpendingBreakdown::top_vendors`].
pub const TOP_VENDOR_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub count: usize,
    pub total_amount: f64,
    pub median_amount: f64,
    pub mean_amount: f64,
    /// Distinct categories after normalization
    pub unique_category_count: usize,
    pub unique_vendor_count: usize,
}

impl TransactionSummary {
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let count = transactions.len();
        let total_amount: f64 = transactions.iter().map(Transaction::amount).sum();
        let mean_amount = if count == 0 { 0.0 } else { total_amount / count as f64 };

        let categories: BTreeSet<String> = transactions
            .iter()
            .map(|tx| normalize_category(tx.category()))
            .collect();
        let vendors: BTreeSet<&str> = transactions.iter().map(Transaction::vendor).collect();

        Self {
            count,
            total_amount,
            median_amount: median_of_sorted(&sorted_amounts(transactions)),
            mean_amount,
            unique_category_count: categories.len(),
            unique_vendor_count: vendors.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendTotal {
    pub name: String,
    pub total: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTotal {
    /// `YYYY-MM`
    pub month: String,
    pub total: f64,
    pub count: usize,
}

/// Where the money went.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpendingBreakdown {
    /// Per-category totals, largest first
    pub categories: Vec<SpendTotal>,
    /// Largest vendors by spend, at most [`TOP_VENDOR_LIMIT`]
    pub top_vendors: Vec<SpendTotal>,
    /// Dated spend per calendar month, oldest first
    pub monthly: Vec<MonthlyTotal>,
}

fn ranked<'a>(keys: impl Iterator<Item = (&'a str, f64)>) -> Vec<SpendTotal> {
    let mut totals: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for (key, amount) in keys {
        let entry = totals.entry(key).or_insert((0.0, 0));
        entry.0 += amount;
        entry.1 += 1;
    }

    let mut ranked: Vec<SpendTotal> = totals
        .into_iter()
        .map(|(name, (total, count))| SpendTotal { name: name.to_string(), total, count })
        .collect();
    // stable: equal totals stay in name order
    ranked.sort_by(|a, b| b.total.total_cmp(&a.total));
    ranked
}

impl SpendingBreakdown {
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let categories = ranked(transactions.iter().map(|tx| (tx.category(), tx.amount())));

        let mut top_vendors = ranked(transactions.iter().map(|tx| (tx.vendor(), tx.amount())));
        top_vendors.truncate(TOP_VENDOR_LIMIT);

        let mut months: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for tx in transactions {
            if let Some(date) = tx.date() {
                let entry = months.entry(date.format("%Y-%m").to_string()).or_insert((0.0, 0));
                entry.0 += tx.amount();
                entry.1 += 1;
            }
        }
        let monthly = months
            .into_iter()
            .map(|(month, (total, count))| MonthlyTotal { month, total, count })
            .collect();

        Self { categories, top_vendors, monthly }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tx(amount: f64, vendor: &str, category: &str, date: Option<(i32, u32, u32)>) -> Transaction {
        Transaction::new(amount)
            .unwrap()
            .with_vendor(vendor)
            .with_category(category)
            .with_date(date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)))
    }

    #[test]
    fn test_summary() {
        let txs = vec![
            tx(10.0, "A", "Coffee", None),
            tx(30.0, "B", "Cafe", None),
            tx(20.0, "A", "Rent", None),
        ];
        let summary = TransactionSummary::from_transactions(&txs);
        assert_eq!(summary.count, 3);
        assert_eq!(summary.total_amount, 60.0);
        assert_eq!(summary.median_amount, 20.0);
        assert_eq!(summary.mean_amount, 20.0);
        // "cafe" normalizes to "coffee"
        assert_eq!(summary.unique_category_count, 2);
        assert_eq!(summary.unique_vendor_count, 2);
    }

    #[test]
    fn test_empty_summary() {
        let summary = TransactionSummary::from_transactions(&[]);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.mean_amount, 0.0);
        assert_eq!(summary.median_amount, 0.0);
    }

    #[test]
    fn test_breakdown_ordering() {
        let txs = vec![
            tx(5.0, "Zed", "Travel", Some((2024, 2, 3))),
            tx(50.0, "Acme", "Rent", Some((2024, 1, 15))),
            tx(5.0, "Bolt", "Fuel", None),
            tx(10.0, "Acme", "Rent", Some((2024, 1, 20))),
        ];
        let breakdown = SpendingBreakdown::from_transactions(&txs);

        let names: Vec<&str> = breakdown.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Rent", "Fuel", "Travel"]);
        assert_eq!(breakdown.categories[0].count, 2);

        assert_eq!(breakdown.top_vendors[0].name, "Acme");
        assert_eq!(breakdown.top_vendors[0].total, 60.0);

        assert_eq!(breakdown.monthly.len(), 2);
        assert_eq!(breakdown.monthly[0].month, "2024-01");
        assert_eq!(breakdown.monthly[0].total, 60.0);
        assert_eq!(breakdown.monthly[1].month, "2024-02");
    }

    #[test]
    fn test_top_vendors_are_capped() {
        let txs: Vec<Transaction> = (0..15)
            .map(|i| tx(1.0 + i as f64, &format!("v{:02}", i), "x", None))
            .collect();
        let breakdown = SpendingBreakdown::from_transactions(&txs);
        assert_eq!(breakdown.top_vendors.len(), TOP_VENDOR_LIMIT);
        assert_eq!(breakdown.top_vendors[0].name, "v14");
    }
}
