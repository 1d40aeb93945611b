//! The six SpendScore sub-metrics.
//!
//! Every metric is computed from the full transaction set and never reads
//! another metric's result. Each returns a value in `0..=100`, or a
//! [`MetricError`] that the engine replaces with the metric's fallback.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::MetricError;
use crate::models::Transaction;

pub type MetricResult<T> = Result<T, MetricError>;

// =============================================================================
// Metric Table
// =============================================================================

/// A scoring dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    FrequencyScore,
    CategoryDiversity,
    BudgetAdherence,
    RedundancyDetection,
    SpikeDetection,
    WasteRatio,
}

/// Metric weights. They sum to exactly 100.
pub const WEIGHTS: [(Metric, u32); 6] = [
    (Metric::FrequencyScore, 15),
    (Metric::CategoryDiversity, 10),
    (Metric::BudgetAdherence, 20),
    (Metric::RedundancyDetection, 15),
    (Metric::SpikeDetection, 20),
    (Metric::WasteRatio, 20),
];

// Substitutes used when a metric computation fails.

/// No reliable view of category spread: neutral midpoint.
pub const FREQUENCY_FALLBACK: f64 = 50.0;
/// Category count unknown: neutral midpoint.
pub const DIVERSITY_FALLBACK: f64 = 50.0;
/// No benchmark could be formed: neutral midpoint.
pub const BUDGET_FALLBACK: f64 = 50.0;
/// Duplicate charges are rare, so partial confidence in a clean record.
pub const REDUNDANCY_FALLBACK: f64 = 75.0;
/// Spikes are the exception, so partial confidence in a clean record.
pub const SPIKE_FALLBACK: f64 = 75.0;
/// Spend mix unknown: neutral midpoint.
pub const WASTE_FALLBACK: f64 = 50.0;

// Values for an empty transaction set.

/// No categories at all is the least healthy spread.
pub const FREQUENCY_EMPTY: f64 = 0.0;
/// Nothing to adhere to.
pub const BUDGET_EMPTY: f64 = 0.0;
/// Nothing can be a duplicate.
pub const REDUNDANCY_EMPTY: f64 = 100.0;
/// Too small a sample to call anything a spike.
pub const SPIKE_INSUFFICIENT: f64 = 100.0;
/// No spend to classify.
pub const WASTE_EMPTY: f64 = 50.0;

/// Band of per-category transaction share that scores 100.
const FREQUENCY_BAND: (f64, f64) = (0.05, 0.25);
/// Category counts that score 100.
const DIVERSITY_BAND: (usize, usize) = (5, 15);
/// Points lost per category above the diversity band.
const DIVERSITY_DECAY: f64 = 5.0;
/// Deviation from the median at which a transaction scores 0.
const MAX_DEVIATION: f64 = 2.0;
/// Same-vendor charges closer than this are possible duplicates.
const REDUNDANCY_WINDOW_HOURS: f64 = 24.0;
/// Penalty lost per hour between two same-vendor charges.
const REDUNDANCY_DECAY_PER_HOUR: f64 = 2.0;
/// Minimum sample size for outlier detection.
const SPIKE_MIN_SAMPLE: usize = 4;
const IQR_MULTIPLIER: f64 = 1.5;
/// Outlier-to-median ratio at which spike severity saturates.
const SEVERITY_CAP: f64 = 10.0;
const ESSENTIAL_BONUS_FACTOR: f64 = 40.0;
const ESSENTIAL_BONUS_CAP: f64 = 20.0;

impl Metric {
    pub const ALL: [Metric; 6] = [
        Self::FrequencyScore,
        Self::CategoryDiversity,
        Self::BudgetAdherence,
        Self::RedundancyDetection,
        Self::SpikeDetection,
        Self::WasteRatio,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FrequencyScore => "frequency_score",
            Self::CategoryDiversity => "category_diversity",
            Self::BudgetAdherence => "budget_adherence",
            Self::RedundancyDetection => "redundancy_detection",
            Self::SpikeDetection => "spike_detection",
            Self::WasteRatio => "waste_ratio",
        }
    }

    /// Human-readable name.
    pub fn title(&self) -> &'static str {
        match self {
            Self::FrequencyScore => "Frequency",
            Self::CategoryDiversity => "Category diversity",
            Self::BudgetAdherence => "Budget adherence",
            Self::RedundancyDetection => "Redundancy",
            Self::SpikeDetection => "Spending spikes",
            Self::WasteRatio => "Waste ratio",
        }
    }

    pub fn weight(&self) -> u32 {
        WEIGHTS
            .iter()
            .find(|(m, _)| m == self)
            .map(|(_, w)| *w)
            .unwrap_or(0)
    }

    pub fn fallback(&self) -> f64 {
        match self {
            Self::FrequencyScore => FREQUENCY_FALLBACK,
            Self::CategoryDiversity => DIVERSITY_FALLBACK,
            Self::BudgetAdherence => BUDGET_FALLBACK,
            Self::RedundancyDetection => REDUNDANCY_FALLBACK,
            Self::SpikeDetection => SPIKE_FALLBACK,
            Self::WasteRatio => WASTE_FALLBACK,
        }
    }

    /// Compute this metric over a transaction set.
    pub fn compute(&self, transactions: &[Transaction]) -> MetricResult<f64> {
        let value = match self {
            Self::FrequencyScore => frequency_score(transactions),
            Self::CategoryDiversity => category_diversity(transactions),
            Self::BudgetAdherence => budget_adherence(transactions),
            Self::RedundancyDetection => redundancy_detection(transactions),
            Self::SpikeDetection => spike_detection(transactions),
            Self::WasteRatio => waste_ratio(transactions),
        }?;
        finite(value, *self)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn finite(value: f64, metric: Metric) -> MetricResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MetricError::NonFinite { metric })
    }
}

// =============================================================================
// Categories
// =============================================================================

/// Category used for blank input after normalization.
pub const UNCATEGORIZED: &str = "uncategorized";

/// Substring aliases, first hit wins.
const CATEGORY_ALIASES: &[(&str, &str)] = &[
    ("food", "groceries"),
    ("gas", "fuel"),
    ("petrol", "fuel"),
    ("restaurant", "dining"),
    ("cafe", "coffee"),
    ("subscription", "subscriptions"),
    ("streaming", "subscriptions"),
    ("electric", "utilities"),
    ("water", "utilities"),
    ("internet", "utilities"),
    ("phone", "utilities"),
];

pub const ESSENTIAL_CATEGORIES: &[&str] = &[
    "utilities", "rent", "mortgage", "insurance", "groceries", "fuel",
    "medical", "healthcare", "transportation", "education", "childcare",
];

pub const LOW_VALUE_CATEGORIES: &[&str] = &[
    "entertainment", "gaming", "subscriptions", "luxury", "dining",
    "fast food", "coffee", "alcohol", "tobacco", "impulse purchases",
];

/// Canonical category name used for scoring.
pub fn normalize_category(raw: &str) -> String {
    let category = raw.trim().to_lowercase();
    if category.is_empty() {
        return UNCATEGORIZED.to_string();
    }

    CATEGORY_ALIASES
        .iter()
        .find(|(key, _)| category.contains(key))
        .map(|(_, alias)| alias.to_string())
        .unwrap_or(category)
}

/// How a normalized category counts toward the waste ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendClass {
    LowValue,
    Essential,
    Other,
}

/// Classify a normalized category. Low-value keywords are checked first.
pub fn classify_category(category: &str) -> SpendClass {
    if LOW_VALUE_CATEGORIES.iter().any(|k| category.contains(k)) {
        SpendClass::LowValue
    } else if ESSENTIAL_CATEGORIES.iter().any(|k| category.contains(k)) {
        SpendClass::Essential
    } else {
        SpendClass::Other
    }
}

fn category_counts(transactions: &[Transaction]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for tx in transactions {
        *counts.entry(normalize_category(tx.category())).or_insert(0) += 1;
    }
    counts
}

// =============================================================================
// Statistics
// =============================================================================

pub(crate) fn sorted_amounts(transactions: &[Transaction]) -> Vec<f64> {
    let mut amounts: Vec<f64> = transactions.iter().map(Transaction::amount).collect();
    amounts.sort_by(f64::total_cmp);
    amounts
}

/// Median of an ascending slice. `0.0` when empty.
pub(crate) fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => sorted[n / 2 - 1] / 2.0 + sorted[n / 2] / 2.0,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

// =============================================================================
// Metrics
// =============================================================================

/// Share of transactions per category, scored against a healthy band.
pub fn frequency_score(transactions: &[Transaction]) -> MetricResult<f64> {
    let counts = category_counts(transactions);
    if counts.is_empty() {
        return Ok(FREQUENCY_EMPTY);
    }

    let total = transactions.len() as f64;
    let (low, high) = FREQUENCY_BAND;
    let scores: Vec<f64> = counts
        .values()
        .map(|&count| {
            let ratio = count as f64 / total;
            if ratio < low {
                ratio / low * 100.0
            } else if ratio <= high {
                100.0
            } else {
                (100.0 * (1.0 - (ratio - high) / (1.0 - high))).max(0.0)
            }
        })
        .collect();

    Ok(mean(&scores))
}

/// Number of distinct categories, scored against a healthy band.
pub fn category_diversity(transactions: &[Transaction]) -> MetricResult<f64> {
    let distinct = category_counts(transactions).len();
    let (low, high) = DIVERSITY_BAND;

    let score = if distinct < low {
        distinct as f64 / low as f64 * 100.0
    } else if distinct <= high {
        100.0
    } else {
        (100.0 - (distinct - high) as f64 * DIVERSITY_DECAY).max(0.0)
    };
    Ok(score)
}

/// Closeness of each amount to the median amount.
pub fn budget_adherence(transactions: &[Transaction]) -> MetricResult<f64> {
    if transactions.is_empty() {
        return Ok(BUDGET_EMPTY);
    }

    let median = finite(median_of_sorted(&sorted_amounts(transactions)), Metric::BudgetAdherence)?;
    let scores: Vec<f64> = transactions
        .iter()
        .map(|tx| {
            if median > 0.0 {
                let deviation = (tx.amount() - median).abs() / median;
                100.0 * (1.0 - deviation.min(MAX_DEVIATION) / MAX_DEVIATION)
            } else {
                0.0
            }
        })
        .collect();

    Ok(mean(&scores))
}

/// Penalizes same-vendor charges that land within a day of each other.
///
/// Dates carry no time of day, so two charges on the same day are 0 hours
/// apart and charges on consecutive days are 24 hours apart.
pub fn redundancy_detection(transactions: &[Transaction]) -> MetricResult<f64> {
    let mut by_vendor: BTreeMap<&str, Vec<NaiveDate>> = BTreeMap::new();
    let mut dated = 0;
    for tx in transactions {
        if let Some(date) = tx.date() {
            by_vendor.entry(tx.vendor()).or_default().push(date);
            dated += 1;
        }
    }
    if dated < 2 {
        return Ok(REDUNDANCY_EMPTY);
    }

    let mut penalties = Vec::new();
    for dates in by_vendor.values_mut() {
        dates.sort();
        for pair in dates.windows(2) {
            let hours = (pair[1] - pair[0]).num_days() as f64 * 24.0;
            if hours <= REDUNDANCY_WINDOW_HOURS {
                penalties.push((100.0 - REDUNDANCY_DECAY_PER_HOUR * hours).max(0.0));
            }
        }
    }

    if penalties.is_empty() {
        Ok(100.0)
    } else {
        Ok((100.0 - mean(&penalties)).max(0.0))
    }
}

/// IQR outlier detection weighted by how far the largest outlier sits
/// above the median.
pub fn spike_detection(transactions: &[Transaction]) -> MetricResult<f64> {
    let sorted = sorted_amounts(transactions);
    let n = sorted.len();
    if n < SPIKE_MIN_SAMPLE {
        return Ok(SPIKE_INSUFFICIENT);
    }

    let q1 = sorted[n / 4];
    let q3 = sorted[3 * n / 4];
    let threshold = finite(q3 + IQR_MULTIPLIER * (q3 - q1), Metric::SpikeDetection)?;

    let outliers: Vec<f64> = sorted.iter().copied().filter(|&a| a > threshold).collect();
    let median = median_of_sorted(&sorted);
    let Some(max_outlier) = outliers.last().copied() else {
        return Ok(100.0);
    };
    if median <= 0.0 {
        return Ok(100.0);
    }

    let outlier_ratio = outliers.len() as f64 / n as f64;
    let severity = finite(max_outlier / median, Metric::SpikeDetection)?;
    let score = 100.0 * (1.0 - outlier_ratio) * (1.0 - (severity / SEVERITY_CAP).min(1.0));
    Ok(score.max(0.0))
}

/// Share of spend in low-value categories, with a bonus for essentials.
pub fn waste_ratio(transactions: &[Transaction]) -> MetricResult<f64> {
    if transactions.is_empty() {
        return Ok(WASTE_EMPTY);
    }

    let mut by_category: BTreeMap<String, f64> = BTreeMap::new();
    for tx in transactions {
        *by_category.entry(normalize_category(tx.category())).or_insert(0.0) += tx.amount();
    }

    let total: f64 = by_category.values().sum();
    if total <= 0.0 {
        return Ok(WASTE_EMPTY);
    }

    let (mut low_value, mut essential) = (0.0, 0.0);
    for (category, amount) in &by_category {
        match classify_category(category) {
            SpendClass::LowValue => low_value += amount,
            SpendClass::Essential => essential += amount,
            SpendClass::Other => {}
        }
    }

    let waste = finite(low_value / total, Metric::WasteRatio)?;
    let essential_share = finite(essential / total, Metric::WasteRatio)?;

    let base = 100.0 * (1.0 - waste);
    let bonus = (ESSENTIAL_BONUS_FACTOR * essential_share).min(ESSENTIAL_BONUS_CAP);
    Ok((base + bonus).min(100.0))
}
