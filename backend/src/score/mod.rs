//! SpendScore engine.
//!
//! Computes the six weighted [`Metric`]s over a transaction set, aggregates
//! them into a 0-100 score and classifies the result into a [`Tier`].
//!
//! Scoring never fails. A metric whose computation errors is replaced by its
//! [`Metric::fallback`] value, logged, and listed in
//! [`ScoreResult::degraded_metrics`].

pub mod metrics;
pub mod summary;
pub mod tier;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::api::logs::log_warning;
use crate::models::Transaction;

pub use metrics::{normalize_category, Metric, MetricResult, WEIGHTS};
pub use summary::{MonthlyTotal, SpendTotal, SpendingBreakdown, TransactionSummary};
pub use tier::{classify, score_color, score_label, Tier, TierInfo};

/// Metric -> sub-score in `0..=100`.
pub type ScoreBreakdown = BTreeMap<Metric, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub final_score: u8,
    pub tier: TierInfo,
    pub breakdown: ScoreBreakdown,
    pub transaction_summary: TransactionSummary,
    /// Metrics that fell back to their substitute value
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded_metrics: Vec<Metric>,
}

/// Scores one transaction set. Holds no state beyond the borrowed slice.
#[derive(Debug, Clone, Copy)]
pub struct SpendScoreEngine<'a> {
    transactions: &'a [Transaction],
}

impl<'a> SpendScoreEngine<'a> {
    pub fn new(transactions: &'a [Transaction]) -> Self {
        Self { transactions }
    }

    /// Compute one metric without fallback.
    pub fn metric(&self, metric: Metric) -> MetricResult<f64> {
        metric.compute(self.transactions)
    }

    /// All six metrics, with fallbacks applied.
    pub fn breakdown(&self) -> (ScoreBreakdown, Vec<Metric>) {
        let mut breakdown = ScoreBreakdown::new();
        let mut degraded = Vec::new();

        for metric in Metric::ALL {
            let value = match self.metric(metric) {
                Ok(value) => value,
                Err(err) => {
                    log_warning(format!(
                        "{}; using fallback {}",
                        err,
                        metric.fallback()
                    ));
                    degraded.push(metric);
                    metric.fallback()
                }
            };
            breakdown.insert(metric, value);
        }

        (breakdown, degraded)
    }

    pub fn score(&self) -> ScoreResult {
        let (breakdown, degraded_metrics) = self.breakdown();
        let final_score = aggregate(&breakdown);

        ScoreResult {
            final_score,
            tier: TierInfo::for_score(final_score),
            breakdown,
            transaction_summary: TransactionSummary::from_transactions(self.transactions),
            degraded_metrics,
        }
    }
}

/// Weighted mean of a breakdown, rounded to the nearest integer with
/// halves going to the even neighbour (88.5 -> 88, 89.5 -> 90).
///
/// Missing metrics contribute 0.
pub fn aggregate(breakdown: &ScoreBreakdown) -> u8 {
    let total_weight: u32 = WEIGHTS.iter().map(|(_, w)| w).sum();
    let weighted: f64 = WEIGHTS
        .iter()
        .map(|(metric, weight)| breakdown.get(metric).copied().unwrap_or(0.0) * *weight as f64)
        .sum();

    round_half_even(weighted / total_weight as f64).clamp(0.0, 100.0) as u8
}

fn round_half_even(value: f64) -> f64 {
    if (value - value.trunc()).abs() == 0.5 {
        2.0 * (value / 2.0).round()
    } else {
        value.round()
    }
}

/// Score a transaction set.
pub fn score(transactions: &[Transaction]) -> ScoreResult {
    SpendScoreEngine::new(transactions).score()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tx(amount: f64, category: &str) -> Transaction {
        Transaction::new(amount).unwrap().with_category(category)
    }

    fn sample() -> Vec<Transaction> {
        let categories = ["rent", "groceries", "fuel", "utilities", "insurance", "travel", "dining"];
        (0..21)
            .map(|i| {
                Transaction::new(80.0 + (i % 5) as f64 * 10.0)
                    .unwrap()
                    .with_vendor(&format!("vendor{}", i % 9))
                    .with_category(categories[i % categories.len()])
                    .with_date(NaiveDate::from_ymd_opt(2024, 1 + (i % 6) as u32, 1 + i as u32))
            })
            .collect()
    }

    #[test]
    fn test_three_row_scenario() {
        let txs = vec![tx(100.0, "groceries"), tx(100.0, "groceries"), tx(5000.0, "entertainment")];
        let result = score(&txs);

        assert_eq!(result.breakdown[&Metric::CategoryDiversity], 40.0);
        assert!(result.breakdown[&Metric::WasteRatio] < 10.0);
        // below the outlier sample size
        assert_eq!(result.breakdown[&Metric::SpikeDetection], 100.0);
        assert!(result.degraded_metrics.is_empty());
        assert_eq!(result.tier.tier, Tier::Red);
    }

    #[test]
    fn test_outlier_scenario_with_enough_rows() {
        let txs: Vec<Transaction> = [100.0, 100.0, 100.0, 100.0, 5000.0]
            .iter()
            .map(|a| tx(*a, "groceries"))
            .collect();
        assert_eq!(score(&txs).breakdown[&Metric::SpikeDetection], 0.0);
    }

    #[test]
    fn test_final_score_is_weighted_mean() {
        let result = score(&sample());
        let expected: f64 = WEIGHTS
            .iter()
            .map(|(m, w)| result.breakdown[m] * *w as f64)
            .sum::<f64>()
            / 100.0;
        assert_eq!(result.final_score, round_half_even(expected) as u8);
        assert!(result.final_score <= 100);
        assert_eq!(result.breakdown.len(), 6);
    }

    #[test]
    fn test_scoring_is_idempotent() {
        let txs = sample();
        assert_eq!(score(&txs), score(&txs));
    }

    #[test]
    fn test_empty_input_defaults() {
        let result = score(&[]);
        assert_eq!(result.breakdown[&Metric::FrequencyScore], 0.0);
        assert_eq!(result.breakdown[&Metric::CategoryDiversity], 0.0);
        assert_eq!(result.breakdown[&Metric::BudgetAdherence], 0.0);
        assert_eq!(result.breakdown[&Metric::RedundancyDetection], 100.0);
        assert_eq!(result.breakdown[&Metric::SpikeDetection], 100.0);
        assert_eq!(result.breakdown[&Metric::WasteRatio], 50.0);
        // (100*15 + 100*20 + 50*20) / 100 = 45
        assert_eq!(result.final_score, 45);
        assert_eq!(result.transaction_summary.count, 0);
    }

    #[test]
    fn test_failing_metric_falls_back() {
        let txs = vec![tx(1e308, "entertainment"), tx(1e308, "entertainment")];
        let result = score(&txs);
        assert_eq!(result.breakdown[&Metric::WasteRatio], metrics::WASTE_FALLBACK);
        assert!(result.degraded_metrics.contains(&Metric::WasteRatio));
        assert!(result.final_score <= 100);
    }

    #[test]
    fn test_aggregate_bounds() {
        let all = |v: f64| -> ScoreBreakdown { Metric::ALL.iter().map(|m| (*m, v)).collect() };
        assert_eq!(aggregate(&all(100.0)), 100);
        assert_eq!(aggregate(&all(0.0)), 0);
        assert_eq!(aggregate(&all(89.5)), 90);
        assert_eq!(aggregate(&all(88.5)), 88);
        assert_eq!(aggregate(&all(88.6)), 89);
        assert_eq!(aggregate(&ScoreBreakdown::new()), 0);
    }

    #[test]
    fn test_result_json_uses_metric_names() {
        let json = serde_json::to_value(score(&sample())).unwrap();
        assert!(json["breakdown"]["waste_ratio"].is_number());
        assert!(json["tier"]["green_reward_eligible"].is_boolean());
        assert!(json.get("degraded_metrics").is_none());

        let back: ScoreResult = serde_json::from_value(json).unwrap();
        assert_eq!(back.breakdown.len(), 6);
    }
}
