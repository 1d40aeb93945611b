//! Prompt construction for spending insights.

use crate::models::Transaction;
use crate::score::{SpendingBreakdown, TransactionSummary};

/// Outliers are transactions above this multiple of the mean.
const OUTLIER_FACTOR: f64 = 3.0;
const MAX_OUTLIERS: usize = 5;
const MAX_CATEGORIES: usize = 10;
const RECENT_MONTHS: usize = 6;

/// System prompt for the insight model.
pub fn system_prompt() -> &'static str {
    "You are an expert financial advisor specializing in business expense optimization. \
     Provide specific, actionable insights based on real transaction data."
}

/// Task instructions sent ahead of the transaction data.
pub fn instructions() -> &'static str {
    r#"Analyze the business expense data below and generate exactly 3 actionable suggestions to reduce unnecessary expenses or optimize spending.

Each suggestion must have:
- A priority level: "High", "Medium", or "Low"
- Specific, actionable text referring to the actual vendors, categories and amounts

Return ONLY JSON in this exact format:

```json
{
  "suggestions": [
    {"priority": "High", "text": "..."},
    {"priority": "Medium", "text": "..."},
    {"priority": "Low", "text": "..."}
  ]
}
```"#
}

fn percent(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        part / total * 100.0
    } else {
        0.0
    }
}

/// Render a transaction set as the data section of the prompt.
pub fn format_transactions(transactions: &[Transaction]) -> String {
    if transactions.is_empty() {
        return "No transaction data available.".to_string();
    }

    let summary = TransactionSummary::from_transactions(transactions);
    let breakdown = SpendingBreakdown::from_transactions(transactions);
    let total = summary.total_amount;

    let mut out = String::new();
    out.push_str("Summary:\n");
    out.push_str(&format!("- Total transactions: {}\n", summary.count));
    out.push_str(&format!("- Total amount: {:.2}\n", total));
    out.push_str(&format!("- Average transaction: {:.2}\n", summary.mean_amount));
    out.push_str(&format!("- Median transaction: {:.2}\n", summary.median_amount));
    out.push_str(&format!("- Unique vendors: {}\n", summary.unique_vendor_count));
    out.push_str(&format!("- Unique categories: {}\n", summary.unique_category_count));

    out.push_str("\nTop spending categories:\n");
    for category in breakdown.categories.iter().take(MAX_CATEGORIES) {
        out.push_str(&format!(
            "- {}: {:.2} ({:.1}%) | {} transactions | avg {:.2}\n",
            category.name,
            category.total,
            percent(category.total, total),
            category.count,
            category.total / category.count as f64
        ));
    }

    out.push_str("\nTop vendors by spend:\n");
    for vendor in &breakdown.top_vendors {
        out.push_str(&format!(
            "- {}: {:.2} ({:.1}%) | {} transactions\n",
            vendor.name,
            vendor.total,
            percent(vendor.total, total),
            vendor.count
        ));
    }

    let recurring: Vec<_> = breakdown.top_vendors.iter().filter(|v| v.count >= 2).collect();
    if !recurring.is_empty() {
        out.push_str("\nLikely recurring subscriptions/services:\n");
        for vendor in recurring {
            out.push_str(&format!(
                "- {}: {:.2}/transaction x {} = {:.2}\n",
                vendor.name,
                vendor.total / vendor.count as f64,
                vendor.count,
                vendor.total
            ));
        }
    }

    let threshold = summary.mean_amount * OUTLIER_FACTOR;
    let mut outliers: Vec<&Transaction> =
        transactions.iter().filter(|t| t.amount() > threshold).collect();
    if !outliers.is_empty() {
        outliers.sort_by(|a, b| b.amount().total_cmp(&a.amount()));
        out.push_str(&format!("\nHigh-value outliers (>{:.2}):\n", threshold));
        for tx in outliers.into_iter().take(MAX_OUTLIERS) {
            out.push_str(&format!("- {}: {:.2} ({})\n", tx.vendor(), tx.amount(), tx.category()));
        }
    }

    if breakdown.monthly.len() > 1 {
        out.push_str("\nMonthly spending:\n");
        let skip = breakdown.monthly.len().saturating_sub(RECENT_MONTHS);
        for month in breakdown.monthly.iter().skip(skip) {
            out.push_str(&format!("- {}: {:.2}\n", month.month, month.total));
        }
    }

    out
}

/// Full user message: instructions followed by the data.
pub fn user_prompt(transactions: &[Transaction]) -> String {
    format!(
        "{}\n\nTRANSACTION DATA:\n{}",
        instructions(),
        format_transactions(transactions)
    )
}
