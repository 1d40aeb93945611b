//! High-level analysis pipeline.
//!
//! Combines every step: decoding, header resolution, normalization,
//! scoring, spending breakdown and suggestions.
//!
//! # Example
//!
//! ```rust,ignore
//! use spendscore::pipeline::{analyze_file, AnalysisOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let analysis = analyze_file("export.csv", &AnalysisOptions::default()).await?;
//!     println!("SpendScore: {}", analysis.score.final_score);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::api::logs::{log_info, log_success, log_warning};
use crate::config::{Settings, DEFAULT_MIN_TRANSACTIONS};
use crate::error::{PipelineError, PipelineResult};
use crate::insights::{suggestions_for, InsightClient, Suggestion};
use crate::models::ColumnMapping;
use crate::normalize::normalize_table;
use crate::parser::{parse_bytes, ParsedTable};
use crate::score::{ScoreResult, SpendScoreEngine, SpendingBreakdown};

/// Options for one analysis run
#[derive(Clone)]
pub struct AnalysisOptions {
    /// Caller-chosen columns; each set field overrides detection
    pub mapping: Option<ColumnMapping>,
    /// Fewer usable transactions than this is an error
    pub min_transactions: usize,
    /// Hosted insight provider; rule-based suggestions when `None`
    pub insight_client: Option<InsightClient>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            mapping: None,
            min_transactions: DEFAULT_MIN_TRANSACTIONS,
            insight_client: None,
        }
    }
}

impl AnalysisOptions {
    /// Options derived from settings. The insight client is only built when
    /// insights are enabled and a key is configured.
    pub fn from_settings(settings: &Settings) -> Self {
        let insight_client = if settings.insights_enabled() {
            InsightClient::from_settings(settings)
                .map_err(|e| log_warning(format!("AI insights disabled: {}", e)))
                .ok()
        } else {
            None
        };

        Self {
            mapping: None,
            min_transactions: settings.min_transactions,
            insight_client,
        }
    }

    pub fn with_mapping(mut self, mapping: Option<ColumnMapping>) -> Self {
        self.mapping = mapping.filter(|m| !m.is_empty());
        self
    }
}

/// CSV file information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
    pub row_count: usize,
}

/// Everything produced for one uploaded file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub csv_info: CsvInfo,
    /// Mapping actually applied (explicit fields over detected ones)
    pub mapping_used: ColumnMapping,
    pub score: ScoreResult,
    pub spending: SpendingBreakdown,
    pub suggestions: Vec<Suggestion>,
    /// Rows dropped for a missing, unparsable or negligible amount
    pub skipped_rows: usize,
    /// Transactions kept undated because their date matched no known format
    pub undated_rows: usize,
}

fn format_delimiter(delimiter: char) -> String {
    match delimiter {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

/// Analyze already-parsed CSV data.
pub async fn analyze_table(table: ParsedTable, options: &AnalysisOptions) -> PipelineResult<Analysis> {
    log_success(format!("Detected encoding: {}", table.encoding));
    log_success(format!("Detected separator: '{}'", format_delimiter(table.delimiter)));
    log_success(format!("Read {} rows", table.rows.len()));

    log_info("Resolving columns...");
    let (mapping_used, report) = normalize_table(&table, options.mapping.as_ref())?;

    let found = report.transactions.len();
    if found == 0 {
        return Err(PipelineError::NoTransactions);
    }
    if found < options.min_transactions {
        return Err(PipelineError::InsufficientData {
            found,
            required: options.min_transactions,
        });
    }
    log_success(format!("{} transactions normalized", found));

    log_info("Scoring...");
    let score = SpendScoreEngine::new(&report.transactions).score();
    log_success(format!(
        "SpendScore {} ({})",
        score.final_score, score.tier.label
    ));

    let spending = SpendingBreakdown::from_transactions(&report.transactions);

    log_info("Generating suggestions...");
    let suggestions =
        suggestions_for(options.insight_client.as_ref(), &report.transactions, &score).await;

    Ok(Analysis {
        csv_info: CsvInfo {
            encoding: table.encoding,
            delimiter: table.delimiter,
            row_count: table.rows.len(),
            headers: table.headers,
        },
        mapping_used,
        score,
        spending,
        suggestions,
        skipped_rows: report.skipped_rows(),
        undated_rows: report.undated_rows(),
    })
}

/// Analyze raw CSV bytes.
pub async fn analyze_bytes(bytes: &[u8], options: &AnalysisOptions) -> PipelineResult<Analysis> {
    log_info("Reading CSV...");
    let table = parse_bytes(bytes)?;
    analyze_table(table, options).await
}

/// Analyze a CSV file.
pub async fn analyze_file<P: AsRef<Path>>(path: P, options: &AnalysisOptions) -> PipelineResult<Analysis> {
    let bytes = tokio::fs::read(path.as_ref()).await?;
    analyze_bytes(&bytes, options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use crate::insights::SUGGESTION_COUNT;
    use crate::models::CanonicalField;

    const EXPORT: &[u8] = b"Txn Date,Merchant,Transaction Value,Expense Type\n\
        2024-01-02,Tesco,45.20,Groceries\n\
        2024-01-03,Shell,60.00,Fuel\n\
        2024-01-05,Netflix,9.99,Streaming\n\
        2024-01-09,Landlord,950.00,Rent\n\
        not a date,Pret,4.50,Coffee\n\
        2024-01-12,Nobody,0.00,Misc\n";

    #[tokio::test]
    async fn test_analyze_bytes() {
        let analysis = analyze_bytes(EXPORT, &AnalysisOptions::default()).await.unwrap();

        assert_eq!(analysis.csv_info.row_count, 6);
        assert_eq!(analysis.csv_info.delimiter, ',');
        assert_eq!(analysis.mapping_used.get(CanonicalField::Amount), Some("Transaction Value"));
        assert_eq!(analysis.score.transaction_summary.count, 5);
        assert_eq!(analysis.skipped_rows, 1);
        assert_eq!(analysis.undated_rows, 1);
        assert_eq!(analysis.suggestions.len(), SUGGESTION_COUNT);
        assert!(analysis.score.final_score <= 100);
        assert_eq!(analysis.spending.top_vendors[0].name, "Landlord");
    }

    #[tokio::test]
    async fn test_insufficient_data() {
        let csv = b"Amount\n10\n20\n";
        let err = analyze_bytes(csv, &AnalysisOptions::default()).await.unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData { found: 2, required: 3 }));
    }

    #[tokio::test]
    async fn test_no_transactions() {
        let csv = b"Amount\n0\nabc\n";
        let err = analyze_bytes(csv, &AnalysisOptions::default()).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoTransactions));
    }

    #[tokio::test]
    async fn test_missing_amount_column() {
        let csv = b"Date,Payee\n2024-01-01,A\n";
        let err = analyze_bytes(csv, &AnalysisOptions::default()).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Ingest(IngestError::MissingAmountColumn { .. })
        ));
    }

    #[tokio::test]
    async fn test_explicit_mapping_wins() {
        let csv = b"Total,Paid Out,Payee\n1,10,A\n1,20,B\n1,30,C\n";
        let options = AnalysisOptions::default()
            .with_mapping(Some(ColumnMapping::new().with(CanonicalField::Amount, "Paid Out")));
        let analysis = analyze_bytes(csv, &options).await.unwrap();
        assert_eq!(analysis.score.transaction_summary.total_amount, 60.0);
        assert_eq!(analysis.mapping_used.get(CanonicalField::Vendor), Some("Payee"));
    }

    #[tokio::test]
    async fn test_analyze_missing_file() {
        let err = analyze_file("/definitely/not/here.csv", &AnalysisOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }

    #[test]
    fn test_options_from_settings_without_key() {
        let options = AnalysisOptions::from_settings(&Settings::default());
        assert!(options.insight_client.is_none());
        assert_eq!(options.min_transactions, 3);
    }
}
