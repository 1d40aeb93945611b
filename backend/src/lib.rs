//! # SpendScore - transaction CSV normalization and spend scoring
//!
//! SpendScore ingests accounting or banking CSV exports with arbitrary column
//! names, normalizes them into canonical transactions, and computes a 0-100
//! SpendScore from six weighted heuristics, with a tier and suggestions.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Parser    │────▶│  Normalize  │────▶│    Score    │
//! │ (UTF8/1252) │     │  (auto-enc) │     │ (matcher)   │     │ (6 metrics) │
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────┬──────┘
//!                                                                    │
//!                     ┌─────────────┐     ┌─────────────┐            │
//!                     │    Store    │◀────│  Insights   │◀───────────┘
//!                     │  (reports)  │     │ (AI / rule) │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spendscore::{analyze_file, AnalysisOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let analysis = analyze_file("export.csv", &AnalysisOptions::default()).await.unwrap();
//!     println!("SpendScore {} ({})", analysis.score.final_score, analysis.score.tier.label);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Canonical fields, raw rows, column mappings, transactions
//! - [`parser`] - CSV decoding with encoding and delimiter detection
//! - [`matcher`] - Header to canonical field resolution
//! - [`normalize`] - Amount/date cleaning and row normalization
//! - [`score`] - Sub-metrics, aggregation, tiers and summaries
//! - [`insights`] - AI and rule-based suggestions
//! - [`pipeline`] - End-to-end analysis
//! - [`store`] - Report repositories
//! - [`config`] - Environment settings
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Ingestion
pub mod matcher;
pub mod normalize;
pub mod parser;

// Scoring
pub mod score;

// Suggestions
pub mod insights;

// Orchestration and storage
pub mod pipeline;
pub mod store;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    AiError,
    ConfigError,
    IngestError,
    MetricError,
    PipelineError,
    RepositoryError,
    ServerError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    CanonicalField,
    ColumnMapping,
    RawCell,
    RawRow,
    Transaction,
};

// =============================================================================
// Re-exports - Ingestion
// =============================================================================

pub use parser::{
    decode_with_fallback,
    detect_delimiter,
    parse_bytes,
    parse_file,
    ParsedTable,
};

pub use matcher::{detect_mapping, resolve, HeaderMatch, HeaderMatcher, MatchKind};

pub use normalize::{
    clean_amount,
    normalize,
    normalize_bytes,
    parse_date,
    NormalizeReport,
    RowIssue,
};

// =============================================================================
// Re-exports - Scoring
// =============================================================================

pub use score::{
    aggregate,
    classify,
    Metric,
    ScoreBreakdown,
    ScoreResult,
    SpendScoreEngine,
    SpendingBreakdown,
    Tier,
    TierInfo,
    TransactionSummary,
};

// =============================================================================
// Re-exports - Insights
// =============================================================================

pub use insights::{rule_based_suggestions, InsightClient, Priority, Suggestion};

// =============================================================================
// Re-exports - Pipeline and storage
// =============================================================================

pub use pipeline::{analyze_bytes, analyze_file, analyze_table, Analysis, AnalysisOptions, CsvInfo};

pub use store::{
    DashboardStats,
    FileReportRepository,
    InMemoryReportRepository,
    ReportRepository,
    StoredReport,
};

pub use config::Settings;

// Server
pub mod server {
    pub use crate::api::server::{router, start_server, AppState};
}
