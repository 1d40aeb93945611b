//! Error types for the SpendScore pipeline.
//!
//! The hierarchy mirrors the layers of the system:
//!
//! - [`IngestError`] - decoding, CSV parsing and column resolution (fatal to a parse)
//! - [`MetricError`] - a single sub-metric failed (always recovered by the engine)
//! - [`RepositoryError`] - report storage
//! - [`AiError`] - insight provider
//! - [`ConfigError`] - environment configuration
//! - [`PipelineError`] - top-level orchestration
//! - [`ServerError`] - HTTP layer
//!
//! Conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

use crate::score::Metric;

// =============================================================================
// Ingestion Errors
// =============================================================================

/// Errors that abort a parse attempt.
#[derive(Debug, Error)]
pub enum IngestError {
    /// No column resolves to `amount`, either explicitly or by header matching.
    #[error("Could not find an amount column (available columns: {})", available.join(", "))]
    MissingAmountColumn { available: Vec<String> },

    /// None of the supported encodings decoded the input.
    #[error("Could not decode input with any supported encoding ({})", tried.join(", "))]
    EncodingFailure { tried: Vec<String> },

    /// Malformed CSV.
    #[error("Invalid CSV: {0}")]
    Csv(#[from] csv::Error),

    /// The input has no header row.
    #[error("No headers found in CSV")]
    NoHeaders,

    /// Failed to read the input.
    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Metric Errors
// =============================================================================

/// A sub-metric computation failed. The engine substitutes the metric's
/// fallback value and carries on.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MetricError {
    /// The computation produced NaN or an infinity.
    #[error("{metric} produced a non-finite value")]
    NonFinite { metric: Metric },
}

// =============================================================================
// Repository Errors
// =============================================================================

/// Errors from a report repository.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Filesystem error.
    #[error("Repository IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored report could not be (de)serialized.
    #[error("Repository JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A lock was poisoned by a panicking writer.
    #[error("Repository lock poisoned")]
    Poisoned,

    /// The blocking storage task panicked or was cancelled.
    #[error("Repository task failed: {0}")]
    Task(String),
}

// =============================================================================
// AI Client Errors
// =============================================================================

/// Errors from the insight provider.
#[derive(Debug, Error)]
pub enum AiError {
    /// Missing API key.
    #[error("Missing API key: {0}")]
    MissingApiKey(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// The provider returned an error payload.
    #[error("API error: {0}")]
    ApiError(String),

    /// The reply was not the expected JSON.
    #[error("Invalid AI response: {0}")]
    InvalidResponse(String),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Invalid environment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level analysis errors.
///
/// This is the error type returned by [`crate::pipeline::analyze_bytes`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Decoding or parsing failed.
    #[error("Failed to parse CSV file: {0}")]
    Ingest(#[from] IngestError),

    /// Storing the report failed.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// No usable transaction rows.
    #[error("No valid transactions found in the CSV file")]
    NoTransactions,

    /// Too few transactions for a meaningful score.
    #[error("Insufficient data for analysis. Found {found} transactions, minimum {required} required")]
    InsufficientData { found: usize, required: usize },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    /// Repository error.
    #[error("{0}")]
    Repository(#[from] RepositoryError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for ingestion.
pub type IngestResult<T> = Result<T, IngestError>;

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Result type for AI operations.
pub type AiResult<T> = Result<T, AiError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let ingest = IngestError::MissingAmountColumn {
            available: vec!["Date".into(), "Merchant".into()],
        };
        let pipeline: PipelineError = ingest.into();
        let msg = pipeline.to_string();
        assert!(msg.contains("amount column"));
        assert!(msg.contains("Date, Merchant"));

        let server: ServerError = pipeline.into();
        assert!(server.to_string().contains("amount column"));
    }

    #[test]
    fn test_insufficient_data_format() {
        let err = PipelineError::InsufficientData { found: 2, required: 3 };
        let msg = err.to_string();
        assert!(msg.contains("Found 2"));
        assert!(msg.contains("minimum 3"));
    }

    #[test]
    fn test_metric_error_names_metric() {
        let err = MetricError::NonFinite { metric: Metric::WasteRatio };
        assert_eq!(err.to_string(), "waste_ratio produced a non-finite value");
    }
}
