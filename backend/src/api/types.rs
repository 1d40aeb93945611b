//! REST API response types and error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::logs::log_error;
use crate::error::{PipelineError, ServerError};
use crate::score::{score_label, Tier};
use crate::store::StoredReport;

/// Response sent after a CSV upload has been analyzed and stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub report: StoredReport,
}

impl From<StoredReport> for UploadResponse {
    fn from(report: StoredReport) -> Self {
        Self { success: true, report }
    }
}

/// One row of the report list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub id: Uuid,
    pub source_name: String,
    pub company_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub spend_score: u8,
    pub tier: Tier,
    pub transaction_count: usize,
}

impl From<&StoredReport> for ReportSummary {
    fn from(report: &StoredReport) -> Self {
        Self {
            id: report.id,
            source_name: report.source_name.clone(),
            company_name: report.company_name.clone(),
            created_at: report.created_at,
            spend_score: report.spend_score(),
            tier: report.analysis.score.tier.tier,
            transaction_count: report.analysis.score.transaction_summary.count,
        }
    }
}

/// Latest score for the dashboard badge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendScoreResponse {
    pub score: u8,
    /// Tier label, or "No Data"
    pub status: String,
    pub recommendations: Vec<String>,
    pub report_id: Option<Uuid>,
    pub created_at: Option<DateTime<Utc>>,
}

impl SpendScoreResponse {
    pub fn no_data() -> Self {
        Self {
            score: 0,
            status: "No Data".to_string(),
            recommendations: vec!["Upload your first financial data to get started".to_string()],
            report_id: None,
            created_at: None,
        }
    }

    pub fn from_report(report: &StoredReport) -> Self {
        Self {
            score: report.spend_score(),
            status: score_label(report.spend_score()).to_string(),
            recommendations: report
                .analysis
                .suggestions
                .iter()
                .map(|s| s.text.clone())
                .collect(),
            report_id: Some(report.id),
            created_at: Some(report.created_at),
        }
    }
}

/// Create an error response
pub fn error_response(message: &str) -> Value {
    json!({
        "success": false,
        "error": message
    })
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Pipeline(
                PipelineError::Ingest(_)
                | PipelineError::NoTransactions
                | PipelineError::InsufficientData { .. },
            ) => StatusCode::BAD_REQUEST,
            ServerError::Pipeline(_) | ServerError::Repository(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log_error(self.to_string());
        }
        (status, Json(error_response(&self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IngestError, RepositoryError};

    #[test]
    fn test_error_status_mapping() {
        let bad = ServerError::from(PipelineError::InsufficientData { found: 1, required: 3 });
        assert_eq!(bad.status_code(), StatusCode::BAD_REQUEST);

        let parse = ServerError::from(PipelineError::from(IngestError::NoHeaders));
        assert_eq!(parse.status_code(), StatusCode::BAD_REQUEST);

        let storage = ServerError::from(RepositoryError::Poisoned);
        assert_eq!(storage.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(ServerError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_error_response_shape() {
        let body = error_response("boom");
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "boom");
    }

    #[test]
    fn test_no_data_score() {
        let response = SpendScoreResponse::no_data();
        assert_eq!(response.status, "No Data");
        assert_eq!(response.report_id, None);
    }
}
