//! HTTP server for the SpendScore API.
//!
//! # API Endpoints
//!
//! | Method | Path                    | Description                           |
//! |--------|-------------------------|---------------------------------------|
//! | GET    | `/health`               | Health check                          |
//! | POST   | `/api/upload`           | Upload a CSV, analyze and store it    |
//! | GET    | `/api/reports`          | List stored reports                   |
//! | GET    | `/api/reports/{id}`     | Fetch one report                      |
//! | DELETE | `/api/reports/{id}`     | Delete one report                     |
//! | GET    | `/api/spend-score`      | Latest score and recommendations      |
//! | GET    | `/api/dashboard/stats`  | Aggregate statistics                  |
//! | GET    | `/api/logs`             | SSE stream for real-time logs         |

use axum::{
    extract::{multipart::Field, DefaultBodyLimit, Multipart, Path, State},
    http::{header, Method},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::logs::{log_info, log_success, log_warning, LOG_BROADCASTER};
use super::types::{ReportSummary, SpendScoreResponse, UploadResponse};
use crate::config::{Settings, DEFAULT_MAX_UPLOAD_BYTES};
use crate::error::{RepositoryError, RepositoryResult, ServerError, ServerResult};
use crate::models::ColumnMapping;
use crate::pipeline::{analyze_bytes, AnalysisOptions};
use crate::store::{latest, DashboardStats, FileReportRepository, ReportRepository, StoredReport};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub reports: Arc<dyn ReportRepository>,
    pub options: AnalysisOptions,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(reports: Arc<dyn ReportRepository>, options: AnalysisOptions) -> Self {
        Self {
            reports,
            options,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .expose_headers([header::CONTENT_TYPE]);

    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/upload", post(upload_csv))
        .route("/api/reports", get(list_reports))
        .route("/api/reports/{id}", get(get_report).delete(delete_report))
        .route("/api/spend-score", get(spend_score))
        .route("/api/dashboard/stats", get(dashboard_stats))
        .route("/api/logs", get(sse_logs))
        .layer(body_limit)
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let reports = FileReportRepository::open(&settings.data_dir)?;
    log_info(format!("Report store: {}", reports.dir().display()));

    let options = AnalysisOptions::from_settings(&settings);
    if options.insight_client.is_none() {
        log_info("AI insights off; using rule-based suggestions");
    }

    let state = AppState {
        reports: Arc::new(reports),
        options,
        max_upload_bytes: settings.max_upload_bytes,
    };
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    eprintln!("🚀 SpendScore server running on http://localhost:{}", settings.port);
    eprintln!("   POST /api/upload          - Upload CSV file");
    eprintln!("   GET  /api/reports         - Stored reports");
    eprintln!("   GET  /api/spend-score     - Latest score");
    eprintln!("   GET  /api/logs            - SSE log stream");
    eprintln!("   GET  /health              - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "spendscore",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn is_csv_name(name: &str) -> bool {
    name.rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("csv"))
}

/// Upload CSV endpoint
async fn upload_csv(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ServerResult<Json<UploadResponse>> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut mapping: Option<ColumnMapping> = None;
    let mut company_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                file_data = Some(bytes.to_vec());
            }
            "mapping" => {
                let text = read_text(field).await?;
                if !text.trim().is_empty() {
                    match serde_json::from_str::<ColumnMapping>(&text) {
                        Ok(m) => mapping = Some(m),
                        Err(e) => log_warning(format!("Ignoring malformed mapping: {}", e)),
                    }
                }
            }
            "company_name" => {
                company_name = Some(read_text(field).await?.trim().to_string());
            }
            _ => {}
        }
    }

    let bytes = file_data.ok_or_else(|| ServerError::BadRequest("No file provided".to_string()))?;
    let file_name = file_name.unwrap_or_else(|| "upload.csv".to_string());
    if !is_csv_name(&file_name) {
        return Err(ServerError::BadRequest(
            "Invalid file type. Only CSV files are allowed.".to_string(),
        ));
    }

    log_info(format!("New upload: {} ({} bytes)", file_name, bytes.len()));
    if let Some(m) = &mapping {
        log_info(format!("Using provided mapping for {} field(s)", m.resolved().count()));
    }

    let options = state.options.clone().with_mapping(mapping);
    let analysis = analyze_bytes(&bytes, &options).await?;

    let report = StoredReport::new(file_name, company_name, analysis);
    let stored = report.clone();
    with_reports(&state, move |reports| reports.put(stored)).await?;
    log_success(format!("Stored report {}", report.id));

    Ok(Json(report.into()))
}

async fn read_text(field: Field<'_>) -> ServerResult<String> {
    field
        .text()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))
}

/// Run a repository call on the blocking pool. File-backed repositories
/// touch the filesystem on writes.
async fn with_reports<T, F>(state: &AppState, op: F) -> ServerResult<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn ReportRepository) -> RepositoryResult<T> + Send + 'static,
{
    let reports = Arc::clone(&state.reports);
    let result = tokio::task::spawn_blocking(move || op(reports.as_ref()))
        .await
        .map_err(|e| RepositoryError::Task(e.to_string()))?;
    Ok(result?)
}

fn parse_id(raw: &str) -> ServerResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ServerError::BadRequest("Invalid report ID format".to_string()))
}

async fn list_reports(State(state): State<AppState>) -> ServerResult<Json<Value>> {
    let reports = state.reports.list()?;
    let summaries: Vec<ReportSummary> = reports.iter().map(ReportSummary::from).collect();
    Ok(Json(json!({
        "success": true,
        "reports": summaries,
    })))
}

async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<Value>> {
    let id = parse_id(&id)?;
    let report = state
        .reports
        .get(id)?
        .ok_or_else(|| ServerError::NotFound("Report not found".to_string()))?;
    Ok(Json(json!({
        "success": true,
        "report": report,
    })))
}

async fn delete_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<Value>> {
    let id = parse_id(&id)?;
    if !with_reports(&state, move |reports| reports.delete(id)).await? {
        return Err(ServerError::NotFound("Report not found".to_string()));
    }
    log_info(format!("Deleted report {}", id));
    Ok(Json(json!({
        "success": true,
        "message": "Report deleted successfully",
    })))
}

async fn spend_score(State(state): State<AppState>) -> ServerResult<Json<SpendScoreResponse>> {
    let reports = state.reports.list()?;
    let response = latest(&reports)
        .map(SpendScoreResponse::from_report)
        .unwrap_or_else(SpendScoreResponse::no_data);
    Ok(Json(response))
}

async fn dashboard_stats(State(state): State<AppState>) -> ServerResult<Json<DashboardStats>> {
    let reports = state.reports.list()?;
    Ok(Json(DashboardStats::from_reports(&reports)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::sample_analysis;
    use crate::store::InMemoryReportRepository;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    const BOUNDARY: &str = "spendscore-test-boundary";

    fn app_with(repo: Arc<InMemoryReportRepository>) -> Router {
        router(AppState::new(repo, AnalysisOptions::default()))
    }

    fn multipart_body(parts: &[(&str, Option<&str>, &str)]) -> String {
        let mut body = String::new();
        for (name, file_name, content) in parts {
            body.push_str(&format!("--{}\r\n", BOUNDARY));
            match file_name {
                Some(f) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: text/csv\r\n\r\n",
                    name, f
                )),
                None => body.push_str(&format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)),
            }
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{}--\r\n", BOUNDARY));
        body
    }

    fn upload_request(body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    const CSV: &str = "Date,Vendor,Amount,Category\n\
        2024-01-02,Tesco,45.20,Groceries\n\
        2024-01-03,Shell,60.00,Fuel\n\
        2024-01-05,Netflix,9.99,Streaming\n\
        2024-01-09,Landlord,950.00,Rent\n";

    #[tokio::test]
    async fn test_health() {
        let app = app_with(Arc::new(InMemoryReportRepository::new()));
        let response = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_upload_stores_report() {
        let repo = Arc::new(InMemoryReportRepository::new());
        let app = app_with(repo.clone());

        let body = multipart_body(&[
            ("file", Some("january.csv"), CSV),
            ("company_name", None, "Acme Ltd"),
        ]);
        let response = app.oneshot(upload_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["report"]["source_name"], "january.csv");
        assert_eq!(json["report"]["company_name"], "Acme Ltd");
        assert!(json["report"]["analysis"]["score"]["final_score"].is_number());

        let stored = repo.list().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].analysis.score.transaction_summary.count, 4);
    }

    #[tokio::test]
    async fn test_upload_with_mapping() {
        let repo = Arc::new(InMemoryReportRepository::new());
        let csv = "Total,Paid Out\n1,10\n1,20\n1,30\n";
        let body = multipart_body(&[
            ("file", Some("m.csv"), csv),
            ("mapping", None, r#"{"amount": "Paid Out"}"#),
        ]);
        let response = app_with(repo.clone()).oneshot(upload_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            repo.list().unwrap()[0].analysis.score.transaction_summary.total_amount,
            60.0
        );
    }

    #[tokio::test]
    async fn test_upload_errors() {
        let app = app_with(Arc::new(InMemoryReportRepository::new()));

        let no_file = multipart_body(&[("company_name", None, "Acme")]);
        let response = app.clone().oneshot(upload_request(no_file)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Invalid request: No file provided");

        let wrong_type = multipart_body(&[("file", Some("data.xlsx"), CSV)]);
        let response = app.clone().oneshot(upload_request(wrong_type)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let too_few = multipart_body(&[("file", Some("few.csv"), "Amount\n5\n")]);
        let response = app.clone().oneshot(upload_request(too_few)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("Insufficient data"));

        let no_amount = multipart_body(&[("file", Some("x.csv"), "Date,Payee\n2024-01-01,A\n")]);
        let response = app.oneshot(upload_request(no_amount)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_and_delete_with_file_repository() {
        let dir = tempfile::TempDir::new().unwrap();
        let repo = Arc::new(FileReportRepository::open(dir.path()).unwrap());
        let app = router(AppState::new(repo.clone(), AnalysisOptions::default()));

        let body = multipart_body(&[("file", Some("disk.csv"), CSV)]);
        let response = app.clone().oneshot(upload_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let id = repo.list().unwrap()[0].id;
        let path = dir.path().join(format!("{}.json", id));
        assert!(path.exists());

        let delete = Request::builder()
            .method("DELETE")
            .uri(format!("/api/reports/{}", id))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(delete).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unreadable_company_name_is_rejected() {
        // field body ends without a closing boundary
        let body = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"company_name\"\r\n\r\nAcme",
            BOUNDARY
        );
        let app = app_with(Arc::new(InMemoryReportRepository::new()));
        let response = app.oneshot(upload_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert!(json["error"].as_str().unwrap().contains("Read error"));
    }

    #[tokio::test]
    async fn test_report_lifecycle() {
        let repo = Arc::new(InMemoryReportRepository::new());
        let report = StoredReport::new("a.csv", None, sample_analysis(&[10.0, 20.0, 30.0]));
        repo.put(report.clone()).unwrap();
        let app = app_with(repo.clone());

        let response = app.clone().oneshot(get_request("/api/reports")).await.unwrap();
        let json = json_body(response).await;
        assert_eq!(json["reports"].as_array().unwrap().len(), 1);

        let uri = format!("/api/reports/{}", report.id);
        let response = app.clone().oneshot(get_request(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["report"]["source_name"], "a.csv");

        let delete = Request::builder().method("DELETE").uri(&uri).body(Body::empty()).unwrap();
        let response = app.clone().oneshot(delete).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(repo.list().unwrap().is_empty());

        let response = app.clone().oneshot(get_request(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.oneshot(get_request("/api/reports/not-a-uuid")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_spend_score_and_stats() {
        let repo = Arc::new(InMemoryReportRepository::new());
        let app = app_with(repo.clone());

        let response = app.clone().oneshot(get_request("/api/spend-score")).await.unwrap();
        assert_eq!(json_body(response).await["status"], "No Data");

        let report = StoredReport::new("a.csv", None, sample_analysis(&[10.0, 20.0, 30.0]));
        repo.put(report.clone()).unwrap();

        let response = app.clone().oneshot(get_request("/api/spend-score")).await.unwrap();
        let json = json_body(response).await;
        assert_eq!(json["score"], report.spend_score());
        assert_eq!(json["report_id"], report.id.to_string());
        assert_eq!(json["recommendations"].as_array().unwrap().len(), 3);

        let response = app.oneshot(get_request("/api/dashboard/stats")).await.unwrap();
        let json = json_body(response).await;
        assert_eq!(json["total_reports"], 1);
        assert_eq!(json["avg_spend_score"], report.spend_score());
    }
}
