//! HTTP submission and status server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/cv-analyzer/analyze` | Multipart submission; starts a background analysis |
//! | `GET`  | `/cv-analyzer/status/{uuid}` | `{status, report}` for a submitted analysis |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one shape:
//!
//! ```json
//! { "error": { "code": "validation_error", "message": "...", "fields": { "job_title": ["..."] } } }
//! ```
//!
//! Error codes: `validation_error` (422), `bad_request` (400), `not_found` (404),
//! `internal` (500). `fields` is present only for validation errors. A body
//! cut off by the upload limit is reported as a `cv` validation error.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! can be served from a different origin.

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use cv_analyzer_core::models::TaskReport;

use crate::analysis::Analyzer;
use crate::config::Config;
use crate::error::AnalysisError;
use crate::submission::{DocumentUpload, Submission, ValidationErrors};
use crate::worker::{self, WorkerPool};

/// Multipart framing allowance on top of the document size limit.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    analyzer: Arc<Analyzer>,
}

/// Starts the HTTP server together with the worker pool.
///
/// Runs the recovery sweep before accepting requests, then serves on
/// `[server].bind` until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let (scheduler, queue) = worker::channel();
    let analyzer = Arc::new(Analyzer::from_config(config, Arc::new(scheduler)).await?);

    WorkerPool::new(analyzer.clone(), &config.worker).spawn(queue);
    analyzer.recover().await?;

    let app = build_router(analyzer, config.server.max_upload_bytes);

    info!(bind = %config.server.bind, "cv analyzer listening");
    println!("CV Analyzer listening on http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router over an existing analyzer.
pub fn build_router(analyzer: Arc<Analyzer>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/cv-analyzer/analyze", post(handle_analyze))
        .route("/cv-analyzer/status/{uuid}", get(handle_status))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(
            max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES),
        ))
        .layer(cors)
        .with_state(AppState { analyzer })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<ValidationErrors>,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    detail: ErrorDetail,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: ErrorDetail {
                code: "bad_request",
                message: message.into(),
                fields: None,
            },
        }
    }
}

impl AppError {
    /// Map a multipart read failure. Hitting the body limit means the
    /// document was too large, which is a `cv` validation error.
    fn from_multipart(err: MultipartError, max_upload_bytes: usize) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return AnalysisError::Validation(ValidationErrors::document_too_large(max_upload_bytes))
                .into();
        }
        Self::bad_request(err.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.detail })).into_response()
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Validation(fields) => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                detail: ErrorDetail {
                    code: "validation_error",
                    message: fields.to_string(),
                    fields: Some(fields),
                },
            },
            AnalysisError::NotFound(id) => Self {
                status: StatusCode::NOT_FOUND,
                detail: ErrorDetail {
                    code: "not_found",
                    message: format!("no analysis with id {}", id),
                    fields: None,
                },
            },
            other => {
                error!(error = %other, "request failed");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    detail: ErrorDetail {
                        code: "internal",
                        message: "An internal server error occurred".to_string(),
                        fields: None,
                    },
                }
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /cv-analyzer/analyze ============

#[derive(Serialize)]
struct AnalyzeResponse {
    uuid: String,
    message: &'static str,
}

/// Handler for `POST /cv-analyzer/analyze`.
///
/// Reads every multipart field into a [`Submission`]; unknown fields are
/// ignored. `analysis_preferences` may repeat (also accepted as
/// `analysis_preferences[]`).
async fn handle_analyze(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let mut submission = Submission::default();
    let max_upload_bytes = state.analyzer.settings().max_upload_bytes;
    let rejected = |e: MultipartError| AppError::from_multipart(e, max_upload_bytes);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(rejected)?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "cv" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(rejected)?;
            submission.cv = Some(DocumentUpload {
                file_name,
                bytes: bytes.to_vec(),
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(rejected)?;
        match name.as_str() {
            "job_title" => submission.job_title = Some(value),
            "job_description" => submission.job_description = Some(value),
            "target_company" => submission.target_company = Some(value),
            "industry" => submission.industry = Some(value),
            "experience_level" => submission.experience_level = Some(value),
            "target_country" => submission.target_country = Some(value),
            "current_career_level" => submission.current_career_level = Some(value),
            "name" => submission.name = Some(value),
            "email" => submission.email = Some(value),
            "analysis_preferences" | "analysis_preferences[]" => {
                submission.analysis_preferences.push(value)
            }
            _ => {}
        }
    }

    let task = state.analyzer.submit(submission).await?;

    Ok(Json(AnalyzeResponse {
        uuid: task.id,
        message: "Analysis started in background.",
    }))
}

// ============ GET /cv-analyzer/status/{uuid} ============

async fn handle_status(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<TaskReport>, AppError> {
    Ok(Json(state.analyzer.status(&uuid).await?))
}
