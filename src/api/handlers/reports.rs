use crate::AppState;
use crate::api::error::AppError;
use crate::api::handlers::ErrorResponse;
use crate::services::storage::StorageArea;
use crate::utils::validation::is_safe_key;
use axum::{
    Json,
    body::Body,
    extract::{Path, State, rejection::JsonRejection},
    http::header,
    response::{IntoResponse, Response},
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use utoipa::ToSchema;
use validator::Validate;

const REQUIRED_MESSAGE: &str = "Filename and charts are required to generate report.";

#[derive(Deserialize, ToSchema, Validate)]
pub struct GenerateReportRequest {
    /// Uploaded file the charts were drawn from; used for the title line and report name
    #[serde(default)]
    #[schema(example = "sales.csv")]
    #[validate(required, length(min = 1))]
    pub filename: Option<String>,

    /// Chart URLs in the order they should appear
    #[serde(default)]
    #[validate(required, length(min = 1))]
    pub charts: Option<Vec<String>>,
}

#[derive(Serialize, ToSchema)]
pub struct ReportResponse {
    pub status: String,
    /// Download URL of the PDF
    pub report_url: String,
}

#[utoipa::path(
    post,
    path = "/generate_report",
    request_body = GenerateReportRequest,
    responses(
        (status = 200, description = "Report written", body = ReportResponse),
        (status = 400, description = "Missing filename or empty chart list", body = ErrorResponse),
        (status = 500, description = "Report could not be written", body = ErrorResponse)
    ),
    tag = "reports"
)]
pub async fn generate_report(
    State(state): State<AppState>,
    payload: Result<Json<GenerateReportRequest>, JsonRejection>,
) -> Result<Json<ReportResponse>, AppError> {
    let Json(req) = payload?;
    req.validate()
        .map_err(|_| AppError::BadRequest(REQUIRED_MESSAGE.to_string()))?;

    let filename = req.filename.unwrap_or_default();
    let charts = req.charts.unwrap_or_default();

    let report = state.report_service.generate(&filename, &charts).await?;

    Ok(Json(ReportResponse {
        status: "success".to_string(),
        report_url: state.config.report_url(&report.report_filename),
    }))
}

fn content_disposition(filename: &str) -> String {
    let ascii_filename = filename
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .collect::<String>();
    let fallback_filename = if ascii_filename.is_empty() {
        "report.pdf"
    } else {
        &ascii_filename
    };
    let encoded_filename = utf8_percent_encode(filename, NON_ALPHANUMERIC).to_string();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback_filename, encoded_filename
    )
}

#[utoipa::path(
    get,
    path = "/download_report/{filename}",
    params(
        ("filename" = String, Path, description = "Report filename returned by /generate_report")
    ),
    responses(
        (status = 200, description = "PDF attachment", content_type = "application/pdf"),
        (status = 404, description = "Report not found", body = ErrorResponse)
    ),
    tag = "reports"
)]
pub async fn download_report(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let not_found = || AppError::NotFound("Report not found.".to_string());

    if !is_safe_key(&filename) {
        tracing::warn!("Rejected report download for unsafe name: {}", filename);
        return Err(not_found());
    }
    if !state.storage.exists(StorageArea::Reports, &filename).await? {
        return Err(not_found());
    }

    let reader = state.storage.open(StorageArea::Reports, &filename).await?;
    let body = Body::from_stream(ReaderStream::new(reader));

    Ok((
        [
            (header::CONTENT_TYPE, mime::APPLICATION_PDF.to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(&filename)),
        ],
        body,
    )
        .into_response())
}
