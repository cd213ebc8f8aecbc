use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::services::charts::ChartError;
use crate::services::report_service::ReportError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    /// A processing failure whose message is safe to show to the client
    #[error("Processing error: {0}")]
    Processing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::Processing(msg) => {
                tracing::error!("Processing error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::Anyhow(e) => {
                tracing::error!("Anyhow error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "status": "error",
            "message": message
        }));

        (status, body).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<ChartError> for AppError {
    fn from(err: ChartError) -> Self {
        match err {
            ChartError::SourceNotFound(_) => {
                AppError::NotFound("Uploaded file not found.".to_string())
            }
            ChartError::TooFewColumns => AppError::BadRequest(
                "The uploaded file must have at least two columns.".to_string(),
            ),
            ChartError::UnknownType(_) => {
                AppError::BadRequest("Invalid chart type specified.".to_string())
            }
            ChartError::Read(e) => AppError::Processing(format!("Error reading the file: {}", e)),
            other => AppError::Processing(format!("Error generating the chart: {}", other)),
        }
    }
}

impl From<ReportError> for AppError {
    fn from(err: ReportError) -> Self {
        AppError::Processing(format!("Error generating report: {}", err))
    }
}
