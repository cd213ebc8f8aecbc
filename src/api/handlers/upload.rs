use crate::AppState;
use crate::api::error::AppError;
use crate::api::handlers::ErrorResponse;
use crate::services::storage::StorageArea;
use crate::utils::validation::{sanitize_filename, validate_extension};
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
};
use futures::TryStreamExt;
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub status: String,
    pub message: String,
    /// Sanitized name the file was stored under
    pub filename: String,
}

/// Multipart form accepted by `/upload`
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// CSV or XLSX spreadsheet
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

fn too_large(max_file_size: usize) -> AppError {
    AppError::PayloadTooLarge(format!(
        "File is too large. The maximum upload size is {} bytes.",
        max_file_size
    ))
}

fn is_length_limit(err: &MultipartError) -> bool {
    err.status() == StatusCode::PAYLOAD_TOO_LARGE
        || err.to_string().contains("length limit exceeded")
}

/// Storage errors wrap the multipart error that interrupted the body stream
fn stream_failure(err: anyhow::Error, max_file_size: usize) -> AppError {
    let limit_hit = err
        .downcast_ref::<std::io::Error>()
        .and_then(|io| io.get_ref())
        .and_then(|inner| inner.downcast_ref::<MultipartError>())
        .is_some_and(is_length_limit);

    if limit_hit {
        too_large(max_file_size)
    } else {
        AppError::Anyhow(err)
    }
}

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File stored", body = UploadResponse),
        (status = 400, description = "Missing file, empty filename or disallowed extension", body = ErrorResponse),
        (status = 413, description = "Upload exceeds the size limit", body = ErrorResponse)
    ),
    tag = "files"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let max_file_size = state.config.max_file_size;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        if is_length_limit(&e) {
            too_large(max_file_size)
        } else {
            AppError::BadRequest(e.body_text())
        }
    })? {
        // Plain form fields are not file parts, even when named `file`
        let Some(original_filename) = field
            .file_name()
            .filter(|_| field.name() == Some("file"))
            .map(str::to_string)
        else {
            continue;
        };
        if original_filename.is_empty() {
            return Err(AppError::BadRequest(
                "No file selected for uploading.".to_string(),
            ));
        }

        validate_extension(&original_filename, &state.config.allowed_extensions).map_err(|e| {
            tracing::warn!("Rejected upload: {}", e);
            AppError::BadRequest("Allowed file types are CSV and XLSX.".to_string())
        })?;

        let filename = sanitize_filename(&original_filename)
            .map_err(|_| AppError::BadRequest("Invalid filename.".to_string()))?;

        let reader: Box<dyn AsyncRead + Unpin + Send + '_> =
            Box::new(StreamReader::new(field.map_err(std::io::Error::other)));

        let stored = state
            .storage
            .upload_stream(StorageArea::Uploads, &filename, reader)
            .await
            .map_err(|e| stream_failure(e, max_file_size))?;

        tracing::info!(
            "📤 Uploaded {} as {} ({} bytes)",
            original_filename,
            stored.key,
            stored.size
        );

        return Ok(Json(UploadResponse {
            status: "success".to_string(),
            message: "File uploaded successfully.".to_string(),
            filename: stored.key,
        }));
    }

    Err(AppError::BadRequest(
        "No file part in the request.".to_string(),
    ))
}
