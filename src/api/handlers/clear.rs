use crate::AppState;
use crate::api::error::AppError;
use crate::api::handlers::{ErrorResponse, MessageResponse};
use crate::services::storage::StorageArea;
use axum::{Json, extract::State};

#[utoipa::path(
    post,
    path = "/clear",
    responses(
        (status = 200, description = "Uploads, charts and reports deleted", body = MessageResponse),
        (status = 500, description = "A file could not be deleted", body = ErrorResponse)
    ),
    tag = "files"
)]
pub async fn clear_files(State(state): State<AppState>) -> Result<Json<MessageResponse>, AppError> {
    for area in [StorageArea::Uploads, StorageArea::Reports] {
        state
            .storage
            .clear(area)
            .await
            .map_err(|e| AppError::Processing(format!("Error clearing files: {}", e)))?;
    }

    Ok(Json(MessageResponse::success(
        "All files and reports have been cleared.",
    )))
}
