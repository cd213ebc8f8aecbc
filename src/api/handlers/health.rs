use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use std::path::Path;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub uploads_dir: String,
    pub reports_dir: String,
    pub version: String,
}

async fn dir_status(path: &Path) -> String {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => "available".to_string(),
        _ => "missing".to_string(),
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        uploads_dir: dir_status(&state.config.upload_dir).await,
        reports_dir: dir_status(&state.config.report_dir).await,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
