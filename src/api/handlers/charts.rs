use crate::AppState;
use crate::api::error::AppError;
use crate::api::handlers::ErrorResponse;
use axum::{Json, extract::State, extract::rejection::JsonRejection};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

const REQUIRED_MESSAGE: &str = "Chart type and filename are required.";

#[derive(Deserialize, ToSchema, Validate)]
pub struct GenerateChartRequest {
    /// One of `bar`, `pie`, `line`
    #[serde(rename = "type", default)]
    #[schema(example = "bar")]
    #[validate(required, length(min = 1))]
    pub chart_type: Option<String>,

    /// Name returned by `/upload`
    #[serde(default)]
    #[schema(example = "sales.csv")]
    #[validate(required, length(min = 1))]
    pub filename: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ChartResponse {
    pub status: String,
    /// Public URL of the PNG
    pub chart_url: String,
    pub chart_filename: String,
}

#[utoipa::path(
    post,
    path = "/generate_chart",
    request_body = GenerateChartRequest,
    responses(
        (status = 200, description = "Chart rendered", body = ChartResponse),
        (status = 400, description = "Missing fields, invalid chart type or too few columns", body = ErrorResponse),
        (status = 404, description = "Uploaded file not found", body = ErrorResponse),
        (status = 500, description = "File could not be read or chart could not be drawn", body = ErrorResponse)
    ),
    tag = "charts"
)]
pub async fn generate_chart(
    State(state): State<AppState>,
    payload: Result<Json<GenerateChartRequest>, JsonRejection>,
) -> Result<Json<ChartResponse>, AppError> {
    let Json(req) = payload?;
    req.validate()
        .map_err(|_| AppError::BadRequest(REQUIRED_MESSAGE.to_string()))?;

    let chart_type = req.chart_type.unwrap_or_default();
    let filename = req.filename.unwrap_or_default();

    let chart = state.chart_service.generate(&chart_type, &filename).await?;

    Ok(Json(ChartResponse {
        status: "success".to_string(),
        chart_url: state.config.chart_url(&chart.chart_filename),
        chart_filename: chart.chart_filename,
    }))
}
