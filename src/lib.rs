pub mod api;
pub mod config;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::api::handlers;
use crate::api::middleware::{metrics::metrics_middleware, request_id::request_id_middleware};
use crate::config::AppConfig;
use crate::services::charts::ChartService;
use crate::services::render::ChartRenderer;
use crate::services::report_service::ReportService;
use crate::services::storage::StorageService;
use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::index::index,
        handlers::upload::upload_file,
        handlers::charts::generate_chart,
        handlers::reports::generate_report,
        handlers::reports::download_report,
        handlers::clear::clear_files,
        handlers::health::health_check,
    ),
    components(
        schemas(
            handlers::ErrorResponse,
            handlers::MessageResponse,
            handlers::upload::UploadForm,
            handlers::upload::UploadResponse,
            handlers::charts::GenerateChartRequest,
            handlers::charts::ChartResponse,
            handlers::reports::GenerateReportRequest,
            handlers::reports::ReportResponse,
            handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "ui", description = "Browser page"),
        (name = "files", description = "Upload and cleanup"),
        (name = "charts", description = "Chart rendering"),
        (name = "reports", description = "PDF reports"),
        (name = "system", description = "Health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn StorageService>,
    pub chart_service: Arc<ChartService>,
    pub report_service: Arc<ReportService>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(storage: Arc<dyn StorageService>, config: AppConfig, renderer: ChartRenderer) -> Self {
        let chart_service = Arc::new(ChartService::new(storage.clone(), renderer));
        let report_service = Arc::new(ReportService::new(
            storage.clone(),
            config.chart_url_prefix.clone(),
        ));

        Self {
            storage,
            chart_service,
            report_service,
            config: Arc::new(config),
        }
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if allowed_origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();

    Router::new()
        .route("/", get(handlers::index::index))
        .route("/upload", post(handlers::upload::upload_file))
        .route("/generate_chart", post(handlers::charts::generate_chart))
        .route("/generate_report", post(handlers::reports::generate_report))
        .route(
            &format!("{}/:filename", config.report_url_prefix),
            get(handlers::reports::download_report),
        )
        .route("/clear", post(handlers::clear::clear_files))
        .route("/health", get(handlers::health::health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest_service(&config.chart_url_prefix, ServeDir::new(&config.upload_dir))
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(cors_layer(&config.allowed_origins))
        .layer(DefaultBodyLimit::max(config.max_file_size))
        .with_state(state)
}
