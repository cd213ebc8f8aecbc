#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode},
};
use chart_report_backend::config::AppConfig;
use chart_report_backend::infrastructure::storage::setup_storage;
use chart_report_backend::services::render::ChartRenderer;
use chart_report_backend::services::storage::{LocalStorageService, StorageService};
use chart_report_backend::{AppState, create_app};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

pub const SALES_CSV: &str = "Category,Sales_Q1,Sales_Q2,Sales_Q3,Sales_Q4\n\
    Electronics,150,200,180,220\n\
    Clothing,90,110,95,130\n\
    Groceries,300,280,310,295.5\n";

const BOUNDARY: &str = "---------------------------chartreportboundary";

pub struct TestApp {
    pub dir: TempDir,
    pub app: Router,
    pub config: AppConfig,
}

pub async fn setup() -> TestApp {
    setup_with(|_| {}).await
}

/// Builds the router over a fresh temp directory; `adjust` tweaks the config first
pub async fn setup_with(adjust: impl FnOnce(&mut AppConfig)) -> TestApp {
    build(adjust, |local| local as Arc<dyn StorageService>).await
}

/// Builds the router with the local storage backend wrapped by `wrap`
pub async fn setup_with_storage(
    wrap: impl FnOnce(Arc<LocalStorageService>) -> Arc<dyn StorageService>,
) -> TestApp {
    build(|_| {}, wrap).await
}

async fn build(
    adjust: impl FnOnce(&mut AppConfig),
    wrap: impl FnOnce(Arc<LocalStorageService>) -> Arc<dyn StorageService>,
) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::development(dir.path());
    adjust(&mut config);

    let storage = wrap(setup_storage(&config).await.unwrap());
    let renderer = ChartRenderer::new(config.chart_width, config.chart_height, false);
    let state = AppState::new(storage, config.clone(), renderer);

    TestApp {
        dir,
        app: create_app(state),
        config,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("Content-Type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await;
        let status = response.status();
        (status, body_json(response).await)
    }

    pub async fn post_empty(&self, uri: &str) -> (StatusCode, Value) {
        let response = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        let status = response.status();
        (status, body_json(response).await)
    }

    /// Posts a single multipart field named `field` carrying `filename`
    pub async fn upload_field(
        &self,
        field: &str,
        filename: &str,
        content: &[u8],
    ) -> (StatusCode, Value) {
        let mut body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        self.post_multipart(body).await
    }

    /// Posts a plain (non-file) form field
    pub async fn upload_text_field(&self, field: &str, value: &str) -> (StatusCode, Value) {
        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"{field}\"\r\n\r\n\
             {value}\r\n--{BOUNDARY}--\r\n"
        );
        self.post_multipart(body.into_bytes()).await
    }

    async fn post_multipart(&self, body: Vec<u8>) -> (StatusCode, Value) {
        let response = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/upload")
                    .header(
                        "Content-Type",
                        format!("multipart/form-data; boundary={}", BOUNDARY),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await;
        let status = response.status();
        (status, body_json(response).await)
    }

    pub async fn upload(&self, filename: &str, content: &[u8]) -> (StatusCode, Value) {
        self.upload_field("file", filename, content).await
    }

    pub async fn generate_chart(&self, chart_type: &str, filename: &str) -> (StatusCode, Value) {
        self.post_json(
            "/generate_chart",
            serde_json::json!({ "type": chart_type, "filename": filename }),
        )
        .await
    }

    pub fn upload_path(&self, name: &str) -> std::path::PathBuf {
        self.config.upload_dir.join(name)
    }

    pub fn report_path(&self, name: &str) -> std::path::PathBuf {
        self.config.report_dir.join(name)
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

pub fn file_count(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter(|e| e.as_ref().unwrap().file_type().unwrap().is_file())
        .count()
}
