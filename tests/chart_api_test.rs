mod common;

use axum::http::StatusCode;
use common::{SALES_CSV, body_bytes, setup};
use serde_json::json;

const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G'];

#[tokio::test]
async fn test_generate_each_chart_type() {
    let t = setup().await;
    t.upload("sales.csv", SALES_CSV.as_bytes()).await;

    for chart_type in ["bar", "pie", "line"] {
        let (status, body) = t.generate_chart(chart_type, "sales.csv").await;
        assert_eq!(status, StatusCode::OK, "{} failed: {}", chart_type, body);
        assert_eq!(body["status"], "success");

        let chart_filename = format!("{}_chart_sales.png", chart_type);
        assert_eq!(body["chart_filename"], chart_filename.as_str());
        assert_eq!(
            body["chart_url"],
            format!("/static/uploads/{}", chart_filename).as_str()
        );

        let png = std::fs::read(t.upload_path(&chart_filename)).unwrap();
        assert!(png.starts_with(PNG_MAGIC));
    }
}

#[tokio::test]
async fn test_chart_url_is_served() {
    let t = setup().await;
    t.upload("sales.csv", SALES_CSV.as_bytes()).await;
    let (_, body) = t.generate_chart("bar", "sales.csv").await;

    let response = t.get(body["chart_url"].as_str().unwrap()).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert!(body_bytes(response).await.starts_with(PNG_MAGIC));
}

#[tokio::test]
async fn test_generate_chart_requires_fields() {
    let t = setup().await;

    for payload in [
        json!({ "filename": "sales.csv" }),
        json!({ "type": "bar" }),
        json!({ "type": "", "filename": "sales.csv" }),
        json!({ "type": "bar", "filename": null }),
    ] {
        let (status, body) = t.post_json("/generate_chart", payload.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", payload);
        assert_eq!(body["message"], "Chart type and filename are required.");
    }
}

#[tokio::test]
async fn test_generate_chart_for_unknown_file() {
    let t = setup().await;

    let (status, body) = t.generate_chart("bar", "missing.csv").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Uploaded file not found.");

    // File existence is checked before the chart type
    let (status, _) = t.generate_chart("scatter", "missing.csv").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = t.generate_chart("bar", "../reports/x.csv").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_generate_chart_with_invalid_type() {
    let t = setup().await;
    t.upload("sales.csv", SALES_CSV.as_bytes()).await;

    let (status, body) = t.generate_chart("scatter", "sales.csv").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid chart type specified.");
    assert!(!t.upload_path("scatter_chart_sales.png").exists());
}

#[tokio::test]
async fn test_generate_chart_needs_two_columns() {
    let t = setup().await;
    t.upload("single.csv", b"Category\nA\nB\n").await;

    let (status, body) = t.generate_chart("bar", "single.csv").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "The uploaded file must have at least two columns."
    );
}

#[tokio::test]
async fn test_generate_chart_with_unreadable_file() {
    let t = setup().await;
    t.upload("broken.xlsx", b"this is not a workbook").await;

    let (status, body) = t.generate_chart("bar", "broken.xlsx").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .starts_with("Error reading the file:")
    );
}

#[tokio::test]
async fn test_generate_chart_with_missing_column() {
    let t = setup().await;
    t.upload("other.csv", b"Name,Value\na,1\nb,2\n").await;

    let (status, body) = t.generate_chart("pie", "other.csv").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let message = body["message"].as_str().unwrap();
    assert!(message.starts_with("Error generating the chart:"));
    assert!(message.contains("Category"));
}

#[tokio::test]
async fn test_generate_chart_with_non_numeric_values() {
    let t = setup().await;
    t.upload(
        "text.csv",
        b"Category,Sales_Q1,Sales_Q2,Sales_Q3,Sales_Q4\nA,1,2,many,4\n",
    )
    .await;

    let (status, body) = t.generate_chart("line", "text.csv").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["message"].as_str().unwrap().contains("Sales_Q3"));

    // The bar chart only reads Sales_Q1
    let (status, _) = t.generate_chart("bar", "text.csv").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_generate_chart_rejects_malformed_json() {
    let t = setup().await;

    let response = t
        .send(
            axum::http::Request::builder()
                .method("POST")
                .uri("/generate_chart")
                .header("Content-Type", "application/json")
                .body(axum::body::Body::from("{not json"))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(common::body_json(response).await["status"], "error");
}
