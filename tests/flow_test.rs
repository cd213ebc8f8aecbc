mod common;

use axum::http::{Request, StatusCode};
use common::{SALES_CSV, body_bytes, body_json, setup};
use serde_json::json;

#[tokio::test]
async fn test_upload_chart_report_download_flow() {
    let t = setup().await;

    let (status, upload) = t.upload("sales.csv", SALES_CSV.as_bytes()).await;
    assert_eq!(status, StatusCode::OK);
    let filename = upload["filename"].as_str().unwrap().to_string();

    let mut chart_urls = Vec::new();
    for chart_type in ["bar", "pie"] {
        let (status, chart) = t.generate_chart(chart_type, &filename).await;
        assert_eq!(status, StatusCode::OK);
        chart_urls.push(chart["chart_url"].clone());
    }

    let (status, report) = t
        .post_json(
            "/generate_report",
            json!({ "filename": filename, "charts": chart_urls }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let response = t.get(report["report_url"].as_str().unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let pdf = body_bytes(response).await;
    assert!(pdf.starts_with(b"%PDF"));
    assert!(pdf.len() > 1000);
}

#[tokio::test]
async fn test_index_page() {
    let t = setup().await;

    let response = t.get("/").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );
    let html = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(html.contains("/generate_chart"));
    assert!(html.contains("/upload"));
}

#[tokio::test]
async fn test_health_check() {
    let t = setup().await;

    let response = t.get("/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["uploads_dir"], "available");
    assert_eq!(body["reports_dir"], "available");
}

#[tokio::test]
async fn test_openapi_document() {
    let t = setup().await;

    let response = t.get("/api-docs/openapi.json").await;

    assert_eq!(response.status(), StatusCode::OK);
    let doc = body_json(response).await;
    for path in [
        "/upload",
        "/generate_chart",
        "/generate_report",
        "/download_report/{filename}",
        "/clear",
    ] {
        assert!(doc["paths"].get(path).is_some(), "missing {}", path);
    }
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let t = setup().await;

    let response = t
        .send(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "trace-123")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.headers()["x-request-id"], "trace-123");

    let response = t.get("/health").await;
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_xlsx_upload_renders_chart() {
    let t = setup().await;

    let (status, _) = t.upload("sales.xlsx", &sales_xlsx()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = t.generate_chart("bar", "sales.xlsx").await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["chart_filename"], "bar_chart_sales.png");
}

/// Minimal workbook with a shared-strings header row and numeric data rows
fn sales_xlsx() -> Vec<u8> {
    use std::io::Write;
    use zip::write::FileOptions;

    let shared = r#"<?xml version="1.0" encoding="UTF-8"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="3" uniqueCount="3">
<si><t>Category</t></si><si><t>Sales_Q1</t></si><si><t>Electronics</t></si>
</sst>"#;
    let sheet = r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>
<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
<row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2"><v>150</v></c></row>
<row r="3"><c r="A3" t="inlineStr"><is><t>Clothing</t></is></c><c r="B3"><v>90</v></c></row>
</sheetData></worksheet>"#;
    let workbook = r#"<?xml version="1.0" encoding="UTF-8"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#;
    let rels = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#;

    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, content) in [
        ("xl/workbook.xml", workbook),
        ("xl/_rels/workbook.xml.rels", rels),
        ("xl/sharedStrings.xml", shared),
        ("xl/worksheets/sheet1.xml", sheet),
    ] {
        zip.start_file(name, FileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}
