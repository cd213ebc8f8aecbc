use axum::response::Html;

const INDEX_HTML: &str = include_str!("../../../assets/index.html");

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Upload and chart page", content_type = "text/html")
    ),
    tag = "ui"
)]
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}
