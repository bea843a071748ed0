//! Browser UI: three columns side by side, served from assets compiled into the binary

use axum::extract::Path;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use rust_embed::Embed;

#[derive(Embed)]
#[folder = "ui/"]
struct WebChatAssets;

/// Serve the compare page
pub async fn index_handler() -> Response {
    match WebChatAssets::get("index.html") {
        Some(content) => Html(content.data.into_owned()).into_response(),
        None => (StatusCode::NOT_FOUND, "Web UI missing from build").into_response(),
    }
}

/// Serve the page's script and stylesheet
pub async fn static_handler(Path(path): Path<String>) -> Response {
    match WebChatAssets::get(&path) {
        Some(content) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            (
                [
                    (header::CONTENT_TYPE, mime.as_ref().to_string()),
                    // Asset names carry no hash, so browsers must revalidate
                    (header::CACHE_CONTROL, "no-cache".to_string()),
                ],
                content.data.into_owned(),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}
