//! Static assets and uploaded media

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use rust_embed::RustEmbed;
use std::path::{Component, PathBuf};
use tokio::fs;

use crate::api::middleware::AppState;

/// Embedded JS, CSS and images
#[derive(RustEmbed)]
#[folder = "static/"]
struct StaticAssets;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/static/{*path}", get(serve_static))
        .route("/media/{*path}", get(serve_media))
}

/// GET /static/{*path}
async fn serve_static(Path(path): Path<String>) -> Response {
    match StaticAssets::get(path.trim_start_matches('/')) {
        Some(content) => build_response(&path, content.data.to_vec(), "public, max-age=3600"),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Relative upload path with no way out of the upload directory
fn media_path(path: &str) -> Option<PathBuf> {
    let relative = PathBuf::from(path.trim_start_matches('/'));
    let safe = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    (safe && relative.components().next().is_some()).then_some(relative)
}

/// GET /media/{*path} - uploads are stored under unique names
async fn serve_media(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let Some(relative) = media_path(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match fs::read(state.media.root().join(relative)).await {
        Ok(contents) => build_response(&path, contents, "public, max-age=31536000, immutable"),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

fn build_response(path: &str, data: Vec<u8>, cache_control: &'static str) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type(path)),
            (header::CACHE_CONTROL, cache_control),
        ],
        Body::from(data),
    )
        .into_response()
}

/// Content type from the file extension
fn content_type(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or("").to_ascii_lowercase().as_str() {
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_path_rejects_traversal() {
        assert_eq!(media_path("reviews/a.png"), Some(PathBuf::from("reviews/a.png")));
        assert_eq!(media_path("/users/avatars/b.jpg"), Some(PathBuf::from("users/avatars/b.jpg")));
        assert_eq!(media_path("../config.yml"), None);
        assert_eq!(media_path("reviews/../../etc/passwd"), None);
        assert_eq!(media_path(""), None);
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type("js/order_form.js"), "application/javascript");
        assert_eq!(content_type("a.JPG"), "image/jpeg");
        assert_eq!(content_type("file"), "application/octet-stream");
    }

    #[test]
    fn test_embedded_assets_present() {
        assert!(StaticAssets::get("js/order_form.js").is_some());
        assert!(StaticAssets::get("js/reviews.js").is_some());
        assert!(StaticAssets::get("css/site.css").is_some());
    }
}
