//! Files from the public directory. A handful of login assets are served without a
//! credential; everything else goes through the gateway via the router fallback.

use std::path::{Component, Path};

use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tracing::{debug, error};

use super::AppState;

fn content_type(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or("") {
        "html" => "text/html; charset=utf-8",
        "js" => "text/javascript; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "ico" => "image/x-icon",
        "webmanifest" => "application/manifest+json",
        _ => "application/octet-stream",
    }
}

/// Relative paths only, no `..` or root components.
fn is_safe_relative(rel: &str) -> bool {
    !rel.is_empty() && Path::new(rel).components().all(|c| matches!(c, Component::Normal(_)))
}

pub async fn serve(root: &Path, rel: &str) -> Response {
    if !is_safe_relative(rel) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let full = root.join(rel);
    match tokio::fs::read(&full).await {
        Ok(bytes) => {
            let mut resp = bytes.into_response();
            resp.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type(rel)));
            resp
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = ?full, "static file not found");
            StatusCode::NOT_FOUND.into_response()
        }
        Err(e) => {
            error!(path = ?full, error = %e, "static file read failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn index_page(State(state): State<AppState>) -> Response { serve(&state.config.public_dir, "index.html").await }

pub async fn login_js(State(state): State<AppState>) -> Response { serve(&state.config.public_dir, "login.js").await }

pub async fn styles_css(State(state): State<AppState>) -> Response { serve(&state.config.public_dir.join("assets"), "styles.css").await }

pub async fn favicon_svg(State(state): State<AppState>) -> Response { serve(&state.config.public_dir.join("assets"), "favicon.svg").await }

pub async fn manifest_json(State(state): State<AppState>) -> Response { serve(&state.config.public_dir.join("assets"), "manifest.json").await }

pub async fn asset_manifest_json(State(state): State<AppState>) -> Response {
    serve(&state.config.public_dir.join("assets"), "asset-manifest.json").await
}

/// Fallback for any other path: a file under the public directory.
pub async fn public_file(State(state): State<AppState>, uri: Uri) -> Response {
    let rel = uri.path().trim_start_matches('/');
    let rel = urlencoding::decode(rel).map(|c| c.into_owned()).unwrap_or_else(|_| rel.to_string());
    serve(&state.config.public_dir, &rel).await
}
