use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE,
};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::error::ServerResult;
use crate::router::AppState;

const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

/// Health check handler.
pub async fn health_handler() -> &'static str {
    "OK"
}

/// Plain-text status page.
pub async fn status_handler(State(state): State<AppState>) -> String {
    let providers = state.engine.provider_names().join(", ");
    format!(
        "picsbot is alive!\n\nproviders: {providers}\ncached images: {}\nstarted: {}\n",
        state.cache.len(),
        state.started_at.to_rfc3339(),
    )
}

pub async fn image_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Response> {
    let bytes = state.cache.get(&id)?;
    let headers = image_headers(&state, bytes.len());
    Ok((headers, Body::from(bytes)).into_response())
}

pub async fn image_head_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Response> {
    let bytes: Bytes = state.cache.get(&id)?;
    let headers = image_headers(&state, bytes.len());
    Ok((headers, Body::empty()).into_response())
}

fn image_headers(state: &AppState, length: usize) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(IMAGE_CONTENT_TYPE));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    let max_age = state.cache.retention().as_secs();
    if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={max_age}")) {
        headers.insert(CACHE_CONTROL, value);
    }
    headers
}
