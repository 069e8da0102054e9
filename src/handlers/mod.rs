pub mod download;
pub mod index;
pub mod upload;

use axum::http::{header, HeaderMap};

use crate::config::ServerConfig;

/// `scheme://host` that result URLs are built on: the configured public URL,
/// else `X-Forwarded-Proto` (default `http`) plus the request's Host header.
pub fn base_url(server: &ServerConfig, headers: &HeaderMap) -> String {
    if let Some(public_url) = server.public_url.as_deref().filter(|u| !u.is_empty()) {
        return public_url.trim_end_matches('/').to_string();
    }

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    format!("{}://{}", scheme, host)
}
