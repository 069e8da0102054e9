use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};

use crate::handlers::index::{file_not_found, public_asset};
use crate::models::ObjectMetadata;
use crate::services::naming::is_valid_key;
use crate::services::upload::DEFAULT_CONTENT_TYPE;
use crate::services::OneTimeBody;
use crate::AppState;

const X_ONE_TIME_DOWNLOAD: HeaderName = HeaderName::from_static("x-one-time-download");

/// Stream a file once; its deletion is scheduled when the body is done.
/// GET /:key
pub async fn download_file(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    if let Some(asset) = public_asset(&state.config.server, &key).await {
        return asset;
    }
    if !is_valid_key(&key) {
        return file_not_found();
    }

    let object = match state.storage.get(&key).await {
        Ok(Some(object)) => object,
        Ok(None) => return file_not_found(),
        Err(e) => return e.into_labeled_response("Error"),
    };

    tracing::info!("[one-time download] Serving {} ({} bytes)", key, object.metadata.size);
    let headers = download_headers(&object.metadata);
    let body = OneTimeBody::new(object.body, key, state.deletions.clone());
    (headers, Body::from_stream(body)).into_response()
}

/// Same headers as a download, without consuming the file.
/// HEAD /:key
pub async fn head_file(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    if let Some(asset) = public_asset(&state.config.server, &key).await {
        return asset;
    }
    if !is_valid_key(&key) {
        return file_not_found();
    }

    match state.storage.head(&key).await {
        Ok(Some(metadata)) => (download_headers(&metadata), Body::empty()).into_response(),
        Ok(None) => file_not_found(),
        Err(e) => e.into_labeled_response("Error"),
    }
}

fn download_headers(metadata: &ObjectMetadata) -> HeaderMap {
    let content_type = metadata
        .content_type
        .as_deref()
        .filter(|ct| !ct.is_empty())
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .or_else(|| {
            mime_guess::from_path(&metadata.key)
                .first_raw()
                .map(HeaderValue::from_static)
        })
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.size));
    if let Some(etag) = metadata
        .etag
        .as_deref()
        .and_then(|e| HeaderValue::from_str(e).ok())
    {
        headers.insert(header::ETAG, etag);
    }
    headers.insert(X_ONE_TIME_DOWNLOAD, HeaderValue::from_static("true"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    headers
}
