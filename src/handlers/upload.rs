use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderName, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use futures::{StreamExt, TryStreamExt};
use std::io;

use crate::handlers::base_url;
use crate::services::{UploadRequest, UploadService};
use crate::AppState;

const X_ONE_TIME_UPLOAD: HeaderName = HeaderName::from_static("x-one-time-upload");

/// Accept a raw request body as a one-time file (`curl -T`)
/// PUT /, PUT /:name, PUT /:name/*rest; `/short` prefixes ask for a short link
pub async fn upload_file(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let wants_short = is_short_path(uri.path());
    let request = UploadRequest {
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        content_length: headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok()),
    };

    let stream = body.into_data_stream().map_err(io::Error::other).boxed();
    let metadata = match UploadService::upload(
        state.storage.as_ref(),
        stream,
        request,
        state.config.upload.max_upload_size,
    )
    .await
    {
        Ok(metadata) => metadata,
        Err(e) => return e.into_labeled_response("Upload failed"),
    };

    let canonical = format!("{}/{}", base_url(&state.config.server, &headers), metadata.key);
    let url = if wants_short {
        match state.shortener.shorten(&canonical).await {
            Ok(short) => {
                tracing::info!("Generated short URL: {} for original: {}", short, canonical);
                short
            }
            Err(e) => {
                tracing::warn!(
                    "Short URL was requested but generation failed, falling back to {}: {}",
                    canonical,
                    e
                );
                canonical
            }
        }
    } else {
        canonical
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (X_ONE_TIME_UPLOAD, "true"),
        ],
        upload_message(&url),
    )
        .into_response()
}

fn is_short_path(path: &str) -> bool {
    path == "/short" || path.starts_with("/short/")
}

pub fn upload_message(url: &str) -> String {
    format!(
        "\n\n{}\n\n⚠️  Note: This file can only be downloaded once!\n",
        url
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_path_detection() {
        assert!(is_short_path("/short"));
        assert!(is_short_path("/short/notes.txt"));
        assert!(!is_short_path("/shortcut"));
        assert!(!is_short_path("/"));
        assert!(!is_short_path("/file/short"));
    }

    #[test]
    fn test_upload_message_layout() {
        assert_eq!(
            upload_message("http://h/abc123.txt"),
            "\n\nhttp://h/abc123.txt\n\n⚠️  Note: This file can only be downloaded once!\n"
        );
    }
}
