use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::services::naming::format_bytes;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Payload too large: limit is {0} bytes")]
    PayloadTooLarge(u64),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Storage(_)
            | AppError::Internal(_)
            | AppError::Io(_)
            | AppError::Request(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller. Low-level IO and HTTP client errors are
    /// logged in full but only summarised in the response.
    pub fn public_message(&self) -> String {
        match self {
            AppError::NotFound(msg) => msg.clone(),
            AppError::MethodNotAllowed => "Method Not Allowed".to_string(),
            AppError::PayloadTooLarge(limit) => {
                format!("file too large. Max size is {}.", format_bytes(*limit))
            }
            AppError::BadRequest(msg) => msg.clone(),
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {}", msg);
                msg.clone()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                msg.clone()
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {:?}", e);
                "IO error".to_string()
            }
            AppError::Request(e) => {
                tracing::error!("Request error: {:?}", e);
                "External request error".to_string()
            }
        }
    }

    /// Build the plain-text response for this error with a leading label,
    /// e.g. `Upload failed: ...`.
    pub fn into_labeled_response(self, label: &str) -> Response {
        let body = format!("{}: {}\n", label, self.public_message());
        plain_text(self.status_code(), body)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = format!("{}\n", self.public_message());
        plain_text(self.status_code(), body)
    }
}

pub fn plain_text(status: StatusCode, body: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

pub type Result<T> = std::result::Result<T, AppError>;
