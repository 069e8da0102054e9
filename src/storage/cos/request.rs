//! Response and error handling shared by the COS calls

use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use std::fmt::Display;

use crate::error::{AppError, Result};

/// Failure class of a COS call
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ErrNo {
    /// HTTP status outside 2xx
    Status,
    /// Body could not be decoded
    Decode,
    /// Connection could not be established
    Connect,
    /// Request timed out
    Timeout,
    /// Anything else reqwest reports
    Other,
}

impl Display for ErrNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<&reqwest::Error> for ErrNo {
    fn from(value: &reqwest::Error) -> Self {
        if value.is_status() {
            ErrNo::Status
        } else if value.is_connect() {
            ErrNo::Connect
        } else if value.is_timeout() {
            ErrNo::Timeout
        } else if value.is_decode() {
            ErrNo::Decode
        } else {
            ErrNo::Other
        }
    }
}

/// Error document COS returns with 4xx/5xx
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CosErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Send a request, mapping transport failures to a storage error.
pub async fn send(req: RequestBuilder, action: &str) -> Result<reqwest::Response> {
    req.send().await.map_err(|e| {
        AppError::Storage(format!("COS {} failed: [{}] {}", action, ErrNo::from(&e), e))
    })
}

/// Turn a non-2xx response into a storage error carrying the COS error code.
pub async fn check_status(resp: reqwest::Response, action: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    Err(AppError::Storage(status_message(action, status, &body)))
}

fn status_message(action: &str, status: StatusCode, body: &str) -> String {
    match quick_xml::de::from_str::<CosErrorBody>(body) {
        Ok(err) if !err.code.is_empty() => format!(
            "COS {} failed: [{}] {} {}",
            action,
            ErrNo::Status,
            err.code,
            err.message
        )
        .trim_end()
        .to_string(),
        _ => format!("COS {} failed: [{}] {}", action, ErrNo::Status, status),
    }
}
