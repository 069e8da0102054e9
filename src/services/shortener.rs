use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, Result};

/// Turns a canonical URL into a short alias.
#[async_trait]
pub trait UrlShortener: Send + Sync {
    async fn shorten(&self, url: &str) -> Result<String>;
}

/// Used when no shortening service is configured; always fails so the
/// caller keeps the canonical URL.
pub struct DisabledShortener;

#[async_trait]
impl UrlShortener for DisabledShortener {
    async fn shorten(&self, _url: &str) -> Result<String> {
        Err(AppError::BadRequest("URL shortening is disabled".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ShortenResponse {
    #[serde(rename = "Code", default)]
    code: i64,
    #[serde(rename = "ShortUrl", default)]
    short_url: Option<String>,
}

/// Client for a suosuo-style service: form POST of `longUrl=<base64 url>`,
/// answering `{"Code": 1, "ShortUrl": "..."}`.
pub struct HttpShortener {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpShortener {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }

    fn form_body(url: &str) -> String {
        format!("longUrl={}", urlencoding::encode(&STANDARD.encode(url)))
    }
}

#[async_trait]
impl UrlShortener for HttpShortener {
    async fn shorten(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Self::form_body(url))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Internal(format!(
                "Short URL service returned {}",
                status
            )));
        }

        let data: ShortenResponse = resp.json().await?;
        match data.short_url {
            Some(short) if data.code == 1 && !short.is_empty() => Ok(short),
            other => Err(AppError::Internal(format!(
                "Short URL service returned unexpected response: code={} short_url={:?}",
                data.code, other
            ))),
        }
    }
}

/// Shortener selected by the configured service URL; empty disables it.
pub fn from_config(service_url: &str) -> Arc<dyn UrlShortener> {
    let service_url = service_url.trim();
    if service_url.is_empty() {
        tracing::info!("URL shortening disabled");
        Arc::new(DisabledShortener)
    } else {
        Arc::new(HttpShortener::new(service_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_form_body_is_base64_then_urlencoded() {
        // base64("http://h/abc123.txt") = aHR0cDovL2gvYWJjMTIzLnR4dA==
        assert_eq!(
            HttpShortener::form_body("http://h/abc123.txt"),
            "longUrl=aHR0cDovL2gvYWJjMTIzLnR4dA%3D%3D"
        );
    }

    #[tokio::test]
    async fn test_shorten_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/short"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string("longUrl=aHR0cDovL2gvYWJjMTIzLnR4dA%3D%3D"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"Code": 1, "ShortUrl": "https://s/x"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let shortener = HttpShortener::new(format!("{}/short", server.uri()));
        let short = shortener.shorten("http://h/abc123.txt").await.unwrap();
        assert_eq!(short, "https://s/x");
    }

    #[tokio::test]
    async fn test_shorten_rejects_bad_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"Code": 0, "ShortUrl": "https://s/x"})),
            )
            .mount(&server)
            .await;

        let shortener = HttpShortener::new(server.uri());
        assert!(shortener.shorten("http://h/a").await.is_err());
    }

    #[tokio::test]
    async fn test_shorten_rejects_empty_url_and_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/empty"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"Code": 1, "ShortUrl": ""})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let empty = HttpShortener::new(format!("{}/empty", server.uri()));
        assert!(empty.shorten("http://h/a").await.is_err());
        let down = HttpShortener::new(format!("{}/down", server.uri()));
        assert!(down.shorten("http://h/a").await.is_err());
    }

    #[tokio::test]
    async fn test_disabled_from_empty_config() {
        let shortener = from_config("  ");
        assert!(shortener.shorten("http://h/a").await.is_err());
    }
}
