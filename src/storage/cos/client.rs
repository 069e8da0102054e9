//! COS client: host resolution, URL building and request authorisation

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, DATE, HOST};
use std::collections::HashMap;
use std::time::Duration;
use urlencoding::encode;

use crate::error::{AppError, Result};
use crate::storage::cos::signer::Signer;

/// Signatures stay valid for two hours so long uploads are not cut off mid-stream.
const SIGNATURE_TTL_SECS: u32 = 7200;

/// COS client
#[derive(Debug, Clone)]
pub struct Client {
    secret_id: String,
    secret_key: String,
    bucket: String,
    region: String,
    endpoint: Option<String>,
    pub(crate) http: reqwest::Client,
}

impl Client {
    /// Create a new COS client
    ///
    /// - secret_id / secret_key: API credentials
    /// - bucket: bucket name including the app id, e.g. `drops-1250000000`
    /// - region: e.g. `ap-guangzhou`
    /// - endpoint: optional base URL replacing the regional COS host
    pub fn new(
        secret_id: impl Into<String>,
        secret_key: impl Into<String>,
        bucket: impl Into<String>,
        region: impl Into<String>,
        endpoint: Option<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
            bucket: bucket.into(),
            region: region.into(),
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
            http,
        }
    }

    /// Host (and port, for custom endpoints) requests are addressed to
    pub fn get_host(&self) -> String {
        if let Some(endpoint) = &self.endpoint {
            if let Ok(url) = reqwest::Url::parse(endpoint) {
                if let Some(host) = url.host_str() {
                    return match url.port() {
                        Some(port) => format!("{}:{}", host, port),
                        None => host.to_string(),
                    };
                }
            }
        }
        format!("{}.cos.{}.myqcloud.com", self.bucket, self.region)
    }

    fn base_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://{}", self.get_host()),
        }
    }

    /// Full URL for an already encoded path
    pub fn get_full_url_from_path(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// URL path for an object key, each segment percent-encoded
    pub fn get_path_from_object_key(&self, key: &str) -> String {
        let encoded: Vec<String> = key
            .trim_start_matches('/')
            .split('/')
            .map(|segment| encode(segment).into_owned())
            .collect();
        format!("/{}", encoded.join("/"))
    }

    /// Host and Date headers every request carries
    pub fn get_common_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, header_value(&self.get_host())?);
        let now_str = Utc::now().format("%a, %d %b %Y %T GMT").to_string();
        headers.insert(DATE, header_value(&now_str)?);
        Ok(headers)
    }

    /// Sign `headers` (or the common headers) and add the Authorization header
    pub fn get_headers_with_auth(
        &self,
        method: &str,
        url_path: &str,
        origin_headers: Option<HeaderMap>,
        query: Option<&HashMap<String, String>>,
    ) -> Result<HeaderMap> {
        let mut headers = match origin_headers {
            Some(headers) => headers,
            None => self.get_common_headers()?,
        };

        let signature = Signer::new(method, url_path, Some(&headers), query).get_signature(
            &self.secret_key,
            &self.secret_id,
            SIGNATURE_TTL_SECS,
        );

        headers.insert(AUTHORIZATION, header_value(&signature)?);
        Ok(headers)
    }
}

pub(crate) fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| AppError::Storage(format!("Invalid header value {:?}: {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = Client::new("test_id", "test_key", "test-bucket", "ap-guangzhou", None);
        assert_eq!(client.get_host(), "test-bucket.cos.ap-guangzhou.myqcloud.com");
        assert_eq!(
            client.get_full_url_from_path("/a.txt"),
            "https://test-bucket.cos.ap-guangzhou.myqcloud.com/a.txt"
        );
    }

    #[test]
    fn test_custom_endpoint() {
        let client = Client::new(
            "id",
            "key",
            "bucket",
            "",
            Some("http://127.0.0.1:9000/".to_string()),
        );
        assert_eq!(client.get_host(), "127.0.0.1:9000");
        assert_eq!(
            client.get_full_url_from_path("/x"),
            "http://127.0.0.1:9000/x"
        );
    }

    #[test]
    fn test_path_generation() {
        let client = Client::new("test_id", "test_key", "test-bucket", "ap-guangzhou", None);
        assert_eq!(client.get_path_from_object_key("test.txt"), "/test.txt");
        assert_eq!(client.get_path_from_object_key("/drops/test.txt"), "/drops/test.txt");
        assert_eq!(client.get_path_from_object_key("a b"), "/a%20b");
    }

    #[test]
    fn test_auth_header_added() {
        let client = Client::new("AKID", "secret", "bucket", "ap-guangzhou", None);
        let headers = client.get_headers_with_auth("get", "/", None, None).unwrap();
        let auth = headers.get(AUTHORIZATION).unwrap().to_str().unwrap();
        assert!(auth.contains("q-ak=AKID"));
        assert!(auth.contains("q-header-list=date;host"));
    }
}
