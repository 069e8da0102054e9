//! COS object operations: streaming upload/download, head, delete and listing

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use reqwest::{Body, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::{AppError, Result};
use crate::models::{ByteStream, ObjectMetadata};
use crate::storage::cos::client::{header_value, Client};
use crate::storage::cos::request::{check_status, send};

/// Prefix COS uses for user metadata headers
pub const META_HEADER_PREFIX: &str = "x-cos-meta-";

/// Result of GET Bucket (list objects)
/// Reference: https://cloud.tencent.com/document/product/436/7734
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListBucketResult {
    #[serde(default)]
    pub is_truncated: bool,
    #[serde(default)]
    pub next_marker: Option<String>,
    #[serde(default)]
    pub contents: Vec<ListEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListEntry {
    pub key: String,
    #[serde(default)]
    pub last_modified: String,
    #[serde(default)]
    pub size: u64,
}

impl Client {
    /// Upload a stream as one object.
    /// Reference: https://cloud.tencent.com/document/product/436/7749
    pub async fn put_object_stream(
        &self,
        key: &str,
        body: ByteStream,
        content_type: &str,
        content_length: Option<u64>,
        custom_metadata: &HashMap<String, String>,
    ) -> Result<HeaderMap> {
        let mut headers = self.get_common_headers()?;
        headers.insert(CONTENT_TYPE, header_value(content_type)?);
        if let Some(len) = content_length {
            headers.insert(CONTENT_LENGTH, len.into());
        }
        for (name, value) in custom_metadata {
            let header = HeaderName::try_from(format!("{}{}", META_HEADER_PREFIX, name))
                .map_err(|e| AppError::Storage(format!("Invalid metadata key {:?}: {}", name, e)))?;
            headers.insert(header, header_value(value)?);
        }

        let url_path = self.get_path_from_object_key(key);
        let headers = self.get_headers_with_auth("put", &url_path, Some(headers), None)?;

        let req = self
            .http
            .put(self.get_full_url_from_path(&url_path))
            .headers(headers)
            .body(Body::wrap_stream(body));
        let resp = check_status(send(req, "upload").await?, "upload").await?;
        Ok(resp.headers().clone())
    }

    /// Open an object for streaming; `None` when it does not exist.
    /// Reference: https://cloud.tencent.com/document/product/436/7753
    pub async fn get_object_stream(&self, key: &str) -> Result<Option<reqwest::Response>> {
        let url_path = self.get_path_from_object_key(key);
        let headers = self.get_headers_with_auth("get", &url_path, None, None)?;

        let req = self
            .http
            .get(self.get_full_url_from_path(&url_path))
            .headers(headers);
        let resp = send(req, "download").await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status(resp, "download").await.map(Some)
    }

    /// Fetch object headers; `None` when it does not exist.
    /// Reference: https://cloud.tencent.com/document/product/436/7745
    pub async fn head_object(&self, key: &str) -> Result<Option<HeaderMap>> {
        let url_path = self.get_path_from_object_key(key);
        let headers = self.get_headers_with_auth("head", &url_path, None, None)?;

        let req = self
            .http
            .head(self.get_full_url_from_path(&url_path))
            .headers(headers);
        let resp = send(req, "head").await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check_status(resp, "head").await?;
        Ok(Some(resp.headers().clone()))
    }

    /// Delete an object. Missing objects are not an error.
    /// Reference: https://cloud.tencent.com/document/product/436/7743
    pub async fn delete_object(&self, key: &str) -> Result<()> {
        let url_path = self.get_path_from_object_key(key);
        let headers = self.get_headers_with_auth("delete", &url_path, None, None)?;

        let req = self
            .http
            .delete(self.get_full_url_from_path(&url_path))
            .headers(headers);
        let resp = send(req, "delete").await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(resp, "delete").await?;
        Ok(())
    }

    /// List up to `max_keys` objects under `prefix` whose key sorts after `marker`.
    pub async fn list_objects(
        &self,
        prefix: Option<&str>,
        marker: Option<&str>,
        max_keys: usize,
    ) -> Result<ListBucketResult> {
        let mut query = HashMap::new();
        if let Some(prefix) = prefix {
            query.insert("prefix".to_string(), prefix.to_string());
        }
        if let Some(marker) = marker {
            query.insert("marker".to_string(), marker.to_string());
        }
        query.insert("max-keys".to_string(), max_keys.to_string());

        let url_path = "/";
        let headers = self.get_headers_with_auth("get", url_path, None, Some(&query))?;

        let req = self
            .http
            .get(self.get_full_url_from_path(url_path))
            .query(&query)
            .headers(headers);
        let resp = check_status(send(req, "list").await?, "list").await?;
        let body = resp
            .text()
            .await
            .map_err(|e| AppError::Storage(format!("COS list failed: {}", e)))?;

        quick_xml::de::from_str(&body)
            .map_err(|e| AppError::Storage(format!("COS list returned malformed XML: {}", e)))
    }
}

/// Build object metadata from HEAD/GET response headers.
pub fn metadata_from_headers(key: &str, headers: &HeaderMap) -> ObjectMetadata {
    let text = |name: &HeaderName| headers.get(name).and_then(|v| v.to_str().ok());

    let custom = headers
        .iter()
        .filter_map(|(name, value)| {
            let field = name.as_str().strip_prefix(META_HEADER_PREFIX)?;
            Some((field.to_string(), value.to_str().ok()?.to_string()))
        })
        .collect();

    ObjectMetadata {
        key: key.to_string(),
        size: text(&CONTENT_LENGTH)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        content_type: text(&CONTENT_TYPE).map(str::to_string),
        uploaded: text(&LAST_MODIFIED)
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now),
        etag: text(&ETAG).map(str::to_string),
        custom,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_decode_list_result() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult>
    <Name>drops-1250000000</Name>
    <Prefix>drops/</Prefix>
    <Marker/>
    <MaxKeys>2</MaxKeys>
    <IsTruncated>true</IsTruncated>
    <NextMarker>drops/b00000.txt</NextMarker>
    <Contents>
        <Key>drops/a00000.txt</Key>
        <LastModified>2024-05-01T10:00:00.000Z</LastModified>
        <ETag>"abc"</ETag>
        <Size>10</Size>
        <StorageClass>STANDARD</StorageClass>
    </Contents>
    <Contents>
        <Key>drops/b00000.txt</Key>
        <LastModified>2024-05-01T11:00:00.000Z</LastModified>
        <ETag>"def"</ETag>
        <Size>20</Size>
        <StorageClass>STANDARD</StorageClass>
    </Contents>
</ListBucketResult>"#;

        let result: ListBucketResult = quick_xml::de::from_str(xml).unwrap();
        assert!(result.is_truncated);
        assert_eq!(result.next_marker.as_deref(), Some("drops/b00000.txt"));
        assert_eq!(result.contents.len(), 2);
        assert_eq!(result.contents[1].size, 20);
    }

    #[test]
    fn test_decode_empty_list_result() {
        let xml = r#"<ListBucketResult><Name>b</Name><IsTruncated>false</IsTruncated></ListBucketResult>"#;
        let result: ListBucketResult = quick_xml::de::from_str(xml).unwrap();
        assert!(!result.is_truncated);
        assert!(result.contents.is_empty());
    }

    #[test]
    fn test_metadata_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("10"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.insert(
            LAST_MODIFIED,
            HeaderValue::from_static("Wed, 01 May 2024 10:00:00 GMT"),
        );
        headers.insert(ETAG, HeaderValue::from_static("\"abc\""));
        headers.insert("x-cos-meta-one-time", HeaderValue::from_static("true"));
        headers.insert(
            "x-cos-meta-upload-time",
            HeaderValue::from_static("2024-05-01T10:00:00.000Z"),
        );

        let meta = metadata_from_headers("abc123.txt", &headers);
        assert_eq!(meta.size, 10);
        assert_eq!(meta.content_type.as_deref(), Some("text/plain"));
        assert_eq!(meta.uploaded.to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert!(meta.is_one_time());
        assert_eq!(meta.custom.len(), 2);
    }
}
