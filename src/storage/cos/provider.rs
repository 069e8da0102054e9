//! COS storage provider
//! Implements StorageProvider on top of the COS client

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::io;

use crate::error::{AppError, Result};
use crate::models::{
    ByteStream, CosStorageConfig, ListOptions, ListPage, ListedObject, ObjectMetadata, PutOptions,
    StoredObject,
};
use crate::storage::{limit_stream, StorageProvider};

use super::client::Client;
use super::objects::metadata_from_headers;

/// COS caps a single listing at 1000 keys
const MAX_LIST_KEYS: usize = 1000;

/// Tencent Cloud COS storage provider
pub struct CosStorage {
    config: CosStorageConfig,
    client: Client,
}

impl CosStorage {
    pub fn new(config: CosStorageConfig) -> Self {
        let client = Client::new(
            &config.secret_id,
            &config.secret_key,
            &config.bucket,
            &config.region,
            config.endpoint.clone(),
        );
        Self { config, client }
    }

    fn prefix(&self) -> Option<String> {
        let base = self.config.base_path.trim_matches('/');
        if base.is_empty() {
            None
        } else {
            Some(format!("{}/", base))
        }
    }

    /// Get the full object key with base path
    fn get_object_key(&self, key: &str) -> String {
        let clean = key.trim_start_matches('/');
        match self.prefix() {
            Some(prefix) => format!("{}{}", prefix, clean),
            None => clean.to_string(),
        }
    }

    /// Inverse of `get_object_key`
    fn strip_object_key<'a>(&self, object_key: &'a str) -> &'a str {
        match self.prefix() {
            Some(prefix) => object_key.strip_prefix(prefix.as_str()).unwrap_or(object_key),
            None => object_key,
        }
    }
}

#[async_trait]
impl StorageProvider for CosStorage {
    async fn put(&self, key: &str, body: ByteStream, options: PutOptions) -> Result<ObjectMetadata> {
        let object_key = self.get_object_key(key);
        let (body, trip) = limit_stream(body, options.size_limit);

        // A declared length beyond the limit would be rejected mid-stream anyway
        if let (Some(len), Some(limit)) = (options.content_length, options.size_limit) {
            if len > limit {
                return Err(AppError::PayloadTooLarge(limit));
            }
        }

        let res = self
            .client
            .put_object_stream(
                &object_key,
                body,
                &options.content_type,
                options.content_length,
                &options.custom_metadata,
            )
            .await;

        let headers = match res {
            Ok(headers) => headers,
            Err(e) => {
                if let Some(limit) = options.size_limit.filter(|_| trip.tripped()) {
                    tracing::warn!("COS upload of {} aborted: over {} bytes", object_key, limit);
                    return Err(AppError::PayloadTooLarge(limit));
                }
                return Err(e);
            }
        };

        tracing::info!("Successfully uploaded to COS: {}", object_key);
        let mut metadata = metadata_from_headers(key, &headers);
        metadata.content_type = Some(options.content_type);
        metadata.custom = options.custom_metadata;
        metadata.uploaded = Utc::now();
        if let Some(len) = options.content_length {
            metadata.size = len;
        }
        Ok(metadata)
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>> {
        let object_key = self.get_object_key(key);
        let Some(resp) = self.client.get_object_stream(&object_key).await? else {
            return Ok(None);
        };

        let metadata = metadata_from_headers(key, resp.headers());
        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(io::Error::other))
            .boxed();
        Ok(Some(StoredObject { metadata, body }))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMetadata>> {
        let object_key = self.get_object_key(key);
        Ok(self
            .client
            .head_object(&object_key)
            .await?
            .map(|headers| metadata_from_headers(key, &headers)))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let object_key = self.get_object_key(key);
        self.client.delete_object(&object_key).await?;
        tracing::debug!("Deleted COS object {}", object_key);
        Ok(())
    }

    async fn list(&self, options: ListOptions) -> Result<ListPage> {
        let prefix = self.prefix();
        let marker = options.cursor.as_deref().map(|c| self.get_object_key(c));
        let max_keys = options.limit.clamp(1, MAX_LIST_KEYS);

        let result = self
            .client
            .list_objects(prefix.as_deref(), marker.as_deref(), max_keys)
            .await?;

        let objects: Vec<ListedObject> = result
            .contents
            .into_iter()
            .map(|entry| ListedObject {
                key: self.strip_object_key(&entry.key).to_string(),
                size: entry.size,
                uploaded: DateTime::parse_from_rfc3339(&entry.last_modified)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
            .collect();

        // COS only sends NextMarker when a delimiter is set; fall back to the last key
        let cursor = if result.is_truncated {
            result
                .next_marker
                .filter(|m| !m.is_empty())
                .map(|m| self.strip_object_key(&m).to_string())
                .or_else(|| objects.last().map(|o| o.key.clone()))
        } else {
            None
        };

        Ok(ListPage {
            objects,
            truncated: result.is_truncated,
            cursor,
        })
    }

    fn storage_type(&self) -> &'static str {
        "cos"
    }
}
