use chrono::Utc;

use crate::error::{AppError, Result};
use crate::models::{ByteStream, ObjectMetadata, PutOptions};
use crate::services::naming::NamingService;
use crate::storage::StorageProvider;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// What the client declared about an upload
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

pub struct UploadService;

impl UploadService {
    /// Store `body` as a new one-time file and return its metadata.
    ///
    /// A declared length over `max_upload_size` is refused before the store is
    /// touched; undeclared or understated bodies are cut off by the store.
    pub async fn upload(
        store: &dyn StorageProvider,
        body: ByteStream,
        request: UploadRequest,
        max_upload_size: u64,
    ) -> Result<ObjectMetadata> {
        if let Some(len) = request.content_length {
            if len > max_upload_size {
                tracing::warn!(
                    "Rejected upload of {} bytes, limit is {}",
                    len,
                    max_upload_size
                );
                return Err(AppError::PayloadTooLarge(max_upload_size));
            }
        }

        let content_type = request
            .content_type
            .as_deref()
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);

        let key = NamingService::allocate_key(store, content_type).await?;

        let mut options = PutOptions::one_time(content_type, Utc::now());
        options.content_length = request.content_length;
        options.size_limit = Some(max_upload_size);

        let metadata = store.put(&key, body, options).await?;
        tracing::info!(
            "Stored {} ({} bytes, {}) on {}",
            key,
            metadata.size,
            content_type,
            store.storage_type()
        );
        Ok(metadata)
    }
}
