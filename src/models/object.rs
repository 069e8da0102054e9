use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::BoxStream;
use std::collections::HashMap;

/// Custom metadata key marking a file as single-download.
pub const META_ONE_TIME: &str = "one-time";
/// Custom metadata key holding the RFC 3339 upload timestamp.
pub const META_UPLOAD_TIME: &str = "upload-time";

/// Streamed object content.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Metadata the store keeps next to every object
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    /// Creation time as recorded by the store itself.
    pub uploaded: DateTime<Utc>,
    pub etag: Option<String>,
    pub custom: HashMap<String, String>,
}

impl ObjectMetadata {
    /// Upload time from custom metadata, falling back to the store timestamp
    /// when the field is missing or unparseable.
    pub fn upload_time(&self) -> DateTime<Utc> {
        self.custom
            .get(META_UPLOAD_TIME)
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(self.uploaded)
    }

    /// Whole seconds elapsed since upload, rounded down.
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.upload_time())
            .num_milliseconds()
            .div_euclid(1000)
    }

    pub fn is_one_time(&self) -> bool {
        self.custom.get(META_ONE_TIME).map(String::as_str) == Some("true")
    }
}

/// An object opened for reading
pub struct StoredObject {
    pub metadata: ObjectMetadata,
    pub body: ByteStream,
}

/// Options for a single put
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub content_type: String,
    pub custom_metadata: HashMap<String, String>,
    /// Declared length, forwarded to stores that want it up front.
    pub content_length: Option<u64>,
    /// Hard ceiling enforced while streaming.
    pub size_limit: Option<u64>,
}

impl PutOptions {
    /// Options for a freshly uploaded one-time file.
    pub fn one_time(content_type: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut custom_metadata = HashMap::new();
        custom_metadata.insert(META_ONE_TIME.to_string(), "true".to_string());
        custom_metadata.insert(
            META_UPLOAD_TIME.to_string(),
            now.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        Self {
            content_type: content_type.into(),
            custom_metadata,
            content_length: None,
            size_limit: None,
        }
    }
}

/// Cursor-based listing request
#[derive(Debug, Clone)]
pub struct ListOptions {
    pub limit: usize,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListedObject {
    pub key: String,
    pub size: u64,
    pub uploaded: DateTime<Utc>,
}

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ListedObject>,
    pub truncated: bool,
    /// Pass back as `ListOptions::cursor` to get the next page.
    pub cursor: Option<String>,
}
