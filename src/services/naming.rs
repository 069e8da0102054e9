use rand::Rng;

use crate::error::{AppError, Result};
use crate::storage::StorageProvider;

const KEY_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const KEY_LEN: usize = 6;
const MAX_KEY_ATTEMPTS: usize = 10;

/// Extensions for types whose `mime_guess` listing does not lead with the usual one.
const PREFERRED_EXTENSIONS: &[(&str, &str)] = &[
    ("text/plain", "txt"),
    ("application/octet-stream", "bin"),
    ("text/html", "html"),
    ("text/css", "css"),
    ("text/javascript", "js"),
    ("application/javascript", "js"),
    ("application/json", "json"),
    ("text/markdown", "md"),
    ("text/csv", "csv"),
    ("application/xml", "xml"),
    ("text/xml", "xml"),
    ("image/jpeg", "jpeg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/svg+xml", "svg"),
    ("application/pdf", "pdf"),
    ("application/zip", "zip"),
    ("application/gzip", "gz"),
    ("application/x-tar", "tar"),
    ("audio/mpeg", "mp3"),
    ("video/mp4", "mp4"),
];

pub struct NamingService;

impl NamingService {
    /// Pick a fresh key for an upload of `content_type`.
    ///
    /// Candidates are probed with `head`; the probe is not atomic with the
    /// following write, so two uploads racing on the same candidate can still
    /// collide. With 36^6 ids that window is accepted.
    pub async fn allocate_key(store: &dyn StorageProvider, content_type: &str) -> Result<String> {
        let extension = derive_extension(content_type);
        for _ in 0..MAX_KEY_ATTEMPTS {
            let candidate = with_extension(generate_key(), &extension);
            if !store.exists(&candidate).await? {
                return Ok(candidate);
            }
            tracing::debug!("Key {} already taken, retrying", candidate);
        }

        Err(AppError::Internal(format!(
            "Failed to generate unique file key after {} attempts",
            MAX_KEY_ATTEMPTS
        )))
    }
}

/// Random id of six characters from `[a-z0-9]`.
pub fn generate_key() -> String {
    let mut rng = rand::thread_rng();
    (0..KEY_LEN)
        .map(|_| KEY_CHARSET[rng.gen_range(0..KEY_CHARSET.len())] as char)
        .collect()
}

fn with_extension(id: String, extension: &str) -> String {
    if extension.is_empty() {
        id
    } else {
        format!("{}.{}", id, extension)
    }
}

/// Canonical extension for a MIME type, empty when unknown.
/// Parameters such as `; charset=utf-8` are ignored.
pub fn derive_extension(content_type: &str) -> String {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if essence.is_empty() {
        return String::new();
    }

    if let Some((_, ext)) = PREFERRED_EXTENSIONS.iter().find(|(mime, _)| *mime == essence) {
        return ext.to_string();
    }

    mime_guess::get_mime_extensions_str(&essence)
        .and_then(|exts| exts.first())
        .filter(|ext| is_key_safe(ext))
        .map(|ext| ext.to_string())
        .unwrap_or_default()
}

fn is_key_safe(ext: &str) -> bool {
    !ext.is_empty()
        && ext
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

/// Keys served over HTTP: `[a-z0-9.]`, non-empty, no leading dot.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.')
}

/// Human-readable 1024-based size, e.g. `5GB` or `1.5KB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{}{}", trimmed, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ObjectMetadata;
    use crate::storage::MemoryStorage;
    use bytes::Bytes;
    use chrono::Utc;
    use std::collections::HashMap;

    #[test]
    fn test_generate_key_shape() {
        for _ in 0..100 {
            let key = generate_key();
            assert_eq!(key.len(), 6);
            assert!(key.bytes().all(|b| KEY_CHARSET.contains(&b)));
        }
    }

    #[test]
    fn test_derive_extension() {
        assert_eq!(derive_extension("text/plain"), "txt");
        assert_eq!(derive_extension("Text/Plain; charset=utf-8"), "txt");
        assert_eq!(derive_extension("application/octet-stream"), "bin");
        assert_eq!(derive_extension("image/png"), "png");
        assert_eq!(derive_extension("application/x-made-up"), "");
        assert_eq!(derive_extension(""), "");
    }

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("abc123.txt"));
        assert!(is_valid_key("abc123"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key(".env"));
        assert!(!is_valid_key("..%2fetc"));
        assert!(!is_valid_key("ABC123"));
        assert!(!is_valid_key("a/b"));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0B");
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(1536), "1.5KB");
        assert_eq!(format_bytes(10 * 1024 * 1024), "10MB");
        assert_eq!(format_bytes(5_368_709_120), "5GB");
        assert_eq!(format_bytes(1_000_000), "976.56KB");
    }

    #[tokio::test]
    async fn test_allocate_key_uses_extension() {
        let store = MemoryStorage::new();
        let key = NamingService::allocate_key(&store, "text/plain").await.unwrap();
        assert_eq!(key.len(), 10);
        assert!(key.ends_with(".txt"));
        assert!(is_valid_key(&key));
    }

    #[tokio::test]
    async fn test_allocate_key_skips_taken_keys() {
        let store = MemoryStorage::new();
        let taken = NamingService::allocate_key(&store, "").await.unwrap();
        store
            .insert(
                ObjectMetadata {
                    key: taken.clone(),
                    size: 1,
                    content_type: None,
                    uploaded: Utc::now(),
                    etag: None,
                    custom: HashMap::new(),
                },
                Bytes::from_static(b"x"),
            )
            .await;

        for _ in 0..50 {
            let key = NamingService::allocate_key(&store, "").await.unwrap();
            assert_ne!(key, taken);
            assert_eq!(key.len(), 6);
        }
    }
}
