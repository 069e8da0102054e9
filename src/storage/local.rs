use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::{BinaryHeap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    ByteStream, ListOptions, ListPage, ListedObject, LocalStorageConfig, ObjectMetadata,
    PutOptions, StoredObject,
};
use crate::storage::{body_error, limit_stream, StorageProvider};

/// Local file system storage provider
///
/// Layout under `base_path`:
/// - `data/<key>`: object content
/// - `meta/<key>.json`: content type, size, timestamps and custom metadata
/// - `tmp/`: uploads in flight, renamed into `data/` once complete
///
/// Listing from the start of the namespace also prunes leftovers of
/// interrupted writes: staging files and sidecars without a data file.
pub struct LocalStorage {
    base_path: PathBuf,
}

/// Staging files and orphaned sidecars untouched for this long are garbage
const STALE_AFTER: Duration = Duration::from_secs(3600);

/// Files written for a put that has not been committed yet. Dropping the
/// guard removes them, so a failed or cancelled put leaves nothing behind.
struct Staged {
    paths: Vec<PathBuf>,
}

impl Staged {
    fn new(tmp_path: PathBuf) -> Self {
        Self {
            paths: vec![tmp_path],
        }
    }

    fn track(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    fn commit(mut self) {
        self.paths.clear();
    }
}

impl Drop for Staged {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!("Removed uncommitted upload file {:?}", path),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::error!("Failed to remove partial upload {:?}: {}", path, e),
            }
        }
    }
}

async fn modified_before(entry: &fs::DirEntry, cutoff: SystemTime) -> bool {
    entry
        .metadata()
        .await
        .ok()
        .and_then(|m| m.modified().ok())
        .is_some_and(|t| t < cutoff)
}

/// Sidecar metadata record
#[derive(Debug, Serialize, Deserialize)]
struct LocalMeta {
    content_type: Option<String>,
    size: u64,
    uploaded: DateTime<Utc>,
    #[serde(default)]
    custom: HashMap<String, String>,
}

impl LocalStorage {
    pub fn new(config: LocalStorageConfig) -> Self {
        Self {
            base_path: PathBuf::from(config.base_path),
        }
    }

    fn data_dir(&self) -> PathBuf {
        self.base_path.join("data")
    }

    fn check_key(key: &str) -> Result<()> {
        if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\']) {
            return Err(AppError::BadRequest(format!("Invalid object key: {:?}", key)));
        }
        Ok(())
    }

    fn data_path(&self, key: &str) -> Result<PathBuf> {
        Self::check_key(key)?;
        Ok(self.data_dir().join(key))
    }

    fn meta_path(&self, key: &str) -> Result<PathBuf> {
        Self::check_key(key)?;
        Ok(self.base_path.join("meta").join(format!("{}.json", key)))
    }

    async fn ensure_dirs(&self) -> Result<()> {
        for dir in ["data", "meta", "tmp"] {
            fs::create_dir_all(self.base_path.join(dir)).await?;
        }
        Ok(())
    }

    /// Remove staging files not written to since `cutoff` and sidecars
    /// older than `cutoff` whose data file is gone. Returns how many went.
    async fn prune_orphans(&self, cutoff: SystemTime) -> Result<usize> {
        let mut removed = 0;

        match fs::read_dir(self.base_path.join("tmp")).await {
            Ok(mut entries) => {
                while let Some(entry) = entries.next_entry().await? {
                    if modified_before(&entry, cutoff).await {
                        fs::remove_file(entry.path()).await?;
                        removed += 1;
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        match fs::read_dir(self.base_path.join("meta")).await {
            Ok(mut entries) => {
                while let Some(entry) = entries.next_entry().await? {
                    let Ok(name) = entry.file_name().into_string() else {
                        continue;
                    };
                    let Some(key) = name.strip_suffix(".json") else {
                        continue;
                    };
                    if fs::try_exists(self.data_dir().join(key)).await? {
                        continue;
                    }
                    if modified_before(&entry, cutoff).await {
                        fs::remove_file(entry.path()).await?;
                        removed += 1;
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(removed)
    }

    /// Stream the body into `path`, returning the number of bytes written.
    async fn write_body(path: &Path, body: ByteStream, options: &PutOptions) -> Result<u64> {
        let (mut body, trip) = limit_stream(body, options.size_limit);
        let mut file = fs::File::create(path).await?;
        let mut size = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| body_error(e, &trip, options.size_limit))?;
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(size)
    }

    /// Build metadata for `key`; a missing sidecar falls back to file system times.
    async fn read_metadata(&self, key: &str, data_path: &Path) -> Result<Option<ObjectMetadata>> {
        let stat = match fs::metadata(data_path).await {
            Ok(stat) => stat,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AppError::Storage(format!("Failed to stat {}: {}", key, e))),
        };

        let meta = match fs::read(self.meta_path(key)?).await {
            Ok(raw) => match serde_json::from_slice::<LocalMeta>(&raw) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    tracing::warn!("Corrupt metadata for {}: {}", key, e);
                    None
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(AppError::Storage(format!("Failed to read metadata: {}", e))),
        };

        let fs_time = stat
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(match meta {
            Some(meta) => ObjectMetadata {
                key: key.to_string(),
                size: stat.len(),
                content_type: meta.content_type,
                uploaded: meta.uploaded,
                etag: None,
                custom: meta.custom,
            },
            None => ObjectMetadata {
                key: key.to_string(),
                size: stat.len(),
                content_type: None,
                uploaded: fs_time,
                etag: None,
                custom: HashMap::new(),
            },
        }))
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    async fn put(&self, key: &str, body: ByteStream, options: PutOptions) -> Result<ObjectMetadata> {
        let data_path = self.data_path(key)?;
        let meta_path = self.meta_path(key)?;
        self.ensure_dirs().await?;

        let tmp_path = self.base_path.join("tmp").join(Uuid::new_v4().to_string());
        let mut staged = Staged::new(tmp_path.clone());
        let size = Self::write_body(&tmp_path, body, &options).await?;

        let meta = LocalMeta {
            content_type: Some(options.content_type),
            size,
            uploaded: Utc::now(),
            custom: options.custom_metadata,
        };
        let raw = serde_json::to_vec(&meta)
            .map_err(|e| AppError::Internal(format!("Failed to encode metadata: {}", e)))?;

        // Metadata lands first so the object never becomes visible without it
        staged.track(meta_path.clone());
        fs::write(&meta_path, raw).await?;
        fs::rename(&tmp_path, &data_path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to commit {}: {}", key, e)))?;
        staged.commit();

        tracing::debug!("Saved object to {:?} ({} bytes)", data_path, size);
        Ok(ObjectMetadata {
            key: key.to_string(),
            size,
            content_type: meta.content_type,
            uploaded: meta.uploaded,
            etag: None,
            custom: meta.custom,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>> {
        let data_path = self.data_path(key)?;

        let file = match fs::File::open(&data_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AppError::Storage(format!("Failed to open {}: {}", key, e))),
        };

        let Some(metadata) = self.read_metadata(key, &data_path).await? else {
            return Ok(None);
        };

        Ok(Some(StoredObject {
            metadata,
            body: ReaderStream::new(file).boxed(),
        }))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMetadata>> {
        let data_path = self.data_path(key)?;
        self.read_metadata(key, &data_path).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        for path in [self.data_path(key)?, self.meta_path(key)?] {
            match fs::remove_file(&path).await {
                Ok(()) => tracing::debug!("Deleted {:?}", path),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(AppError::Storage(format!("Failed to delete {}: {}", key, e)))
                }
            }
        }
        Ok(())
    }

    async fn list(&self, options: ListOptions) -> Result<ListPage> {
        if options.cursor.is_none() {
            let cutoff = SystemTime::now()
                .checked_sub(STALE_AFTER)
                .unwrap_or(SystemTime::UNIX_EPOCH);
            match self.prune_orphans(cutoff).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Pruned {} leftover upload files", n),
                Err(e) => tracing::warn!("Failed to prune leftover upload files: {}", e),
            }
        }

        let mut entries = match fs::read_dir(self.data_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ListPage::default()),
            Err(e) => return Err(AppError::Storage(format!("Failed to list objects: {}", e))),
        };

        // Max-heap of the smallest names past the cursor, one more than a page
        let limit = options.limit.max(1);
        let mut smallest = BinaryHeap::with_capacity(limit + 2);
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if options.cursor.as_deref().is_some_and(|c| name.as_str() <= c) {
                continue;
            }
            smallest.push(name);
            if smallest.len() > limit + 1 {
                smallest.pop();
            }
        }

        let mut keys = smallest.into_sorted_vec();
        let truncated = keys.len() > limit;
        keys.truncate(limit);
        let cursor = if truncated { keys.last().cloned() } else { None };

        let mut objects = Vec::with_capacity(keys.len());
        for key in keys {
            // Deleted between read_dir and stat
            let Ok(stat) = fs::metadata(self.data_dir().join(&key)).await else {
                continue;
            };
            if !stat.is_file() {
                continue;
            }
            objects.push(ListedObject {
                uploaded: stat
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now()),
                size: stat.len(),
                key,
            });
        }

        Ok(ListPage {
            cursor,
            objects,
            truncated,
        })
    }

    fn storage_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;

    fn storage(dir: &tempfile::TempDir) -> LocalStorage {
        LocalStorage::new(LocalStorageConfig {
            base_path: dir.path().to_string_lossy().to_string(),
        })
    }

    fn body(parts: Vec<&'static [u8]>) -> ByteStream {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p)))).boxed()
    }

    async fn read_all(object: StoredObject) -> Vec<u8> {
        let chunks: Vec<Bytes> = object.body.map(|c| c.unwrap()).collect().await;
        chunks.concat()
    }

    #[tokio::test]
    async fn test_round_trip_keeps_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = storage(&dir);
        let opts = PutOptions::one_time("text/plain", Utc::now());

        store
            .put("k1x9z0.txt", body(vec![b"hello ", b"world"]), opts)
            .await
            .unwrap();

        let object = store.get("k1x9z0.txt").await.unwrap().unwrap();
        assert_eq!(object.metadata.content_type.as_deref(), Some("text/plain"));
        assert!(object.metadata.is_one_time());
        assert_eq!(object.metadata.size, 11);
        assert_eq!(read_all(object).await, b"hello world");
        assert!(dir.path().join("tmp").read_dir().unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = storage(&dir);
        assert!(store.get("nope00").await.unwrap().is_none());
        assert!(store.head("nope00").await.unwrap().is_none());
        store.delete("nope00").await.unwrap();
    }

    #[tokio::test]
    async fn test_oversized_upload_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = storage(&dir);
        let opts = PutOptions {
            content_type: "application/octet-stream".into(),
            size_limit: Some(4),
            ..Default::default()
        };

        let err = store
            .put("big000.bin", body(vec![b"abc", b"def"]), opts)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(4)));
        assert!(store.head("big000.bin").await.unwrap().is_none());
        assert!(dir.path().join("tmp").read_dir().unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = storage(&dir);
        assert!(store.head("../etc").await.is_err());
        assert!(store.get(".hidden").await.is_err());
    }

    fn dir_is_empty(path: &Path) -> bool {
        std::fs::read_dir(path).unwrap().next().is_none()
    }

    fn age(path: &Path, by: Duration) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_put_removes_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = storage(&dir);
        let stalled = stream::iter(vec![Ok(Bytes::from_static(b"partial"))])
            .chain(stream::pending())
            .boxed();

        let put = store.put("abc123.txt", stalled, PutOptions::default());
        assert!(tokio::time::timeout(Duration::from_millis(100), put)
            .await
            .is_err());

        assert!(dir_is_empty(&dir.path().join("tmp")));
        assert!(dir_is_empty(&dir.path().join("meta")));
        assert!(store.head("abc123.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_commit_removes_sidecar_and_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = storage(&dir);
        // A non-empty directory in the way makes the rename fail
        let blocker = dir.path().join("data").join("abc123.txt");
        std::fs::create_dir_all(&blocker).unwrap();
        std::fs::write(blocker.join("inner"), b"x").unwrap();

        let err = store
            .put("abc123.txt", body(vec![b"hello"]), PutOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert!(dir_is_empty(&dir.path().join("tmp")));
        assert!(dir_is_empty(&dir.path().join("meta")));
    }

    #[tokio::test]
    async fn test_listing_prunes_stale_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let store = storage(&dir);
        store
            .put("live00.txt", body(vec![b"x"]), PutOptions::default())
            .await
            .unwrap();

        let stale_tmp = dir.path().join("tmp").join("stale-upload");
        let fresh_tmp = dir.path().join("tmp").join("fresh-upload");
        let orphan = dir.path().join("meta").join("gone00.txt.json");
        let live_meta = dir.path().join("meta").join("live00.txt.json");
        for path in [&stale_tmp, &fresh_tmp, &orphan] {
            std::fs::write(path, b"{}").unwrap();
        }
        for path in [&stale_tmp, &orphan, &live_meta] {
            age(path, Duration::from_secs(7200));
        }

        let page = store
            .list(ListOptions { limit: 10, cursor: None })
            .await
            .unwrap();
        assert_eq!(page.objects.len(), 1);

        assert!(!stale_tmp.exists());
        assert!(!orphan.exists());
        assert!(fresh_tmp.exists());
        assert!(live_meta.exists());
    }

    #[tokio::test]
    async fn test_list_walks_every_key_across_pages() {
        let dir = tempfile::tempdir().unwrap();
        let store = storage(&dir);
        let mut expected = Vec::new();
        for i in (0..7).rev() {
            let key = format!("key{:03}", i);
            store
                .put(&key, body(vec![b"x"]), PutOptions::default())
                .await
                .unwrap();
            expected.push(key);
        }
        expected.sort();

        let mut seen = Vec::new();
        let mut cursor = None;
        let mut pages = 0;
        loop {
            let page = store.list(ListOptions { limit: 3, cursor }).await.unwrap();
            pages += 1;
            assert!(page.objects.len() <= 3);
            seen.extend(page.objects.into_iter().map(|o| o.key));
            if !page.truncated {
                assert!(page.cursor.is_none());
                break;
            }
            cursor = page.cursor;
        }
        assert_eq!(pages, 3);
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_list_pages_in_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = storage(&dir);
        for key in ["ccc", "aaa", "bbb"] {
            store
                .put(key, body(vec![b"x"]), PutOptions::default())
                .await
                .unwrap();
        }

        let first = store
            .list(ListOptions { limit: 2, cursor: None })
            .await
            .unwrap();
        let keys: Vec<_> = first.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["aaa", "bbb"]);
        assert!(first.truncated);

        let second = store
            .list(ListOptions { limit: 2, cursor: first.cursor })
            .await
            .unwrap();
        assert_eq!(second.objects.len(), 1);
        assert_eq!(second.objects[0].key, "ccc");
        assert!(!second.truncated);
    }
}
