use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ByteStream, ListOptions, ListPage, ObjectMetadata, PutOptions, StoredObject};

/// Object store the relay keeps its files in.
///
/// Keys are flat strings; `put` attaches content type and custom metadata in the
/// same write as the content, and every mutation is atomic per key. `delete` on a
/// missing key succeeds.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Stream `body` into the store under `key`.
    /// Fails with `PayloadTooLarge` once more than `options.size_limit` bytes arrive,
    /// leaving nothing behind under `key`.
    async fn put(&self, key: &str, body: ByteStream, options: PutOptions)
        -> Result<ObjectMetadata>;

    /// Open an object for streaming, `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<StoredObject>>;

    /// Fetch metadata only, `None` if absent.
    async fn head(&self, key: &str) -> Result<Option<ObjectMetadata>>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// One page of keys in ascending order, starting after `options.cursor`.
    async fn list(&self, options: ListOptions) -> Result<ListPage>;

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.head(key).await?.is_some())
    }

    /// Get the storage type name
    fn storage_type(&self) -> &'static str;
}
