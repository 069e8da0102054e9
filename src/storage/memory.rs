use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::{stream, StreamExt};
use std::collections::BTreeMap;
use std::ops::Bound;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::{
    ByteStream, ListOptions, ListPage, ListedObject, ObjectMetadata, PutOptions, StoredObject,
};
use crate::storage::{body_error, limit_stream, StorageProvider};

/// In-process object store. Contents vanish with the process, so this only
/// suits tests and single-instance throwaway deployments.
#[derive(Default)]
pub struct MemoryStorage {
    objects: RwLock<BTreeMap<String, (ObjectMetadata, Bytes)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object with fully specified metadata, bypassing `put`.
    pub async fn insert(&self, metadata: ObjectMetadata, data: Bytes) {
        self.objects
            .write()
            .await
            .insert(metadata.key.clone(), (metadata, data));
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl StorageProvider for MemoryStorage {
    async fn put(&self, key: &str, body: ByteStream, options: PutOptions) -> Result<ObjectMetadata> {
        let (mut body, trip) = limit_stream(body, options.size_limit);

        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| body_error(e, &trip, options.size_limit))?;
            buf.extend_from_slice(&chunk);
        }

        let metadata = ObjectMetadata {
            key: key.to_string(),
            size: buf.len() as u64,
            content_type: Some(options.content_type),
            uploaded: Utc::now(),
            etag: None,
            custom: options.custom_metadata,
        };
        self.insert(metadata.clone(), buf.freeze()).await;
        Ok(metadata)
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>> {
        let objects = self.objects.read().await;
        Ok(objects.get(key).map(|(metadata, data)| StoredObject {
            metadata: metadata.clone(),
            body: stream::once(futures::future::ready(Ok(data.clone()))).boxed(),
        }))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMetadata>> {
        let objects = self.objects.read().await;
        Ok(objects.get(key).map(|(metadata, _)| metadata.clone()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, options: ListOptions) -> Result<ListPage> {
        let objects = self.objects.read().await;
        let start = match &options.cursor {
            Some(cursor) => Bound::Excluded(cursor.clone()),
            None => Bound::Unbounded,
        };

        let mut remaining = objects.range((start, Bound::Unbounded));
        let page: Vec<ListedObject> = remaining
            .by_ref()
            .take(options.limit)
            .map(|(key, (metadata, _))| ListedObject {
                key: key.clone(),
                size: metadata.size,
                uploaded: metadata.uploaded,
            })
            .collect();
        let truncated = remaining.next().is_some();

        Ok(ListPage {
            cursor: if truncated {
                page.last().map(|o| o.key.clone())
            } else {
                None
            },
            objects: page,
            truncated,
        })
    }

    fn storage_type(&self) -> &'static str {
        "memory"
    }
}
