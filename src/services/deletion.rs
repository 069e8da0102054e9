//! Post-download deletion.
//!
//! Download responses wrap the object body in [`OneTimeBody`]. When the
//! transport finishes with the body (fully sent or dropped on disconnect) the
//! key is handed to the [`DeletionQueue`]; a background [`DeletionWorker`]
//! deletes it after a short delay. The worker drains everything still queued
//! or sleeping when shutdown is signalled.

use bytes::Bytes;
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::models::ByteStream;
use crate::storage::StorageProvider;

/// Sending half; cheap to clone into every download.
#[derive(Clone)]
pub struct DeletionQueue {
    tx: mpsc::UnboundedSender<String>,
}

impl DeletionQueue {
    pub fn schedule(&self, key: String) {
        if let Err(e) = self.tx.send(key) {
            // Only after shutdown; the sweeper reclaims the file once it expires
            tracing::warn!("Deletion queue closed, leaving {} to the sweeper", e.0);
        }
    }
}

pub struct DeletionWorker {
    rx: mpsc::UnboundedReceiver<String>,
    store: Arc<dyn StorageProvider>,
    delay: Duration,
    tasks: JoinSet<()>,
}

/// Create a queue and the worker that serves it.
pub fn deletion_queue(
    store: Arc<dyn StorageProvider>,
    delay: Duration,
) -> (DeletionQueue, DeletionWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        DeletionQueue { tx },
        DeletionWorker {
            rx,
            store,
            delay,
            tasks: JoinSet::new(),
        },
    )
}

impl DeletionWorker {
    /// Process deletions until `shutdown` flips or every queue handle is gone,
    /// then finish all outstanding deletions before returning.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                key = self.rx.recv() => match key {
                    Some(key) => self.spawn(key),
                    None => break,
                },
                _ = shutdown.changed() => break,
            }
            self.reap();
        }

        self.rx.close();
        while let Some(key) = self.rx.recv().await {
            self.spawn(key);
        }

        if !self.tasks.is_empty() {
            tracing::info!("Draining {} pending deletions", self.tasks.len());
        }
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Deletion task panicked");
            }
        }
        tracing::info!("Deletion worker stopped");
    }

    fn spawn(&mut self, key: String) {
        let store = self.store.clone();
        let delay = self.delay;
        self.tasks.spawn(async move {
            tokio::time::sleep(delay).await;
            match store.delete(&key).await {
                Ok(()) => tracing::info!("[one-time download] Deleted file: {}", key),
                Err(e) => {
                    tracing::error!("[one-time download] Failed to delete file {}: {}", key, e)
                }
            }
        });
    }

    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                tracing::error!(error = %e, "Deletion task panicked");
            }
        }
    }
}

/// Download body that schedules deletion of its key once the transport
/// is done with it.
pub struct OneTimeBody {
    inner: ByteStream,
    key: Option<String>,
    queue: DeletionQueue,
    finished: bool,
}

impl OneTimeBody {
    pub fn new(inner: ByteStream, key: String, queue: DeletionQueue) -> Self {
        Self {
            inner,
            key: Some(key),
            queue,
            finished: false,
        }
    }
}

impl Stream for OneTimeBody {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let next = this.inner.as_mut().poll_next(cx);
        if let Poll::Ready(None) = next {
            this.finished = true;
        }
        next
    }
}

impl Drop for OneTimeBody {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        if self.finished {
            tracing::debug!("Download of {} complete", key);
        } else {
            tracing::warn!("Download of {} ended before the body was fully sent", key);
        }
        self.queue.schedule(key);
    }
}
