use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::models::ListOptions;
use crate::storage::StorageProvider;

/// Keys fetched per listing call
pub const SWEEP_PAGE_SIZE: usize = 1000;

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub deleted: usize,
    pub failed: usize,
}

enum Outcome {
    Kept,
    Deleted,
    Failed,
}

/// Deletes every object older than `max_age`.
pub struct Sweeper {
    store: Arc<dyn StorageProvider>,
    max_age_secs: i64,
}

impl Sweeper {
    pub fn new(store: Arc<dyn StorageProvider>, max_age: Duration) -> Self {
        Self {
            store,
            max_age_secs: i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX),
        }
    }

    /// Walk the whole namespace once, page by page. Objects on a page are
    /// checked concurrently; a failed listing ends the run early.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        tracing::info!(
            "[sweeper] Start cleaning expired files, MAX_AGE: {}s",
            self.max_age_secs
        );

        let mut report = SweepReport::default();
        let mut cursor = None;
        loop {
            let page = match self
                .store
                .list(ListOptions {
                    limit: SWEEP_PAGE_SIZE,
                    cursor: cursor.take(),
                })
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    tracing::error!("[sweeper] Listing failed, ending run early: {}", e);
                    break;
                }
            };

            report.checked += page.objects.len();
            let outcomes = join_all(page.objects.iter().map(|o| self.check(&o.key, now))).await;
            for outcome in outcomes {
                match outcome {
                    Outcome::Kept => {}
                    Outcome::Deleted => report.deleted += 1,
                    Outcome::Failed => report.failed += 1,
                }
            }

            match page.cursor {
                Some(next) if page.truncated => cursor = Some(next),
                _ => break,
            }
        }

        tracing::info!(
            "[sweeper] Cleanup complete: checked {} files, deleted {} expired files, {} failures",
            report.checked,
            report.deleted,
            report.failed
        );
        report
    }

    async fn check(&self, key: &str, now: DateTime<Utc>) -> Outcome {
        let metadata = match self.store.head(key).await {
            Ok(Some(metadata)) => metadata,
            // Gone since the listing, e.g. downloaded
            Ok(None) => return Outcome::Kept,
            Err(e) => {
                tracing::error!("[sweeper] Error processing file {}: {}", key, e);
                return Outcome::Failed;
            }
        };

        let age = metadata.age_secs(now);
        if age <= self.max_age_secs {
            return Outcome::Kept;
        }

        match self.store.delete(key).await {
            Ok(()) => {
                tracing::info!("[sweeper] Deleted expired file: {}, age: {}s", key, age);
                Outcome::Deleted
            }
            Err(e) => {
                tracing::error!("[sweeper] Error deleting file {}: {}", key, e);
                Outcome::Failed
            }
        }
    }

    /// Sweep immediately, then every `interval` until `shutdown` flips.
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep(Utc::now()).await;
                }
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!("[sweeper] Stopped");
    }
}
