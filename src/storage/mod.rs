pub mod cos;
pub mod local;
pub mod memory;
pub mod provider;

pub use cos::CosStorage;
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use provider::*;

use futures::StreamExt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::StorageConfig;
use crate::error::{AppError, Result};
use crate::models::{ByteStream, StorageBackend};

/// Create the provider selected by the storage config
pub fn create_provider(config: &StorageConfig) -> Result<Arc<dyn StorageProvider>> {
    match config.backend {
        StorageBackend::Local => Ok(Arc::new(LocalStorage::new(config.local.clone()))),
        StorageBackend::Memory => Ok(Arc::new(MemoryStorage::new())),
        StorageBackend::Cos => {
            let cos = config
                .cos
                .clone()
                .ok_or_else(|| AppError::BadRequest("Missing [storage.cos] section".to_string()))?;
            cos.validate()
                .map_err(|e| AppError::BadRequest(format!("Invalid COS config: {}", e)))?;
            Ok(Arc::new(CosStorage::new(cos)))
        }
    }
}

/// Set once a limited stream has seen more bytes than allowed.
#[derive(Debug, Clone, Default)]
pub struct LimitTrip(Arc<AtomicBool>);

impl LimitTrip {
    pub fn tripped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Wrap `body` so it errors as soon as it has produced more than `limit` bytes.
pub fn limit_stream(body: ByteStream, limit: Option<u64>) -> (ByteStream, LimitTrip) {
    let trip = LimitTrip::default();
    let Some(limit) = limit else {
        return (body, trip);
    };

    let flag = trip.clone();
    let mut seen: u64 = 0;
    let limited = body
        .map(move |chunk| {
            let chunk = chunk?;
            seen += chunk.len() as u64;
            if seen > limit {
                flag.0.store(true, Ordering::Release);
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("upload exceeds {} bytes", limit),
                ));
            }
            Ok(chunk)
        })
        .boxed();
    (limited, trip)
}

/// Map a failure while draining an upload body.
pub fn body_error(err: impl std::fmt::Display, trip: &LimitTrip, limit: Option<u64>) -> AppError {
    match limit {
        Some(limit) if trip.tripped() => AppError::PayloadTooLarge(limit),
        _ => AppError::BadRequest(format!("Failed to read upload body: {}", err)),
    }
}
