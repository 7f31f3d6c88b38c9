//! Key-value store with per-key expiry.
//!
//! Holds short-lived state such as login failure counters, lock markers,
//! captcha answers and issued-token sessions. Every operation is a single round-trip to the backend.

pub mod memory;
pub mod postgres;

pub use memory::MemoryKvStore;
pub use postgres::PgKvStore;

use std::sync::Arc;
use std::time::Duration;

use crate::common::error::AppError;

#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous value and expiry.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AppError>;

    /// Value of a live key.
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    /// Remove a key. Returns whether a live key was removed.
    async fn delete(&self, key: &str) -> Result<bool, AppError>;

    async fn exists(&self, key: &str) -> Result<bool, AppError>;

    /// Seconds until `key` expires, `None` when it does not exist.
    async fn ttl(&self, key: &str) -> Result<Option<i64>, AppError>;

    /// Atomically increment an integer counter and reset its expiry to `ttl`.
    /// A missing or expired key counts from zero.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, AppError>;

    /// Live entries whose key starts with `prefix`, ordered by key.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, AppError>;

    /// Drop every expired entry. Returns how many were removed.
    async fn purge_expired(&self) -> Result<u64, AppError>;
}

/// Purges expired entries every `period` for the lifetime of the process.
pub fn spawn_sweeper(store: Arc<dyn KvStore>, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Expired key-value entries purged"),
                Err(e) => tracing::warn!("Key-value sweep failed: {}", e),
            }
        }
    })
}
