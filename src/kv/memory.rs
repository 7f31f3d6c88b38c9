// src/kv/memory.rs

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::KvStore;
use crate::common::error::AppError;

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Instant,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Process-local store. Expired entries are dropped when touched and by
/// [`KvStore::purge_expired`], which the background sweeper calls.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    slots: DashMap<String, Slot>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_slot(&self, key: &str) -> Option<Slot> {
        let now = Instant::now();
        // remove_if takes the shard write lock, so a concurrent set is never lost.
        self.slots.remove_if(key, |_, slot| !slot.is_live(now));
        self.slots.get(key).map(|slot| slot.clone()).filter(|slot| slot.is_live(now))
    }

    /// Entries held, live or not yet purged.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryKvStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AppError> {
        self.slots.insert(
            key.to_string(),
            Slot { value: value.to_string(), expires_at: Instant::now() + ttl },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.live_slot(key).map(|slot| slot.value))
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let now = Instant::now();
        Ok(self.slots.remove(key).is_some_and(|(_, slot)| slot.is_live(now)))
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.live_slot(key).is_some())
    }

    async fn ttl(&self, key: &str) -> Result<Option<i64>, AppError> {
        let now = Instant::now();
        Ok(self.live_slot(key).map(|slot| {
            let remaining = slot.expires_at.saturating_duration_since(now);
            // Round up so a freshly written key reports its full TTL.
            remaining.as_millis().div_ceil(1000) as i64
        }))
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, AppError> {
        let now = Instant::now();
        let expires_at = now + ttl;

        match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                let current = if slot.is_live(now) {
                    slot.value.parse::<i64>().map_err(|_| {
                        AppError::validation(format!("Value at '{}' is not an integer.", key))
                    })?
                } else {
                    0
                };
                let next = current + 1;
                *slot = Slot { value: next.to_string(), expires_at };
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot { value: "1".to_string(), expires_at });
                Ok(1)
            }
        }
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, AppError> {
        let now = Instant::now();
        let mut entries: Vec<(String, String)> = self
            .slots
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && entry.value().is_live(now))
            .map(|entry| (entry.key().clone(), entry.value().value.clone()))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    async fn purge_expired(&self) -> Result<u64, AppError> {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.is_live(now));
        Ok(before.saturating_sub(self.slots.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let store = MemoryKvStore::new();
        store.set("k", "v", Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.exists("k").await.unwrap());
        assert!(store.delete("k").await.unwrap());
        assert!(!store.exists("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn expired_keys_disappear() {
        let store = MemoryKvStore::new();
        store.set("k", "v", Duration::from_millis(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.ttl("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn ttl_reports_remaining_seconds() {
        let store = MemoryKvStore::new();
        store.set("k", "v", Duration::from_secs(1800)).await.unwrap();

        let ttl = store.ttl("k").await.unwrap().unwrap();
        assert!(ttl > 0 && ttl <= 1800);
        assert_eq!(store.ttl("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn incr_counts_and_restarts_after_expiry() {
        let store = MemoryKvStore::new();
        assert_eq!(store.incr("c", Duration::from_millis(30)).await.unwrap(), 1);
        assert_eq!(store.incr("c", Duration::from_millis(30)).await.unwrap(), 2);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.incr("c", Duration::from_secs(60)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn purge_drops_untouched_expired_entries() {
        let store = MemoryKvStore::new();
        for i in 0..1000 {
            store.set(&format!("captcha:{}", i), "abcd", Duration::from_millis(1)).await.unwrap();
        }
        store.set("live", "v", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(store.purge_expired().await.unwrap(), 1000);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("live").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn sweeper_purges_in_the_background() {
        let store = std::sync::Arc::new(MemoryKvStore::new());
        for i in 0..100 {
            store.set(&format!("login:fail:{}", i), "1", Duration::from_millis(1)).await.unwrap();
        }
        let sweeper = crate::kv::spawn_sweeper(store.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        sweeper.abort();

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn incr_keeps_sliding_the_window() {
        let store = MemoryKvStore::new();
        let window = Duration::from_millis(200);
        assert_eq!(store.incr("c", window).await.unwrap(), 1);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(store.incr("c", window).await.unwrap(), 2);

        // Past the first expiry, inside the second.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(store.get("c").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.incr("c", window).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn scan_prefix_returns_live_matches_in_key_order() {
        let store = MemoryKvStore::new();
        store.set("session:2:b", "two", Duration::from_secs(60)).await.unwrap();
        store.set("session:1:a", "one", Duration::from_secs(60)).await.unwrap();
        store.set("session:1:gone", "x", Duration::from_millis(1)).await.unwrap();
        store.set("captcha:k", "abcd", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let all = store.scan_prefix("session:").await.unwrap();
        assert_eq!(
            all,
            vec![
                ("session:1:a".to_string(), "one".to_string()),
                ("session:2:b".to_string(), "two".to_string()),
            ]
        );
        assert_eq!(store.scan_prefix("session:2:").await.unwrap().len(), 1);
        assert!(store.scan_prefix("nothing:").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn incr_rejects_non_integer_values() {
        let store = MemoryKvStore::new();
        store.set("k", "abc", Duration::from_secs(60)).await.unwrap();
        assert!(store.incr("k", Duration::from_secs(60)).await.is_err());
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let store = std::sync::Arc::new(MemoryKvStore::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.incr("c", Duration::from_secs(60)).await.unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.get("c").await.unwrap().as_deref(), Some("50"));
    }
}
