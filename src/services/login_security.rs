// src/services/login_security.rs

use std::sync::Arc;
use std::time::Duration;

use crate::common::error::AppError;
use crate::kv::KvStore;
use crate::models::security::LockStatus;

const FAILURE_KEY_PREFIX: &str = "login:fail:";
const LOCK_KEY_PREFIX: &str = "account:lock:";

#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_attempts: i64,
    /// Lifetime of the failure counter, restarted on every failure.
    pub failure_window: Duration,
    pub lock_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            failure_window: Duration::from_secs(3600),
            lock_duration: Duration::from_secs(1800),
        }
    }
}

/// Failed-login bookkeeping per identifier (username, e-mail or phone).
///
/// An identifier is clean (no counter), warned (counter below the threshold)
/// or locked (lock key present). Success, an explicit unlock or TTL expiry
/// brings it back to clean. Identifiers are compared case-insensitively.
#[derive(Clone)]
pub struct LoginSecurityGuard {
    store: Arc<dyn KvStore>,
    policy: LockoutPolicy,
}

fn normalize(identifier: &str) -> Option<String> {
    let identifier = identifier.trim();
    (!identifier.is_empty()).then(|| identifier.to_lowercase())
}

impl LoginSecurityGuard {
    pub fn new(store: Arc<dyn KvStore>, policy: LockoutPolicy) -> Self {
        Self { store, policy }
    }

    pub fn max_attempts(&self) -> i64 {
        self.policy.max_attempts
    }

    pub fn lock_duration(&self) -> Duration {
        self.policy.lock_duration
    }

    /// Counts one failure and locks the identifier once the threshold is hit.
    /// Returns the current count (0 for a blank identifier).
    pub async fn record_failure(&self, identifier: &str) -> Result<i64, AppError> {
        let Some(id) = normalize(identifier) else {
            return Ok(0);
        };

        let count = self
            .store
            .incr(&format!("{}{}", FAILURE_KEY_PREFIX, id), self.policy.failure_window)
            .await?;
        tracing::warn!(identifier = %id, failures = count, "Login failure recorded");

        if count >= self.max_attempts() {
            self.lock(&id).await?;
        }
        Ok(count)
    }

    /// Drops the failure counter. An existing lock stays in place.
    pub async fn clear_failure(&self, identifier: &str) -> Result<(), AppError> {
        let Some(id) = normalize(identifier) else {
            return Ok(());
        };
        self.store.delete(&format!("{}{}", FAILURE_KEY_PREFIX, id)).await?;
        tracing::debug!(identifier = %id, "Login failures cleared");
        Ok(())
    }

    pub async fn failure_count(&self, identifier: &str) -> Result<i64, AppError> {
        let Some(id) = normalize(identifier) else {
            return Ok(0);
        };
        let value = self.store.get(&format!("{}{}", FAILURE_KEY_PREFIX, id)).await?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    pub async fn lock(&self, identifier: &str) -> Result<(), AppError> {
        let Some(id) = normalize(identifier) else {
            return Ok(());
        };
        let locked_at = chrono::Utc::now().timestamp_millis().to_string();
        self.store
            .set(&format!("{}{}", LOCK_KEY_PREFIX, id), &locked_at, self.lock_duration())
            .await?;
        tracing::warn!(
            identifier = %id,
            seconds = self.lock_duration().as_secs(),
            "Account locked"
        );
        Ok(())
    }

    /// Removes the lock and the failure counter.
    pub async fn unlock(&self, identifier: &str) -> Result<(), AppError> {
        let Some(id) = normalize(identifier) else {
            return Ok(());
        };
        self.store.delete(&format!("{}{}", LOCK_KEY_PREFIX, id)).await?;
        self.store.delete(&format!("{}{}", FAILURE_KEY_PREFIX, id)).await?;
        tracing::info!(identifier = %id, "Account unlocked");
        Ok(())
    }

    pub async fn is_locked(&self, identifier: &str) -> Result<bool, AppError> {
        let Some(id) = normalize(identifier) else {
            return Ok(false);
        };
        self.store.exists(&format!("{}{}", LOCK_KEY_PREFIX, id)).await
    }

    /// Seconds left on the lock, -1 when not locked.
    pub async fn remaining_lock_time(&self, identifier: &str) -> Result<i64, AppError> {
        let Some(id) = normalize(identifier) else {
            return Ok(-1);
        };
        let ttl = self.store.ttl(&format!("{}{}", LOCK_KEY_PREFIX, id)).await?;
        Ok(ttl.unwrap_or(-1))
    }

    /// Only the lock matters here; the failure count never blocks on its own.
    pub async fn can_login(&self, identifier: &str) -> Result<bool, AppError> {
        if normalize(identifier).is_none() {
            return Ok(false);
        }
        let locked = self.is_locked(identifier).await?;
        if locked {
            tracing::warn!(identifier = %identifier.trim().to_lowercase(), "Login rejected, account locked");
        }
        Ok(!locked)
    }

    pub async fn failure_message(&self, identifier: &str) -> Result<String, AppError> {
        if normalize(identifier).is_none() {
            return Ok("Login failed".to_string());
        }

        if self.is_locked(identifier).await? {
            let remaining = self.remaining_lock_time(identifier).await?;
            return Ok(if remaining > 0 {
                format!("Account locked, retry in {}m {}s", remaining / 60, remaining % 60)
            } else {
                "Account locked, please retry later".to_string()
            });
        }

        let failures = self.failure_count(identifier).await?;
        let remaining = self.max_attempts() - failures;
        Ok(match remaining {
            _ if failures == 0 || remaining <= 0 => "Invalid username or password".to_string(),
            1 => "Login failed, 1 attempt remaining".to_string(),
            n => format!("Login failed, {} attempts remaining", n),
        })
    }

    pub async fn status(&self, identifier: &str) -> Result<LockStatus, AppError> {
        Ok(LockStatus {
            identifier: identifier.trim().to_lowercase(),
            locked: self.is_locked(identifier).await?,
            failure_count: self.failure_count(identifier).await?,
            max_attempts: self.max_attempts(),
            remaining_time: self.remaining_lock_time(identifier).await?,
            message: self.failure_message(identifier).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;

    fn guard() -> LoginSecurityGuard {
        LoginSecurityGuard::new(Arc::new(MemoryKvStore::new()), LockoutPolicy::default())
    }

    #[tokio::test]
    async fn four_failures_warn_and_fifth_locks() {
        let guard = guard();
        for _ in 0..4 {
            guard.record_failure("alice").await.unwrap();
        }
        assert!(guard.can_login("alice").await.unwrap());
        assert_eq!(
            guard.failure_message("alice").await.unwrap(),
            "Login failed, 1 attempt remaining"
        );

        assert_eq!(guard.record_failure("alice").await.unwrap(), 5);
        assert!(!guard.can_login("alice").await.unwrap());
        assert!(guard.is_locked("alice").await.unwrap());

        let remaining = guard.remaining_lock_time("alice").await.unwrap();
        assert!(remaining > 0 && remaining <= 1800);
        assert!(guard.failure_message("alice").await.unwrap().starts_with("Account locked"));
    }

    #[tokio::test]
    async fn unlock_resets_everything() {
        let guard = guard();
        for _ in 0..5 {
            guard.record_failure("bob").await.unwrap();
        }
        guard.unlock("bob").await.unwrap();

        assert!(!guard.is_locked("bob").await.unwrap());
        assert_eq!(guard.failure_count("bob").await.unwrap(), 0);
        assert_eq!(guard.remaining_lock_time("bob").await.unwrap(), -1);
    }

    #[tokio::test]
    async fn clear_failure_keeps_the_lock() {
        let guard = guard();
        guard.lock("carol").await.unwrap();
        guard.record_failure("carol").await.unwrap();
        guard.clear_failure("carol").await.unwrap();

        assert_eq!(guard.failure_count("carol").await.unwrap(), 0);
        assert!(guard.is_locked("carol").await.unwrap());
    }

    #[tokio::test]
    async fn identifiers_are_case_insensitive() {
        let guard = guard();
        guard.record_failure("Alice").await.unwrap();
        guard.record_failure(" ALICE ").await.unwrap();
        assert_eq!(guard.failure_count("alice").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn blank_identifier_is_inert() {
        let guard = guard();
        assert_eq!(guard.record_failure("  ").await.unwrap(), 0);
        assert!(!guard.can_login("").await.unwrap());
        assert!(!guard.is_locked("").await.unwrap());
        assert_eq!(guard.remaining_lock_time("").await.unwrap(), -1);
        assert_eq!(guard.failure_message("").await.unwrap(), "Login failed");
    }

    #[tokio::test]
    async fn clean_identifier_gets_generic_message() {
        let guard = guard();
        assert_eq!(
            guard.failure_message("dave").await.unwrap(),
            "Invalid username or password"
        );
        let status = guard.status("dave").await.unwrap();
        assert!(!status.locked);
        assert_eq!(status.failure_count, 0);
        assert_eq!(status.max_attempts, 5);
        assert_eq!(status.remaining_time, -1);
    }

    #[tokio::test]
    async fn custom_threshold_is_honoured() {
        let policy = LockoutPolicy { max_attempts: 2, ..LockoutPolicy::default() };
        let guard = LoginSecurityGuard::new(Arc::new(MemoryKvStore::new()), policy);
        guard.record_failure("erin").await.unwrap();
        assert!(!guard.is_locked("erin").await.unwrap());
        guard.record_failure("erin").await.unwrap();
        assert!(guard.is_locked("erin").await.unwrap());
    }

    #[tokio::test]
    async fn each_failure_restarts_the_window() {
        let policy = LockoutPolicy {
            max_attempts: 3,
            failure_window: Duration::from_millis(200),
            ..LockoutPolicy::default()
        };
        let guard = LoginSecurityGuard::new(Arc::new(MemoryKvStore::new()), policy);

        guard.record_failure("frank").await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        guard.record_failure("frank").await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        // 240ms since the first failure, but only 120ms since the last one.
        assert_eq!(guard.failure_count("frank").await.unwrap(), 2);
        guard.record_failure("frank").await.unwrap();
        assert!(guard.is_locked("frank").await.unwrap());

        let quiet = LoginSecurityGuard::new(Arc::new(MemoryKvStore::new()), policy);
        quiet.record_failure("gina").await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(quiet.failure_count("gina").await.unwrap(), 0);
    }
}
