// src/services/session.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::common::error::AppError;
use crate::kv::KvStore;
use crate::models::security::OnlineSession;

const KEY_PREFIX: &str = "session:";

fn session_key(user_id: i64, token_id: &str) -> String {
    format!("{}{}:{}", KEY_PREFIX, user_id, token_id)
}

/// Issued tokens that are still honoured, one entry per token id under
/// `session:<user id>:<token id>`. An entry lives exactly as long as its
/// token; removing it revokes the token before its expiry.
#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn KvStore>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn open(&self, session: &OnlineSession) -> Result<(), AppError> {
        let ttl = (session.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        if ttl.is_zero() {
            return Ok(());
        }
        let value = serde_json::to_string(session).map_err(anyhow::Error::from)?;
        self.store
            .set(&session_key(session.user_id, &session.token_id), &value, ttl)
            .await
    }

    pub async fn is_active(&self, user_id: i64, token_id: &str) -> Result<bool, AppError> {
        self.store.exists(&session_key(user_id, token_id)).await
    }

    pub async fn get(&self, user_id: i64, token_id: &str) -> Result<Option<OnlineSession>, AppError> {
        let raw = self.store.get(&session_key(user_id, token_id)).await?;
        Ok(raw.and_then(|raw| decode(&raw)))
    }

    /// Returns whether a live session was removed.
    pub async fn close(&self, user_id: i64, token_id: &str) -> Result<bool, AppError> {
        self.store.delete(&session_key(user_id, token_id)).await
    }

    /// Revokes every token of the user. Returns how many were live.
    pub async fn close_all(&self, user_id: i64) -> Result<usize, AppError> {
        let entries = self.store.scan_prefix(&format!("{}{}:", KEY_PREFIX, user_id)).await?;
        let mut closed = 0;
        for (key, _) in entries {
            if self.store.delete(&key).await? {
                closed += 1;
            }
        }
        Ok(closed)
    }

    /// Every live session, most recent login first.
    pub async fn list(&self) -> Result<Vec<OnlineSession>, AppError> {
        let entries = self.store.scan_prefix(KEY_PREFIX).await?;
        let mut sessions: Vec<OnlineSession> = entries.iter().filter_map(|(_, raw)| decode(raw)).collect();
        sessions.sort_by(|a, b| b.login_time.cmp(&a.login_time));
        Ok(sessions)
    }
}

fn decode(raw: &str) -> Option<OnlineSession> {
    match serde_json::from_str(raw) {
        Ok(session) => Some(session),
        Err(e) => {
            tracing::warn!("Skipping unreadable session entry: {}", e);
            None
        }
    }
}
