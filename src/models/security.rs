// src/models/security.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// Snapshot of the login guard for one identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LockStatus {
    pub identifier: String,
    pub locked: bool,
    pub failure_count: i64,
    pub max_attempts: i64,
    // Seconds left on the lock, -1 when not locked
    pub remaining_time: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CaptchaResponse {
    pub key: String,
    // data:image/png;base64,...
    pub image: String,
    pub expires_in: u64,
}

// One issued token that has not expired or been revoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OnlineSession {
    pub token_id: String,
    pub user_id: i64,
    pub username: String,
    pub ip: Option<String>,
    pub login_time: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
