// src/models/auth.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Disabled = 0,
    #[default]
    Enabled = 1,
}

impl UserStatus {
    pub fn label(self) -> &'static str {
        match self {
            UserStatus::Disabled => "Disabled",
            UserStatus::Enabled => "Enabled",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "enabled" => Some(UserStatus::Enabled),
            "disabled" => Some(UserStatus::Disabled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    #[default]
    Unknown = 0,
    Male = 1,
    Female = 2,
}

impl Gender {
    pub fn label(self) -> &'static str {
        match self {
            Gender::Unknown => "Unknown",
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            "unknown" | "" => Some(Gender::Unknown),
            _ => None,
        }
    }
}

// A user row (soft-deleted rows are never returned by the repositories)
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,

    #[serde(skip_serializing)]
    #[schema(ignore)]
    pub password_hash: String,

    pub nickname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub gender: Gender,
    pub birthday: Option<NaiveDate>,
    pub status: UserStatus,

    pub last_login_ip: Option<String>,
    pub last_login_time: Option<DateTime<Utc>>,
    pub login_count: i32,
    pub password_updated_at: Option<DateTime<Utc>>,

    pub remark: Option<String>,

    #[schema(ignore)]
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_enabled(&self) -> bool {
        self.status == UserStatus::Enabled
    }

    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.username)
    }
}

// Self-service registration
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserPayload {
    #[validate(length(min = 3, max = 20, message = "Username must be 3-20 characters."))]
    #[schema(example = "alice")]
    pub username: String,

    #[validate(length(min = 6, max = 20, message = "Password must be 6-20 characters."))]
    #[schema(example = "s3cret!")]
    pub password: String,

    #[validate(length(max = 50, message = "Nickname must be at most 50 characters."))]
    pub nickname: Option<String>,

    #[validate(
        email(message = "The e-mail address is invalid."),
        length(max = 100, message = "E-mail must be at most 100 characters.")
    )]
    pub email: Option<String>,

    #[validate(length(max = 20, message = "Phone must be at most 20 characters."))]
    pub phone: Option<String>,

    pub gender: Option<Gender>,
}

// Username, e-mail or phone plus password, optionally with a captcha answer.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginUserPayload {
    #[validate(length(min = 1, message = "Username is required."))]
    #[schema(example = "alice")]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,

    pub captcha_key: Option<String>,
    pub captcha: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    // Seconds
    pub expires_in: i64,
    pub user_id: i64,
    pub username: String,
    pub display_name: String,
    pub avatar: Option<String>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub first_login: bool,
    pub last_login_time: Option<DateTime<Utc>>,
}

// A re-issued token for an existing session.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    // Seconds
    pub expires_in: i64,
}

// Fields a user may change on their own account.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfilePayload {
    #[validate(length(max = 50, message = "Nickname must be at most 50 characters."))]
    pub nickname: Option<String>,

    #[validate(
        email(message = "The e-mail address is invalid."),
        length(max = 100, message = "E-mail must be at most 100 characters.")
    )]
    pub email: Option<String>,

    #[validate(length(max = 20, message = "Phone must be at most 20 characters."))]
    pub phone: Option<String>,

    #[validate(length(max = 255, message = "Avatar URL must be at most 255 characters."))]
    pub avatar: Option<String>,

    pub gender: Option<Gender>,
    pub birthday: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordPayload {
    #[validate(length(min = 1, message = "Current password is required."))]
    pub old_password: String,

    #[validate(length(min = 6, max = 20, message = "Password must be 6-20 characters."))]
    pub new_password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    pub id: i64,
}

// JWT claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,    // user id
    pub exp: usize,  // expires at
    pub iat: usize,  // issued at
    pub jti: String, // session id
}
