// src/models/user.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::common::pagination::PageQuery;
use crate::models::auth::{Gender, User, UserStatus};
use crate::models::rbac::Role;

/// Password given to imported users that do not carry one.
pub const DEFAULT_PASSWORD: &str = "123456";

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserPayload {
    #[validate(length(min = 3, max = 20, message = "Username must be 3-20 characters."))]
    pub username: String,

    #[validate(length(min = 6, max = 20, message = "Password must be 6-20 characters."))]
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

    #[validate(length(max = 255, message = "Avatar URL must be at most 255 characters."))]
    pub avatar: Option<String>,

    pub gender: Option<Gender>,
    pub birthday: Option<NaiveDate>,
    pub status: Option<UserStatus>,

    #[validate(length(max = 500, message = "Remark must be at most 500 characters."))]
    pub remark: Option<String>,
}

// Partial update: only the fields present are written.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserPayload {
    #[validate(length(min = 3, max = 20, message = "Username must be 3-20 characters."))]
    pub username: Option<String>,

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

    #[validate(length(max = 500, message = "Remark must be at most 500 characters."))]
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct UserQuery {
    pub current: Option<i64>,
    pub size: Option<i64>,
    // Matches username, nickname, email or phone
    pub keyword: Option<String>,
    pub username: Option<String>,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<UserStatus>,
    pub gender: Option<Gender>,
    pub role_id: Option<i64>,
}

impl UserQuery {
    pub fn page(&self) -> PageQuery {
        PageQuery { current: self.current, size: self.size, keyword: self.keyword.clone() }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserStatusPayload {
    pub status: UserStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchUserStatusPayload {
    pub user_ids: Vec<i64>,
    pub status: UserStatus,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordPayload {
    #[validate(length(min = 6, max = 20, message = "Password must be 6-20 characters."))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    pub value: String,
    pub exclude_id: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AvailabilityResponse {
    pub available: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    pub roles: Vec<Role>,
}

// ---
// IMPORT / EXPORT
// ---

// One exported spreadsheet row.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserExportRow {
    pub id: i64,
    pub username: String,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub gender_text: String,
    pub birthday: Option<NaiveDate>,
    pub status_text: String,
    pub last_login_ip: Option<String>,
    pub last_login_time: Option<DateTime<Utc>>,
    pub login_count: i32,
    pub role_names: String,
    pub remark: Option<String>,
    pub created_at: DateTime<Utc>,
}

// One imported spreadsheet row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserImportRow {
    pub username: String,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub gender_text: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub status_text: Option<String>,
    pub password: Option<String>,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportFailure {
    // Spreadsheet row number; the header is row 1.
    pub row_index: usize,
    pub username: String,
    pub reason: String,
}

#[derive(Debug, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub total_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub all_success: bool,
    pub failures: Vec<ImportFailure>,
    // Milliseconds
    pub duration: u64,
}
