// src/services/user_service.rs

use std::sync::Arc;
use std::time::Instant;

use validator::{Validate, ValidationErrors};

use crate::common::error::AppError;
use crate::common::pagination::PageResult;
use crate::db::{NewUser, RoleRepository, UserRepository, distinct_ids};
use crate::models::auth::{Gender, User, UserStatus};
use crate::models::user::{
    CreateUserPayload, DEFAULT_PASSWORD, ImportFailure, ImportResult, UpdateUserPayload, UserDetail,
    UserExportRow, UserImportRow, UserQuery,
};
use crate::services::password::hash_password;

// Empty strings from forms and spreadsheets mean "not set".
fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

// The first human-readable message of a failed validation.
fn first_message(errors: &ValidationErrors) -> String {
    errors
        .field_errors()
        .values()
        .flat_map(|errs| errs.iter())
        .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| errors.to_string())
}

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserRepository>,
    roles: Arc<dyn RoleRepository>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepository>, roles: Arc<dyn RoleRepository>) -> Self {
        Self { users, roles }
    }

    pub async fn require(&self, id: i64) -> Result<User, AppError> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("User {} not found.", id)))
    }

    pub async fn page(&self, query: &UserQuery) -> Result<PageResult<User>, AppError> {
        let (records, total) = self.users.find_page(query).await?;
        Ok(PageResult::new(&query.page(), total, records))
    }

    pub async fn detail(&self, id: i64) -> Result<UserDetail, AppError> {
        let user = self.require(id).await?;
        let roles = self.roles.find_by_user(id).await?;
        Ok(UserDetail { user, roles })
    }

    pub async fn by_role(&self, role_id: i64) -> Result<Vec<User>, AppError> {
        self.users.find_by_role(role_id).await
    }

    pub async fn username_available(&self, username: &str, exclude_id: Option<i64>) -> Result<bool, AppError> {
        Ok(!self.users.username_exists(username.trim(), exclude_id).await?)
    }

    pub async fn email_available(&self, email: &str, exclude_id: Option<i64>) -> Result<bool, AppError> {
        Ok(!self.users.email_exists(email.trim(), exclude_id).await?)
    }

    pub async fn phone_available(&self, phone: &str, exclude_id: Option<i64>) -> Result<bool, AppError> {
        Ok(!self.users.phone_exists(phone.trim(), exclude_id).await?)
    }

    async fn check_unique(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        phone: Option<&str>,
        exclude_id: Option<i64>,
    ) -> Result<(), AppError> {
        if let Some(username) = username {
            if self.users.username_exists(username, exclude_id).await? {
                return Err(AppError::conflict(format!("Username '{}' is already taken.", username)));
            }
        }
        if let Some(email) = email {
            if self.users.email_exists(email, exclude_id).await? {
                return Err(AppError::conflict(format!("E-mail '{}' is already in use.", email)));
            }
        }
        if let Some(phone) = phone {
            if self.users.phone_exists(phone, exclude_id).await? {
                return Err(AppError::conflict(format!("Phone '{}' is already in use.", phone)));
            }
        }
        Ok(())
    }

    /// `actor` is `None` for self-registration.
    pub async fn create(&self, payload: &CreateUserPayload, actor: Option<i64>) -> Result<User, AppError> {
        let username = payload.username.trim().to_string();
        let email = non_blank(&payload.email);
        let phone = non_blank(&payload.phone);
        self.check_unique(Some(&username), email.as_deref(), phone.as_deref(), None)
            .await?;

        let new_user = NewUser {
            username,
            password_hash: hash_password(&payload.password).await?,
            nickname: non_blank(&payload.nickname),
            email,
            phone,
            avatar: non_blank(&payload.avatar),
            gender: payload.gender.unwrap_or_default(),
            birthday: payload.birthday,
            status: payload.status.unwrap_or_default(),
            remark: non_blank(&payload.remark),
        };
        let user = self.users.create(&new_user, actor).await?;
        tracing::info!(user_id = user.id, username = %user.username, ?actor, "User created");
        Ok(user)
    }

    pub async fn update(&self, id: i64, payload: &UpdateUserPayload, actor: i64) -> Result<User, AppError> {
        self.require(id).await?;

        let payload = UpdateUserPayload {
            username: non_blank(&payload.username),
            nickname: payload.nickname.clone(),
            email: non_blank(&payload.email),
            phone: non_blank(&payload.phone),
            avatar: payload.avatar.clone(),
            gender: payload.gender,
            birthday: payload.birthday,
            remark: payload.remark.clone(),
        };
        self.check_unique(
            payload.username.as_deref(),
            payload.email.as_deref(),
            payload.phone.as_deref(),
            Some(id),
        )
        .await?;

        let user = self.users.update(id, &payload, actor).await?;
        tracing::info!(user_id = id, actor, "User updated");
        Ok(user)
    }

    pub async fn delete(&self, id: i64, actor: i64) -> Result<(), AppError> {
        self.delete_batch(&[id], actor).await.map(|_| ())
    }

    /// Soft-deletes the users; unknown ids fail the whole call.
    pub async fn delete_batch(&self, ids: &[i64], actor: i64) -> Result<u64, AppError> {
        let ids = distinct_ids(ids);
        if ids.contains(&actor) {
            return Err(AppError::validation("You cannot delete your own account."));
        }
        if self.users.count_existing(&ids).await? != ids.len() as i64 {
            return Err(AppError::not_found("One or more users do not exist."));
        }
        let affected = self.users.delete(&ids, actor).await?;
        tracing::info!(affected, actor, "Users deleted");
        Ok(affected)
    }

    pub async fn update_status(&self, id: i64, status: UserStatus, actor: i64) -> Result<(), AppError> {
        self.require(id).await?;
        self.update_status_batch(&[id], status, actor).await.map(|_| ())
    }

    pub async fn update_status_batch(&self, ids: &[i64], status: UserStatus, actor: i64) -> Result<u64, AppError> {
        if status == UserStatus::Disabled && ids.contains(&actor) {
            return Err(AppError::validation("You cannot disable your own account."));
        }
        let affected = self.users.update_status(ids, status, actor).await?;
        tracing::info!(affected, status = status.label(), actor, "User status changed");
        Ok(affected)
    }

    pub async fn reset_password(&self, id: i64, new_password: &str, actor: i64) -> Result<(), AppError> {
        self.require(id).await?;
        let password_hash = hash_password(new_password).await?;
        self.users.update_password(id, &password_hash, actor).await?;
        tracing::info!(user_id = id, actor, "Password reset");
        Ok(())
    }

    // ---
    // IMPORT / EXPORT
    // ---

    pub async fn export(&self, query: &UserQuery) -> Result<Vec<UserExportRow>, AppError> {
        let users = self.users.find_all(query).await?;
        let mut rows = Vec::with_capacity(users.len());
        for user in users {
            let roles = self.roles.find_by_user(user.id).await?;
            let role_names = roles.into_iter().map(|r| r.name).collect::<Vec<_>>().join(", ");
            rows.push(UserExportRow {
                id: user.id,
                gender_text: user.gender.label().to_string(),
                status_text: user.status.label().to_string(),
                role_names,
                username: user.username,
                nickname: user.nickname,
                email: user.email,
                phone: user.phone,
                birthday: user.birthday,
                last_login_ip: user.last_login_ip,
                last_login_time: user.last_login_time,
                login_count: user.login_count,
                remark: user.remark,
                created_at: user.created_at,
            });
        }
        Ok(rows)
    }

    /// An example row showing every accepted column.
    pub fn import_template(&self) -> Vec<UserImportRow> {
        vec![UserImportRow {
            username: "jdoe".to_string(),
            nickname: Some("John Doe".to_string()),
            email: Some("jdoe@example.com".to_string()),
            phone: Some("13800000000".to_string()),
            gender_text: Some(Gender::Male.label().to_string()),
            birthday: None,
            status_text: Some(UserStatus::Enabled.label().to_string()),
            password: None,
            remark: Some(format!("Password defaults to {} when left empty", DEFAULT_PASSWORD)),
        }]
    }

    fn parse_row(row: &UserImportRow) -> Result<CreateUserPayload, String> {
        let gender = match non_blank(&row.gender_text) {
            Some(text) => Some(Gender::from_label(&text).ok_or_else(|| format!("Unknown gender '{}'.", text))?),
            None => None,
        };
        let status = match non_blank(&row.status_text) {
            Some(text) => Some(UserStatus::from_label(&text).ok_or_else(|| format!("Unknown status '{}'.", text))?),
            None => None,
        };

        let payload = CreateUserPayload {
            username: row.username.trim().to_string(),
            password: non_blank(&row.password).unwrap_or_else(|| DEFAULT_PASSWORD.to_string()),
            nickname: non_blank(&row.nickname),
            email: non_blank(&row.email),
            phone: non_blank(&row.phone),
            avatar: None,
            gender,
            birthday: row.birthday,
            status,
            remark: non_blank(&row.remark),
        };
        // Same rules as the create form, so a row never reaches the table with oversized columns.
        payload.validate().map_err(|errors| first_message(&errors))?;
        Ok(payload)
    }

    /// Imports rows one by one; a bad row is reported and the rest continue.
    /// Row numbers start at 2, the header being row 1.
    pub async fn import(&self, rows: Vec<UserImportRow>, actor: i64) -> Result<ImportResult, AppError> {
        let started = Instant::now();
        let mut result = ImportResult { total_count: rows.len(), ..Default::default() };

        for (i, row) in rows.iter().enumerate() {
            let outcome = match Self::parse_row(row) {
                Ok(payload) => match self.create(&payload, Some(actor)).await {
                    Ok(_) => Ok(()),
                    Err(e @ (AppError::Conflict(_) | AppError::Validation(_))) => Err(e.to_string()),
                    Err(e) => {
                        tracing::warn!(row = i + 2, error = %e, "User import row failed");
                        Err("The row could not be saved.".to_string())
                    }
                },
                Err(reason) => Err(reason),
            };

            match outcome {
                Ok(()) => result.success_count += 1,
                Err(reason) => result.failures.push(ImportFailure {
                    row_index: i + 2,
                    username: row.username.clone(),
                    reason,
                }),
            }
        }

        result.failure_count = result.failures.len();
        result.all_success = result.failure_count == 0;
        result.duration = started.elapsed().as_millis() as u64;
        tracing::info!(
            total = result.total_count,
            succeeded = result.success_count,
            failed = result.failure_count,
            actor,
            "User import finished"
        );
        Ok(result)
    }

    /// Creates the bootstrap administrator when it does not exist yet and
    /// gives it the role with `role_code`.
    pub async fn ensure_admin(&self, username: &str, password: &str, role_code: &str) -> Result<(), AppError> {
        if self.users.find_by_username(username).await?.is_some() {
            return Ok(());
        }
        let role = self
            .roles
            .find_by_code(role_code)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Role '{}' not found.", role_code)))?;

        let payload = CreateUserPayload {
            username: username.to_string(),
            password: password.to_string(),
            nickname: Some("Administrator".to_string()),
            email: None,
            phone: None,
            avatar: None,
            gender: None,
            birthday: None,
            status: Some(UserStatus::Enabled),
            remark: None,
        };
        let admin = self.create(&payload, None).await?;
        self.roles.replace_user_roles(admin.id, &[role.id], admin.id).await?;
        tracing::info!(user_id = admin.id, %username, "Bootstrap administrator created");
        Ok(())
    }
}
