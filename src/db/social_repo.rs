// src/db/social_repo.rs

use sqlx::PgPool;

use crate::common::error::AppError;
use crate::db::map_unique_violation;
use crate::models::social::{BindSocialPayload, SocialType, UserSocial};

// Everything but the provider tokens.
const SOCIAL_COLUMNS: &str = "id, user_id, social_type, social_id, social_nickname, social_avatar, \
    social_email, union_id, open_id, expires_in, bind_time, last_login_time, login_count";

#[async_trait::async_trait]
pub trait SocialRepository: Send + Sync {
    async fn find_by_social(&self, social_type: SocialType, social_id: &str) -> Result<Option<UserSocial>, AppError>;
    async fn find_by_user(&self, user_id: i64) -> Result<Vec<UserSocial>, AppError>;
    async fn create(&self, user_id: i64, payload: &BindSocialPayload) -> Result<UserSocial, AppError>;

    /// Returns whether a binding was removed.
    async fn delete(&self, user_id: i64, social_type: SocialType) -> Result<bool, AppError>;

    async fn record_login(&self, id: i64) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct PgSocialRepository {
    pool: PgPool,
}

impl PgSocialRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SocialRepository for PgSocialRepository {
    async fn find_by_social(&self, social_type: SocialType, social_id: &str) -> Result<Option<UserSocial>, AppError> {
        let social = sqlx::query_as::<_, UserSocial>(&format!(
            "SELECT {} FROM sys_user_social WHERE social_type = $1 AND social_id = $2",
            SOCIAL_COLUMNS
        ))
        .bind(social_type.as_str())
        .bind(social_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(social)
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<UserSocial>, AppError> {
        let socials = sqlx::query_as::<_, UserSocial>(&format!(
            "SELECT {} FROM sys_user_social WHERE user_id = $1 ORDER BY bind_time",
            SOCIAL_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(socials)
    }

    async fn create(&self, user_id: i64, payload: &BindSocialPayload) -> Result<UserSocial, AppError> {
        sqlx::query_as::<_, UserSocial>(&format!(
            r#"
            INSERT INTO sys_user_social (
                user_id, social_type, social_id, social_nickname, social_avatar, social_email,
                union_id, open_id, access_token, refresh_token, expires_in
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {}
            "#,
            SOCIAL_COLUMNS
        ))
        .bind(user_id)
        .bind(payload.social_type.as_str())
        .bind(&payload.social_id)
        .bind(&payload.social_nickname)
        .bind(&payload.social_avatar)
        .bind(&payload.social_email)
        .bind(&payload.union_id)
        .bind(&payload.open_id)
        .bind(&payload.access_token)
        .bind(&payload.refresh_token)
        .bind(payload.expires_in)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "This social account is already bound."))
    }

    async fn delete(&self, user_id: i64, social_type: SocialType) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM sys_user_social WHERE user_id = $1 AND social_type = $2")
            .bind(user_id)
            .bind(social_type.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_login(&self, id: i64) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE sys_user_social SET last_login_time = NOW(), login_count = login_count + 1 WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
