// src/services/social_service.rs

use std::sync::Arc;

use crate::common::error::AppError;
use crate::db::{SocialRepository, UserRepository};
use crate::models::auth::User;
use crate::models::social::{BindSocialPayload, SocialType, UserSocial};

/// Binding of third-party accounts to local users. One binding per provider
/// per user, and a provider account belongs to at most one user.
#[derive(Clone)]
pub struct SocialService {
    socials: Arc<dyn SocialRepository>,
    users: Arc<dyn UserRepository>,
}

impl SocialService {
    pub fn new(socials: Arc<dyn SocialRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { socials, users }
    }

    pub async fn bind(&self, user_id: i64, payload: &BindSocialPayload) -> Result<UserSocial, AppError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found."))?;

        let social_id = payload.social_id.trim();
        if let Some(existing) = self.socials.find_by_social(payload.social_type, social_id).await? {
            let message = if existing.user_id == user_id {
                "This account is already bound to you."
            } else {
                "This account is bound to another user."
            };
            return Err(AppError::conflict(message));
        }

        let already = self.socials.find_by_user(user_id).await?;
        if already.iter().any(|s| s.social_type == payload.social_type) {
            return Err(AppError::conflict(format!(
                "A {} account is already bound; unbind it first.",
                payload.social_type.as_str()
            )));
        }

        let payload = BindSocialPayload { social_id: social_id.to_string(), ..payload.clone() };
        let social = self.socials.create(user_id, &payload).await?;
        tracing::info!(user_id, provider = payload.social_type.as_str(), "Social account bound");
        Ok(social)
    }

    pub async fn unbind(&self, user_id: i64, social_type: SocialType) -> Result<(), AppError> {
        if !self.socials.delete(user_id, social_type).await? {
            return Err(AppError::not_found(format!(
                "No {} account is bound.",
                social_type.as_str()
            )));
        }
        tracing::info!(user_id, provider = social_type.as_str(), "Social account unbound");
        Ok(())
    }

    pub async fn list(&self, user_id: i64) -> Result<Vec<UserSocial>, AppError> {
        self.socials.find_by_user(user_id).await
    }

    /// The live user behind a provider account, recording the social login.
    pub async fn find_user(&self, social_type: SocialType, social_id: &str) -> Result<Option<User>, AppError> {
        let Some(social) = self.socials.find_by_social(social_type, social_id.trim()).await? else {
            return Ok(None);
        };
        let user = self.users.find_by_id(social.user_id).await?;
        if user.is_some() {
            self.socials.record_login(social.id).await?;
        }
        Ok(user)
    }
}
