// src/services/role_service.rs

use std::sync::Arc;

use crate::common::error::AppError;
use crate::common::pagination::PageResult;
use crate::db::{PermissionRepository, RoleRepository, distinct_ids};
use crate::models::rbac::{Role, RoleDetail, RolePayload, RoleQuery};

#[derive(Clone)]
pub struct RoleService {
    roles: Arc<dyn RoleRepository>,
    permissions: Arc<dyn PermissionRepository>,
}

impl RoleService {
    pub fn new(roles: Arc<dyn RoleRepository>, permissions: Arc<dyn PermissionRepository>) -> Self {
        Self { roles, permissions }
    }

    pub async fn page(&self, query: &RoleQuery) -> Result<PageResult<Role>, AppError> {
        let (records, total) = self.roles.find_page(query).await?;
        Ok(PageResult::new(&query.page(), total, records))
    }

    async fn require(&self, id: i64) -> Result<Role, AppError> {
        self.roles
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Role {} not found.", id)))
    }

    pub async fn detail(&self, id: i64) -> Result<RoleDetail, AppError> {
        let role = self.require(id).await?;
        let permission_ids = self.roles.permission_ids(id).await?;
        let user_count = self.roles.count_users(id).await?;
        Ok(RoleDetail { role, permission_ids, user_count })
    }

    pub async fn find_by_code(&self, code: &str) -> Result<Role, AppError> {
        self.roles
            .find_by_code(code)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Role '{}' not found.", code)))
    }

    pub async fn enabled(&self) -> Result<Vec<Role>, AppError> {
        self.roles.find_enabled().await
    }

    // Code and name are unique among live roles; checked before writing.
    async fn check_unique(&self, payload: &RolePayload, exclude_id: Option<i64>) -> Result<(), AppError> {
        if self.roles.code_exists(&payload.code, exclude_id).await? {
            return Err(AppError::conflict(format!("Role code '{}' already exists.", payload.code)));
        }
        if self.roles.name_exists(&payload.name, exclude_id).await? {
            return Err(AppError::conflict(format!("Role name '{}' already exists.", payload.name)));
        }
        Ok(())
    }

    async fn check_permissions(&self, payload: &RolePayload) -> Result<(), AppError> {
        if let Some(ids) = &payload.permission_ids {
            let ids = distinct_ids(ids);
            if !ids.is_empty() && self.permissions.count_existing(&ids).await? != ids.len() as i64 {
                return Err(AppError::not_found("One or more permissions do not exist."));
            }
        }
        Ok(())
    }

    pub async fn create(&self, payload: &RolePayload, actor: i64) -> Result<Role, AppError> {
        self.check_unique(payload, None).await?;
        self.check_permissions(payload).await?;

        let role = self.roles.create(payload, actor).await?;
        tracing::info!(role_id = role.id, code = %role.code, actor, "Role created");
        Ok(role)
    }

    pub async fn update(&self, id: i64, payload: &RolePayload, actor: i64) -> Result<Role, AppError> {
        self.require(id).await?;
        self.check_unique(payload, Some(id)).await?;
        self.check_permissions(payload).await?;

        let role = self.roles.update(id, payload, actor).await?;
        tracing::info!(role_id = id, actor, "Role updated");
        Ok(role)
    }

    async fn check_deletable(&self, id: i64) -> Result<(), AppError> {
        let role = self.require(id).await?;
        let holders = self.roles.count_users(id).await?;
        if holders > 0 {
            return Err(AppError::PreconditionFailed(format!(
                "Role '{}' is still assigned to {} user(s).",
                role.name, holders
            )));
        }
        Ok(())
    }

    /// Soft-deletes a role nobody holds, together with its permission links.
    pub async fn delete(&self, id: i64, actor: i64) -> Result<(), AppError> {
        self.check_deletable(id).await?;
        self.roles.delete(id, actor).await?;
        tracing::info!(role_id = id, actor, "Role deleted");
        Ok(())
    }

    /// Every role is checked before any is deleted.
    pub async fn delete_batch(&self, ids: &[i64], actor: i64) -> Result<usize, AppError> {
        let ids = distinct_ids(ids);
        for id in &ids {
            self.check_deletable(*id).await?;
        }
        for id in &ids {
            self.roles.delete(*id, actor).await?;
        }
        tracing::info!(count = ids.len(), actor, "Roles deleted");
        Ok(ids.len())
    }

    pub async fn update_status(&self, id: i64, enabled: bool, actor: i64) -> Result<(), AppError> {
        self.require(id).await?;
        self.roles.update_status(&[id], enabled, actor).await?;
        tracing::info!(role_id = id, enabled, actor, "Role status changed");
        Ok(())
    }

    pub async fn update_status_batch(&self, ids: &[i64], enabled: bool, actor: i64) -> Result<u64, AppError> {
        let affected = self.roles.update_status(ids, enabled, actor).await?;
        tracing::info!(affected, enabled, actor, "Role status changed");
        Ok(affected)
    }
}
