// src/services/permission_service.rs

use std::collections::HashMap;
use std::sync::Arc;

use crate::common::error::AppError;
use crate::common::pagination::PageResult;
use crate::db::{PermissionRepository, distinct_ids};
use crate::models::rbac::{
    Permission, PermissionPayload, PermissionQuery, PermissionTreeNode, PermissionType, TREE_ROOT,
};
use crate::services::permission_tree::build_tree;

#[derive(Clone)]
pub struct PermissionService {
    permissions: Arc<dyn PermissionRepository>,
}

impl PermissionService {
    pub fn new(permissions: Arc<dyn PermissionRepository>) -> Self {
        Self { permissions }
    }

    pub async fn page(&self, query: &PermissionQuery) -> Result<PageResult<Permission>, AppError> {
        let (records, total) = self.permissions.find_page(query).await?;
        Ok(PageResult::new(&query.page(), total, records))
    }

    pub async fn detail(&self, id: i64) -> Result<Permission, AppError> {
        self.permissions
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Permission {} not found.", id)))
    }

    pub async fn find_by_code(&self, code: &str) -> Result<Permission, AppError> {
        self.permissions
            .find_by_code(code)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Permission '{}' not found.", code)))
    }

    pub async fn by_type(&self, permission_type: PermissionType) -> Result<Vec<Permission>, AppError> {
        self.permissions.find_by_type(permission_type).await
    }

    pub async fn by_role(&self, role_id: i64) -> Result<Vec<Permission>, AppError> {
        self.permissions.find_by_role(role_id).await
    }

    /// The whole permission forest.
    pub async fn tree(&self) -> Result<Vec<PermissionTreeNode>, AppError> {
        build_tree(self.permissions.find_all().await?)
    }

    /// Visible directories and menus the user reaches through enabled roles.
    pub async fn menu_tree(&self, user_id: i64) -> Result<Vec<PermissionTreeNode>, AppError> {
        let menus = self
            .permissions
            .find_by_user(user_id)
            .await?
            .into_iter()
            .filter(|p| p.permission_type.is_navigation() && p.visible)
            .collect();
        build_tree(menus)
    }

    pub async fn button_codes(&self, user_id: i64) -> Result<Vec<String>, AppError> {
        let permissions = self.permissions.find_by_user(user_id).await?;
        Ok(permissions
            .into_iter()
            .filter(|p| p.permission_type == PermissionType::Button)
            .map(|p| p.code)
            .collect())
    }

    async fn check_parent(&self, id: Option<i64>, parent_id: i64) -> Result<(), AppError> {
        if parent_id == TREE_ROOT {
            return Ok(());
        }
        if Some(parent_id) == id {
            return Err(AppError::validation("A permission cannot be its own parent."));
        }
        if self.permissions.find_by_id(parent_id).await?.is_none() {
            return Err(AppError::not_found(format!("Parent permission {} not found.", parent_id)));
        }

        // Re-parenting under one of its own descendants would close a loop.
        if let Some(id) = id {
            let parent_of: HashMap<i64, i64> = self
                .permissions
                .find_all()
                .await?
                .into_iter()
                .map(|p| (p.id, p.parent_id))
                .collect();
            let mut current = parent_id;
            let mut steps = 0;
            while current != TREE_ROOT && steps <= parent_of.len() {
                if current == id {
                    return Err(AppError::validation(
                        "A permission cannot be moved under one of its descendants.",
                    ));
                }
                current = parent_of.get(&current).copied().unwrap_or(TREE_ROOT);
                steps += 1;
            }
        }
        Ok(())
    }

    pub async fn create(&self, payload: &PermissionPayload, actor: i64) -> Result<Permission, AppError> {
        if self.permissions.code_exists(&payload.code, None).await? {
            return Err(AppError::conflict(format!("Permission code '{}' already exists.", payload.code)));
        }
        self.check_parent(None, payload.parent_id).await?;

        let permission = self.permissions.create(payload, actor).await?;
        tracing::info!(permission_id = permission.id, code = %permission.code, actor, "Permission created");
        Ok(permission)
    }

    pub async fn update(&self, id: i64, payload: &PermissionPayload, actor: i64) -> Result<Permission, AppError> {
        self.detail(id).await?;
        if self.permissions.code_exists(&payload.code, Some(id)).await? {
            return Err(AppError::conflict(format!("Permission code '{}' already exists.", payload.code)));
        }
        self.check_parent(Some(id), payload.parent_id).await?;

        let permission = self.permissions.update(id, payload, actor).await?;
        tracing::info!(permission_id = id, actor, "Permission updated");
        Ok(permission)
    }

    async fn check_deletable(&self, id: i64) -> Result<Permission, AppError> {
        let permission = self.detail(id).await?;
        if self.permissions.count_children(id).await? > 0 {
            return Err(AppError::PreconditionFailed(format!(
                "Permission '{}' still has children.",
                permission.name
            )));
        }
        Ok(permission)
    }

    /// Hard-deletes a childless node and its role links.
    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        self.check_deletable(id).await?;
        self.permissions.delete(id).await?;
        tracing::info!(permission_id = id, "Permission deleted");
        Ok(())
    }

    /// Every node must be childless; nothing is deleted otherwise.
    pub async fn delete_batch(&self, ids: &[i64]) -> Result<usize, AppError> {
        let ids = distinct_ids(ids);
        for id in &ids {
            self.check_deletable(*id).await?;
        }
        for id in &ids {
            self.permissions.delete(*id).await?;
        }
        tracing::info!(count = ids.len(), "Permissions deleted");
        Ok(ids.len())
    }

    pub async fn update_status(&self, id: i64, enabled: bool, actor: i64) -> Result<(), AppError> {
        self.detail(id).await?;
        self.permissions.update_status(&[id], enabled, actor).await?;
        Ok(())
    }

    pub async fn update_status_batch(&self, ids: &[i64], enabled: bool, actor: i64) -> Result<u64, AppError> {
        let affected = self.permissions.update_status(ids, enabled, actor).await?;
        tracing::info!(affected, enabled, actor, "Permission status changed");
        Ok(affected)
    }
}
