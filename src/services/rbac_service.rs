// src/services/rbac_service.rs

use std::collections::HashSet;
use std::sync::Arc;

use crate::common::error::AppError;
use crate::db::{PermissionRepository, RoleRepository, UserRepository, distinct_ids};
use crate::models::rbac::Role;

/// Authorization checks and RBAC link assignment.
///
/// Checks re-read the user's grants on every call. An empty code list passes
/// both `has_any_permission` and `has_all_permissions`.
#[derive(Clone)]
pub struct RbacService {
    users: Arc<dyn UserRepository>,
    roles: Arc<dyn RoleRepository>,
    permissions: Arc<dyn PermissionRepository>,
}

impl RbacService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        roles: Arc<dyn RoleRepository>,
        permissions: Arc<dyn PermissionRepository>,
    ) -> Self {
        Self { users, roles, permissions }
    }

    /// Codes of every enabled permission reachable through the user's enabled roles.
    pub async fn permission_codes(&self, user_id: i64) -> Result<HashSet<String>, AppError> {
        let permissions = self.permissions.find_by_user(user_id).await?;
        Ok(permissions.into_iter().map(|p| p.code).collect())
    }

    pub async fn has_permission(&self, user_id: i64, code: &str) -> Result<bool, AppError> {
        Ok(self.permission_codes(user_id).await?.contains(code))
    }

    pub async fn has_any_permission(&self, user_id: i64, codes: &[String]) -> Result<bool, AppError> {
        if codes.is_empty() {
            return Ok(true);
        }
        let granted = self.permission_codes(user_id).await?;
        Ok(codes.iter().any(|c| granted.contains(c)))
    }

    pub async fn has_all_permissions(&self, user_id: i64, codes: &[String]) -> Result<bool, AppError> {
        if codes.is_empty() {
            return Ok(true);
        }
        let granted = self.permission_codes(user_id).await?;
        Ok(codes.iter().all(|c| granted.contains(c)))
    }

    /// Replaces the role's permission set. An empty list leaves the role with none.
    pub async fn assign_role_permissions(
        &self,
        role_id: i64,
        permission_ids: &[i64],
        actor: i64,
    ) -> Result<(), AppError> {
        self.roles
            .find_by_id(role_id)
            .await?
            .ok_or_else(|| AppError::not_found("Role not found."))?;

        let ids = distinct_ids(permission_ids);
        if !ids.is_empty() && self.permissions.count_existing(&ids).await? != ids.len() as i64 {
            return Err(AppError::not_found("One or more permissions do not exist."));
        }

        self.roles.replace_permissions(role_id, &ids, actor).await?;
        tracing::info!(role_id, count = ids.len(), actor, "Role permissions assigned");
        Ok(())
    }

    /// Replaces the user's role set. An empty list leaves the user with none.
    pub async fn assign_user_roles(&self, user_id: i64, role_ids: &[i64], actor: i64) -> Result<(), AppError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found."))?;

        let ids = distinct_ids(role_ids);
        if !ids.is_empty() && self.roles.count_existing(&ids).await? != ids.len() as i64 {
            return Err(AppError::not_found("One or more roles do not exist."));
        }

        self.roles.replace_user_roles(user_id, &ids, actor).await?;
        tracing::info!(user_id, count = ids.len(), actor, "User roles assigned");
        Ok(())
    }

    pub async fn permission_ids_for_role(&self, role_id: i64) -> Result<Vec<i64>, AppError> {
        self.roles.permission_ids(role_id).await
    }

    pub async fn role_ids_for_user(&self, user_id: i64) -> Result<Vec<i64>, AppError> {
        self.roles.role_ids_for_user(user_id).await
    }

    pub async fn roles_for_user(&self, user_id: i64) -> Result<Vec<Role>, AppError> {
        self.roles.find_by_user(user_id).await
    }

    /// Codes of the user's enabled roles.
    pub async fn role_codes(&self, user_id: i64) -> Result<Vec<String>, AppError> {
        let roles = self.roles.find_by_user(user_id).await?;
        Ok(roles.into_iter().filter(|r| r.enabled).map(|r| r.code).collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::NewUser;
    use crate::db::memory::MemoryDb;
    use crate::models::auth::{Gender, UserStatus};
    use crate::models::rbac::{DataScope, PermissionType, RolePayload};

    pub(crate) fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            password_hash: "hash".to_string(),
            nickname: None,
            email: None,
            phone: None,
            avatar: None,
            gender: Gender::Unknown,
            birthday: None,
            status: UserStatus::Enabled,
            remark: None,
        }
    }

    pub(crate) fn role_payload(code: &str) -> RolePayload {
        RolePayload {
            name: format!("{} name", code),
            code: code.to_string(),
            sort_order: 0,
            data_scope: DataScope::All,
            remark: None,
            permission_ids: None,
        }
    }

    fn service(db: &Arc<MemoryDb>) -> RbacService {
        RbacService::new(db.clone(), db.clone(), db.clone())
    }

    #[tokio::test]
    async fn permission_checks_follow_role_grants() {
        let db = Arc::new(MemoryDb::new());
        let rbac = service(&db);
        let list = db.insert_permission(0, "system:user:list", PermissionType::Menu);
        db.insert_permission(0, "system:user:delete", PermissionType::Button);
        let user = UserRepository::create(db.as_ref(), &new_user("alice"), None).await.unwrap();
        let role = RoleRepository::create(db.as_ref(), &role_payload("ROLE_VIEWER"), 1).await.unwrap();

        rbac.assign_role_permissions(role.id, &[list.id], 1).await.unwrap();
        rbac.assign_user_roles(user.id, &[role.id], 1).await.unwrap();

        assert!(rbac.has_permission(user.id, "system:user:list").await.unwrap());
        assert!(!rbac.has_permission(user.id, "system:user:delete").await.unwrap());

        let both = vec!["system:user:list".to_string(), "system:user:delete".to_string()];
        assert!(rbac.has_any_permission(user.id, &both).await.unwrap());
        assert!(!rbac.has_all_permissions(user.id, &both).await.unwrap());
    }

    #[tokio::test]
    async fn empty_code_lists_are_vacuously_true() {
        let db = Arc::new(MemoryDb::new());
        let rbac = service(&db);
        assert!(rbac.has_any_permission(42, &[]).await.unwrap());
        assert!(rbac.has_all_permissions(42, &[]).await.unwrap());
    }

    #[tokio::test]
    async fn assignment_replaces_instead_of_adding() {
        let db = Arc::new(MemoryDb::new());
        let rbac = service(&db);
        let a = db.insert_permission(0, "a", PermissionType::Menu);
        let b = db.insert_permission(0, "b", PermissionType::Menu);
        let role = RoleRepository::create(db.as_ref(), &role_payload("ROLE_X"), 1).await.unwrap();

        rbac.assign_role_permissions(role.id, &[a.id, b.id, a.id], 1).await.unwrap();
        assert_eq!(rbac.permission_ids_for_role(role.id).await.unwrap(), vec![a.id, b.id]);

        rbac.assign_role_permissions(role.id, &[], 1).await.unwrap();
        assert!(rbac.permission_ids_for_role(role.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleted_role_cannot_receive_permissions() {
        let db = Arc::new(MemoryDb::new());
        let rbac = service(&db);
        let a = db.insert_permission(0, "a", PermissionType::Menu);
        let role = RoleRepository::create(db.as_ref(), &role_payload("ROLE_GONE"), 1).await.unwrap();
        RoleRepository::delete(db.as_ref(), role.id, 1).await.unwrap();

        let err = rbac.assign_role_permissions(role.id, &[a.id], 1).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(RoleRepository::permission_ids(db.as_ref(), role.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn user_roles_round_trip_regardless_of_prior_state() {
        let db = Arc::new(MemoryDb::new());
        let rbac = service(&db);
        let user = UserRepository::create(db.as_ref(), &new_user("bob"), None).await.unwrap();
        let r1 = RoleRepository::create(db.as_ref(), &role_payload("R1"), 1).await.unwrap();
        let r2 = RoleRepository::create(db.as_ref(), &role_payload("R2"), 1).await.unwrap();
        let r3 = RoleRepository::create(db.as_ref(), &role_payload("R3"), 1).await.unwrap();

        rbac.assign_user_roles(user.id, &[r3.id], 1).await.unwrap();
        rbac.assign_user_roles(user.id, &[r2.id, r1.id], 1).await.unwrap();

        let mut ids: Vec<i64> = rbac.roles_for_user(user.id).await.unwrap().iter().map(|r| r.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![r1.id, r2.id]);
    }

    #[tokio::test]
    async fn unknown_ids_are_rejected() {
        let db = Arc::new(MemoryDb::new());
        let rbac = service(&db);
        let role = RoleRepository::create(db.as_ref(), &role_payload("R"), 1).await.unwrap();

        let err = rbac.assign_role_permissions(role.id, &[999], 1).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = rbac.assign_user_roles(999, &[role.id], 1).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn disabled_roles_grant_nothing() {
        let db = Arc::new(MemoryDb::new());
        let rbac = service(&db);
        let p = db.insert_permission(0, "system:role:list", PermissionType::Menu);
        let user = UserRepository::create(db.as_ref(), &new_user("carol"), None).await.unwrap();
        let role = RoleRepository::create(db.as_ref(), &role_payload("R"), 1).await.unwrap();
        rbac.assign_role_permissions(role.id, &[p.id], 1).await.unwrap();
        rbac.assign_user_roles(user.id, &[role.id], 1).await.unwrap();

        RoleRepository::update_status(db.as_ref(), &[role.id], false, 1).await.unwrap();
        assert!(!rbac.has_permission(user.id, "system:role:list").await.unwrap());
        assert!(rbac.role_codes(user.id).await.unwrap().is_empty());
    }
}
