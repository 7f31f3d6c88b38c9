// src/models/rbac.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::common::pagination::PageQuery;

/// Parent id of every top-level permission node.
pub const TREE_ROOT: i64 = 0;

// ---
// ENUMS
// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum PermissionType {
    Directory = 1,
    Menu = 2,
    Button = 3,
    Api = 4,
}

impl PermissionType {
    /// Directory and menu nodes make up the navigation tree.
    pub fn is_navigation(self) -> bool {
        matches!(self, PermissionType::Directory | PermissionType::Menu)
    }
}

// Which rows a role's members may see; enforced by downstream queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum DataScope {
    #[default]
    All = 1,
    Custom = 2,
    Department = 3,
    DepartmentAndBelow = 4,
    SelfOnly = 5,
}

// ---
// PERMISSIONS
// ---

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    #[schema(example = 12)]
    pub id: i64,

    #[schema(example = 0)]
    pub parent_id: i64,

    #[schema(example = "User management")]
    pub name: String,

    #[schema(example = "system:user:list")]
    pub code: String,

    pub permission_type: PermissionType,

    #[schema(example = "/system/user")]
    pub path: Option<String>,

    #[schema(example = "system/user/index")]
    pub component: Option<String>,

    #[schema(example = "user")]
    pub icon: Option<String>,

    pub order_num: i32,
    pub enabled: bool,
    pub visible: bool,
    pub remark: Option<String>,

    #[schema(ignore)]
    pub created_by: Option<i64>,
    #[schema(ignore)]
    pub updated_by: Option<i64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

// A node of the permission/menu tree.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PermissionTreeNode {
    #[serde(flatten)]
    pub permission: Permission,

    pub has_children: bool,

    #[schema(no_recursion)]
    pub children: Vec<PermissionTreeNode>,
}

// Used for both create and full update.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PermissionPayload {
    #[serde(default)]
    #[schema(example = 0)]
    pub parent_id: i64,

    #[validate(length(min = 1, max = 50, message = "Permission name must be 1-50 characters."))]
    #[schema(example = "User management")]
    pub name: String,

    #[validate(length(min = 1, max = 100, message = "Permission code must be 1-100 characters."))]
    #[schema(example = "system:user:list")]
    pub code: String,

    pub permission_type: PermissionType,

    pub path: Option<String>,
    pub component: Option<String>,
    pub icon: Option<String>,

    #[serde(default)]
    pub order_num: i32,

    // Defaults to visible when omitted.
    pub visible: Option<bool>,

    pub remark: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct PermissionQuery {
    pub current: Option<i64>,
    pub size: Option<i64>,
    pub name: Option<String>,
    pub code: Option<String>,
    pub permission_type: Option<PermissionType>,
    pub enabled: Option<bool>,
    pub visible: Option<bool>,
    pub parent_id: Option<i64>,
}

impl PermissionQuery {
    pub fn page(&self) -> PageQuery {
        PageQuery { current: self.current, size: self.size, keyword: None }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckMode {
    Any,
    All,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PermissionCheckPayload {
    #[schema(example = json!(["system:user:list", "system:user:create"]))]
    pub codes: Vec<String>,
    pub mode: CheckMode,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionCheckResponse {
    pub granted: bool,
}

// ---
// ROLES
// ---

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    #[schema(example = 2)]
    pub id: i64,

    #[schema(example = "Administrator")]
    pub name: String,

    #[schema(example = "ROLE_ADMIN")]
    pub code: String,

    pub sort_order: i32,
    pub data_scope: DataScope,
    pub enabled: bool,
    pub remark: Option<String>,

    #[schema(ignore)]
    pub created_by: Option<i64>,
    #[schema(ignore)]
    pub updated_by: Option<i64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RolePayload {
    #[validate(length(min = 1, max = 30, message = "Role name must be 1-30 characters."))]
    #[schema(example = "Auditor")]
    pub name: String,

    #[validate(length(min = 1, max = 100, message = "Role code must be 1-100 characters."))]
    #[schema(example = "ROLE_AUDITOR")]
    pub code: String,

    #[serde(default)]
    pub sort_order: i32,

    #[serde(default)]
    pub data_scope: DataScope,

    pub remark: Option<String>,

    // When present, replaces the role's permission set in the same transaction.
    #[schema(example = json!([1, 2, 3]))]
    pub permission_ids: Option<Vec<i64>>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleDetail {
    #[serde(flatten)]
    pub role: Role,

    pub permission_ids: Vec<i64>,
    pub user_count: i64,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct RoleQuery {
    pub current: Option<i64>,
    pub size: Option<i64>,
    pub name: Option<String>,
    pub code: Option<String>,
    pub enabled: Option<bool>,
    pub data_scope: Option<DataScope>,
}

impl RoleQuery {
    pub fn page(&self) -> PageQuery {
        PageQuery { current: self.current, size: self.size, keyword: None }
    }
}

// ---
// ASSIGNMENT & STATUS PAYLOADS
// ---

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignPermissionsPayload {
    #[serde(default)]
    #[schema(example = json!([1, 2, 3]))]
    pub permission_ids: Vec<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignRolesPayload {
    #[serde(default)]
    #[schema(example = json!([2]))]
    pub role_ids: Vec<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusPayload {
    pub enabled: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchStatusPayload {
    pub ids: Vec<i64>,
    pub enabled: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct IdsPayload {
    pub ids: Vec<i64>,
}
