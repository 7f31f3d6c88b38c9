// src/handlers/permissions.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use validator::Validate;

use crate::{
    common::{
        error::{ApiError, AppError},
        pagination::PageResult,
    },
    config::AppState,
    middleware::{
        auth::AuthenticatedUser,
        rbac::{
            PermPermissionCreate, PermPermissionDelete, PermPermissionList, PermPermissionQuery,
            PermPermissionUpdate, RequirePermission,
        },
    },
    models::rbac::{
        BatchStatusPayload, CheckMode, IdsPayload, Permission, PermissionCheckPayload, PermissionCheckResponse,
        PermissionPayload, PermissionQuery, PermissionTreeNode, PermissionType, StatusPayload,
    },
};

#[utoipa::path(
    get,
    path = "/api/permissions",
    tag = "Permissions",
    params(PermissionQuery),
    responses((status = 200, description = "One page of permissions", body = PageResult<Permission>)),
    security(("api_jwt" = []))
)]
pub async fn list_permissions(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermPermissionList>,
    Query(query): Query<PermissionQuery>,
) -> Result<Json<PageResult<Permission>>, ApiError> {
    Ok(Json(app_state.permission_service.page(&query).await?))
}

#[utoipa::path(
    get,
    path = "/api/permissions/tree",
    tag = "Permissions",
    responses(
        (status = 200, description = "The whole permission forest", body = [PermissionTreeNode]),
        (status = 400, description = "The stored hierarchy contains a cycle")
    ),
    security(("api_jwt" = []))
)]
pub async fn permission_tree(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermPermissionList>,
) -> Result<Json<Vec<PermissionTreeNode>>, ApiError> {
    Ok(Json(app_state.permission_service.tree().await?))
}

#[utoipa::path(
    get,
    path = "/api/permissions/{id}",
    tag = "Permissions",
    params(("id" = i64, Path, description = "Permission id")),
    responses(
        (status = 200, description = "The permission", body = Permission),
        (status = 404, description = "Permission not found")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_permission(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermPermissionQuery>,
    Path(id): Path<i64>,
) -> Result<Json<Permission>, ApiError> {
    Ok(Json(app_state.permission_service.detail(id).await?))
}

#[utoipa::path(
    get,
    path = "/api/permissions/code/{code}",
    tag = "Permissions",
    params(("code" = String, Path, description = "Permission code")),
    responses(
        (status = 200, description = "The permission", body = Permission),
        (status = 404, description = "Permission not found")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_permission_by_code(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermPermissionQuery>,
    Path(code): Path<String>,
) -> Result<Json<Permission>, ApiError> {
    Ok(Json(app_state.permission_service.find_by_code(&code).await?))
}

#[utoipa::path(
    get,
    path = "/api/permissions/type/{permission_type}",
    tag = "Permissions",
    params(("permission_type" = PermissionType, Path, description = "directory, menu, button or api")),
    responses((status = 200, description = "Enabled permissions of that type", body = [Permission])),
    security(("api_jwt" = []))
)]
pub async fn permissions_by_type(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermPermissionList>,
    Path(permission_type): Path<PermissionType>,
) -> Result<Json<Vec<Permission>>, ApiError> {
    Ok(Json(app_state.permission_service.by_type(permission_type).await?))
}

#[utoipa::path(
    get,
    path = "/api/permissions/role/{role_id}",
    tag = "Permissions",
    params(("role_id" = i64, Path, description = "Role id")),
    responses((status = 200, description = "Permissions granted to the role", body = [Permission])),
    security(("api_jwt" = []))
)]
pub async fn permissions_by_role(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermPermissionList>,
    Path(role_id): Path<i64>,
) -> Result<Json<Vec<Permission>>, ApiError> {
    Ok(Json(app_state.permission_service.by_role(role_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/permissions",
    tag = "Permissions",
    request_body = PermissionPayload,
    responses(
        (status = 201, description = "Permission created", body = Permission),
        (status = 404, description = "Parent not found"),
        (status = 409, description = "Code already taken")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_permission(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermPermissionCreate>,
    Json(payload): Json<PermissionPayload>,
) -> Result<(StatusCode, Json<Permission>), ApiError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let permission = app_state.permission_service.create(&payload, user.id()).await?;
    Ok((StatusCode::CREATED, Json(permission)))
}

#[utoipa::path(
    put,
    path = "/api/permissions/{id}",
    tag = "Permissions",
    params(("id" = i64, Path, description = "Permission id")),
    request_body = PermissionPayload,
    responses(
        (status = 200, description = "Permission updated", body = Permission),
        (status = 400, description = "Parent would create a cycle"),
        (status = 404, description = "Permission or parent not found"),
        (status = 409, description = "Code already taken")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_permission(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermPermissionUpdate>,
    Path(id): Path<i64>,
    Json(payload): Json<PermissionPayload>,
) -> Result<Json<Permission>, ApiError> {
    payload.validate().map_err(AppError::ValidationError)?;

    Ok(Json(app_state.permission_service.update(id, &payload, user.id()).await?))
}

#[utoipa::path(
    delete,
    path = "/api/permissions/{id}",
    tag = "Permissions",
    params(("id" = i64, Path, description = "Permission id")),
    responses(
        (status = 204, description = "Permission deleted"),
        (status = 404, description = "Permission not found"),
        (status = 412, description = "Permission still has children")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_permission(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermPermissionDelete>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    app_state.permission_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/permissions/batch-delete",
    tag = "Permissions",
    request_body = IdsPayload,
    responses((status = 200, description = "Number of permissions deleted", body = usize)),
    security(("api_jwt" = []))
)]
pub async fn delete_permissions(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermPermissionDelete>,
    Json(payload): Json<IdsPayload>,
) -> Result<Json<usize>, ApiError> {
    Ok(Json(app_state.permission_service.delete_batch(&payload.ids).await?))
}

#[utoipa::path(
    put,
    path = "/api/permissions/{id}/status",
    tag = "Permissions",
    params(("id" = i64, Path, description = "Permission id")),
    request_body = StatusPayload,
    responses((status = 204, description = "Status changed")),
    security(("api_jwt" = []))
)]
pub async fn update_permission_status(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermPermissionUpdate>,
    Path(id): Path<i64>,
    Json(payload): Json<StatusPayload>,
) -> Result<StatusCode, ApiError> {
    app_state
        .permission_service
        .update_status(id, payload.enabled, user.id())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/api/permissions/status",
    tag = "Permissions",
    request_body = BatchStatusPayload,
    responses((status = 200, description = "Number of permissions changed", body = u64)),
    security(("api_jwt" = []))
)]
pub async fn update_permissions_status(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermPermissionUpdate>,
    Json(payload): Json<BatchStatusPayload>,
) -> Result<Json<u64>, ApiError> {
    let changed = app_state
        .permission_service
        .update_status_batch(&payload.ids, payload.enabled, user.id())
        .await?;
    Ok(Json(changed))
}

/// Whether the caller holds any (or all) of the given codes.
#[utoipa::path(
    post,
    path = "/api/permissions/check",
    tag = "Permissions",
    request_body = PermissionCheckPayload,
    responses((status = 200, description = "Check outcome", body = PermissionCheckResponse)),
    security(("api_jwt" = []))
)]
pub async fn check_permissions(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<PermissionCheckPayload>,
) -> Result<Json<PermissionCheckResponse>, ApiError> {
    let rbac = &app_state.rbac_service;
    let granted = match payload.mode {
        CheckMode::Any => rbac.has_any_permission(user.id(), &payload.codes).await?,
        CheckMode::All => rbac.has_all_permissions(user.id(), &payload.codes).await?,
    };
    Ok(Json(PermissionCheckResponse { granted }))
}
