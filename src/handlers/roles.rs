// src/handlers/roles.rs

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
            PermRoleAssignPermission, PermRoleCreate, PermRoleDelete, PermRoleList, PermRoleQuery, PermRoleUpdate,
            RequirePermission,
        },
    },
    models::rbac::{
        AssignPermissionsPayload, BatchStatusPayload, IdsPayload, Role, RoleDetail, RolePayload, RoleQuery,
        StatusPayload,
    },
};

#[utoipa::path(
    get,
    path = "/api/roles",
    tag = "Roles",
    params(RoleQuery),
    responses((status = 200, description = "One page of roles", body = PageResult<Role>)),
    security(("api_jwt" = []))
)]
pub async fn list_roles(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermRoleList>,
    Query(query): Query<RoleQuery>,
) -> Result<Json<PageResult<Role>>, ApiError> {
    Ok(Json(app_state.role_service.page(&query).await?))
}

#[utoipa::path(
    get,
    path = "/api/roles/enabled",
    tag = "Roles",
    responses((status = 200, description = "Every enabled role", body = [Role])),
    security(("api_jwt" = []))
)]
pub async fn enabled_roles(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermRoleList>,
) -> Result<Json<Vec<Role>>, ApiError> {
    Ok(Json(app_state.role_service.enabled().await?))
}

#[utoipa::path(
    get,
    path = "/api/roles/code/{code}",
    tag = "Roles",
    params(("code" = String, Path, description = "Role code")),
    responses(
        (status = 200, description = "The role", body = Role),
        (status = 404, description = "Role not found")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_role_by_code(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermRoleQuery>,
    Path(code): Path<String>,
) -> Result<Json<Role>, ApiError> {
    Ok(Json(app_state.role_service.find_by_code(&code).await?))
}

#[utoipa::path(
    post,
    path = "/api/roles",
    tag = "Roles",
    request_body = RolePayload,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 409, description = "Code or name already taken")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_role(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermRoleCreate>,
    Json(payload): Json<RolePayload>,
) -> Result<(StatusCode, Json<Role>), ApiError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let role = app_state.role_service.create(&payload, user.id()).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    get,
    path = "/api/roles/{id}",
    tag = "Roles",
    params(("id" = i64, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role with permission ids and user count", body = RoleDetail),
        (status = 404, description = "Role not found")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_role(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermRoleQuery>,
    Path(id): Path<i64>,
) -> Result<Json<RoleDetail>, ApiError> {
    Ok(Json(app_state.role_service.detail(id).await?))
}

#[utoipa::path(
    put,
    path = "/api/roles/{id}",
    tag = "Roles",
    params(("id" = i64, Path, description = "Role id")),
    request_body = RolePayload,
    responses(
        (status = 200, description = "Role updated", body = Role),
        (status = 404, description = "Role not found"),
        (status = 409, description = "Code or name already taken")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_role(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermRoleUpdate>,
    Path(id): Path<i64>,
    Json(payload): Json<RolePayload>,
) -> Result<Json<Role>, ApiError> {
    payload.validate().map_err(AppError::ValidationError)?;

    Ok(Json(app_state.role_service.update(id, &payload, user.id()).await?))
}

#[utoipa::path(
    delete,
    path = "/api/roles/{id}",
    tag = "Roles",
    params(("id" = i64, Path, description = "Role id")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 404, description = "Role not found"),
        (status = 412, description = "Role still assigned to users")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_role(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermRoleDelete>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    app_state.role_service.delete(id, user.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/roles/batch-delete",
    tag = "Roles",
    request_body = IdsPayload,
    responses((status = 200, description = "Number of roles deleted", body = usize)),
    security(("api_jwt" = []))
)]
pub async fn delete_roles(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermRoleDelete>,
    Json(payload): Json<IdsPayload>,
) -> Result<Json<usize>, ApiError> {
    Ok(Json(app_state.role_service.delete_batch(&payload.ids, user.id()).await?))
}

#[utoipa::path(
    put,
    path = "/api/roles/{id}/status",
    tag = "Roles",
    params(("id" = i64, Path, description = "Role id")),
    request_body = StatusPayload,
    responses((status = 204, description = "Status changed")),
    security(("api_jwt" = []))
)]
pub async fn update_role_status(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermRoleUpdate>,
    Path(id): Path<i64>,
    Json(payload): Json<StatusPayload>,
) -> Result<StatusCode, ApiError> {
    app_state.role_service.update_status(id, payload.enabled, user.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/api/roles/status",
    tag = "Roles",
    request_body = BatchStatusPayload,
    responses((status = 200, description = "Number of roles changed", body = u64)),
    security(("api_jwt" = []))
)]
pub async fn update_roles_status(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermRoleUpdate>,
    Json(payload): Json<BatchStatusPayload>,
) -> Result<Json<u64>, ApiError> {
    let changed = app_state
        .role_service
        .update_status_batch(&payload.ids, payload.enabled, user.id())
        .await?;
    Ok(Json(changed))
}

#[utoipa::path(
    get,
    path = "/api/roles/{id}/permissions",
    tag = "Roles",
    params(("id" = i64, Path, description = "Role id")),
    responses((status = 200, description = "Permission ids granted to the role", body = [i64])),
    security(("api_jwt" = []))
)]
pub async fn get_role_permissions(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermRoleQuery>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<i64>>, ApiError> {
    Ok(Json(app_state.rbac_service.permission_ids_for_role(id).await?))
}

#[utoipa::path(
    put,
    path = "/api/roles/{id}/permissions",
    tag = "Roles",
    params(("id" = i64, Path, description = "Role id")),
    request_body = AssignPermissionsPayload,
    responses(
        (status = 204, description = "Permission set replaced"),
        (status = 404, description = "Role or permission not found")
    ),
    security(("api_jwt" = []))
)]
pub async fn assign_role_permissions(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermRoleAssignPermission>,
    Path(id): Path<i64>,
    Json(payload): Json<AssignPermissionsPayload>,
) -> Result<StatusCode, ApiError> {
    app_state
        .rbac_service
        .assign_role_permissions(id, &payload.permission_ids, user.id())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
