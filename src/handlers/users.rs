// src/handlers/users.rs

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
            PermUserAssignRole, PermUserCreate, PermUserDelete, PermUserExport, PermUserImport, PermUserList,
            PermUserQuery, PermUserResetPassword, PermUserUpdate, RequirePermission,
        },
    },
    models::{
        auth::User,
        rbac::{AssignRolesPayload, IdsPayload},
        user::{
            AvailabilityQuery, AvailabilityResponse, BatchUserStatusPayload, CreateUserPayload, ImportResult,
            ResetPasswordPayload, UpdateUserPayload, UserDetail, UserExportRow, UserImportRow, UserQuery,
            UserStatusPayload,
        },
    },
};

#[utoipa::path(
    get,
    path = "/api/users",
    tag = "Users",
    params(UserQuery),
    responses((status = 200, description = "One page of users", body = PageResult<User>)),
    security(("api_jwt" = []))
)]
pub async fn list_users(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermUserList>,
    Query(query): Query<UserQuery>,
) -> Result<Json<PageResult<User>>, ApiError> {
    Ok(Json(app_state.user_service.page(&query).await?))
}

#[utoipa::path(
    post,
    path = "/api/users",
    tag = "Users",
    request_body = CreateUserPayload,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 409, description = "Username, e-mail or phone already taken")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_user(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermUserCreate>,
    Json(payload): Json<CreateUserPayload>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let created = app_state.user_service.create(&payload, Some(user.id())).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    tag = "Users",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User with roles", body = UserDetail),
        (status = 404, description = "User not found")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_user(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermUserQuery>,
    Path(id): Path<i64>,
) -> Result<Json<UserDetail>, ApiError> {
    Ok(Json(app_state.user_service.detail(id).await?))
}

#[utoipa::path(
    put,
    path = "/api/users/{id}",
    tag = "Users",
    params(("id" = i64, Path, description = "User id")),
    request_body = UpdateUserPayload,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 404, description = "User not found"),
        (status = 409, description = "Username, e-mail or phone already taken")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_user(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermUserUpdate>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserPayload>,
) -> Result<Json<User>, ApiError> {
    payload.validate().map_err(AppError::ValidationError)?;

    Ok(Json(app_state.user_service.update(id, &payload, user.id()).await?))
}

#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    tag = "Users",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 404, description = "User not found")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_user(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermUserDelete>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    app_state.user_service.delete(id, user.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/users/batch-delete",
    tag = "Users",
    request_body = IdsPayload,
    responses((status = 200, description = "Number of users deleted", body = u64)),
    security(("api_jwt" = []))
)]
pub async fn delete_users(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermUserDelete>,
    Json(payload): Json<IdsPayload>,
) -> Result<Json<u64>, ApiError> {
    Ok(Json(app_state.user_service.delete_batch(&payload.ids, user.id()).await?))
}

#[utoipa::path(
    put,
    path = "/api/users/{id}/status",
    tag = "Users",
    params(("id" = i64, Path, description = "User id")),
    request_body = UserStatusPayload,
    responses((status = 204, description = "Status changed")),
    security(("api_jwt" = []))
)]
pub async fn update_user_status(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermUserUpdate>,
    Path(id): Path<i64>,
    Json(payload): Json<UserStatusPayload>,
) -> Result<StatusCode, ApiError> {
    app_state.user_service.update_status(id, payload.status, user.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/api/users/status",
    tag = "Users",
    request_body = BatchUserStatusPayload,
    responses((status = 200, description = "Number of users changed", body = u64)),
    security(("api_jwt" = []))
)]
pub async fn update_users_status(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermUserUpdate>,
    Json(payload): Json<BatchUserStatusPayload>,
) -> Result<Json<u64>, ApiError> {
    let changed = app_state
        .user_service
        .update_status_batch(&payload.user_ids, payload.status, user.id())
        .await?;
    Ok(Json(changed))
}

#[utoipa::path(
    put,
    path = "/api/users/{id}/password",
    tag = "Users",
    params(("id" = i64, Path, description = "User id")),
    request_body = ResetPasswordPayload,
    responses((status = 204, description = "Password reset")),
    security(("api_jwt" = []))
)]
pub async fn reset_password(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermUserResetPassword>,
    Path(id): Path<i64>,
    Json(payload): Json<ResetPasswordPayload>,
) -> Result<StatusCode, ApiError> {
    payload.validate().map_err(AppError::ValidationError)?;

    app_state.user_service.reset_password(id, &payload.new_password, user.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/users/{id}/roles",
    tag = "Users",
    params(("id" = i64, Path, description = "User id")),
    responses((status = 200, description = "Role ids of the user", body = [i64])),
    security(("api_jwt" = []))
)]
pub async fn get_user_roles(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermUserQuery>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<i64>>, ApiError> {
    app_state.user_service.require(id).await?;
    Ok(Json(app_state.rbac_service.role_ids_for_user(id).await?))
}

#[utoipa::path(
    put,
    path = "/api/users/{id}/roles",
    tag = "Users",
    params(("id" = i64, Path, description = "User id")),
    request_body = AssignRolesPayload,
    responses(
        (status = 204, description = "Roles replaced"),
        (status = 404, description = "User or role not found")
    ),
    security(("api_jwt" = []))
)]
pub async fn assign_user_roles(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermUserAssignRole>,
    Path(id): Path<i64>,
    Json(payload): Json<AssignRolesPayload>,
) -> Result<StatusCode, ApiError> {
    app_state
        .rbac_service
        .assign_user_roles(id, &payload.role_ids, user.id())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/users/by-role/{role_id}",
    tag = "Users",
    params(("role_id" = i64, Path, description = "Role id")),
    responses((status = 200, description = "Users holding the role", body = [User])),
    security(("api_jwt" = []))
)]
pub async fn users_by_role(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermUserList>,
    Path(role_id): Path<i64>,
) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(app_state.user_service.by_role(role_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/users/check/username",
    tag = "Users",
    params(AvailabilityQuery),
    responses((status = 200, description = "Whether the username is free", body = AvailabilityResponse)),
    security(("api_jwt" = []))
)]
pub async fn check_username(
    State(app_state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let available = app_state
        .user_service
        .username_available(&query.value, query.exclude_id)
        .await?;
    Ok(Json(AvailabilityResponse { available }))
}

#[utoipa::path(
    get,
    path = "/api/users/check/email",
    tag = "Users",
    params(AvailabilityQuery),
    responses((status = 200, description = "Whether the e-mail is free", body = AvailabilityResponse)),
    security(("api_jwt" = []))
)]
pub async fn check_email(
    State(app_state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let available = app_state.user_service.email_available(&query.value, query.exclude_id).await?;
    Ok(Json(AvailabilityResponse { available }))
}

#[utoipa::path(
    get,
    path = "/api/users/check/phone",
    tag = "Users",
    params(AvailabilityQuery),
    responses((status = 200, description = "Whether the phone is free", body = AvailabilityResponse)),
    security(("api_jwt" = []))
)]
pub async fn check_phone(
    State(app_state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let available = app_state.user_service.phone_available(&query.value, query.exclude_id).await?;
    Ok(Json(AvailabilityResponse { available }))
}

#[utoipa::path(
    get,
    path = "/api/users/export",
    tag = "Users",
    params(UserQuery),
    responses((status = 200, description = "Rows matching the filter", body = [UserExportRow])),
    security(("api_jwt" = []))
)]
pub async fn export_users(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermUserExport>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<UserExportRow>>, ApiError> {
    Ok(Json(app_state.user_service.export(&query).await?))
}

#[utoipa::path(
    post,
    path = "/api/users/import",
    tag = "Users",
    request_body = [UserImportRow],
    responses((status = 200, description = "Per-row outcome", body = ImportResult)),
    security(("api_jwt" = []))
)]
pub async fn import_users(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermUserImport>,
    Json(rows): Json<Vec<UserImportRow>>,
) -> Result<Json<ImportResult>, ApiError> {
    Ok(Json(app_state.user_service.import(rows, user.id()).await?))
}

#[utoipa::path(
    get,
    path = "/api/users/import/template",
    tag = "Users",
    responses((status = 200, description = "Sample import rows", body = [UserImportRow])),
    security(("api_jwt" = []))
)]
pub async fn import_template(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermUserImport>,
) -> Json<Vec<UserImportRow>> {
    Json(app_state.user_service.import_template())
}
