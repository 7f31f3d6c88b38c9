// src/handlers/security.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    common::error::ApiError,
    config::AppState,
    middleware::{
        auth::AuthenticatedUser,
        rbac::{PermSecurityKick, PermSecurityList, PermSecurityOnline, PermSecurityUnlock, RequirePermission},
    },
    models::security::{LockStatus, OnlineSession},
};

#[utoipa::path(
    get,
    path = "/api/security/locks/{identifier}",
    tag = "Security",
    params(("identifier" = String, Path, description = "Username, e-mail or phone")),
    responses((status = 200, description = "Failure and lock state of the identifier", body = LockStatus)),
    security(("api_jwt" = []))
)]
pub async fn lock_status(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermSecurityList>,
    Path(identifier): Path<String>,
) -> Result<Json<LockStatus>, ApiError> {
    Ok(Json(app_state.login_guard.status(&identifier).await?))
}

#[utoipa::path(
    delete,
    path = "/api/security/locks/{identifier}",
    tag = "Security",
    params(("identifier" = String, Path, description = "Username, e-mail or phone")),
    responses((status = 204, description = "Lock and failure counter cleared")),
    security(("api_jwt" = []))
)]
pub async fn unlock_account(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermSecurityUnlock>,
    Path(identifier): Path<String>,
) -> Result<StatusCode, ApiError> {
    app_state.login_guard.unlock(&identifier).await?;
    tracing::info!(identifier = %identifier, actor = user.id(), "Account unlocked by administrator");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/security/online",
    tag = "Security",
    responses((status = 200, description = "Live sessions, most recent login first", body = [OnlineSession])),
    security(("api_jwt" = []))
)]
pub async fn online_sessions(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermSecurityOnline>,
) -> Result<Json<Vec<OnlineSession>>, ApiError> {
    Ok(Json(app_state.auth_service.online_sessions().await?))
}

#[utoipa::path(
    delete,
    path = "/api/security/online/{user_id}",
    tag = "Security",
    params(("user_id" = i64, Path, description = "User to sign out everywhere")),
    responses(
        (status = 204, description = "Every token of the user is revoked"),
        (status = 400, description = "The caller targeted their own account")
    ),
    security(("api_jwt" = []))
)]
pub async fn force_logout(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermSecurityKick>,
    Path(user_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    app_state.auth_service.force_logout(user_id, user.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}
