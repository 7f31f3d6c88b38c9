// src/handlers/auth.rs

use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
};
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::{
        auth::{
            ChangePasswordPayload, LoginResponse, LoginUserPayload, RegisterResponse, RegisterUserPayload,
            TokenResponse, UpdateProfilePayload, User,
        },
        rbac::PermissionTreeNode,
        security::CaptchaResponse,
        user::UserDetail,
    },
};

// First address of X-Forwarded-For, then X-Real-IP, then the socket peer.
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|ip| !ip.is_empty() && !ip.eq_ignore_ascii_case("unknown"))
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string())
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "Auth",
    request_body = RegisterUserPayload,
    responses(
        (status = 201, description = "User registered", body = RegisterResponse),
        (status = 400, description = "Invalid payload"),
        (status = 409, description = "Username, e-mail or phone already taken")
    )
)]
pub async fn register(
    State(app_state): State<AppState>,
    Json(payload): Json<RegisterUserPayload>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let user = app_state.auth_service.register(&payload).await?;
    Ok((StatusCode::CREATED, Json(RegisterResponse { id: user.id })))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Auth",
    request_body = LoginUserPayload,
    responses(
        (status = 200, description = "Token issued", body = LoginResponse),
        (status = 400, description = "Invalid payload or wrong captcha"),
        (status = 401, description = "Invalid credentials"),
        (status = 423, description = "Account locked")
    )
)]
pub async fn login(
    State(app_state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<LoginUserPayload>,
) -> Result<Json<LoginResponse>, ApiError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let ip = client_ip(&headers, peer);
    let response = app_state.auth_service.login(&payload, Some(&ip)).await?;
    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/api/auth/captcha",
    tag = "Auth",
    responses((status = 200, description = "A fresh captcha", body = CaptchaResponse))
)]
pub async fn captcha(State(app_state): State<AppState>) -> Result<Json<CaptchaResponse>, ApiError> {
    Ok(Json(app_state.captcha_service.generate().await?))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "The authenticated user with roles", body = UserDetail),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_me(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UserDetail>, ApiError> {
    Ok(Json(app_state.user_service.detail(user.id()).await?))
}

#[utoipa::path(
    put,
    path = "/api/auth/me",
    tag = "Auth",
    request_body = UpdateProfilePayload,
    responses(
        (status = 200, description = "Profile updated", body = User),
        (status = 400, description = "Invalid payload"),
        (status = 409, description = "E-mail or phone already in use")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_me(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdateProfilePayload>,
) -> Result<Json<User>, ApiError> {
    payload.validate().map_err(AppError::ValidationError)?;

    Ok(Json(app_state.auth_service.update_profile(user.id(), &payload).await?))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Auth",
    responses((status = 204, description = "The presented token is revoked")),
    security(("api_jwt" = []))
)]
pub async fn logout(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<StatusCode, ApiError> {
    app_state.auth_service.logout(user.id(), &user.token_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "Auth",
    responses(
        (status = 200, description = "A new token; the presented one is revoked", body = TokenResponse),
        (status = 401, description = "Missing, invalid or already refreshed token")
    ),
    security(("api_jwt" = []))
)]
pub async fn refresh(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<TokenResponse>, ApiError> {
    Ok(Json(app_state.auth_service.refresh(&user.user, &user.token_id).await?))
}

#[utoipa::path(
    put,
    path = "/api/auth/password",
    tag = "Auth",
    request_body = ChangePasswordPayload,
    responses(
        (status = 204, description = "Password changed"),
        (status = 401, description = "Current password is wrong")
    ),
    security(("api_jwt" = []))
)]
pub async fn change_password(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<ChangePasswordPayload>,
) -> Result<StatusCode, ApiError> {
    payload.validate().map_err(AppError::ValidationError)?;

    app_state.auth_service.change_password(user.id(), &payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/auth/menus",
    tag = "Auth",
    responses((status = 200, description = "Navigation tree of the caller", body = [PermissionTreeNode])),
    security(("api_jwt" = []))
)]
pub async fn get_menus(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<PermissionTreeNode>>, ApiError> {
    Ok(Json(app_state.permission_service.menu_tree(user.id()).await?))
}

#[utoipa::path(
    get,
    path = "/api/auth/buttons",
    tag = "Auth",
    responses((status = 200, description = "Button permission codes of the caller", body = [String])),
    security(("api_jwt" = []))
)]
pub async fn get_buttons(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(app_state.permission_service.button_codes(user.id()).await?))
}
