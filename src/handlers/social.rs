// src/handlers/social.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::social::{BindSocialPayload, SocialType, UserSocial},
};

#[utoipa::path(
    get,
    path = "/api/auth/socials",
    tag = "Social",
    responses((status = 200, description = "Third-party accounts bound to the caller", body = [UserSocial])),
    security(("api_jwt" = []))
)]
pub async fn list_socials(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<UserSocial>>, ApiError> {
    Ok(Json(app_state.social_service.list(user.id()).await?))
}

#[utoipa::path(
    post,
    path = "/api/auth/socials",
    tag = "Social",
    request_body = BindSocialPayload,
    responses(
        (status = 201, description = "Account bound", body = UserSocial),
        (status = 409, description = "Account or provider already bound")
    ),
    security(("api_jwt" = []))
)]
pub async fn bind_social(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<BindSocialPayload>,
) -> Result<(StatusCode, Json<UserSocial>), ApiError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let social = app_state.social_service.bind(user.id(), &payload).await?;
    Ok((StatusCode::CREATED, Json(social)))
}

#[utoipa::path(
    delete,
    path = "/api/auth/socials/{social_type}",
    tag = "Social",
    params(("social_type" = SocialType, Path, description = "Provider")),
    responses(
        (status = 204, description = "Account unbound"),
        (status = 404, description = "No account of that provider is bound")
    ),
    security(("api_jwt" = []))
)]
pub async fn unbind_social(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(social_type): Path<SocialType>,
) -> Result<StatusCode, ApiError> {
    app_state.social_service.unbind(user.id(), social_type).await?;
    Ok(StatusCode::NO_CONTENT)
}
