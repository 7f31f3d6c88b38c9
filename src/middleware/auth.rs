// src/middleware/auth.rs

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

use crate::{common::error::AppError, config::AppState, models::auth::User};

/// Rejects requests without a valid bearer token and stores the caller in the
/// request extensions for [`AuthenticatedUser`].
pub async fn auth_guard(
    State(app_state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(Authorization(bearer)) = request.headers().typed_get::<Authorization<Bearer>>() else {
        return Err(AppError::InvalidToken);
    };

    let (user, claims) = app_state.auth_service.validate_token(bearer.token()).await?;
    request.extensions_mut().insert(AuthenticatedUser { user, token_id: claims.jti });
    Ok(next.run(request).await)
}

/// The caller of a guarded route and the session its token belongs to.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub token_id: String,
}

impl AuthenticatedUser {
    pub fn id(&self) -> i64 {
        self.user.id
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(AppError::InvalidToken)
    }
}
