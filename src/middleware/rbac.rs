// src/middleware/rbac.rs

use std::marker::PhantomData;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use crate::{common::error::AppError, config::AppState, middleware::auth::AuthenticatedUser};

/// A permission code a route can demand.
pub trait PermissionDef: Send + Sync + 'static {
    fn code() -> &'static str;
}

/// Extractor that only succeeds when the authenticated caller holds `T`.
pub struct RequirePermission<T>(pub PhantomData<T>);

impl<T, S> FromRequestParts<S> for RequirePermission<T>
where
    T: PermissionDef,
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let user = parts
            .extensions
            .get::<AuthenticatedUser>()
            .ok_or(AppError::InvalidToken)?;

        let required = T::code();
        if !app_state.rbac_service.has_permission(user.id(), required).await? {
            tracing::warn!(user_id = user.id(), permission = required, "Permission denied");
            return Err(AppError::Forbidden(format!(
                "You need the '{}' permission to perform this action.",
                required
            )));
        }

        Ok(RequirePermission(PhantomData))
    }
}

macro_rules! permissions {
    ($($name:ident => $code:literal),* $(,)?) => {
        $(
            pub struct $name;
            impl PermissionDef for $name {
                fn code() -> &'static str { $code }
            }
        )*
    };
}

permissions! {
    PermUserList => "system:user:list",
    PermUserQuery => "system:user:query",
    PermUserCreate => "system:user:create",
    PermUserUpdate => "system:user:update",
    PermUserDelete => "system:user:delete",
    PermUserResetPassword => "system:user:reset-pwd",
    PermUserAssignRole => "system:user:assign-role",
    PermUserImport => "system:user:import",
    PermUserExport => "system:user:export",

    PermRoleList => "system:role:list",
    PermRoleQuery => "system:role:query",
    PermRoleCreate => "system:role:create",
    PermRoleUpdate => "system:role:update",
    PermRoleDelete => "system:role:delete",
    PermRoleAssignPermission => "system:role:assign-perm",

    PermPermissionList => "system:permission:list",
    PermPermissionQuery => "system:permission:query",
    PermPermissionCreate => "system:permission:create",
    PermPermissionUpdate => "system:permission:update",
    PermPermissionDelete => "system:permission:delete",

    PermSecurityList => "system:security:list",
    PermSecurityUnlock => "system:security:unlock",
    PermSecurityOnline => "system:security:online",
    PermSecurityKick => "system:security:kick",
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEEDS: [&str; 2] = [
        include_str!("../../migrations/0001_init.sql"),
        include_str!("../../migrations/0002_online_sessions.sql"),
    ];

    fn codes() -> Vec<&'static str> {
        vec![
            PermUserList::code(),
            PermUserQuery::code(),
            PermUserCreate::code(),
            PermUserUpdate::code(),
            PermUserDelete::code(),
            PermUserResetPassword::code(),
            PermUserAssignRole::code(),
            PermUserImport::code(),
            PermUserExport::code(),
            PermRoleList::code(),
            PermRoleQuery::code(),
            PermRoleCreate::code(),
            PermRoleUpdate::code(),
            PermRoleDelete::code(),
            PermRoleAssignPermission::code(),
            PermPermissionList::code(),
            PermPermissionQuery::code(),
            PermPermissionCreate::code(),
            PermPermissionUpdate::code(),
            PermPermissionDelete::code(),
            PermSecurityList::code(),
            PermSecurityUnlock::code(),
            PermSecurityOnline::code(),
            PermSecurityKick::code(),
        ]
    }

    #[test]
    fn every_guarded_code_is_seeded() {
        for code in codes() {
            let quoted = format!("'{}'", code);
            assert!(SEEDS.iter().any(|seed| seed.contains(&quoted)), "{} is not seeded", code);
        }
    }
}
