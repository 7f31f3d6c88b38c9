pub mod user_repo;
pub use user_repo::{NewUser, PgUserRepository, UserRepository};
pub mod role_repo;
pub use role_repo::{PgRoleRepository, RoleRepository};
pub mod permission_repo;
pub use permission_repo::{PermissionRepository, PgPermissionRepository};
pub mod social_repo;
pub use social_repo::{PgSocialRepository, SocialRepository};

#[cfg(test)]
pub mod memory;

use crate::common::error::AppError;

// Turns a unique-index violation into a conflict; everything else stays a database error.
pub(crate) fn map_unique_violation(e: sqlx::Error, message: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return AppError::conflict(message);
        }
    }
    e.into()
}

/// Sorted, de-duplicated copy of an id list.
pub(crate) fn distinct_ids(ids: &[i64]) -> Vec<i64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

pub(crate) fn like_pattern(value: &str) -> String {
    format!("%{}%", value.trim())
}
