// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};

use crate::common;
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Auth ---
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::captcha,
        handlers::auth::get_me,
        handlers::auth::update_me,
        handlers::auth::logout,
        handlers::auth::refresh,
        handlers::auth::change_password,
        handlers::auth::get_menus,
        handlers::auth::get_buttons,

        // --- Social ---
        handlers::social::list_socials,
        handlers::social::bind_social,
        handlers::social::unbind_social,

        // --- Users ---
        handlers::users::list_users,
        handlers::users::create_user,
        handlers::users::get_user,
        handlers::users::update_user,
        handlers::users::delete_user,
        handlers::users::delete_users,
        handlers::users::update_user_status,
        handlers::users::update_users_status,
        handlers::users::reset_password,
        handlers::users::get_user_roles,
        handlers::users::assign_user_roles,
        handlers::users::users_by_role,
        handlers::users::check_username,
        handlers::users::check_email,
        handlers::users::check_phone,
        handlers::users::export_users,
        handlers::users::import_users,
        handlers::users::import_template,

        // --- Roles ---
        handlers::roles::list_roles,
        handlers::roles::enabled_roles,
        handlers::roles::get_role_by_code,
        handlers::roles::create_role,
        handlers::roles::get_role,
        handlers::roles::update_role,
        handlers::roles::delete_role,
        handlers::roles::delete_roles,
        handlers::roles::update_role_status,
        handlers::roles::update_roles_status,
        handlers::roles::get_role_permissions,
        handlers::roles::assign_role_permissions,

        // --- Permissions ---
        handlers::permissions::list_permissions,
        handlers::permissions::permission_tree,
        handlers::permissions::get_permission,
        handlers::permissions::get_permission_by_code,
        handlers::permissions::permissions_by_type,
        handlers::permissions::permissions_by_role,
        handlers::permissions::create_permission,
        handlers::permissions::update_permission,
        handlers::permissions::delete_permission,
        handlers::permissions::delete_permissions,
        handlers::permissions::update_permission_status,
        handlers::permissions::update_permissions_status,
        handlers::permissions::check_permissions,

        // --- Security ---
        handlers::security::lock_status,
        handlers::security::unlock_account,
        handlers::security::online_sessions,
        handlers::security::force_logout,
    ),
    components(
        schemas(
            common::pagination::PageQuery,

            // --- Auth ---
            models::auth::UserStatus,
            models::auth::Gender,
            models::auth::User,
            models::auth::RegisterUserPayload,
            models::auth::RegisterResponse,
            models::auth::LoginUserPayload,
            models::auth::LoginResponse,
            models::auth::ChangePasswordPayload,
            models::auth::TokenResponse,
            models::auth::UpdateProfilePayload,

            // --- Users ---
            models::user::CreateUserPayload,
            models::user::UpdateUserPayload,
            models::user::UserStatusPayload,
            models::user::BatchUserStatusPayload,
            models::user::ResetPasswordPayload,
            models::user::AvailabilityResponse,
            models::user::UserDetail,
            models::user::UserExportRow,
            models::user::UserImportRow,
            models::user::ImportFailure,
            models::user::ImportResult,

            // --- RBAC ---
            models::rbac::PermissionType,
            models::rbac::DataScope,
            models::rbac::Permission,
            models::rbac::PermissionTreeNode,
            models::rbac::PermissionPayload,
            models::rbac::CheckMode,
            models::rbac::PermissionCheckPayload,
            models::rbac::PermissionCheckResponse,
            models::rbac::Role,
            models::rbac::RolePayload,
            models::rbac::RoleDetail,
            models::rbac::AssignPermissionsPayload,
            models::rbac::AssignRolesPayload,
            models::rbac::StatusPayload,
            models::rbac::BatchStatusPayload,
            models::rbac::IdsPayload,

            // --- Social ---
            models::social::SocialType,
            models::social::UserSocial,
            models::social::BindSocialPayload,

            // --- Security ---
            models::security::LockStatus,
            models::security::CaptchaResponse,
            models::security::OnlineSession,
        )
    ),
    tags(
        (name = "Auth", description = "Registration, login and the caller's own data"),
        (name = "Social", description = "Third-party account binding"),
        (name = "Users", description = "User administration"),
        (name = "Roles", description = "Role administration"),
        (name = "Permissions", description = "Permission tree administration"),
        (name = "Security", description = "Login lockout and online session administration")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}
