// src/main.rs

use std::net::SocketAddr;

use axum::{
    Router,
    middleware as axum_middleware,
    routing::{delete, get, post, put},
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod common;
mod config;
mod db;
mod docs;
mod handlers;
mod kv;
mod middleware;
mod models;
mod services;

use crate::config::{AppState, Config};
use crate::docs::ApiDoc;
use crate::middleware::auth::auth_guard;

/// Role granted to the bootstrap administrator; seeded by the first migration.
const SUPER_ADMIN_ROLE: &str = "ROLE_SUPER_ADMIN";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    // Without configuration or a database the service must not start.
    let config = Config::from_env().expect("Invalid configuration");
    let addr = config.server_addr.clone();

    let app_state = AppState::new(config)
        .await
        .expect("Failed to initialise application state");

    sqlx::migrate!()
        .run(&app_state.db_pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    if let (Some(username), Some(password)) = (
        app_state.config.admin_username.as_deref(),
        app_state.config.admin_password.as_deref(),
    ) {
        app_state
            .user_service
            .ensure_admin(username, password, SUPER_ADMIN_ROLE)
            .await
            .expect("Failed to create the bootstrap administrator");
    }

    let app = router(app_state);

    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind the TCP listener");
    tracing::info!("Listening on {}", addr);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .expect("Server error");
}

fn router(app_state: AppState) -> Router {
    let guard = || axum_middleware::from_fn_with_state(app_state.clone(), auth_guard);

    // Public
    let auth_public = Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login))
        .route("/captcha", get(handlers::auth::captcha));

    // The caller's own data
    let auth_private = Router::new()
        .route("/me", get(handlers::auth::get_me).put(handlers::auth::update_me))
        .route("/logout", post(handlers::auth::logout))
        .route("/refresh", post(handlers::auth::refresh))
        .route("/password", put(handlers::auth::change_password))
        .route("/menus", get(handlers::auth::get_menus))
        .route("/buttons", get(handlers::auth::get_buttons))
        .route(
            "/socials",
            get(handlers::social::list_socials).post(handlers::social::bind_social),
        )
        .route("/socials/{social_type}", delete(handlers::social::unbind_social))
        .layer(guard());

    let user_routes = Router::new()
        .route(
            "/",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route("/batch-delete", post(handlers::users::delete_users))
        .route("/status", put(handlers::users::update_users_status))
        .route("/export", get(handlers::users::export_users))
        .route("/import", post(handlers::users::import_users))
        .route("/import/template", get(handlers::users::import_template))
        .route("/check/username", get(handlers::users::check_username))
        .route("/check/email", get(handlers::users::check_email))
        .route("/check/phone", get(handlers::users::check_phone))
        .route("/by-role/{role_id}", get(handlers::users::users_by_role))
        .route(
            "/{id}",
            get(handlers::users::get_user)
                .put(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
        .route("/{id}/status", put(handlers::users::update_user_status))
        .route("/{id}/password", put(handlers::users::reset_password))
        .route(
            "/{id}/roles",
            get(handlers::users::get_user_roles).put(handlers::users::assign_user_roles),
        )
        .layer(guard());

    let role_routes = Router::new()
        .route(
            "/",
            get(handlers::roles::list_roles).post(handlers::roles::create_role),
        )
        .route("/enabled", get(handlers::roles::enabled_roles))
        .route("/code/{code}", get(handlers::roles::get_role_by_code))
        .route("/batch-delete", post(handlers::roles::delete_roles))
        .route("/status", put(handlers::roles::update_roles_status))
        .route(
            "/{id}",
            get(handlers::roles::get_role)
                .put(handlers::roles::update_role)
                .delete(handlers::roles::delete_role),
        )
        .route("/{id}/status", put(handlers::roles::update_role_status))
        .route(
            "/{id}/permissions",
            get(handlers::roles::get_role_permissions).put(handlers::roles::assign_role_permissions),
        )
        .layer(guard());

    let permission_routes = Router::new()
        .route(
            "/",
            get(handlers::permissions::list_permissions).post(handlers::permissions::create_permission),
        )
        .route("/tree", get(handlers::permissions::permission_tree))
        .route("/check", post(handlers::permissions::check_permissions))
        .route("/code/{code}", get(handlers::permissions::get_permission_by_code))
        .route("/type/{permission_type}", get(handlers::permissions::permissions_by_type))
        .route("/role/{role_id}", get(handlers::permissions::permissions_by_role))
        .route("/batch-delete", post(handlers::permissions::delete_permissions))
        .route("/status", put(handlers::permissions::update_permissions_status))
        .route(
            "/{id}",
            get(handlers::permissions::get_permission)
                .put(handlers::permissions::update_permission)
                .delete(handlers::permissions::delete_permission),
        )
        .route("/{id}/status", put(handlers::permissions::update_permission_status))
        .layer(guard());

    let security_routes = Router::new()
        .route(
            "/locks/{identifier}",
            get(handlers::security::lock_status).delete(handlers::security::unlock_account),
        )
        .route("/online", get(handlers::security::online_sessions))
        .route("/online/{user_id}", delete(handlers::security::force_logout))
        .layer(guard());

    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api/auth", auth_public.merge(auth_private))
        .nest("/api/users", user_routes)
        .nest("/api/roles", role_routes)
        .nest("/api/permissions", permission_routes)
        .nest("/api/security", security_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(app_state)
}
