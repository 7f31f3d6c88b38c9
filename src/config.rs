// src/config.rs

use std::{env, str::FromStr, sync::Arc, time::Duration};

use anyhow::{Context, bail};
use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::{
    db::{
        PermissionRepository, PgPermissionRepository, PgRoleRepository, PgSocialRepository,
        PgUserRepository, RoleRepository, SocialRepository, UserRepository,
    },
    kv::{self, KvStore, MemoryKvStore, PgKvStore},
    services::{
        auth::AuthService,
        captcha::CaptchaService,
        login_security::{LockoutPolicy, LoginSecurityGuard},
        permission_service::PermissionService,
        rbac_service::RbacService,
        role_service::RoleService,
        session::SessionRegistry,
        social_service::SocialService,
        user_service::UserService,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvBackend {
    Memory,
    Postgres,
}

impl FromStr for KvBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(KvBackend::Memory),
            "postgres" => Ok(KvBackend::Postgres),
            other => bail!("unknown key-value backend '{}'", other),
        }
    }
}

/// Process settings, read once at startup.
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub server_addr: String,
    pub db_max_connections: u32,
    pub kv_backend: KvBackend,
    pub kv_sweep_interval: Duration,
    pub lockout: LockoutPolicy,
    pub captcha_ttl: Duration,
    /// Bootstrap administrator, created on startup when both are set.
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).with_context(|| format!("{} must be set", key))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = LockoutPolicy::default();
        let lockout = LockoutPolicy {
            max_attempts: parse_or("LOGIN_MAX_ATTEMPTS", defaults.max_attempts)?,
            failure_window: Duration::from_secs(parse_or(
                "LOGIN_FAILURE_WINDOW_SECS",
                defaults.failure_window.as_secs(),
            )?),
            lock_duration: Duration::from_secs(parse_or("LOGIN_LOCK_SECS", defaults.lock_duration.as_secs())?),
        };
        if lockout.max_attempts < 1 {
            bail!("LOGIN_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiration_hours: parse_or("JWT_EXPIRATION_HOURS", 168)?,
            server_addr: optional("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", 5)?,
            kv_backend: parse_or("KV_BACKEND", KvBackend::Memory)?,
            kv_sweep_interval: Duration::from_secs(parse_or("KV_SWEEP_SECS", 60u64)?.max(1)),
            lockout,
            captcha_ttl: Duration::from_secs(parse_or("CAPTCHA_TTL_SECS", 300)?),
            admin_username: optional("ADMIN_USERNAME"),
            admin_password: optional("ADMIN_PASSWORD"),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub config: Arc<Config>,
    pub auth_service: AuthService,
    pub user_service: UserService,
    pub role_service: RoleService,
    pub permission_service: PermissionService,
    pub rbac_service: RbacService,
    pub social_service: SocialService,
    pub login_guard: LoginSecurityGuard,
    pub captcha_service: CaptchaService,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let db_pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await
            .context("failed to connect to the database")?;

        tracing::info!("Database connection established");

        let users: Arc<dyn UserRepository> = Arc::new(PgUserRepository::new(db_pool.clone()));
        let roles: Arc<dyn RoleRepository> = Arc::new(PgRoleRepository::new(db_pool.clone()));
        let permissions: Arc<dyn PermissionRepository> = Arc::new(PgPermissionRepository::new(db_pool.clone()));
        let socials: Arc<dyn SocialRepository> = Arc::new(PgSocialRepository::new(db_pool.clone()));

        let kv: Arc<dyn KvStore> = match config.kv_backend {
            KvBackend::Memory => Arc::new(MemoryKvStore::new()),
            KvBackend::Postgres => Arc::new(PgKvStore::new(db_pool.clone())),
        };
        kv::spawn_sweeper(kv.clone(), config.kv_sweep_interval);
        tracing::info!(backend = ?config.kv_backend, "Key-value store ready");

        // --- dependency graph ---
        let login_guard = LoginSecurityGuard::new(kv.clone(), config.lockout);
        let captcha_service = CaptchaService::new(kv.clone(), config.captcha_ttl);
        let sessions = SessionRegistry::new(kv);
        let rbac_service = RbacService::new(users.clone(), roles.clone(), permissions.clone());
        let role_service = RoleService::new(roles.clone(), permissions.clone());
        let permission_service = PermissionService::new(permissions);
        let user_service = UserService::new(users.clone(), roles);
        let social_service = SocialService::new(socials, users.clone());
        let auth_service = AuthService::new(
            users,
            user_service.clone(),
            rbac_service.clone(),
            login_guard.clone(),
            captcha_service.clone(),
            sessions,
            config.jwt_secret.clone(),
            chrono::Duration::hours(config.jwt_expiration_hours),
        );

        Ok(Self {
            db_pool,
            config: Arc::new(config),
            auth_service,
            user_service,
            role_service,
            permission_service,
            rbac_service,
            social_service,
            login_guard,
            captcha_service,
        })
    }
}
