// src/services/auth.rs

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::UserRepository,
    models::auth::{
        ChangePasswordPayload, Claims, LoginResponse, LoginUserPayload, RegisterUserPayload, TokenResponse,
        UpdateProfilePayload, User,
    },
    models::security::OnlineSession,
    models::user::{CreateUserPayload, UpdateUserPayload},
    services::{
        captcha::CaptchaService,
        login_security::LoginSecurityGuard,
        password::{hash_password, verify_password},
        rbac_service::RbacService,
        session::SessionRegistry,
        user_service::UserService,
    },
};

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    user_service: UserService,
    rbac: RbacService,
    guard: LoginSecurityGuard,
    captcha: CaptchaService,
    sessions: SessionRegistry,
    jwt_secret: String,
    token_ttl: chrono::Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        user_service: UserService,
        rbac: RbacService,
        guard: LoginSecurityGuard,
        captcha: CaptchaService,
        sessions: SessionRegistry,
        jwt_secret: String,
        token_ttl: chrono::Duration,
    ) -> Self {
        Self { users, user_service, rbac, guard, captcha, sessions, jwt_secret, token_ttl }
    }

    pub async fn register(&self, payload: &RegisterUserPayload) -> Result<User, AppError> {
        let create = CreateUserPayload {
            username: payload.username.clone(),
            password: payload.password.clone(),
            nickname: payload.nickname.clone(),
            email: payload.email.clone(),
            phone: payload.phone.clone(),
            avatar: None,
            gender: payload.gender,
            birthday: None,
            status: None,
            remark: None,
        };
        self.user_service.create(&create, None).await
    }

    // Username first, then e-mail (only when it looks like one), then phone.
    async fn resolve(&self, identifier: &str) -> Result<Option<User>, AppError> {
        if let Some(user) = self.users.find_by_username(identifier).await? {
            return Ok(Some(user));
        }
        if identifier.contains('@') {
            if let Some(user) = self.users.find_by_email(identifier).await? {
                return Ok(Some(user));
            }
        }
        self.users.find_by_phone(identifier).await
    }

    // Counts the failure and builds the error the caller sees.
    async fn reject(&self, identifier: &str) -> Result<AppError, AppError> {
        self.guard.record_failure(identifier).await?;
        let message = self.guard.failure_message(identifier).await?;
        if self.guard.is_locked(identifier).await? {
            Ok(AppError::LockedOut(message))
        } else {
            Ok(AppError::InvalidCredentials(message))
        }
    }

    pub async fn login(&self, payload: &LoginUserPayload, ip: Option<&str>) -> Result<LoginResponse, AppError> {
        let identifier = payload.username.trim();

        if !self.guard.can_login(identifier).await? {
            let message = self.guard.failure_message(identifier).await?;
            return Err(AppError::LockedOut(message));
        }

        if let Some(answer) = payload.captcha.as_deref().filter(|c| !c.trim().is_empty()) {
            let key = payload.captcha_key.as_deref().unwrap_or_default();
            if !self.captcha.verify(key, answer).await? {
                self.guard.record_failure(identifier).await?;
                return Err(AppError::validation("The captcha is incorrect or has expired."));
            }
        }

        let user = match self.resolve(identifier).await? {
            Some(user) if user.is_enabled() => user,
            Some(user) => {
                tracing::warn!(user_id = user.id, "Login attempt on a disabled account");
                return Err(self.reject(identifier).await?);
            }
            None => {
                tracing::warn!(%identifier, "Login attempt for an unknown account");
                return Err(self.reject(identifier).await?);
            }
        };

        if !verify_password(&payload.password, &user.password_hash).await? {
            return Err(self.reject(identifier).await?);
        }

        self.guard.clear_failure(identifier).await?;
        self.users.record_login(user.id, ip).await?;

        let access_token = self.issue_token(&user, ip).await?;
        let roles = self.rbac.role_codes(user.id).await?;
        let mut permissions: Vec<String> = self.rbac.permission_codes(user.id).await?.into_iter().collect();
        permissions.sort_unstable();

        tracing::info!(user_id = user.id, ip = ip.unwrap_or("-"), "User logged in");

        Ok(LoginResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.token_ttl.num_seconds(),
            user_id: user.id,
            username: user.username.clone(),
            display_name: user.display_name().to_string(),
            avatar: user.avatar.clone(),
            roles,
            permissions,
            first_login: user.last_login_time.is_none(),
            last_login_time: user.last_login_time,
        })
    }

    /// Resolves a bearer token to a live, enabled user. The token's session
    /// must still be open; logout and forced logout close it.
    pub async fn validate_token(&self, token: &str) -> Result<(User, Claims), AppError> {
        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_ref()),
            &Validation::default(),
        )
        .map_err(|_| AppError::InvalidToken)?
        .claims;

        if !self.sessions.is_active(claims.sub, &claims.jti).await? {
            return Err(AppError::InvalidToken);
        }

        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or(AppError::InvalidToken)?;

        if !user.is_enabled() {
            return Err(AppError::Forbidden("This account is disabled.".to_string()));
        }
        Ok((user, claims))
    }

    pub async fn logout(&self, user_id: i64, token_id: &str) -> Result<(), AppError> {
        self.sessions.close(user_id, token_id).await?;
        tracing::info!(user_id, "User logged out");
        Ok(())
    }

    /// Swaps the caller's token for a fresh one with a full lifetime.
    pub async fn refresh(&self, user: &User, token_id: &str) -> Result<TokenResponse, AppError> {
        let previous = self.sessions.get(user.id, token_id).await?;
        if !self.sessions.close(user.id, token_id).await? {
            return Err(AppError::InvalidToken);
        }
        let ip = previous.and_then(|s| s.ip);
        let access_token = self.issue_token(user, ip.as_deref()).await?;
        tracing::debug!(user_id = user.id, "Token refreshed");
        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.token_ttl.num_seconds(),
        })
    }

    /// Revokes every token of `user_id`. Returns how many were live.
    pub async fn force_logout(&self, user_id: i64, actor: i64) -> Result<usize, AppError> {
        if user_id == actor {
            return Err(AppError::validation("Use logout to end your own sessions."));
        }
        let closed = self.sessions.close_all(user_id).await?;
        tracing::info!(user_id, closed, actor, "User forced offline");
        Ok(closed)
    }

    pub async fn online_sessions(&self) -> Result<Vec<OnlineSession>, AppError> {
        self.sessions.list().await
    }

    /// Updates the caller's own profile, with the same uniqueness rules as
    /// the administrative update.
    pub async fn update_profile(&self, user_id: i64, payload: &UpdateProfilePayload) -> Result<User, AppError> {
        let update = UpdateUserPayload {
            username: None,
            nickname: payload.nickname.clone(),
            email: payload.email.clone(),
            phone: payload.phone.clone(),
            avatar: payload.avatar.clone(),
            gender: payload.gender,
            birthday: payload.birthday,
            remark: None,
        };
        self.user_service.update(user_id, &update, user_id).await
    }

    pub async fn change_password(&self, user_id: i64, payload: &ChangePasswordPayload) -> Result<(), AppError> {
        let user = self.user_service.require(user_id).await?;

        if !verify_password(&payload.old_password, &user.password_hash).await? {
            return Err(AppError::InvalidCredentials("The current password is incorrect.".to_string()));
        }
        if payload.old_password == payload.new_password {
            return Err(AppError::validation("The new password must differ from the current one."));
        }

        let password_hash = hash_password(&payload.new_password).await?;
        self.users.update_password(user_id, &password_hash, user_id).await?;
        tracing::info!(user_id, "Password changed");
        Ok(())
    }

    // Signs a token and opens the session that keeps it valid.
    async fn issue_token(&self, user: &User, ip: Option<&str>) -> Result<String, AppError> {
        let now = Utc::now();
        let expires_at = now + self.token_ttl;
        let token_id = Uuid::new_v4().simple().to_string();

        let claims = Claims {
            sub: user.id,
            exp: expires_at.timestamp() as usize,
            iat: now.timestamp() as usize,
            jti: token_id.clone(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_ref()),
        )?;

        self.sessions
            .open(&OnlineSession {
                token_id,
                user_id: user.id,
                username: user.username.clone(),
                ip: ip.map(str::to_string),
                login_time: now,
                expires_at,
            })
            .await?;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::common::error::ErrorKind;
    use crate::db::memory::MemoryDb;
    use crate::kv::{KvStore, MemoryKvStore};
    use crate::models::auth::UserStatus;
    use crate::services::login_security::LockoutPolicy;

    struct Fixture {
        auth: AuthService,
        guard: LoginSecurityGuard,
        store: Arc<MemoryKvStore>,
        users: UserService,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(MemoryDb::new());
        let store = Arc::new(MemoryKvStore::new());
        let guard = LoginSecurityGuard::new(store.clone(), LockoutPolicy::default());
        let users = UserService::new(db.clone(), db.clone());
        let auth = AuthService::new(
            db.clone(),
            users.clone(),
            RbacService::new(db.clone(), db.clone(), db.clone()),
            guard.clone(),
            CaptchaService::new(store.clone(), Duration::from_secs(300)),
            SessionRegistry::new(store.clone()),
            "test-secret".to_string(),
            chrono::Duration::hours(1),
        );
        Fixture { auth, guard, store, users }
    }

    fn register(username: &str, email: Option<&str>, phone: Option<&str>) -> RegisterUserPayload {
        RegisterUserPayload {
            username: username.to_string(),
            password: "secret1".to_string(),
            nickname: None,
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
            gender: None,
        }
    }

    fn login(username: &str, password: &str) -> LoginUserPayload {
        LoginUserPayload {
            username: username.to_string(),
            password: password.to_string(),
            captcha_key: None,
            captcha: None,
        }
    }

    #[tokio::test]
    async fn login_by_username_email_or_phone() {
        let f = fixture();
        f.auth.register(&register("alice", Some("alice@example.com"), Some("555-0100"))).await.unwrap();

        let first = f.auth.login(&login("alice", "secret1"), Some("10.0.0.1")).await.unwrap();
        assert!(first.first_login);
        assert_eq!(first.token_type, "Bearer");
        assert_eq!(first.expires_in, 3600);

        let second = f.auth.login(&login("alice@example.com", "secret1"), None).await.unwrap();
        assert!(!second.first_login);
        f.auth.login(&login("555-0100", "secret1"), None).await.unwrap();

        let (user, claims) = f.auth.validate_token(&first.access_token).await.unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(claims.sub, user.id);
        assert_eq!(user.login_count, 3);
        assert_eq!(user.last_login_ip, None);
    }

    #[tokio::test]
    async fn wrong_password_counts_down_then_locks() {
        let f = fixture();
        f.auth.register(&register("bob", None, None)).await.unwrap();

        for _ in 0..4 {
            let err = f.auth.login(&login("bob", "nope"), None).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::CredentialInvalid);
        }
        let err = f.auth.login(&login("bob", "nope"), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockedOut);

        // Even the right password is refused while locked.
        let err = f.auth.login(&login("bob", "secret1"), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockedOut);

        f.guard.unlock("bob").await.unwrap();
        f.auth.login(&login("bob", "secret1"), None).await.unwrap();
    }

    #[tokio::test]
    async fn failure_message_reports_remaining_attempts() {
        let f = fixture();
        f.auth.register(&register("carol", None, None)).await.unwrap();
        f.auth.login(&login("carol", "bad"), None).await.unwrap_err();
        let err = f.auth.login(&login("carol", "bad"), None).await.unwrap_err();
        assert_eq!(err.to_string(), "Login failed, 3 attempts remaining");
    }

    #[tokio::test]
    async fn success_clears_failures() {
        let f = fixture();
        f.auth.register(&register("dave", None, None)).await.unwrap();
        f.auth.login(&login("dave", "bad"), None).await.unwrap_err();
        f.auth.login(&login("dave", "secret1"), None).await.unwrap();
        assert_eq!(f.guard.failure_count("dave").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_and_disabled_users_are_rejected() {
        let f = fixture();
        let err = f.auth.login(&login("ghost", "whatever"), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CredentialInvalid);
        assert_eq!(f.guard.failure_count("ghost").await.unwrap(), 1);

        let erin = f.auth.register(&register("erin", None, None)).await.unwrap();
        f.users.update_status(erin.id, UserStatus::Disabled, 99).await.unwrap();
        let err = f.auth.login(&login("erin", "secret1"), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CredentialInvalid);
    }

    #[tokio::test]
    async fn wrong_captcha_counts_as_failure() {
        let f = fixture();
        f.auth.register(&register("frank", None, None)).await.unwrap();
        f.store.set("captcha:k", "abcd", Duration::from_secs(60)).await.unwrap();

        let mut payload = login("frank", "secret1");
        payload.captcha_key = Some("k".into());
        payload.captcha = Some("zzzz".into());
        let err = f.auth.login(&payload, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(f.guard.failure_count("frank").await.unwrap(), 1);

        payload.captcha = Some("ABCD".into());
        f.auth.login(&payload, None).await.unwrap();
    }

    #[tokio::test]
    async fn tampered_tokens_are_rejected() {
        let f = fixture();
        assert!(matches!(f.auth.validate_token("not-a-jwt").await.unwrap_err(), AppError::InvalidToken));
    }

    #[tokio::test]
    async fn change_password_requires_the_current_one() {
        let f = fixture();
        let gina = f.auth.register(&register("gina", None, None)).await.unwrap();

        let wrong = ChangePasswordPayload { old_password: "bad".into(), new_password: "fresh12".into() };
        assert!(f.auth.change_password(gina.id, &wrong).await.is_err());

        let right = ChangePasswordPayload { old_password: "secret1".into(), new_password: "fresh12".into() };
        f.auth.change_password(gina.id, &right).await.unwrap();
        f.auth.login(&login("gina", "fresh12"), None).await.unwrap();
    }

    #[tokio::test]
    async fn logout_revokes_only_that_token() {
        let f = fixture();
        f.auth.register(&register("hank", None, None)).await.unwrap();
        let phone = f.auth.login(&login("hank", "secret1"), Some("10.0.0.2")).await.unwrap();
        let laptop = f.auth.login(&login("hank", "secret1"), Some("10.0.0.3")).await.unwrap();

        let (user, claims) = f.auth.validate_token(&phone.access_token).await.unwrap();
        f.auth.logout(user.id, &claims.jti).await.unwrap();

        assert!(matches!(
            f.auth.validate_token(&phone.access_token).await.unwrap_err(),
            AppError::InvalidToken
        ));
        f.auth.validate_token(&laptop.access_token).await.unwrap();
    }

    #[tokio::test]
    async fn refresh_replaces_the_token() {
        let f = fixture();
        f.auth.register(&register("iris", None, None)).await.unwrap();
        let issued = f.auth.login(&login("iris", "secret1"), Some("10.0.0.4")).await.unwrap();
        let (user, claims) = f.auth.validate_token(&issued.access_token).await.unwrap();

        let refreshed = f.auth.refresh(&user, &claims.jti).await.unwrap();
        assert_eq!(refreshed.token_type, "Bearer");
        assert_eq!(refreshed.expires_in, 3600);
        assert!(f.auth.validate_token(&issued.access_token).await.is_err());

        let (_, fresh) = f.auth.validate_token(&refreshed.access_token).await.unwrap();
        assert_ne!(fresh.jti, claims.jti);
        let sessions = f.auth.online_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].ip.as_deref(), Some("10.0.0.4"));

        // The old token cannot be refreshed a second time.
        assert!(matches!(f.auth.refresh(&user, &claims.jti).await.unwrap_err(), AppError::InvalidToken));
    }

    #[tokio::test]
    async fn force_logout_closes_every_session_of_the_user() {
        let f = fixture();
        let admin = f.auth.register(&register("admin", None, None)).await.unwrap();
        let jack = f.auth.register(&register("jack", None, None)).await.unwrap();
        let admin_token = f.auth.login(&login("admin", "secret1"), None).await.unwrap();
        let first = f.auth.login(&login("jack", "secret1"), None).await.unwrap();
        let second = f.auth.login(&login("jack", "secret1"), None).await.unwrap();
        assert_eq!(f.auth.online_sessions().await.unwrap().len(), 3);

        assert!(f.auth.force_logout(admin.id, admin.id).await.is_err());
        assert_eq!(f.auth.force_logout(jack.id, admin.id).await.unwrap(), 2);

        assert!(f.auth.validate_token(&first.access_token).await.is_err());
        assert!(f.auth.validate_token(&second.access_token).await.is_err());
        f.auth.validate_token(&admin_token.access_token).await.unwrap();
        let online: Vec<i64> = f.auth.online_sessions().await.unwrap().iter().map(|s| s.user_id).collect();
        assert_eq!(online, vec![admin.id]);
    }

    #[tokio::test]
    async fn profile_update_checks_uniqueness_but_allows_own_values() {
        let f = fixture();
        let kate = f.auth.register(&register("kate", Some("kate@example.com"), None)).await.unwrap();
        f.auth.register(&register("liam", Some("liam@example.com"), Some("555-0199"))).await.unwrap();

        let own = UpdateProfilePayload {
            nickname: Some("Kate".into()),
            email: Some("kate@example.com".into()),
            avatar: Some("https://cdn.example.com/kate.png".into()),
            ..Default::default()
        };
        let updated = f.auth.update_profile(kate.id, &own).await.unwrap();
        assert_eq!(updated.display_name(), "Kate");
        assert_eq!(updated.avatar.as_deref(), Some("https://cdn.example.com/kate.png"));
        assert_eq!(updated.username, "kate");

        let taken_email = UpdateProfilePayload { email: Some("liam@example.com".into()), ..Default::default() };
        assert!(matches!(
            f.auth.update_profile(kate.id, &taken_email).await.unwrap_err(),
            AppError::Conflict(_)
        ));
        let taken_phone = UpdateProfilePayload { phone: Some("555-0199".into()), ..Default::default() };
        assert!(matches!(
            f.auth.update_profile(kate.id, &taken_phone).await.unwrap_err(),
            AppError::Conflict(_)
        ));
    }
}
