// src/db/user_repo.rs

use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::common::error::AppError;
use crate::db::{distinct_ids, like_pattern, map_unique_violation};
use crate::models::auth::{Gender, User, UserStatus};
use crate::models::user::{UpdateUserPayload, UserQuery};

/// Fields of a user row about to be inserted. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub gender: Gender,
    pub birthday: Option<NaiveDate>,
    pub status: UserStatus,
    pub remark: Option<String>,
}

// Soft-deleted users are invisible to every method.
#[async_trait::async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, AppError>;

    async fn username_exists(&self, username: &str, exclude_id: Option<i64>) -> Result<bool, AppError>;
    async fn email_exists(&self, email: &str, exclude_id: Option<i64>) -> Result<bool, AppError>;
    async fn phone_exists(&self, phone: &str, exclude_id: Option<i64>) -> Result<bool, AppError>;

    async fn find_page(&self, query: &UserQuery) -> Result<(Vec<User>, i64), AppError>;

    /// Every user matching the filters, unpaginated (export).
    async fn find_all(&self, query: &UserQuery) -> Result<Vec<User>, AppError>;
    async fn find_by_role(&self, role_id: i64) -> Result<Vec<User>, AppError>;
    async fn count_existing(&self, ids: &[i64]) -> Result<i64, AppError>;

    async fn create(&self, user: &NewUser, actor: Option<i64>) -> Result<User, AppError>;
    async fn update(&self, id: i64, payload: &UpdateUserPayload, actor: i64) -> Result<User, AppError>;

    /// Soft-deletes the users and drops their role links.
    async fn delete(&self, ids: &[i64], actor: i64) -> Result<u64, AppError>;

    async fn update_status(&self, ids: &[i64], status: UserStatus, actor: i64) -> Result<u64, AppError>;
    async fn update_password(&self, id: i64, password_hash: &str, actor: i64) -> Result<(), AppError>;

    /// Stamps a successful login: ip, time, count + 1.
    async fn record_login(&self, id: i64, ip: Option<&str>) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one_by(&self, column: &str, value: &str) -> Result<Option<User>, AppError> {
        // `column` is always one of our own literals.
        let sql = format!("SELECT * FROM sys_user WHERE {} = $1 AND deleted = FALSE", column);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn exists_by(&self, column: &str, value: &str, exclude_id: Option<i64>) -> Result<bool, AppError> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM sys_user WHERE {} = $1 AND deleted = FALSE AND ($2::BIGINT IS NULL OR id <> $2))",
            column
        );
        let exists = sqlx::query_scalar::<_, bool>(&sql)
            .bind(value)
            .bind(exclude_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &UserQuery) {
    qb.push(" WHERE u.deleted = FALSE");
    if let Some(keyword) = query.page().keyword() {
        let pattern = like_pattern(keyword);
        qb.push(" AND (u.username ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.nickname ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.phone ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    let text_filters = [
        ("u.username", &query.username),
        ("u.nickname", &query.nickname),
        ("u.email", &query.email),
        ("u.phone", &query.phone),
    ];
    for (column, value) in text_filters {
        if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            qb.push(format!(" AND {} ILIKE ", column)).push_bind(like_pattern(value));
        }
    }
    if let Some(status) = query.status {
        qb.push(" AND u.status = ").push_bind(status);
    }
    if let Some(gender) = query.gender {
        qb.push(" AND u.gender = ").push_bind(gender);
    }
    if let Some(role_id) = query.role_id {
        qb.push(" AND EXISTS (SELECT 1 FROM sys_user_role ur WHERE ur.user_id = u.id AND ur.role_id = ")
            .push_bind(role_id)
            .push(")");
    }
}

#[async_trait::async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM sys_user WHERE id = $1 AND deleted = FALSE")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        self.find_one_by("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.find_one_by("email", email).await
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, AppError> {
        self.find_one_by("phone", phone).await
    }

    async fn username_exists(&self, username: &str, exclude_id: Option<i64>) -> Result<bool, AppError> {
        self.exists_by("username", username, exclude_id).await
    }

    async fn email_exists(&self, email: &str, exclude_id: Option<i64>) -> Result<bool, AppError> {
        self.exists_by("email", email, exclude_id).await
    }

    async fn phone_exists(&self, phone: &str, exclude_id: Option<i64>) -> Result<bool, AppError> {
        self.exists_by("phone", phone, exclude_id).await
    }

    async fn find_page(&self, query: &UserQuery) -> Result<(Vec<User>, i64), AppError> {
        let page = query.page();

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM sys_user u");
        push_filters(&mut count, query);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT u.* FROM sys_user u");
        push_filters(&mut select, query);
        select
            .push(" ORDER BY u.created_at DESC, u.id DESC LIMIT ")
            .push_bind(page.size())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let records = select.build_query_as::<User>().fetch_all(&self.pool).await?;

        Ok((records, total))
    }

    async fn find_all(&self, query: &UserQuery) -> Result<Vec<User>, AppError> {
        let mut select = QueryBuilder::<Postgres>::new("SELECT u.* FROM sys_user u");
        push_filters(&mut select, query);
        select.push(" ORDER BY u.id");
        let users = select.build_query_as::<User>().fetch_all(&self.pool).await?;
        Ok(users)
    }

    async fn find_by_role(&self, role_id: i64) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT u.*
            FROM sys_user u
            JOIN sys_user_role ur ON ur.user_id = u.id
            WHERE ur.role_id = $1 AND u.deleted = FALSE
            ORDER BY u.id
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn count_existing(&self, ids: &[i64]) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sys_user WHERE id = ANY($1) AND deleted = FALSE",
        )
        .bind(distinct_ids(ids))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn create(&self, user: &NewUser, actor: Option<i64>) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO sys_user (
                username, password_hash, nickname, email, phone, avatar,
                gender, birthday, status, remark, password_updated_at, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), $11)
            RETURNING *
            "#,
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.nickname)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.avatar)
        .bind(user.gender)
        .bind(user.birthday)
        .bind(user.status)
        .bind(&user.remark)
        .bind(actor)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "Username, e-mail or phone already in use."))
    }

    async fn update(&self, id: i64, payload: &UpdateUserPayload, actor: i64) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE sys_user
            SET username = COALESCE($2, username),
                nickname = COALESCE($3, nickname),
                email = COALESCE($4, email),
                phone = COALESCE($5, phone),
                avatar = COALESCE($6, avatar),
                gender = COALESCE($7, gender),
                birthday = COALESCE($8, birthday),
                remark = COALESCE($9, remark),
                updated_by = $10,
                updated_at = NOW()
            WHERE id = $1 AND deleted = FALSE
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&payload.username)
        .bind(&payload.nickname)
        .bind(&payload.email)
        .bind(&payload.phone)
        .bind(&payload.avatar)
        .bind(payload.gender)
        .bind(payload.birthday)
        .bind(&payload.remark)
        .bind(actor)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "Username, e-mail or phone already in use."))?
        .ok_or_else(|| AppError::not_found("User not found."))
    }

    async fn delete(&self, ids: &[i64], actor: i64) -> Result<u64, AppError> {
        let ids = distinct_ids(ids);
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE sys_user
            SET deleted = TRUE, updated_by = $2, updated_at = NOW()
            WHERE id = ANY($1) AND deleted = FALSE
            "#,
        )
        .bind(&ids)
        .bind(actor)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM sys_user_role WHERE user_id = ANY($1)")
            .bind(&ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn update_status(&self, ids: &[i64], status: UserStatus, actor: i64) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE sys_user
            SET status = $2, updated_by = $3, updated_at = NOW()
            WHERE id = ANY($1) AND deleted = FALSE
            "#,
        )
        .bind(distinct_ids(ids))
        .bind(status)
        .bind(actor)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn update_password(&self, id: i64, password_hash: &str, actor: i64) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE sys_user
            SET password_hash = $2, password_updated_at = NOW(), updated_by = $3, updated_at = NOW()
            WHERE id = $1 AND deleted = FALSE
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .bind(actor)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("User not found."));
        }
        Ok(())
    }

    async fn record_login(&self, id: i64, ip: Option<&str>) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE sys_user
            SET last_login_ip = $2, last_login_time = NOW(), login_count = login_count + 1
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(ip)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
