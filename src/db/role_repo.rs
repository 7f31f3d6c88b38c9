// src/db/role_repo.rs

use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use crate::common::error::AppError;
use crate::db::{distinct_ids, like_pattern, map_unique_violation};
use crate::models::rbac::{Role, RolePayload, RoleQuery};

/// Roles plus both RBAC link tables (role→permission, user→role).
/// Roles are soft-deleted; deleted rows are invisible to every method.
#[async_trait::async_trait]
pub trait RoleRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Role>, AppError>;
    async fn find_by_code(&self, code: &str) -> Result<Option<Role>, AppError>;
    async fn find_page(&self, query: &RoleQuery) -> Result<(Vec<Role>, i64), AppError>;
    async fn find_enabled(&self) -> Result<Vec<Role>, AppError>;

    /// Roles held by a user, enabled or not.
    async fn find_by_user(&self, user_id: i64) -> Result<Vec<Role>, AppError>;

    async fn code_exists(&self, code: &str, exclude_id: Option<i64>) -> Result<bool, AppError>;
    async fn name_exists(&self, name: &str, exclude_id: Option<i64>) -> Result<bool, AppError>;
    async fn count_existing(&self, ids: &[i64]) -> Result<i64, AppError>;

    /// Non-deleted users holding the role.
    async fn count_users(&self, role_id: i64) -> Result<i64, AppError>;

    /// Inserts the role and, when `payload.permission_ids` is present, its links.
    async fn create(&self, payload: &RolePayload, actor: i64) -> Result<Role, AppError>;
    async fn update(&self, id: i64, payload: &RolePayload, actor: i64) -> Result<Role, AppError>;

    /// Soft-deletes the role and drops its permission links in one transaction.
    async fn delete(&self, id: i64, actor: i64) -> Result<(), AppError>;

    async fn update_status(&self, ids: &[i64], enabled: bool, actor: i64) -> Result<u64, AppError>;

    async fn permission_ids(&self, role_id: i64) -> Result<Vec<i64>, AppError>;

    /// Makes the role's permission set exactly `permission_ids`.
    async fn replace_permissions(&self, role_id: i64, permission_ids: &[i64], actor: i64) -> Result<(), AppError>;

    async fn role_ids_for_user(&self, user_id: i64) -> Result<Vec<i64>, AppError>;

    /// Makes the user's role set exactly `role_ids`.
    async fn replace_user_roles(&self, user_id: i64, role_ids: &[i64], actor: i64) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct PgRoleRepository {
    pool: PgPool,
}

impl PgRoleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Diff against the stored set: drop links not wanted, add the missing ones.
// The link table is never empty in between, so concurrent readers see either
// the old or the new set.
async fn sync_role_permissions(
    conn: &mut PgConnection,
    role_id: i64,
    permission_ids: &[i64],
    actor: i64,
) -> Result<(), AppError> {
    let ids = distinct_ids(permission_ids);

    sqlx::query("DELETE FROM sys_role_permission WHERE role_id = $1 AND NOT (permission_id = ANY($2))")
        .bind(role_id)
        .bind(&ids)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO sys_role_permission (role_id, permission_id, created_by)
        SELECT $1, UNNEST($2::BIGINT[]), $3
        ON CONFLICT (role_id, permission_id) DO NOTHING
        "#,
    )
    .bind(role_id)
    .bind(&ids)
    .bind(actor)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &RoleQuery) {
    qb.push(" WHERE deleted = FALSE");
    if let Some(name) = query.name.as_deref().filter(|v| !v.trim().is_empty()) {
        qb.push(" AND name ILIKE ").push_bind(like_pattern(name));
    }
    if let Some(code) = query.code.as_deref().filter(|v| !v.trim().is_empty()) {
        qb.push(" AND code ILIKE ").push_bind(like_pattern(code));
    }
    if let Some(enabled) = query.enabled {
        qb.push(" AND enabled = ").push_bind(enabled);
    }
    if let Some(data_scope) = query.data_scope {
        qb.push(" AND data_scope = ").push_bind(data_scope);
    }
}

#[async_trait::async_trait]
impl RoleRepository for PgRoleRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Role>, AppError> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM sys_role WHERE id = $1 AND deleted = FALSE")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Role>, AppError> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM sys_role WHERE code = $1 AND deleted = FALSE")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role)
    }

    async fn find_page(&self, query: &RoleQuery) -> Result<(Vec<Role>, i64), AppError> {
        let page = query.page();

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM sys_role");
        push_filters(&mut count, query);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM sys_role");
        push_filters(&mut select, query);
        select
            .push(" ORDER BY sort_order, id LIMIT ")
            .push_bind(page.size())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let records = select.build_query_as::<Role>().fetch_all(&self.pool).await?;

        Ok((records, total))
    }

    async fn find_enabled(&self) -> Result<Vec<Role>, AppError> {
        let roles = sqlx::query_as::<_, Role>(
            "SELECT * FROM sys_role WHERE deleted = FALSE AND enabled = TRUE ORDER BY sort_order, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<Role>, AppError> {
        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT r.*
            FROM sys_role r
            JOIN sys_user_role ur ON ur.role_id = r.id
            WHERE ur.user_id = $1 AND r.deleted = FALSE
            ORDER BY r.sort_order, r.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }

    async fn code_exists(&self, code: &str, exclude_id: Option<i64>) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM sys_role
                WHERE code = $1 AND deleted = FALSE AND ($2::BIGINT IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(code)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn name_exists(&self, name: &str, exclude_id: Option<i64>) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM sys_role
                WHERE name = $1 AND deleted = FALSE AND ($2::BIGINT IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(name)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn count_existing(&self, ids: &[i64]) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sys_role WHERE id = ANY($1) AND deleted = FALSE",
        )
        .bind(distinct_ids(ids))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_users(&self, role_id: i64) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM sys_user_role ur
            JOIN sys_user u ON u.id = ur.user_id AND u.deleted = FALSE
            WHERE ur.role_id = $1
            "#,
        )
        .bind(role_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn create(&self, payload: &RolePayload, actor: i64) -> Result<Role, AppError> {
        let mut tx = self.pool.begin().await?;

        let role = sqlx::query_as::<_, Role>(
            r#"
            INSERT INTO sys_role (name, code, sort_order, data_scope, enabled, remark, created_by)
            VALUES ($1, $2, $3, $4, TRUE, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&payload.name)
        .bind(&payload.code)
        .bind(payload.sort_order)
        .bind(payload.data_scope)
        .bind(&payload.remark)
        .bind(actor)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, "Role code or name already exists."))?;

        if let Some(permission_ids) = &payload.permission_ids {
            sync_role_permissions(&mut tx, role.id, permission_ids, actor).await?;
        }

        tx.commit().await?;
        Ok(role)
    }

    async fn update(&self, id: i64, payload: &RolePayload, actor: i64) -> Result<Role, AppError> {
        let mut tx = self.pool.begin().await?;

        let role = sqlx::query_as::<_, Role>(
            r#"
            UPDATE sys_role
            SET name = $2, code = $3, sort_order = $4, data_scope = $5, remark = $6,
                updated_by = $7, updated_at = NOW()
            WHERE id = $1 AND deleted = FALSE
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&payload.name)
        .bind(&payload.code)
        .bind(payload.sort_order)
        .bind(payload.data_scope)
        .bind(&payload.remark)
        .bind(actor)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, "Role code or name already exists."))?
        .ok_or_else(|| AppError::not_found("Role not found."))?;

        if let Some(permission_ids) = &payload.permission_ids {
            sync_role_permissions(&mut tx, role.id, permission_ids, actor).await?;
        }

        tx.commit().await?;
        Ok(role)
    }

    async fn delete(&self, id: i64, actor: i64) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE sys_role SET deleted = TRUE, updated_by = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(actor)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM sys_role_permission WHERE role_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        // Links left behind by soft-deleted users.
        sqlx::query("DELETE FROM sys_user_role WHERE role_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_status(&self, ids: &[i64], enabled: bool, actor: i64) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE sys_role
            SET enabled = $2, updated_by = $3, updated_at = NOW()
            WHERE id = ANY($1) AND deleted = FALSE
            "#,
        )
        .bind(distinct_ids(ids))
        .bind(enabled)
        .bind(actor)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn permission_ids(&self, role_id: i64) -> Result<Vec<i64>, AppError> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT permission_id FROM sys_role_permission WHERE role_id = $1 ORDER BY permission_id",
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn replace_permissions(&self, role_id: i64, permission_ids: &[i64], actor: i64) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        sync_role_permissions(&mut tx, role_id, permission_ids, actor).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn role_ids_for_user(&self, user_id: i64) -> Result<Vec<i64>, AppError> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT ur.role_id
            FROM sys_user_role ur
            JOIN sys_role r ON r.id = ur.role_id AND r.deleted = FALSE
            WHERE ur.user_id = $1
            ORDER BY ur.role_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn replace_user_roles(&self, user_id: i64, role_ids: &[i64], actor: i64) -> Result<(), AppError> {
        let ids = distinct_ids(role_ids);
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM sys_user_role WHERE user_id = $1 AND NOT (role_id = ANY($2))")
            .bind(user_id)
            .bind(&ids)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO sys_user_role (user_id, role_id, created_by)
            SELECT $1, UNNEST($2::BIGINT[]), $3
            ON CONFLICT (user_id, role_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(&ids)
        .bind(actor)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
