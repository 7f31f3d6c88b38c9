// src/db/permission_repo.rs

use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::common::error::AppError;
use crate::db::{distinct_ids, like_pattern, map_unique_violation};
use crate::models::rbac::{Permission, PermissionPayload, PermissionQuery, PermissionType};

// Permission/menu nodes. Nodes are hard-deleted.
#[async_trait::async_trait]
pub trait PermissionRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Permission>, AppError>;
    async fn find_by_code(&self, code: &str) -> Result<Option<Permission>, AppError>;

    /// Every node, ordered by parent, display order and id.
    async fn find_all(&self) -> Result<Vec<Permission>, AppError>;
    async fn find_page(&self, query: &PermissionQuery) -> Result<(Vec<Permission>, i64), AppError>;
    async fn find_by_type(&self, permission_type: PermissionType) -> Result<Vec<Permission>, AppError>;
    async fn find_by_role(&self, role_id: i64) -> Result<Vec<Permission>, AppError>;

    /// Enabled nodes granted to the user through enabled, non-deleted roles.
    async fn find_by_user(&self, user_id: i64) -> Result<Vec<Permission>, AppError>;

    async fn code_exists(&self, code: &str, exclude_id: Option<i64>) -> Result<bool, AppError>;
    async fn count_children(&self, id: i64) -> Result<i64, AppError>;

    /// How many of the given (distinct) ids exist.
    async fn count_existing(&self, ids: &[i64]) -> Result<i64, AppError>;

    async fn create(&self, payload: &PermissionPayload, actor: i64) -> Result<Permission, AppError>;
    async fn update(&self, id: i64, payload: &PermissionPayload, actor: i64) -> Result<Permission, AppError>;

    /// Removes the node and its role links in one transaction.
    async fn delete(&self, id: i64) -> Result<(), AppError>;

    async fn update_status(&self, ids: &[i64], enabled: bool, actor: i64) -> Result<u64, AppError>;
}

#[derive(Clone)]
pub struct PgPermissionRepository {
    pool: PgPool,
}

impl PgPermissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &PermissionQuery) {
    qb.push(" WHERE TRUE");
    if let Some(name) = query.name.as_deref().filter(|v| !v.trim().is_empty()) {
        qb.push(" AND name ILIKE ").push_bind(like_pattern(name));
    }
    if let Some(code) = query.code.as_deref().filter(|v| !v.trim().is_empty()) {
        qb.push(" AND code ILIKE ").push_bind(like_pattern(code));
    }
    if let Some(permission_type) = query.permission_type {
        qb.push(" AND permission_type = ").push_bind(permission_type);
    }
    if let Some(enabled) = query.enabled {
        qb.push(" AND enabled = ").push_bind(enabled);
    }
    if let Some(visible) = query.visible {
        qb.push(" AND visible = ").push_bind(visible);
    }
    if let Some(parent_id) = query.parent_id {
        qb.push(" AND parent_id = ").push_bind(parent_id);
    }
}

#[async_trait::async_trait]
impl PermissionRepository for PgPermissionRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Permission>, AppError> {
        let permission = sqlx::query_as::<_, Permission>("SELECT * FROM sys_permission WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(permission)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Permission>, AppError> {
        let permission = sqlx::query_as::<_, Permission>("SELECT * FROM sys_permission WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(permission)
    }

    async fn find_all(&self) -> Result<Vec<Permission>, AppError> {
        let permissions = sqlx::query_as::<_, Permission>(
            "SELECT * FROM sys_permission ORDER BY parent_id, order_num, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(permissions)
    }

    async fn find_page(&self, query: &PermissionQuery) -> Result<(Vec<Permission>, i64), AppError> {
        let page = query.page();

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM sys_permission");
        push_filters(&mut count, query);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM sys_permission");
        push_filters(&mut select, query);
        select
            .push(" ORDER BY parent_id, order_num, id LIMIT ")
            .push_bind(page.size())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let records = select.build_query_as::<Permission>().fetch_all(&self.pool).await?;

        Ok((records, total))
    }

    async fn find_by_type(&self, permission_type: PermissionType) -> Result<Vec<Permission>, AppError> {
        let permissions = sqlx::query_as::<_, Permission>(
            r#"
            SELECT * FROM sys_permission
            WHERE permission_type = $1 AND enabled = TRUE
            ORDER BY parent_id, order_num, id
            "#,
        )
        .bind(permission_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(permissions)
    }

    async fn find_by_role(&self, role_id: i64) -> Result<Vec<Permission>, AppError> {
        let permissions = sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.*
            FROM sys_permission p
            JOIN sys_role_permission rp ON rp.permission_id = p.id
            WHERE rp.role_id = $1
            ORDER BY p.parent_id, p.order_num, p.id
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(permissions)
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<Permission>, AppError> {
        let permissions = sqlx::query_as::<_, Permission>(
            r#"
            SELECT DISTINCT p.*
            FROM sys_permission p
            JOIN sys_role_permission rp ON rp.permission_id = p.id
            JOIN sys_role r ON r.id = rp.role_id AND r.deleted = FALSE AND r.enabled = TRUE
            JOIN sys_user_role ur ON ur.role_id = r.id
            WHERE ur.user_id = $1 AND p.enabled = TRUE
            ORDER BY p.parent_id, p.order_num, p.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(permissions)
    }

    async fn code_exists(&self, code: &str, exclude_id: Option<i64>) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM sys_permission
                WHERE code = $1 AND ($2::BIGINT IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(code)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn count_children(&self, id: i64) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sys_permission WHERE parent_id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_existing(&self, ids: &[i64]) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sys_permission WHERE id = ANY($1)")
            .bind(distinct_ids(ids))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn create(&self, payload: &PermissionPayload, actor: i64) -> Result<Permission, AppError> {
        sqlx::query_as::<_, Permission>(
            r#"
            INSERT INTO sys_permission (
                parent_id, name, code, permission_type, path, component, icon,
                order_num, enabled, visible, remark, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(payload.parent_id)
        .bind(&payload.name)
        .bind(&payload.code)
        .bind(payload.permission_type)
        .bind(&payload.path)
        .bind(&payload.component)
        .bind(&payload.icon)
        .bind(payload.order_num)
        .bind(payload.visible.unwrap_or(true))
        .bind(&payload.remark)
        .bind(actor)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "Permission code already exists."))
    }

    async fn update(&self, id: i64, payload: &PermissionPayload, actor: i64) -> Result<Permission, AppError> {
        sqlx::query_as::<_, Permission>(
            r#"
            UPDATE sys_permission
            SET parent_id = $2, name = $3, code = $4, permission_type = $5,
                path = $6, component = $7, icon = $8, order_num = $9,
                visible = COALESCE($10, visible), remark = $11,
                updated_by = $12, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(payload.parent_id)
        .bind(&payload.name)
        .bind(&payload.code)
        .bind(payload.permission_type)
        .bind(&payload.path)
        .bind(&payload.component)
        .bind(&payload.icon)
        .bind(payload.order_num)
        .bind(payload.visible)
        .bind(&payload.remark)
        .bind(actor)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "Permission code already exists."))?
        .ok_or_else(|| AppError::not_found("Permission not found."))
    }

    async fn delete(&self, id: i64) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM sys_role_permission WHERE permission_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM sys_permission WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_status(&self, ids: &[i64], enabled: bool, actor: i64) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE sys_permission
            SET enabled = $2, updated_by = $3, updated_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(distinct_ids(ids))
        .bind(enabled)
        .bind(actor)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
