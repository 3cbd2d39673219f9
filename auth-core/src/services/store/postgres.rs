//! PostgreSQL store.
//!
//! Rows are read into flat `*Row` structs and converted into domain models;
//! enum columns are stored as their wire strings.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::{FromRow, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{AuditStore, CredentialStore, FailedLogin};
use crate::models::{
    normalize_email, AuditLogEntry, AuditPage, AuditQuery, Auditable, Permission,
    RefreshTokenRecord, Role, Tenant, TenantLimits, User,
};
use crate::services::error::StoreError;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_insert_error(err: sqlx::Error, what: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Duplicate(what.to_string())
        }
        _ => StoreError::Database(err),
    }
}

fn parse_column<T: std::str::FromStr<Err = String>>(value: &str) -> Result<T, StoreError> {
    value.parse().map_err(StoreError::Corrupt)
}

#[derive(FromRow)]
struct TenantRow {
    id: Uuid,
    slug: String,
    name: String,
    status: String,
    subscription_plan: String,
    max_users: i32,
    max_patients: i32,
    max_storage_mb: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TenantRow> for Tenant {
    type Error = StoreError;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        Ok(Tenant {
            id: row.id,
            slug: row.slug,
            name: row.name,
            status: parse_column(&row.status)?,
            subscription_plan: parse_column(&row.subscription_plan)?,
            limits: TenantLimits {
                max_users: row.max_users,
                max_patients: row.max_patients,
                max_storage_mb: row.max_storage_mb,
            },
            audit: Auditable {
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
        })
    }
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    tenant_id: Option<Uuid>,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    role: String,
    custom_permissions: Option<Json<Vec<Permission>>>,
    is_active: bool,
    is_email_verified: bool,
    failed_login_attempts: i32,
    locked_until: Option<DateTime<Utc>>,
    last_login_at: Option<DateTime<Utc>>,
    last_login_ip: Option<String>,
    reset_token_hash: Option<String>,
    reset_token_expires_at: Option<DateTime<Utc>>,
    email_verify_token_hash: Option<String>,
    email_verify_token_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            tenant_id: row.tenant_id,
            email: row.email,
            password_hash: row.password_hash,
            first_name: row.first_name,
            last_name: row.last_name,
            role: parse_column::<Role>(&row.role)?,
            custom_permissions: row.custom_permissions.map(|Json(p)| p),
            is_active: row.is_active,
            is_email_verified: row.is_email_verified,
            failed_login_attempts: row.failed_login_attempts,
            locked_until: row.locked_until,
            last_login_at: row.last_login_at,
            last_login_ip: row.last_login_ip,
            reset_token_hash: row.reset_token_hash,
            reset_token_expires_at: row.reset_token_expires_at,
            email_verify_token_hash: row.email_verify_token_hash,
            email_verify_token_expires_at: row.email_verify_token_expires_at,
            audit: Auditable {
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
        })
    }
}

#[derive(FromRow)]
struct RefreshTokenRow {
    jti: Uuid,
    user_id: Uuid,
    session_id: Uuid,
    token_hash: String,
    expires_at: DateTime<Utc>,
    revoked: bool,
    created_at: DateTime<Utc>,
}

impl From<RefreshTokenRow> for RefreshTokenRecord {
    fn from(row: RefreshTokenRow) -> Self {
        RefreshTokenRecord {
            jti: row.jti,
            user_id: row.user_id,
            session_id: row.session_id,
            token_hash: row.token_hash,
            expires_at: row.expires_at,
            revoked: row.revoked,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct AuditRow {
    id: Uuid,
    tenant_id: Option<Uuid>,
    user_id: Option<Uuid>,
    user_email: Option<String>,
    user_role: Option<String>,
    action: String,
    entity_type: String,
    entity_id: Option<String>,
    method: String,
    endpoint: String,
    status_code: i32,
    ip_address: String,
    user_agent: Option<String>,
    old_values: Option<serde_json::Value>,
    new_values: Option<serde_json::Value>,
    error_message: Option<String>,
    is_sensitive: bool,
    is_suspicious: bool,
    requires_review: bool,
    reviewed_by: Option<Uuid>,
    reviewed_at: Option<DateTime<Utc>>,
    duration_ms: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditLogEntry {
    type Error = StoreError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        Ok(AuditLogEntry {
            id: row.id,
            tenant_id: row.tenant_id,
            user_id: row.user_id,
            user_email: row.user_email,
            user_role: row.user_role.as_deref().map(parse_column::<Role>).transpose()?,
            action: row.action,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            method: row.method,
            endpoint: row.endpoint,
            status_code: u16::try_from(row.status_code)
                .map_err(|_| StoreError::Corrupt(format!("status code {}", row.status_code)))?,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            old_values: row.old_values,
            new_values: row.new_values,
            error_message: row.error_message,
            is_sensitive: row.is_sensitive,
            is_suspicious: row.is_suspicious,
            requires_review: row.requires_review,
            reviewed_by: row.reviewed_by,
            reviewed_at: row.reviewed_at,
            duration_ms: row.duration_ms,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(|e| {
            tracing::error!("Database health check failed: {}", e);
            StoreError::Unavailable(e.to_string())
        })?;
        Ok(())
    }

    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, StoreError> {
        sqlx::query_as::<_, TenantRow>("SELECT * FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Tenant::try_from)
            .transpose()
    }

    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tenants (id, slug, name, status, subscription_plan, max_users,
                                 max_patients, max_storage_mb, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(tenant.id)
        .bind(&tenant.slug)
        .bind(&tenant.name)
        .bind(tenant.status.as_str())
        .bind(tenant.subscription_plan.as_str())
        .bind(tenant.limits.max_users)
        .bind(tenant.limits.max_patients)
        .bind(tenant.limits.max_storage_mb)
        .bind(tenant.audit.created_at)
        .bind(tenant.audit.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "Tenant slug already exists"))?;
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_user_by_email(
        &self,
        tenant_id: Option<Uuid>,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(
            "SELECT * FROM users WHERE tenant_id IS NOT DISTINCT FROM $1 AND LOWER(email) = $2",
        )
        .bind(tenant_id)
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn find_user_by_reset_token(&self, token_hash: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE reset_token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_user_by_verification_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email_verify_token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, tenant_id, email, password_hash, first_name, last_name, role,
                               custom_permissions, is_active, is_email_verified,
                               failed_login_attempts, locked_until, last_login_at, last_login_ip,
                               reset_token_hash, reset_token_expires_at,
                               email_verify_token_hash, email_verify_token_expires_at,
                               created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20)
            "#,
        )
        .bind(user.id)
        .bind(user.tenant_id)
        .bind(normalize_email(&user.email))
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role.as_str())
        .bind(user.custom_permissions.as_ref().map(Json))
        .bind(user.is_active)
        .bind(user.is_email_verified)
        .bind(user.failed_login_attempts)
        .bind(user.locked_until)
        .bind(user.last_login_at)
        .bind(&user.last_login_ip)
        .bind(&user.reset_token_hash)
        .bind(user.reset_token_expires_at)
        .bind(&user.email_verify_token_hash)
        .bind(user.email_verify_token_expires_at)
        .bind(user.audit.created_at)
        .bind(user.audit.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "Email already registered"))?;
        Ok(())
    }

    async fn record_failed_login(
        &self,
        user_id: Uuid,
        threshold: i32,
        lockout: Duration,
        now: DateTime<Utc>,
    ) -> Result<FailedLogin, StoreError> {
        // SET expressions see the pre-update row, so the restart rule is
        // repeated inside the lock decision.
        let row: Option<(i32, Option<DateTime<Utc>>)> = sqlx::query_as(
            r#"
            UPDATE users SET
                failed_login_attempts = CASE
                    WHEN locked_until IS NOT NULL AND locked_until <= $2 THEN 1
                    ELSE failed_login_attempts + 1
                END,
                locked_until = CASE
                    WHEN (CASE
                            WHEN locked_until IS NOT NULL AND locked_until <= $2 THEN 1
                            ELSE failed_login_attempts + 1
                          END) >= $3 THEN $4
                    WHEN locked_until IS NOT NULL AND locked_until <= $2 THEN NULL
                    ELSE locked_until
                END,
                updated_at = $2
            WHERE id = $1
            RETURNING failed_login_attempts, locked_until
            "#,
        )
        .bind(user_id)
        .bind(now)
        .bind(threshold)
        .bind(now + lockout)
        .fetch_optional(&self.pool)
        .await?;

        let (attempts, locked_until) =
            row.ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;
        Ok(FailedLogin {
            attempts,
            locked_until,
        })
    }

    async fn record_successful_login(
        &self,
        user_id: Uuid,
        ip_address: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
            SET failed_login_attempts = 0, locked_until = NULL,
                last_login_at = $2, last_login_ip = $3, updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(now)
        .bind(ip_address)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users SET reset_token_hash = $2, reset_token_expires_at = $3 WHERE id = $1",
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_password_reset(
        &self,
        user_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, reset_token_hash = NULL, reset_token_expires_at = NULL,
                failed_login_attempts = 0, locked_until = NULL, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(password_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_email_verified(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
            SET is_email_verified = TRUE, email_verify_token_hash = NULL,
                email_verify_token_expires_at = NULL, updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_role_permissions(
        &self,
        tenant_id: Uuid,
        role: Role,
    ) -> Result<Option<Vec<Permission>>, StoreError> {
        let row: Option<(Json<Vec<Permission>>,)> = sqlx::query_as(
            "SELECT permissions FROM role_permissions WHERE tenant_id = $1 AND role = $2",
        )
        .bind(tenant_id)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(Json(p),)| p))
    }

    async fn upsert_role_permissions(
        &self,
        tenant_id: Uuid,
        role: Role,
        permissions: &[Permission],
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO role_permissions (tenant_id, role, permissions, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (tenant_id, role)
            DO UPDATE SET permissions = EXCLUDED.permissions, updated_at = NOW()
            "#,
        )
        .bind(tenant_id)
        .bind(role.as_str())
        .bind(Json(permissions))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (jti, user_id, session_id, token_hash, expires_at, revoked, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.jti)
        .bind(record.user_id)
        .bind(record.session_id)
        .bind(&record.token_hash)
        .bind(record.expires_at)
        .bind(record.revoked)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "Refresh token already registered"))?;
        Ok(())
    }

    async fn find_refresh_token(&self, jti: Uuid) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(
            sqlx::query_as::<_, RefreshTokenRow>("SELECT * FROM refresh_tokens WHERE jti = $1")
                .bind(jti)
                .fetch_optional(&self.pool)
                .await?
                .map(RefreshTokenRecord::from),
        )
    }

    async fn revoke_refresh_token(&self, jti: Uuid) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = $1 AND revoked = FALSE")
                .bind(jti)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_session(&self, user_id: Uuid, session_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1 AND session_id = $2 AND revoked = FALSE",
        )
        .bind(user_id)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1 AND revoked = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Append the `WHERE` clause shared by the count and page queries.
fn push_audit_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &AuditQuery) {
    builder.push(" WHERE TRUE");
    if let Some(tenant_id) = query.tenant_id {
        builder.push(" AND tenant_id = ").push_bind(tenant_id);
    }
    if let Some(user_id) = query.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(action) = &query.action {
        builder.push(" AND action = ").push_bind(action.clone());
    }
    if let Some(entity_type) = &query.entity_type {
        builder.push(" AND entity_type = ").push_bind(entity_type.clone());
    }
    if let Some(entity_id) = &query.entity_id {
        builder.push(" AND entity_id = ").push_bind(entity_id.clone());
    }
    if let Some(from) = query.from {
        builder.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = query.to {
        builder.push(" AND created_at <= ").push_bind(to);
    }
    if let Some(flag) = query.is_sensitive {
        builder.push(" AND is_sensitive = ").push_bind(flag);
    }
    if let Some(flag) = query.is_suspicious {
        builder.push(" AND is_suspicious = ").push_bind(flag);
    }
    if let Some(flag) = query.requires_review {
        builder.push(" AND requires_review = ").push_bind(flag);
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn insert_audit(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, tenant_id, user_id, user_email, user_role, action,
                                    entity_type, entity_id, method, endpoint, status_code,
                                    ip_address, user_agent, old_values, new_values, error_message,
                                    is_sensitive, is_suspicious, requires_review, reviewed_by,
                                    reviewed_at, duration_ms, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23)
            "#,
        )
        .bind(entry.id)
        .bind(entry.tenant_id)
        .bind(entry.user_id)
        .bind(&entry.user_email)
        .bind(entry.user_role.map(|r| r.as_str()))
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.method)
        .bind(&entry.endpoint)
        .bind(i32::from(entry.status_code))
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(&entry.old_values)
        .bind(&entry.new_values)
        .bind(&entry.error_message)
        .bind(entry.is_sensitive)
        .bind(entry.is_suspicious)
        .bind(entry.requires_review)
        .bind(entry.reviewed_by)
        .bind(entry.reviewed_at)
        .bind(entry.duration_ms)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_audit(&self, id: Uuid) -> Result<Option<AuditLogEntry>, StoreError> {
        sqlx::query_as::<_, AuditRow>("SELECT * FROM audit_logs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(AuditLogEntry::try_from)
            .transpose()
    }

    async fn query_audit(&self, query: &AuditQuery) -> Result<AuditPage, StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_logs");
        push_audit_filters(&mut count, query);
        let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;

        let (limit, offset) = (query.limit(), query.offset());
        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM audit_logs");
        push_audit_filters(&mut select, query);
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let items = select
            .build_query_as::<AuditRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(AuditLogEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AuditPage {
            items,
            total,
            limit,
            offset,
        })
    }

    async fn mark_reviewed(
        &self,
        id: Uuid,
        reviewer: Uuid,
        now: DateTime<Utc>,
    ) -> Result<AuditLogEntry, StoreError> {
        let updated = sqlx::query_as::<_, AuditRow>(
            r#"
            UPDATE audit_logs
            SET requires_review = FALSE, reviewed_by = $2, reviewed_at = $3
            WHERE id = $1 AND requires_review = TRUE
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(reviewer)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(row) => AuditLogEntry::try_from(row),
            None => match self.find_audit(id).await? {
                Some(_) => Err(StoreError::Conflict(
                    "Audit entry is not awaiting review".to_string(),
                )),
                None => Err(StoreError::NotFound("Audit entry not found".to_string())),
            },
        }
    }

    async fn purge_audit_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM audit_logs
            WHERE created_at < $1 AND is_sensitive = FALSE AND requires_review = FALSE
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
