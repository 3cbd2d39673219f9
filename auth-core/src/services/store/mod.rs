//! Storage seams for credentials and the audit trail.
//!
//! Every method that changes account security state is a single atomic
//! operation in the backing store; callers never read-modify-write.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::error::StoreError;
use crate::models::{
    AuditLogEntry, AuditPage, AuditQuery, Permission, RefreshTokenRecord, Role, Tenant, User,
};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Counter state after a failed login was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedLogin {
    pub attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl FailedLogin {
    pub fn locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn health_check(&self) -> Result<(), StoreError>;

    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, StoreError>;

    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), StoreError>;

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    /// Case-insensitive lookup scoped to a tenant (`None` = platform accounts).
    async fn find_user_by_email(
        &self,
        tenant_id: Option<Uuid>,
        email: &str,
    ) -> Result<Option<User>, StoreError>;

    async fn find_user_by_reset_token(&self, token_hash: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_verification_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<User>, StoreError>;

    /// Fails with `Duplicate` when `(email, tenant_id)` is taken.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    /// Atomically bump the failure counter, restarting it when a previous lock
    /// has expired, and lock the account once `threshold` is reached.
    async fn record_failed_login(
        &self,
        user_id: Uuid,
        threshold: i32,
        lockout: Duration,
        now: DateTime<Utc>,
    ) -> Result<FailedLogin, StoreError>;

    /// Clear failures and lock, stamp last login.
    async fn record_successful_login(
        &self,
        user_id: Uuid,
        ip_address: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Set the new hash and clear the reset token, failure counter and lock.
    async fn complete_password_reset(
        &self,
        user_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn update_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn mark_email_verified(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Per-tenant override of a role's permissions, if configured.
    async fn find_role_permissions(
        &self,
        tenant_id: Uuid,
        role: Role,
    ) -> Result<Option<Vec<Permission>>, StoreError>;

    async fn upsert_role_permissions(
        &self,
        tenant_id: Uuid,
        role: Role,
        permissions: &[Permission],
    ) -> Result<(), StoreError>;

    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), StoreError>;

    async fn find_refresh_token(&self, jti: Uuid) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Revoke one token. Returns `false` when it was already revoked, so two
    /// concurrent rotations cannot both succeed.
    async fn revoke_refresh_token(&self, jti: Uuid) -> Result<bool, StoreError>;

    async fn revoke_session(&self, user_id: Uuid, session_id: Uuid) -> Result<u64, StoreError>;

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append-only insert.
    async fn insert_audit(&self, entry: &AuditLogEntry) -> Result<(), StoreError>;

    async fn find_audit(&self, id: Uuid) -> Result<Option<AuditLogEntry>, StoreError>;

    /// Newest first, with the total number of matches.
    async fn query_audit(&self, query: &AuditQuery) -> Result<AuditPage, StoreError>;

    /// `requires_review` true to false. `Conflict` when the entry is not
    /// awaiting review, `NotFound` when it does not exist.
    async fn mark_reviewed(
        &self,
        id: Uuid,
        reviewer: Uuid,
        now: DateTime<Utc>,
    ) -> Result<AuditLogEntry, StoreError>;

    /// Delete entries created before `cutoff` that are neither sensitive nor
    /// awaiting review.
    async fn purge_audit_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}
