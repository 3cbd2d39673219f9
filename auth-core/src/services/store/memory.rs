//! In-memory store used by tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use super::{AuditStore, CredentialStore, FailedLogin};
use crate::models::{
    normalize_email, AuditLogEntry, AuditPage, AuditQuery, Permission, RefreshTokenRecord, Role,
    Tenant, TenantStatus, User,
};
use crate::services::error::StoreError;

#[derive(Default)]
pub struct InMemoryStore {
    tenants: DashMap<Uuid, Tenant>,
    users: DashMap<Uuid, User>,
    /// `(tenant, lowercased email)` to user id; the uniqueness index.
    emails: DashMap<(Option<Uuid>, String), Uuid>,
    role_permissions: DashMap<(Uuid, Role), Vec<Permission>>,
    refresh_tokens: DashMap<Uuid, RefreshTokenRecord>,
    audit: DashMap<Uuid, AuditLogEntry>,
    audit_unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every audit write fail, simulating an unreachable audit store.
    pub fn set_audit_unavailable(&self, unavailable: bool) {
        self.audit_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_role_permissions(&self, tenant_id: Uuid, role: Role, permissions: Vec<Permission>) {
        self.role_permissions.insert((tenant_id, role), permissions);
    }

    pub fn set_user_active(&self, user_id: Uuid, active: bool) {
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.is_active = active;
        }
    }

    pub fn set_tenant_status(&self, tenant_id: Uuid, status: TenantStatus) {
        if let Some(mut tenant) = self.tenants.get_mut(&tenant_id) {
            tenant.status = status;
        }
    }

    pub fn audit_len(&self) -> usize {
        self.audit.len()
    }

    /// Snapshot of every audit entry, newest first.
    pub fn audit_entries(&self) -> Vec<AuditLogEntry> {
        let mut entries: Vec<AuditLogEntry> = self.audit.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries
    }

    fn with_user<T>(&self, user_id: Uuid, f: impl FnOnce(&mut User) -> T) -> Result<T, StoreError> {
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;
        Ok(f(&mut *user))
    }

    fn ensure_audit_available(&self) -> Result<(), StoreError> {
        if self.audit_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("audit store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, StoreError> {
        Ok(self.tenants.get(&tenant_id).map(|t| t.clone()))
    }

    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), StoreError> {
        if self.tenants.iter().any(|t| t.slug == tenant.slug) {
            return Err(StoreError::Duplicate(format!("tenant slug {}", tenant.slug)));
        }
        self.tenants.insert(tenant.id, tenant.clone());
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn find_user_by_email(
        &self,
        tenant_id: Option<Uuid>,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        let key = (tenant_id, normalize_email(email));
        let Some(user_id) = self.emails.get(&key).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn find_user_by_reset_token(&self, token_hash: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.reset_token_hash.as_deref() == Some(token_hash))
            .map(|u| u.clone()))
    }

    async fn find_user_by_verification_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.email_verify_token_hash.as_deref() == Some(token_hash))
            .map(|u| u.clone()))
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let key = (user.tenant_id, normalize_email(&user.email));
        match self.emails.entry(key) {
            Entry::Occupied(_) => Err(StoreError::Duplicate("Email already registered".to_string())),
            Entry::Vacant(slot) => {
                self.users.insert(user.id, user.clone());
                slot.insert(user.id);
                Ok(())
            }
        }
    }

    async fn record_failed_login(
        &self,
        user_id: Uuid,
        threshold: i32,
        lockout: Duration,
        now: DateTime<Utc>,
    ) -> Result<FailedLogin, StoreError> {
        self.with_user(user_id, |user| {
            if user.locked_until.is_some_and(|until| until <= now) {
                user.failed_login_attempts = 0;
                user.locked_until = None;
            }
            user.failed_login_attempts += 1;
            if user.failed_login_attempts >= threshold {
                user.locked_until = Some(now + lockout);
            }
            user.audit.touch(now);
            FailedLogin {
                attempts: user.failed_login_attempts,
                locked_until: user.locked_until,
            }
        })
    }

    async fn record_successful_login(
        &self,
        user_id: Uuid,
        ip_address: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_user(user_id, |user| {
            user.failed_login_attempts = 0;
            user.locked_until = None;
            user.last_login_at = Some(now);
            user.last_login_ip = ip_address.map(str::to_string);
            user.audit.touch(now);
        })
    }

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_user(user_id, |user| {
            user.reset_token_hash = Some(token_hash.to_string());
            user.reset_token_expires_at = Some(expires_at);
        })
    }

    async fn complete_password_reset(
        &self,
        user_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_user(user_id, |user| {
            user.password_hash = password_hash.to_string();
            user.reset_token_hash = None;
            user.reset_token_expires_at = None;
            user.failed_login_attempts = 0;
            user.locked_until = None;
            user.audit.touch(now);
        })
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_user(user_id, |user| {
            user.password_hash = password_hash.to_string();
            user.audit.touch(now);
        })
    }

    async fn mark_email_verified(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.with_user(user_id, |user| {
            user.is_email_verified = true;
            user.email_verify_token_hash = None;
            user.email_verify_token_expires_at = None;
            user.audit.touch(now);
        })
    }

    async fn find_role_permissions(
        &self,
        tenant_id: Uuid,
        role: Role,
    ) -> Result<Option<Vec<Permission>>, StoreError> {
        Ok(self.role_permissions.get(&(tenant_id, role)).map(|p| p.clone()))
    }

    async fn upsert_role_permissions(
        &self,
        tenant_id: Uuid,
        role: Role,
        permissions: &[Permission],
    ) -> Result<(), StoreError> {
        self.set_role_permissions(tenant_id, role, permissions.to_vec());
        Ok(())
    }

    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        match self.refresh_tokens.entry(record.jti) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!("refresh token {}", record.jti))),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn find_refresh_token(&self, jti: Uuid) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(self.refresh_tokens.get(&jti).map(|r| r.clone()))
    }

    async fn revoke_refresh_token(&self, jti: Uuid) -> Result<bool, StoreError> {
        Ok(match self.refresh_tokens.get_mut(&jti) {
            Some(mut record) if !record.revoked => {
                record.revoked = true;
                true
            }
            _ => false,
        })
    }

    async fn revoke_session(&self, user_id: Uuid, session_id: Uuid) -> Result<u64, StoreError> {
        let mut revoked = 0;
        for mut record in self.refresh_tokens.iter_mut() {
            if record.user_id == user_id && record.session_id == session_id && !record.revoked {
                record.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut revoked = 0;
        for mut record in self.refresh_tokens.iter_mut() {
            if record.user_id == user_id && !record.revoked {
                record.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}

#[async_trait]
impl AuditStore for InMemoryStore {
    async fn insert_audit(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        self.ensure_audit_available()?;
        self.audit.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn find_audit(&self, id: Uuid) -> Result<Option<AuditLogEntry>, StoreError> {
        self.ensure_audit_available()?;
        Ok(self.audit.get(&id).map(|e| e.clone()))
    }

    async fn query_audit(&self, query: &AuditQuery) -> Result<AuditPage, StoreError> {
        self.ensure_audit_available()?;
        let matching: Vec<AuditLogEntry> = self
            .audit_entries()
            .into_iter()
            .filter(|e| query.matches(e))
            .collect();

        let (limit, offset) = (query.limit(), query.offset());
        Ok(AuditPage {
            total: matching.len() as i64,
            items: matching
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect(),
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
        self.ensure_audit_available()?;
        let mut entry = self
            .audit
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("Audit entry not found".to_string()))?;
        if !entry.requires_review {
            return Err(StoreError::Conflict(
                "Audit entry is not awaiting review".to_string(),
            ));
        }
        entry.requires_review = false;
        entry.reviewed_by = Some(reviewer);
        entry.reviewed_at = Some(now);
        Ok(entry.clone())
    }

    async fn purge_audit_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.ensure_audit_available()?;
        // Counted inside retain: concurrent inserts change len() mid-sweep.
        let mut purged = 0u64;
        self.audit.retain(|_, entry| {
            let keep = entry.created_at >= cutoff || entry.is_retained();
            if !keep {
                purged += 1;
            }
            keep
        });
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubscriptionPlan;
    use crate::services::AuditEvent;
    use std::sync::Arc;

    fn user(tenant_id: Option<Uuid>, email: &str) -> User {
        User::new(
            tenant_id,
            email.to_string(),
            "hash".to_string(),
            "Test".to_string(),
            "User".to_string(),
            Role::Nurse,
        )
    }

    #[tokio::test]
    async fn test_email_unique_per_tenant_case_insensitive() {
        let store = InMemoryStore::new();
        let t1 = Tenant::new("t1".to_string(), "T1".to_string(), SubscriptionPlan::Basic);
        let t2 = Tenant::new("t2".to_string(), "T2".to_string(), SubscriptionPlan::Basic);

        store.insert_user(&user(Some(t1.id), "a@x.com")).await.unwrap();
        let dup = store.insert_user(&user(Some(t1.id), "A@X.com")).await;
        assert!(matches!(dup, Err(StoreError::Duplicate(_))));
        store.insert_user(&user(Some(t2.id), "a@x.com")).await.unwrap();

        let found = store.find_user_by_email(Some(t1.id), "A@x.COM").await.unwrap();
        assert!(found.is_some());
        assert!(store.find_user_by_email(None, "a@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_login_locks_at_threshold_and_restarts_after_expiry() {
        let store = InMemoryStore::new();
        let u = user(None, "lock@x.com");
        store.insert_user(&u).await.unwrap();
        let now = Utc::now();
        let lockout = Duration::minutes(30);

        for attempt in 1..=4 {
            let outcome = store.record_failed_login(u.id, 5, lockout, now).await.unwrap();
            assert_eq!(outcome.attempts, attempt);
            assert!(!outcome.locked(now));
        }
        let outcome = store.record_failed_login(u.id, 5, lockout, now).await.unwrap();
        assert_eq!(outcome.locked_until, Some(now + lockout));

        let later = now + lockout + Duration::seconds(1);
        let outcome = store.record_failed_login(u.id, 5, lockout, later).await.unwrap();
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.locked_until.is_none());
    }

    #[tokio::test]
    async fn test_revoke_refresh_token_only_once() {
        let store = InMemoryStore::new();
        let record = RefreshTokenRecord::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "digest".to_string(),
            Utc::now() + Duration::days(1),
        );
        store.insert_refresh_token(&record).await.unwrap();

        assert!(store.revoke_refresh_token(record.jti).await.unwrap());
        assert!(!store.revoke_refresh_token(record.jti).await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_audit_store_rejects_writes() {
        let store = InMemoryStore::new();
        store.set_audit_unavailable(true);

        let entry = AuditEvent::new("GET", "/patients", 200).into_entry();
        let write = store.insert_audit(&entry).await;
        assert!(matches!(write, Err(StoreError::Unavailable(_))));
        let read = store.query_audit(&AuditQuery::default()).await;
        assert!(matches!(read, Err(StoreError::Unavailable(_))));
        assert_eq!(store.audit_len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_purge_counts_only_removed_entries_during_inserts() {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        let cutoff = now - Duration::days(90);

        for _ in 0..2_000 {
            let mut entry = AuditEvent::new("GET", "/appointments", 200).into_entry();
            entry.created_at = now - Duration::days(120);
            store.insert_audit(&entry).await.unwrap();
        }

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..20_000 {
                    let entry = AuditEvent::new("GET", "/appointments", 200).into_entry();
                    store.insert_audit(&entry).await.unwrap();
                }
            })
        };

        let mut purged = 0;
        while !writer.is_finished() {
            purged += store.purge_audit_before(cutoff).await.unwrap();
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
        purged += store.purge_audit_before(cutoff).await.unwrap();

        assert_eq!(purged, 2_000);
        assert_eq!(store.audit_len(), 20_000);
    }
}
