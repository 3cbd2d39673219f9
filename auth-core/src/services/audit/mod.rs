//! Audit pipeline: capture, sanitize, classify, persist in the background.
//!
//! `capture` never blocks and never fails. Entries go into a bounded queue
//! drained by a single worker task; when the queue is full the oldest entry is
//! dropped and counted. Persistence failures are logged and counted, never
//! surfaced to the request that produced them.

pub mod classify;
mod retention;
pub mod sanitize;

use chrono::Utc;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::error::{AuditPersistenceError, ServiceError};
use super::metrics::{AUDIT_EVENTS_DROPPED, AUDIT_PERSIST_FAILURES};
use super::store::AuditStore;
use crate::models::{AuditLogEntry, AuditPage, AuditQuery, Identity};

pub use retention::RetentionJob;

/// Raw outcome of a request or account operation, before classification.
#[derive(Debug, Clone, Default)]
pub struct AuditEvent {
    pub identity: Option<Identity>,
    /// Overrides the identity's tenant (e.g. the enforced request tenant).
    pub tenant_id: Option<Uuid>,
    pub action: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub method: String,
    pub endpoint: String,
    pub status_code: u16,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub error_message: Option<String>,
    pub failed_authentication: bool,
    pub suspicious: bool,
    pub duration_ms: i64,
}

impl AuditEvent {
    pub fn new(method: impl Into<String>, endpoint: impl Into<String>, status_code: u16) -> Self {
        Self {
            method: method.into(),
            endpoint: endpoint.into(),
            status_code,
            ..Default::default()
        }
    }

    pub fn identity(mut self, identity: &Identity) -> Self {
        self.identity = Some(identity.clone());
        self
    }

    pub fn tenant(mut self, tenant_id: Option<Uuid>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn entity(mut self, entity_type: impl Into<String>, entity_id: Option<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = entity_id;
        self
    }

    pub fn client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    pub fn values(mut self, old_values: Option<Value>, new_values: Option<Value>) -> Self {
        self.old_values = old_values;
        self.new_values = new_values;
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Failed authentication; always suspicious.
    pub fn failed_authentication(mut self) -> Self {
        self.failed_authentication = true;
        self
    }

    pub fn suspicious(mut self) -> Self {
        self.suspicious = true;
        self
    }

    pub fn duration_ms(mut self, duration_ms: i64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Sanitize and classify into a persistable entry.
    pub fn into_entry(self) -> AuditLogEntry {
        let (derived_type, derived_id) = classify::entity_from_path(&self.endpoint);
        let action = self
            .action
            .unwrap_or_else(|| classify::action_for_method(&self.method).to_string());
        let entity_type = self.entity_type.unwrap_or(derived_type);
        let entity_id = self.entity_id.or(derived_id);

        let is_sensitive = classify::is_sensitive(&entity_type, &action);
        let is_suspicious = self.failed_authentication || self.suspicious;
        let requires_review = classify::requires_review(self.status_code);

        let identity = self.identity.as_ref();
        AuditLogEntry {
            id: Uuid::new_v4(),
            tenant_id: self.tenant_id.or(identity.and_then(|i| i.tenant_id)),
            user_id: identity.map(|i| i.user_id),
            user_email: identity.map(|i| i.email.clone()),
            user_role: identity.map(|i| i.role),
            action,
            entity_type,
            entity_id,
            method: self.method.to_ascii_uppercase(),
            endpoint: self.endpoint,
            status_code: self.status_code,
            ip_address: self.ip_address.unwrap_or_else(|| "unknown".to_string()),
            user_agent: self.user_agent,
            old_values: self.old_values.map(|v| sanitize::sanitize(&v)),
            new_values: self.new_values.map(|v| sanitize::sanitize(&v)),
            error_message: self.error_message,
            is_sensitive,
            is_suspicious,
            requires_review,
            reviewed_by: None,
            reviewed_at: None,
            duration_ms: self.duration_ms.max(0),
            created_at: Utc::now(),
        }
    }
}

struct Shared {
    store: Arc<dyn AuditStore>,
    queue: Mutex<VecDeque<AuditLogEntry>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, VecDeque<AuditLogEntry>> {
        // A panic while holding the lock leaves the queue itself intact.
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn drain(&self) -> Vec<AuditLogEntry> {
        self.queue().drain(..).collect()
    }

    async fn persist(&self, entry: AuditLogEntry) {
        if let Err(e) = self.store.insert_audit(&entry).await {
            let err = AuditPersistenceError(e);
            metrics::counter!(AUDIT_PERSIST_FAILURES).increment(1);
            tracing::error!(
                error = %err,
                audit_id = %entry.id,
                action = %entry.action,
                endpoint = %entry.endpoint,
                "Dropping audit entry after persistence failure"
            );
        }
    }
}

#[derive(Clone)]
pub struct AuditPipeline {
    shared: Arc<Shared>,
}

impl AuditPipeline {
    pub fn new(store: Arc<dyn AuditStore>, capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                queue: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
                capacity: capacity.max(1),
                notify: Notify::new(),
                dropped: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Queue an event for persistence. Returns the id of the entry.
    pub fn capture(&self, event: AuditEvent) -> Uuid {
        let entry = event.into_entry();
        let id = entry.id;
        self.enqueue(entry);
        id
    }

    fn enqueue(&self, entry: AuditLogEntry) {
        let evicted = {
            let mut queue = self.shared.queue();
            let evicted = if queue.len() >= self.shared.capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(entry);
            evicted
        };

        if let Some(old) = evicted {
            let total = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            metrics::counter!(AUDIT_EVENTS_DROPPED).increment(1);
            tracing::warn!(
                audit_id = %old.id,
                action = %old.action,
                dropped_total = total,
                "Audit queue full; dropped oldest entry"
            );
        }
        self.shared.notify.notify_one();
    }

    /// Start the background writer.
    pub fn spawn_worker(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            tracing::info!(capacity = shared.capacity, "Audit worker started");
            loop {
                let batch = shared.drain();
                if batch.is_empty() {
                    if shared.closed.load(Ordering::Acquire) {
                        break;
                    }
                    shared.notify.notified().await;
                    continue;
                }
                for entry in batch {
                    shared.persist(entry).await;
                }
            }
            tracing::info!("Audit worker stopped");
        })
    }

    /// Stop accepting wake-ups and wait for the worker to drain the queue.
    pub async fn shutdown(&self, worker: JoinHandle<()>) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_one();
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "Audit worker terminated abnormally");
        }
    }

    /// Persist everything queued right now on the calling task.
    pub async fn flush(&self) {
        for entry in self.shared.drain() {
            self.shared.persist(entry).await;
        }
    }

    pub fn pending(&self) -> usize {
        self.shared.queue().len()
    }

    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub async fn query(&self, query: &AuditQuery) -> Result<AuditPage, ServiceError> {
        Ok(self.shared.store.query_audit(query).await?)
    }

    /// Clear the review flag. Only entries awaiting review qualify; entries of
    /// another tenant look the same as missing ones unless the reviewer is a
    /// super admin.
    pub async fn mark_reviewed(
        &self,
        id: Uuid,
        reviewer: &Identity,
    ) -> Result<AuditLogEntry, ServiceError> {
        let not_found = || ServiceError::NotFound("Audit entry not found".to_string());
        let existing = self.shared.store.find_audit(id).await?.ok_or_else(not_found)?;
        if !reviewer.is_super_admin() && existing.tenant_id != reviewer.tenant_id {
            return Err(not_found());
        }

        let entry = self
            .shared
            .store
            .mark_reviewed(id, reviewer.user_id, Utc::now())
            .await?;
        tracing::info!(audit_id = %id, reviewer = %reviewer.user_id, "Audit entry reviewed");
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use serde_json::json;

    fn identity() -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            email: "doc@clinic.test".to_string(),
            tenant_id: Some(Uuid::new_v4()),
            role: Role::Doctor,
            custom_permissions: None,
            session_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_entry_derivation() {
        let identity = identity();
        let entry = AuditEvent::new("put", "/api/v1/patients/17", 200)
            .identity(&identity)
            .values(None, Some(json!({ "name": "a", "ssn": "123" })))
            .into_entry();

        assert_eq!(entry.action, "update");
        assert_eq!(entry.entity_type, "patients");
        assert_eq!(entry.entity_id.as_deref(), Some("17"));
        assert_eq!(entry.method, "PUT");
        assert_eq!(entry.tenant_id, identity.tenant_id);
        assert_eq!(entry.user_role, Some(Role::Doctor));
        assert!(entry.is_sensitive);
        assert!(!entry.is_suspicious);
        assert!(!entry.requires_review);
        assert_eq!(entry.new_values, Some(json!({ "name": "a", "ssn": "[REDACTED]" })));
    }

    #[test]
    fn test_failed_authentication_is_suspicious_and_anonymous() {
        let entry = AuditEvent::new("GET", "/audit/logs", 401)
            .failed_authentication()
            .error("Invalid token")
            .into_entry();

        assert!(entry.is_suspicious);
        assert!(entry.user_id.is_none());
        assert!(entry.tenant_id.is_none());
        assert_eq!(entry.ip_address, "unknown");
    }

    #[test]
    fn test_server_errors_require_review() {
        let entry = AuditEvent::new("POST", "/appointments", 500).into_entry();
        assert!(entry.requires_review);
        assert!(!entry.is_sensitive);
    }

    #[test]
    fn test_explicit_action_and_tenant_win() {
        let identity = identity();
        let tenant = Uuid::new_v4();
        let entry = AuditEvent::new("POST", "/auth/change-password", 200)
            .identity(&identity)
            .tenant(Some(tenant))
            .action("change_password")
            .into_entry();

        assert_eq!(entry.action, "change_password");
        assert_eq!(entry.tenant_id, Some(tenant));
        assert!(entry.is_sensitive);
    }
}
