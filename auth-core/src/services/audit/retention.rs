use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::services::error::ServiceError;
use crate::services::metrics::AUDIT_ENTRIES_PURGED;
use crate::services::store::AuditStore;

/// Deletes plain audit entries older than the retention window. Sensitive
/// entries and entries awaiting review are never purged.
#[derive(Clone)]
pub struct RetentionJob {
    store: Arc<dyn AuditStore>,
    window: Duration,
}

impl RetentionJob {
    pub fn new(store: Arc<dyn AuditStore>, retention_days: i64) -> Self {
        Self {
            store,
            window: Duration::days(retention_days),
        }
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let cutoff = now - self.window;
        let purged = self.store.purge_audit_before(cutoff).await?;
        metrics::counter!(AUDIT_ENTRIES_PURGED).increment(purged);
        tracing::info!(purged, cutoff = %cutoff, "Audit retention pass complete");
        Ok(purged)
    }

    /// Run every `interval`, starting after the first tick. Failures are
    /// logged and retried on the next tick.
    pub fn spawn(self, interval: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once(Utc::now()).await {
                    tracing::error!(error = %e, "Audit retention pass failed");
                }
            }
        })
    }
}
