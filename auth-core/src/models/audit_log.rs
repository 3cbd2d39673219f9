//! Audit trail records.
//!
//! Entries are append-only. The single permitted mutation is the review
//! transition (`requires_review` true to false with reviewer stamp); removal
//! happens only through the retention job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub user_email: Option<String>,
    pub user_role: Option<Role>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub method: String,
    pub endpoint: String,
    pub status_code: u16,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub is_sensitive: bool,
    pub is_suspicious: bool,
    pub requires_review: bool,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Entries flagged sensitive or awaiting review survive retention.
    pub fn is_retained(&self) -> bool {
        self.is_sensitive || self.requires_review
    }
}

/// Filters for listing audit entries. Absent fields do not filter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub tenant_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub action: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub is_sensitive: Option<bool>,
    pub is_suspicious: Option<bool>,
    pub requires_review: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl AuditQuery {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 500;

    /// Page size clamped to `1..=500`.
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    /// In-memory evaluation of the filter set.
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.tenant_id.is_none_or(|t| entry.tenant_id == Some(t))
            && self.user_id.is_none_or(|u| entry.user_id == Some(u))
            && self.action.as_ref().is_none_or(|a| &entry.action == a)
            && self
                .entity_type
                .as_ref()
                .is_none_or(|e| &entry.entity_type == e)
            && self
                .entity_id
                .as_ref()
                .is_none_or(|e| entry.entity_id.as_ref() == Some(e))
            && self.from.is_none_or(|from| entry.created_at >= from)
            && self.to.is_none_or(|to| entry.created_at <= to)
            && self.is_sensitive.is_none_or(|f| entry.is_sensitive == f)
            && self.is_suspicious.is_none_or(|f| entry.is_suspicious == f)
            && self.requires_review.is_none_or(|f| entry.requires_review == f)
    }
}

/// One page of audit entries, newest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditPage {
    pub items: Vec<AuditLogEntry>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}
