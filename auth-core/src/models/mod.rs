//! Domain models for the authorization and audit core.

mod audit_log;
mod auditable;
mod identity;
mod refresh_token;
mod role;
mod tenant;
mod user;

pub use audit_log::{AuditLogEntry, AuditPage, AuditQuery};
pub use auditable::Auditable;
pub use identity::{ClientInfo, Identity};
pub use refresh_token::RefreshTokenRecord;
pub use role::{Permission, Role};
pub use tenant::{SubscriptionPlan, Tenant, TenantLimits, TenantStatus};
pub use user::{normalize_email, User, UserProfile};
