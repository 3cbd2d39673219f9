//! Services layer: credentials, tokens, roles, account flows and the audit
//! pipeline, all behind storage traits.

pub mod audit;
mod auth;
pub mod error;
mod jwt;
pub mod metrics;
pub mod notifier;
pub mod password;
mod roles;
pub mod store;

pub(crate) use auth::ensure_tenant_active;
pub use audit::{AuditEvent, AuditPipeline, RetentionJob};
pub use auth::AuthService;
pub use error::{
    AuditPersistenceError, AuthenticationError, AuthorizationError, ServiceError, StoreError,
    ValidationError,
};
pub use jwt::{parse_ttl, AccessClaims, RefreshClaims, TokenPair, TokenService};
pub use notifier::{AccountNotifier, LogNotifier};
pub use password::{digest_token, IssuedToken, PasswordService, StrengthReport};
pub use roles::{PermissionRequirement, RoleDescription, RoleResolver};
pub use store::{AuditStore, CredentialStore, FailedLogin, InMemoryStore, PgStore};
