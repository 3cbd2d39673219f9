//! User model - tenant-scoped staff and patient accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Auditable, Permission, Role};

/// Stored user account.
///
/// `tenant_id` is `None` only for platform accounts. Reset and verification
/// tokens are kept as SHA-256 digests.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub custom_permissions: Option<Vec<Permission>>,
    pub is_active: bool,
    pub is_email_verified: bool,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub reset_token_hash: Option<String>,
    pub reset_token_expires_at: Option<DateTime<Utc>>,
    pub email_verify_token_hash: Option<String>,
    pub email_verify_token_expires_at: Option<DateTime<Utc>>,
    pub audit: Auditable,
}

impl User {
    /// Create a new, active, unverified user.
    pub fn new(
        tenant_id: Option<Uuid>,
        email: String,
        password_hash: String,
        first_name: String,
        last_name: String,
        role: Role,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            email: normalize_email(&email),
            password_hash,
            first_name,
            last_name,
            role,
            custom_permissions: None,
            is_active: true,
            is_email_verified: false,
            failed_login_attempts: 0,
            locked_until: None,
            last_login_at: None,
            last_login_ip: None,
            reset_token_hash: None,
            reset_token_expires_at: None,
            email_verify_token_hash: None,
            email_verify_token_expires_at: None,
            audit: Auditable::new(Utc::now()),
        }
    }

    /// Lock still in force at `now`, if any.
    pub fn active_lock(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.locked_until.filter(|until| *until > now)
    }

    /// Convert to sanitized response (no credential fields).
    pub fn sanitized(&self) -> UserProfile {
        UserProfile::from(self)
    }
}

/// Emails are compared case-insensitively; store them lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Public view of a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_permissions: Option<Vec<Permission>>,
    pub is_active: bool,
    pub is_email_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            tenant_id: user.tenant_id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
            custom_permissions: user.custom_permissions.clone(),
            is_active: user.is_active,
            is_email_verified: user.is_email_verified,
            last_login_at: user.last_login_at,
            created_at: user.audit.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_user_defaults() {
        let user = User::new(
            Some(Uuid::new_v4()),
            " Dr.House@Example.COM ".to_string(),
            "hash".to_string(),
            "Gregory".to_string(),
            "House".to_string(),
            Role::Doctor,
        );

        assert_eq!(user.email, "dr.house@example.com");
        assert!(user.is_active);
        assert!(!user.is_email_verified);
        assert_eq!(user.failed_login_attempts, 0);
        assert!(user.locked_until.is_none());
    }

    #[test]
    fn test_expired_lock_is_not_active() {
        let mut user = User::new(
            None,
            "root@example.com".to_string(),
            "hash".to_string(),
            "Root".to_string(),
            "Admin".to_string(),
            Role::SuperAdmin,
        );
        let now = Utc::now();
        user.locked_until = Some(now - Duration::minutes(1));
        assert!(user.active_lock(now).is_none());

        user.locked_until = Some(now + Duration::minutes(1));
        assert!(user.active_lock(now).is_some());
    }

    #[test]
    fn test_profile_omits_credentials() {
        let user = User::new(
            None,
            "a@x.com".to_string(),
            "$argon2id$secret".to_string(),
            "A".to_string(),
            "X".to_string(),
            Role::Nurse,
        );
        let json = serde_json::to_string(&user.sanitized()).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("\"firstName\":\"A\""));
    }
}
