use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Permission, Role, User};

/// Verified caller identity decoded from an access token. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
    pub tenant_id: Option<Uuid>,
    pub role: Role,
    pub custom_permissions: Option<Vec<Permission>>,
    pub session_id: Uuid,
}

impl Identity {
    pub fn is_super_admin(&self) -> bool {
        self.role.is_super_admin()
    }

    /// Identity for a new or continuing session of `user`.
    pub fn for_session(user: &User, session_id: Uuid) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            tenant_id: user.tenant_id,
            role: user.role,
            custom_permissions: user.custom_permissions.clone(),
            session_id,
        }
    }
}

/// Where a request came from, as far as the transport can tell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}
