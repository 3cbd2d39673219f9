//! Role to permission resolution.
//!
//! Resolution order for a caller is: explicit custom permissions (a full
//! override, never merged), then the tenant's override row for the role, then
//! the static table below. `super_admin` passes every requirement regardless.
//! The hierarchy is descriptive only and never widens a check.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::error::StoreError;
use super::store::CredentialStore;
use crate::models::{Identity, Permission, Role};

/// What a route demands of the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "permissions", rename_all = "camelCase")]
pub enum PermissionRequirement {
    /// Any verified identity.
    Authenticated,
    AnyOf(Vec<Permission>),
    AllOf(Vec<Permission>),
}

impl fmt::Display for PermissionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |perms: &[Permission]| {
            perms
                .iter()
                .map(Permission::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self {
            PermissionRequirement::Authenticated => f.write_str("authentication"),
            PermissionRequirement::AnyOf(p) => write!(f, "any of [{}]", join(p)),
            PermissionRequirement::AllOf(p) => write!(f, "all of [{}]", join(p)),
        }
    }
}

/// Human-readable summary of a role.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDescription {
    pub role: Role,
    pub inherits: Vec<Role>,
    pub permissions: Vec<Permission>,
}

#[derive(Clone)]
pub struct RoleResolver {
    store: Arc<dyn CredentialStore>,
}

impl RoleResolver {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Static grants for a role.
    pub fn role_permissions(role: Role) -> &'static [Permission] {
        use Permission::*;
        match role {
            Role::SuperAdmin => &Permission::ALL,
            Role::TenantAdmin => &[
                PatientsRead,
                PatientsWrite,
                PatientsDelete,
                AppointmentsRead,
                AppointmentsWrite,
                AppointmentsDelete,
                PharmacyRead,
                PharmacyWrite,
                LabRead,
                LabWrite,
                StaffRead,
                StaffWrite,
                DepartmentsRead,
                DepartmentsWrite,
                BillingRead,
                BillingWrite,
                IpdRead,
                IpdWrite,
                AuditRead,
                AuditReview,
                UsersRead,
                UsersManage,
            ],
            Role::Doctor => &[
                PatientsRead,
                PatientsWrite,
                AppointmentsRead,
                AppointmentsWrite,
                PharmacyRead,
                LabRead,
                LabWrite,
                LabApprove,
                IpdRead,
                IpdWrite,
                DepartmentsRead,
            ],
            Role::Nurse => &[
                PatientsRead,
                PatientsWrite,
                AppointmentsRead,
                PharmacyRead,
                LabRead,
                IpdRead,
                IpdWrite,
            ],
            Role::Pharmacist => &[PatientsRead, PharmacyRead, PharmacyWrite, PharmacyDispense],
            Role::LabTechnician => &[PatientsRead, LabRead, LabWrite],
            Role::Receptionist => &[
                PatientsRead,
                PatientsWrite,
                AppointmentsRead,
                AppointmentsWrite,
                AppointmentsDelete,
                DepartmentsRead,
                StaffRead,
            ],
            Role::Accountant => &[PatientsRead, BillingRead, BillingWrite],
            Role::Patient => &[AppointmentsRead],
        }
    }

    /// Roles whose duties a role encompasses. Informational.
    pub fn inherited_roles(role: Role) -> &'static [Role] {
        match role {
            Role::SuperAdmin => &[Role::TenantAdmin],
            Role::TenantAdmin => &[
                Role::Doctor,
                Role::Pharmacist,
                Role::LabTechnician,
                Role::Receptionist,
                Role::Accountant,
            ],
            Role::Doctor => &[Role::Nurse],
            Role::Nurse
            | Role::Pharmacist
            | Role::LabTechnician
            | Role::Receptionist
            | Role::Accountant
            | Role::Patient => &[],
        }
    }

    pub fn describe(role: Role) -> RoleDescription {
        RoleDescription {
            role,
            inherits: Self::inherited_roles(role).to_vec(),
            permissions: Self::role_permissions(role).to_vec(),
        }
    }

    /// Custom permissions replace the role's grants entirely.
    pub fn effective_permissions(role: Role, custom: Option<&[Permission]>) -> BTreeSet<Permission> {
        match custom {
            Some(custom) => custom.iter().copied().collect(),
            None => Self::role_permissions(role).iter().copied().collect(),
        }
    }

    pub fn has_any(role: Role, required: &[Permission]) -> bool {
        role.is_super_admin()
            || required
                .iter()
                .any(|p| Self::role_permissions(role).contains(p))
    }

    pub fn has_all(role: Role, required: &[Permission]) -> bool {
        role.is_super_admin()
            || required
                .iter()
                .all(|p| Self::role_permissions(role).contains(p))
    }

    /// Check a resolved permission set against a requirement.
    pub fn satisfies(
        role: Role,
        effective: &BTreeSet<Permission>,
        requirement: &PermissionRequirement,
    ) -> bool {
        if role.is_super_admin() {
            return true;
        }
        match requirement {
            PermissionRequirement::Authenticated => true,
            PermissionRequirement::AnyOf(required) => {
                required.is_empty() || required.iter().any(|p| effective.contains(p))
            }
            PermissionRequirement::AllOf(required) => required.iter().all(|p| effective.contains(p)),
        }
    }

    /// Effective permissions for a caller. At most one store lookup.
    pub async fn resolve(&self, identity: &Identity) -> Result<BTreeSet<Permission>, StoreError> {
        if let Some(custom) = identity.custom_permissions.as_deref() {
            return Ok(Self::effective_permissions(identity.role, Some(custom)));
        }

        if let Some(tenant_id) = identity.tenant_id {
            if let Some(overridden) = self
                .store
                .find_role_permissions(tenant_id, identity.role)
                .await?
            {
                tracing::debug!(
                    tenant_id = %tenant_id,
                    role = %identity.role,
                    "Using tenant role override"
                );
                return Ok(overridden.into_iter().collect());
            }
        }

        Ok(Self::effective_permissions(identity.role, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::InMemoryStore;
    use uuid::Uuid;

    fn identity(role: Role, tenant_id: Option<Uuid>) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            email: "someone@clinic.test".to_string(),
            tenant_id,
            role,
            custom_permissions: None,
            session_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_custom_permissions_fully_override() {
        let custom = [Permission::PatientsRead];
        let effective = RoleResolver::effective_permissions(Role::Doctor, Some(&custom));
        assert_eq!(effective, BTreeSet::from([Permission::PatientsRead]));

        let empty = RoleResolver::effective_permissions(Role::TenantAdmin, Some(&[]));
        assert!(empty.is_empty());
    }

    #[test]
    fn test_super_admin_satisfies_everything() {
        let nothing = BTreeSet::new();
        assert!(RoleResolver::satisfies(
            Role::SuperAdmin,
            &nothing,
            &PermissionRequirement::AllOf(vec![Permission::TenantsManage, Permission::LabApprove]),
        ));
        assert!(RoleResolver::has_all(Role::SuperAdmin, &Permission::ALL));
    }

    #[test]
    fn test_any_and_all() {
        assert!(RoleResolver::has_any(
            Role::Nurse,
            &[Permission::BillingRead, Permission::PatientsRead]
        ));
        assert!(!RoleResolver::has_all(
            Role::Nurse,
            &[Permission::BillingRead, Permission::PatientsRead]
        ));
        assert!(!RoleResolver::has_any(Role::Patient, &[Permission::PatientsRead]));
    }

    #[test]
    fn test_hierarchy_does_not_widen_checks() {
        assert!(RoleResolver::inherited_roles(Role::Doctor).contains(&Role::Nurse));
        assert!(RoleResolver::has_any(Role::Nurse, &[Permission::IpdWrite]));
        let doctor = RoleResolver::describe(Role::Doctor);
        assert_eq!(doctor.inherits, vec![Role::Nurse]);
        assert!(!RoleResolver::has_any(Role::Doctor, &[Permission::BillingRead]));
    }

    #[test]
    fn test_tenant_admin_cannot_manage_tenants() {
        assert!(!RoleResolver::has_any(Role::TenantAdmin, &[Permission::TenantsManage]));
    }

    #[test]
    fn test_requirement_display() {
        let req = PermissionRequirement::AllOf(vec![Permission::LabRead, Permission::LabApprove]);
        assert_eq!(req.to_string(), "all of [lab:read, lab:approve]");
    }

    #[tokio::test]
    async fn test_resolve_prefers_custom_then_tenant_override() {
        let store = Arc::new(InMemoryStore::new());
        let resolver = RoleResolver::new(store.clone());
        let tenant_id = Uuid::new_v4();

        let nurse = identity(Role::Nurse, Some(tenant_id));
        let resolved = resolver.resolve(&nurse).await.unwrap();
        assert!(resolved.contains(&Permission::IpdWrite));

        store.set_role_permissions(tenant_id, Role::Nurse, vec![Permission::PatientsRead]);
        let resolved = resolver.resolve(&nurse).await.unwrap();
        assert_eq!(resolved, BTreeSet::from([Permission::PatientsRead]));

        let mut custom = nurse.clone();
        custom.custom_permissions = Some(vec![Permission::LabRead]);
        let resolved = resolver.resolve(&custom).await.unwrap();
        assert_eq!(resolved, BTreeSet::from([Permission::LabRead]));

        let other_tenant = identity(Role::Nurse, Some(Uuid::new_v4()));
        let resolved = resolver.resolve(&other_tenant).await.unwrap();
        assert!(resolved.contains(&Permission::IpdWrite));
    }
}
