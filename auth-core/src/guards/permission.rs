use std::collections::BTreeSet;

use crate::models::{Identity, Permission};
use crate::services::{AuthorizationError, PermissionRequirement, RoleResolver, ServiceError};

/// Resolve the caller's permissions and check them against `requirement`.
/// Returns the resolved set for downstream use.
pub async fn check(
    resolver: &RoleResolver,
    identity: &Identity,
    requirement: &PermissionRequirement,
) -> Result<BTreeSet<Permission>, ServiceError> {
    let effective = resolver.resolve(identity).await?;
    if RoleResolver::satisfies(identity.role, &effective, requirement) {
        Ok(effective)
    } else {
        Err(AuthorizationError::PermissionDenied(requirement.clone()).into())
    }
}
