//! Tenant isolation.
//!
//! The target tenant of a request comes from, in order: the `tenantId` path
//! parameter, the `tenantId` query parameter, a top-level `tenantId` body
//! field, the `X-Tenant-Id` header. With none of these the caller's own
//! tenant applies.

use std::collections::HashMap;
use uuid::Uuid;

use super::GuardRequest;
use crate::models::Identity;
use crate::services::{AuthorizationError, ValidationError};

pub const TENANT_PARAM: &str = "tenantId";
pub const TENANT_HEADER: &str = "x-tenant-id";

fn parse(raw: &str) -> Result<Uuid, ValidationError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ValidationError::Invalid(format!("Invalid tenant id: {}", raw)))
}

/// The tenant a request targets, if it names one.
pub fn requested_tenant(
    request: &GuardRequest,
    params: &HashMap<String, String>,
) -> Result<Option<Uuid>, ValidationError> {
    if let Some(raw) = params.get(TENANT_PARAM) {
        return parse(raw).map(Some);
    }

    if let Some(query) = request.query.as_deref() {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
            .map_err(|_| ValidationError::Invalid("Malformed query string".to_string()))?;
        if let Some((_, raw)) = pairs.iter().find(|(k, _)| k == TENANT_PARAM) {
            return parse(raw).map(Some);
        }
    }

    if let Some(value) = request.body.as_ref().and_then(|b| b.get(TENANT_PARAM)) {
        return match value {
            serde_json::Value::String(raw) => parse(raw).map(Some),
            serde_json::Value::Null => Ok(None),
            other => Err(ValidationError::Invalid(format!("Invalid tenant id: {}", other))),
        };
    }

    request.tenant_header.as_deref().map(parse).transpose()
}

/// The tenant to enforce for `identity`. Super admins may target any tenant;
/// everyone else only their own.
pub fn enforce(
    identity: &Identity,
    requested: Option<Uuid>,
) -> Result<Option<Uuid>, AuthorizationError> {
    if identity.is_super_admin() {
        return Ok(requested.or(identity.tenant_id));
    }
    match requested {
        Some(target) if Some(target) != identity.tenant_id => Err(AuthorizationError::TenantMismatch),
        _ => Ok(identity.tenant_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use axum::http::Method;
    use serde_json::json;

    fn identity(role: Role, tenant_id: Option<Uuid>) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            email: "u@clinic.test".to_string(),
            tenant_id,
            role,
            custom_permissions: None,
            session_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_resolution_order() {
        let (a, b, c, d) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut request = GuardRequest::new(Method::GET, "/tenants/x/users")
            .with_query(format!("tenantId={}", b))
            .with_body(json!({ "tenantId": c.to_string() }))
            .with_tenant_header(d.to_string());
        let mut params = HashMap::from([(TENANT_PARAM.to_string(), a.to_string())]);

        assert_eq!(requested_tenant(&request, &params), Ok(Some(a)));
        params.clear();
        assert_eq!(requested_tenant(&request, &params), Ok(Some(b)));
        request.query = None;
        assert_eq!(requested_tenant(&request, &params), Ok(Some(c)));
        request.body = None;
        assert_eq!(requested_tenant(&request, &params), Ok(Some(d)));
        request.tenant_header = None;
        assert_eq!(requested_tenant(&request, &params), Ok(None));
    }

    #[test]
    fn test_malformed_tenant_is_validation_error() {
        let request = GuardRequest::new(Method::GET, "/patients").with_tenant_header("nope");
        assert!(matches!(
            requested_tenant(&request, &HashMap::new()),
            Err(ValidationError::Invalid(_))
        ));

        let request = GuardRequest::new(Method::POST, "/patients").with_body(json!({ "tenantId": 7 }));
        assert!(requested_tenant(&request, &HashMap::new()).is_err());
    }

    #[test]
    fn test_enforce() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let doctor = identity(Role::Doctor, Some(a));
        assert_eq!(enforce(&doctor, None), Ok(Some(a)));
        assert_eq!(enforce(&doctor, Some(a)), Ok(Some(a)));
        assert_eq!(enforce(&doctor, Some(b)), Err(AuthorizationError::TenantMismatch));

        let root = identity(Role::SuperAdmin, None);
        assert_eq!(enforce(&root, Some(b)), Ok(Some(b)));
        assert_eq!(enforce(&root, None), Ok(None));
    }
}
