//! Authorization guard chain: authentication, then permission, then tenant
//! isolation. The first failing step ends the chain.

pub mod authentication;
pub mod permission;
pub mod routes;
pub mod tenant;

use axum::http::{header, request::Parts, Method, StatusCode};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{ClientInfo, Identity, Permission};
use crate::services::{
    AuditEvent, AuditPipeline, AuthorizationError, CredentialStore, RoleResolver, ServiceError,
    TokenService,
};
use routes::{MatchedRoute, RoutePolicy, RouteTable};

/// What the chain needs to know about an incoming request.
#[derive(Debug, Clone)]
pub struct GuardRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub tenant_header: Option<String>,
    pub body: Option<Value>,
    pub client: ClientInfo,
}

impl GuardRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            authorization: None,
            tenant_header: None,
            body: None,
            client: ClientInfo::default(),
        }
    }

    pub fn with_bearer(mut self, token: &str) -> Self {
        self.authorization = Some(format!("Bearer {}", token));
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_tenant_header(mut self, tenant: impl Into<String>) -> Self {
        self.tenant_header = Some(tenant.into());
        self
    }

    /// Build from HTTP request parts and an already-parsed JSON body.
    pub fn from_parts(parts: &Parts, body: Option<Value>) -> Self {
        let get = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            authorization: get(header::AUTHORIZATION.as_str()),
            tenant_header: get(tenant::TENANT_HEADER),
            body,
            client: client_info(parts),
        }
    }

    /// Path plus query string, as recorded in the audit trail.
    pub fn endpoint(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }
}

/// Client address from `X-Forwarded-For` or the socket, plus the user agent.
pub fn client_info(parts: &Parts) -> ClientInfo {
    let forwarded = parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty());
    let socket = parts
        .extensions
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string());
    ClientInfo {
        ip_address: forwarded.or(socket),
        user_agent: parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

/// Result of a successful pass through the chain.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity: Identity,
    /// Tenant enforced for this request. `None` only for platform callers
    /// that did not name a tenant.
    pub tenant_id: Option<Uuid>,
    pub route: RoutePolicy,
    pub params: HashMap<String, String>,
    pub permissions: BTreeSet<Permission>,
}

#[derive(Clone)]
pub struct GuardChain {
    routes: Arc<RouteTable>,
    tokens: TokenService,
    store: Arc<dyn CredentialStore>,
    roles: RoleResolver,
    audit: AuditPipeline,
}

impl GuardChain {
    pub fn new(
        routes: Arc<RouteTable>,
        tokens: TokenService,
        store: Arc<dyn CredentialStore>,
        audit: AuditPipeline,
    ) -> Self {
        let roles = RoleResolver::new(store.clone());
        Self {
            routes,
            tokens,
            store,
            roles,
            audit,
        }
    }

    /// Run the chain for `request`. Failures are audited here; callers only
    /// need to render the error.
    pub async fn authorize(&self, request: &GuardRequest) -> Result<AuthContext, ServiceError> {
        let Some(MatchedRoute { policy, params }) =
            self.routes.lookup(&request.method, &request.path)
        else {
            tracing::warn!(method = %request.method, path = %request.path, "No route policy");
            return Err(AuthorizationError::NoRoutePolicy.into());
        };

        let identity = match authentication::authenticate(
            &self.tokens,
            self.store.as_ref(),
            request.authorization.as_deref(),
        )
        .await
        {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(error = %e, path = %request.path, "Authentication failed");
                self.audit_denial(request, &policy, None, None, &e);
                return Err(e);
            }
        };

        let permissions =
            match permission::check(&self.roles, &identity, &policy.requirement).await {
                Ok(permissions) => permissions,
                Err(e) => {
                    tracing::warn!(
                        user_id = %identity.user_id,
                        role = %identity.role,
                        requirement = %policy.requirement,
                        "Permission denied"
                    );
                    self.audit_denial(request, &policy, Some(&identity), None, &e);
                    return Err(e);
                }
            };

        let requested = match tenant::requested_tenant(request, &params) {
            Ok(requested) => requested,
            Err(e) => {
                let e = ServiceError::from(e);
                self.audit_denial(request, &policy, Some(&identity), None, &e);
                return Err(e);
            }
        };

        let tenant_id = match tenant::enforce(&identity, requested) {
            Ok(tenant_id) => tenant_id,
            Err(e) => {
                tracing::warn!(
                    user_id = %identity.user_id,
                    tenant_id = ?identity.tenant_id,
                    requested_tenant = ?requested,
                    "Cross-tenant access attempt"
                );
                let e = ServiceError::from(e);
                self.audit_denial(request, &policy, Some(&identity), requested, &e);
                return Err(e);
            }
        };

        Ok(AuthContext {
            identity,
            tenant_id,
            route: policy,
            params,
            permissions,
        })
    }

    fn audit_denial(
        &self,
        request: &GuardRequest,
        policy: &RoutePolicy,
        identity: Option<&Identity>,
        requested_tenant: Option<Uuid>,
        error: &ServiceError,
    ) {
        let status = match error {
            ServiceError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Authorization(_) => StatusCode::FORBIDDEN,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut event = AuditEvent::new(request.method.as_str(), request.endpoint(), status.as_u16())
            .client(request.client.ip_address.clone(), request.client.user_agent.clone())
            .error(error.to_string());
        if let Some(action) = policy.action {
            event = event.action(action);
        }

        event = match (identity, error) {
            (None, ServiceError::Authentication(_)) => event.failed_authentication(),
            (Some(identity), ServiceError::Authorization(AuthorizationError::TenantMismatch)) => event
                .identity(identity)
                .values(None, Some(json!({ "requestedTenantId": requested_tenant })))
                .suspicious(),
            (Some(identity), _) => event.identity(identity),
            (None, _) => event,
        };

        self.audit.capture(event);
    }
}
