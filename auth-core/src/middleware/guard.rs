use axum::{
    async_trait,
    body::{to_bytes, Body},
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use service_core::error::AppError;
use std::convert::Infallible;
use std::time::Instant;

use crate::guards::{client_info, AuthContext, GuardRequest};
use crate::models::ClientInfo;
use crate::services::AuditEvent;
use crate::AppState;

/// Bodies beyond this are rejected before the guards run.
const MAX_GUARDED_BODY_BYTES: usize = 1024 * 1024;

/// Run the guard chain, expose `AuthContext` to the handler and audit the
/// handler's outcome. Denials are audited by the chain itself.
pub async fn guard_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let (parts, body) = request.into_parts();

    let bytes = match to_bytes(body, MAX_GUARDED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected unreadable request body");
            return AppError::bad_request("Request body could not be read").into_response();
        }
    };
    let json_body = if bytes.is_empty() {
        None
    } else {
        serde_json::from_slice::<serde_json::Value>(&bytes).ok()
    };

    let guard_request = GuardRequest::from_parts(&parts, json_body);
    let context = match state.guards.authorize(&guard_request).await {
        Ok(context) => context,
        Err(e) => return AppError::from(e).into_response(),
    };

    let mut request = Request::from_parts(parts, Body::from(bytes));
    request.extensions_mut().insert(context.clone());

    let response = next.run(request).await;
    let status = response.status();

    let mut event = AuditEvent::new(
        guard_request.method.as_str(),
        guard_request.endpoint(),
        status.as_u16(),
    )
    .identity(&context.identity)
    .tenant(context.tenant_id)
    .client(guard_request.client.ip_address, guard_request.client.user_agent)
    .duration_ms(started.elapsed().as_millis() as i64);
    if let Some(action) = context.route.action {
        event = event.action(action);
    }
    if guard_request.method != Method::GET && guard_request.method != Method::HEAD {
        event = event.values(None, guard_request.body);
    }
    if status.is_client_error() || status.is_server_error() {
        event = event.error(status.canonical_reason().unwrap_or("Request failed"));
    }
    state.audit.capture(event);

    response
}

/// Extractor for the context left by [`guard_middleware`].
#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthContext>().cloned().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!("Auth context missing from request extensions"))
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(client_info(parts))
    }
}
