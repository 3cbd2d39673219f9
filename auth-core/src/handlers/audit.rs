//! Audit trail query and review endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::guards::AuthContext;
use crate::models::{AuditLogEntry, AuditPage, AuditQuery};
use crate::AppState;

/// List audit entries, newest first.
///
/// GET /audit/logs
///
/// Callers bound to a tenant only ever see that tenant's entries; the guard
/// chain has already rejected requests naming another tenant.
#[tracing::instrument(
    skip(state, ctx, query),
    fields(
        user_id = %ctx.identity.user_id,
        tenant_id = ?ctx.tenant_id,
        limit = query.limit(),
        offset = query.offset()
    )
)]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditPage>, AppError> {
    let mut query = query;
    if !ctx.identity.is_super_admin() || ctx.tenant_id.is_some() {
        query.tenant_id = ctx.tenant_id;
    }
    let page = state.audit.query(&query).await?;
    Ok(Json(page))
}

/// Mark an entry awaiting review as reviewed.
///
/// POST /audit/logs/:id/review
pub async fn review_audit_log(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<AuditLogEntry>, AppError> {
    let entry = state.audit.mark_reviewed(id, &ctx.identity).await?;
    Ok(Json(entry))
}
