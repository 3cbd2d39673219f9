use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::dtos::{
    ChangePasswordRequest, LoginRequest, LogoutResponse, PasswordResetConfirm,
    PasswordResetRequest, RefreshRequest, RegisterRequest, VerifyEmailRequest,
};
use crate::guards::AuthContext;
use crate::models::ClientInfo;
use crate::utils::ValidatedJson;
use crate::AppState;

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    client: ClientInfo,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.auth_service.register(req, &client).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.auth_service.login(req, &client).await?;
    Ok(Json(response))
}

/// POST /auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    client: ClientInfo,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tokens = state
        .auth_service
        .refresh(&req.refresh_token, &client)
        .await?;
    Ok(Json(tokens))
}

/// POST /auth/password-reset/request
pub async fn request_password_reset(
    State(state): State<AppState>,
    client: ClientInfo,
    ValidatedJson(req): ValidatedJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state
        .auth_service
        .request_password_reset(req, &client)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to process password reset request");
            e
        })?;
    Ok(Json(response))
}

/// POST /auth/password-reset/confirm
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    client: ClientInfo,
    ValidatedJson(req): ValidatedJson<PasswordResetConfirm>,
) -> Result<impl IntoResponse, AppError> {
    let response = state
        .auth_service
        .confirm_password_reset(req, &client)
        .await?;
    Ok(Json(response))
}

/// POST /auth/verify-email
pub async fn verify_email(
    State(state): State<AppState>,
    client: ClientInfo,
    ValidatedJson(req): ValidatedJson<VerifyEmailRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.auth_service.verify_email(&req.token, &client).await?;
    Ok(Json(response))
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let revoked_tokens = state.auth_service.logout(&ctx.identity).await?;
    Ok(Json(LogoutResponse {
        message: "Logged out".to_string(),
        revoked_tokens,
    }))
}

/// GET /auth/me
pub async fn me(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let profile = state.auth_service.current_user(&ctx.identity).await?;
    Ok(Json(profile))
}

/// POST /auth/change-password
pub async fn change_password(
    State(state): State<AppState>,
    ctx: AuthContext,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state
        .auth_service
        .change_password(&ctx.identity, req)
        .await?;
    Ok(Json(response))
}
