//! Account lifecycle: login with lockout, registration, password reset,
//! email verification, password change and refresh-token rotation.

use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;
use validator::Validate;

use super::audit::{AuditEvent, AuditPipeline};
use super::error::{AuthenticationError, ServiceError, StoreError, ValidationError};
use super::jwt::{TokenPair, TokenService};
use super::metrics::{AUTH_LOCKOUTS, AUTH_LOGIN_FAILURES};
use super::notifier::AccountNotifier;
use super::password::{digest_token, PasswordService};
use super::store::CredentialStore;
use crate::config::LockoutConfig;
use crate::dtos::{
    ChangePasswordRequest, LoginRequest, LoginResponse, MessageResponse, PasswordResetConfirm,
    PasswordResetRequest, RegisterRequest, RegisterResponse,
};
use crate::models::{
    normalize_email, ClientInfo, Identity, RefreshTokenRecord, Role, User, UserProfile,
};

const RESET_REQUESTED_MESSAGE: &str =
    "If an account exists for this email, a password reset link has been sent.";

/// Reject when the tenant is missing or not active. Platform accounts pass.
pub(crate) async fn ensure_tenant_active(
    store: &dyn CredentialStore,
    tenant_id: Option<Uuid>,
) -> Result<(), ServiceError> {
    let Some(tenant_id) = tenant_id else {
        return Ok(());
    };
    match store.find_tenant(tenant_id).await? {
        Some(tenant) if tenant.is_active() => Ok(()),
        _ => Err(AuthenticationError::TenantInactive.into()),
    }
}

fn validate_request<T: Validate>(req: &T) -> Result<(), ServiceError> {
    req.validate()
        .map_err(|e| ServiceError::invalid(e.to_string()))
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    passwords: PasswordService,
    tokens: TokenService,
    notifier: Arc<dyn AccountNotifier>,
    audit: AuditPipeline,
    lockout: LockoutConfig,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        passwords: PasswordService,
        tokens: TokenService,
        notifier: Arc<dyn AccountNotifier>,
        audit: AuditPipeline,
        lockout: LockoutConfig,
    ) -> Self {
        Self {
            store,
            passwords,
            tokens,
            notifier,
            audit,
            lockout,
        }
    }

    pub async fn register(
        &self,
        req: RegisterRequest,
        client: &ClientInfo,
    ) -> Result<RegisterResponse, ServiceError> {
        validate_request(&req)?;

        let role = req.role.unwrap_or(Role::Patient);
        if role.is_privileged() {
            return Err(ServiceError::invalid(format!(
                "Role {} cannot be self-assigned",
                role
            )));
        }

        let tenant = self
            .store
            .find_tenant(req.tenant_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Tenant not found".to_string()))?;
        if !tenant.is_active() {
            return Err(ServiceError::invalid("Tenant is not accepting registrations"));
        }

        let report = self.passwords.validate_strength(&req.password);
        if !report.valid {
            return Err(ValidationError::WeakPassword {
                violations: report.violations,
            }
            .into());
        }

        let password_hash = self.passwords.hash(&req.password)?;
        let mut user = User::new(
            Some(tenant.id),
            req.email,
            password_hash,
            req.first_name,
            req.last_name,
            role,
        );

        let verification = self.passwords.issue_verification_token();
        user.email_verify_token_hash = Some(verification.digest());
        user.email_verify_token_expires_at = Some(verification.expires_at);

        self.store.insert_user(&user).await.map_err(|e| match e {
            StoreError::Duplicate(_) => ServiceError::Conflict("Email already registered".to_string()),
            other => other.into(),
        })?;

        tracing::info!(user_id = %user.id, tenant_id = %tenant.id, role = %role, "User registered");

        if let Err(e) = self
            .notifier
            .send_verification(user.id, &user.email, &verification.token)
            .await
        {
            tracing::warn!(error = %e, user_id = %user.id, "Failed to send verification message");
        }

        self.audit.capture(
            AuditEvent::new("POST", "/auth/register", 201)
                .tenant(Some(tenant.id))
                .action("register")
                .entity("users", Some(user.id.to_string()))
                .client(client.ip_address.clone(), client.user_agent.clone())
                .values(
                    None,
                    Some(json!({
                        "email": user.email,
                        "firstName": user.first_name,
                        "lastName": user.last_name,
                        "role": role,
                    })),
                ),
        );

        Ok(RegisterResponse {
            user: user.sanitized(),
            message: "Registration successful. Please verify your email.".to_string(),
        })
    }

    /// Unknown accounts spend the same password verification as known ones.
    /// Account and tenant status are reported only once the password matched.
    pub async fn login(
        &self,
        req: LoginRequest,
        client: &ClientInfo,
    ) -> Result<LoginResponse, ServiceError> {
        let now = Utc::now();
        let email = normalize_email(&req.email);

        let Some(user) = self.store.find_user_by_email(req.tenant_id, &email).await? else {
            self.passwords.verify_decoy(&req.password);
            self.login_failed(None, req.tenant_id, &email, client, "unknown account");
            return Err(AuthenticationError::InvalidCredentials.into());
        };

        if let Some(until) = user.active_lock(now) {
            self.login_failed(Some(&user), user.tenant_id, &email, client, "account locked");
            return Err(AuthenticationError::AccountLocked { until }.into());
        }

        if !self.passwords.verify(&req.password, &user.password_hash) {
            let state = self
                .store
                .record_failed_login(user.id, self.lockout.threshold, self.lockout.duration(), now)
                .await?;

            if state.locked(now) {
                metrics::counter!(AUTH_LOCKOUTS).increment(1);
                tracing::warn!(
                    user_id = %user.id,
                    attempts = state.attempts,
                    locked_until = ?state.locked_until,
                    "Account locked after repeated failed logins"
                );
            }
            self.login_failed(Some(&user), user.tenant_id, &email, client, "invalid password");
            return Err(AuthenticationError::InvalidCredentials.into());
        }

        if !user.is_active {
            self.login_failed(Some(&user), user.tenant_id, &email, client, "account inactive");
            return Err(AuthenticationError::AccountInactive.into());
        }

        if let Err(e) = ensure_tenant_active(self.store.as_ref(), user.tenant_id).await {
            self.login_failed(Some(&user), user.tenant_id, &email, client, "tenant inactive");
            return Err(e);
        }

        self.store
            .record_successful_login(user.id, client.ip_address.as_deref(), now)
            .await?;

        let identity = Identity::for_session(&user, Uuid::new_v4());
        let tokens = self.start_session(&identity).await?;

        tracing::info!(user_id = %user.id, session_id = %identity.session_id, "User logged in");
        self.audit.capture(
            AuditEvent::new("POST", "/auth/login", 200)
                .identity(&identity)
                .action("login")
                .entity("auth", Some(user.id.to_string()))
                .client(client.ip_address.clone(), client.user_agent.clone()),
        );

        let mut profile = user.sanitized();
        profile.last_login_at = Some(now);
        Ok(LoginResponse {
            tokens,
            user: profile,
        })
    }

    fn login_failed(
        &self,
        user: Option<&User>,
        tenant_id: Option<Uuid>,
        email: &str,
        client: &ClientInfo,
        reason: &str,
    ) {
        metrics::counter!(AUTH_LOGIN_FAILURES).increment(1);
        tracing::warn!(user_id = ?user.map(|u| u.id), reason, "Login failed");
        self.audit.capture(
            AuditEvent::new("POST", "/auth/login", 401)
                .tenant(tenant_id)
                .action("login_failed")
                .entity("auth", user.map(|u| u.id.to_string()))
                .client(client.ip_address.clone(), client.user_agent.clone())
                .values(None, Some(json!({ "email": email })))
                .error(reason)
                .failed_authentication(),
        );
    }

    /// Issue a pair and register its refresh token.
    async fn start_session(&self, identity: &Identity) -> Result<TokenPair, ServiceError> {
        let pair = self.tokens.issue(identity)?;
        let record = RefreshTokenRecord::new(
            pair.refresh_jti,
            identity.user_id,
            identity.session_id,
            digest_token(&pair.refresh_token),
            pair.refresh_expires_at,
        );
        self.store.insert_refresh_token(&record).await?;
        Ok(pair)
    }

    /// Rotate a refresh token. The old token is revoked before the new pair
    /// is issued, and the session id carries over.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client: &ClientInfo,
    ) -> Result<TokenPair, ServiceError> {
        match self.rotate(refresh_token).await {
            Ok((identity, pair)) => {
                self.audit.capture(
                    AuditEvent::new("POST", "/auth/refresh", 200)
                        .identity(&identity)
                        .action("refresh")
                        .entity("auth", Some(identity.user_id.to_string()))
                        .client(client.ip_address.clone(), client.user_agent.clone()),
                );
                Ok(pair)
            }
            Err(e) => {
                if let ServiceError::Authentication(reason) = &e {
                    tracing::warn!(reason = %reason, "Refresh rejected");
                    self.audit.capture(
                        AuditEvent::new("POST", "/auth/refresh", 401)
                            .action("refresh")
                            .entity("auth", None)
                            .client(client.ip_address.clone(), client.user_agent.clone())
                            .error(reason.to_string())
                            .failed_authentication(),
                    );
                }
                Err(e)
            }
        }
    }

    async fn rotate(&self, refresh_token: &str) -> Result<(Identity, TokenPair), ServiceError> {
        let now = Utc::now();
        let claims = self.tokens.verify_refresh(refresh_token)?;

        let record = self
            .store
            .find_refresh_token(claims.jti)
            .await?
            .ok_or(AuthenticationError::TokenInvalid)?;

        if record.revoked {
            return Err(AuthenticationError::TokenRevoked.into());
        }
        if record.is_expired(now) {
            return Err(AuthenticationError::TokenExpired.into());
        }
        let digest_matches: bool = record
            .token_hash
            .as_bytes()
            .ct_eq(digest_token(refresh_token).as_bytes())
            .into();
        if record.user_id != claims.subject_id
            || record.session_id != claims.session_id
            || !digest_matches
        {
            return Err(AuthenticationError::TokenInvalid.into());
        }

        let user = self
            .store
            .find_user_by_id(claims.subject_id)
            .await?
            .ok_or(AuthenticationError::TokenInvalid)?;
        if !user.is_active {
            return Err(AuthenticationError::AccountInactive.into());
        }
        ensure_tenant_active(self.store.as_ref(), user.tenant_id).await?;

        // Only one of two concurrent rotations wins the revoke.
        if !self.store.revoke_refresh_token(claims.jti).await? {
            return Err(AuthenticationError::TokenRevoked.into());
        }

        let identity = Identity::for_session(&user, claims.session_id);
        let pair = self.start_session(&identity).await?;
        tracing::debug!(user_id = %user.id, session_id = %claims.session_id, "Refresh token rotated");
        Ok((identity, pair))
    }

    /// Revoke every refresh token of the caller's session.
    pub async fn logout(&self, identity: &Identity) -> Result<u64, ServiceError> {
        let revoked = self
            .store
            .revoke_session(identity.user_id, identity.session_id)
            .await?;
        tracing::info!(
            user_id = %identity.user_id,
            session_id = %identity.session_id,
            revoked,
            "User logged out"
        );
        Ok(revoked)
    }

    /// Same response whether or not the account exists.
    pub async fn request_password_reset(
        &self,
        req: PasswordResetRequest,
        client: &ClientInfo,
    ) -> Result<MessageResponse, ServiceError> {
        validate_request(&req)?;
        let email = normalize_email(&req.email);

        let user = self
            .store
            .find_user_by_email(req.tenant_id, &email)
            .await?
            .filter(|u| u.is_active);

        match &user {
            Some(user) => {
                let token = self.passwords.issue_reset_token();
                self.store
                    .set_reset_token(user.id, &token.digest(), token.expires_at)
                    .await?;
                if let Err(e) = self
                    .notifier
                    .send_password_reset(user.id, &user.email, &token.token)
                    .await
                {
                    tracing::warn!(error = %e, user_id = %user.id, "Failed to send password reset message");
                }
                tracing::info!(user_id = %user.id, "Password reset requested");
            }
            None => tracing::debug!("Password reset requested for unknown account"),
        }

        self.audit.capture(
            AuditEvent::new("POST", "/auth/password-reset/request", 200)
                .tenant(user.as_ref().and_then(|u| u.tenant_id).or(req.tenant_id))
                .action("password_reset_request")
                .entity("users", user.as_ref().map(|u| u.id.to_string()))
                .client(client.ip_address.clone(), client.user_agent.clone()),
        );

        Ok(MessageResponse::new(RESET_REQUESTED_MESSAGE))
    }

    /// Set a new password with a reset token. Clears the lockout and ends
    /// every session of the account.
    pub async fn confirm_password_reset(
        &self,
        req: PasswordResetConfirm,
        client: &ClientInfo,
    ) -> Result<MessageResponse, ServiceError> {
        validate_request(&req)?;
        let now = Utc::now();

        let user = self
            .store
            .find_user_by_reset_token(&digest_token(&req.token))
            .await?
            .filter(|u| u.reset_token_expires_at.is_some_and(|exp| exp > now))
            .ok_or_else(|| ServiceError::invalid("Invalid or expired reset token"))?;

        let report = self.passwords.validate_strength(&req.new_password);
        if !report.valid {
            return Err(ValidationError::WeakPassword {
                violations: report.violations,
            }
            .into());
        }

        let password_hash = self.passwords.hash(&req.new_password)?;
        self.store
            .complete_password_reset(user.id, &password_hash, now)
            .await?;
        let revoked = self.store.revoke_all_for_user(user.id).await?;

        tracing::info!(user_id = %user.id, revoked, "Password reset completed");
        self.audit.capture(
            AuditEvent::new("POST", "/auth/password-reset/confirm", 200)
                .tenant(user.tenant_id)
                .action("password_reset")
                .entity("users", Some(user.id.to_string()))
                .client(client.ip_address.clone(), client.user_agent.clone()),
        );

        Ok(MessageResponse::new(
            "Password reset successful. You can now log in with your new password.",
        ))
    }

    pub async fn verify_email(
        &self,
        token: &str,
        client: &ClientInfo,
    ) -> Result<MessageResponse, ServiceError> {
        let now = Utc::now();
        let user = self
            .store
            .find_user_by_verification_token(&digest_token(token))
            .await?
            .filter(|u| u.email_verify_token_expires_at.is_some_and(|exp| exp > now))
            .ok_or_else(|| ServiceError::invalid("Invalid or expired verification token"))?;

        self.store.mark_email_verified(user.id, now).await?;

        tracing::info!(user_id = %user.id, "Email verified");
        self.audit.capture(
            AuditEvent::new("POST", "/auth/verify-email", 200)
                .tenant(user.tenant_id)
                .action("verify_email")
                .entity("users", Some(user.id.to_string()))
                .client(client.ip_address.clone(), client.user_agent.clone()),
        );

        Ok(MessageResponse::new("Email verified successfully"))
    }

    pub async fn change_password(
        &self,
        identity: &Identity,
        req: ChangePasswordRequest,
    ) -> Result<MessageResponse, ServiceError> {
        validate_request(&req)?;

        let user = self.load_user(identity.user_id).await?;
        if !self.passwords.verify(&req.current_password, &user.password_hash) {
            return Err(AuthenticationError::InvalidCredentials.into());
        }

        let report = self.passwords.validate_strength(&req.new_password);
        if !report.valid {
            return Err(ValidationError::WeakPassword {
                violations: report.violations,
            }
            .into());
        }

        let password_hash = self.passwords.hash(&req.new_password)?;
        self.store
            .update_password(user.id, &password_hash, Utc::now())
            .await?;

        tracing::info!(user_id = %user.id, "Password changed");
        Ok(MessageResponse::new("Password changed successfully"))
    }

    pub async fn current_user(&self, identity: &Identity) -> Result<UserProfile, ServiceError> {
        Ok(self.load_user(identity.user_id).await?.sanitized())
    }

    async fn load_user(&self, user_id: Uuid) -> Result<User, ServiceError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
    }
}
