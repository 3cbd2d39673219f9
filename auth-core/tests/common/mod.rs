//! Test helper module for auth-core integration tests.
//!
//! Everything runs against the in-memory store with a cheap Argon2 cost so
//! the suites need no database.

#![allow(dead_code)]

use auth_core::{
    build_router,
    config::{
        AccountTokenConfig, AuditConfig, AuthConfig, DatabaseConfig, Environment, JwtConfig,
        LockoutConfig, SecurityConfig,
    },
    dtos::{LoginRequest, LoginResponse},
    models::{ClientInfo, Permission, Role, SubscriptionPlan, Tenant, User},
    services::{AccountNotifier, AuditPipeline, CredentialStore, InMemoryStore, PasswordService},
    AppState,
};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "Corr3ct!Horse";
pub const WRONG_PASSWORD: &str = "Wr0ng!Horse";

pub fn test_config() -> AuthConfig {
    AuthConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "auth-core-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: None,
            max_connections: 5,
            min_connections: 1,
        },
        jwt: JwtConfig {
            access_secret: SecretString::new("test-access-secret-0123456789abcdef".to_string()),
            refresh_secret: SecretString::new("test-refresh-secret-fedcba9876543210".to_string()),
            access_ttl: "15m".to_string(),
            refresh_ttl: "7d".to_string(),
        },
        lockout: LockoutConfig::default(),
        tokens: AccountTokenConfig::default(),
        audit: AuditConfig::default(),
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
    }
}

pub fn fast_passwords() -> PasswordService {
    PasswordService::with_params(&AccountTokenConfig::default(), 1024, 1, 1).unwrap()
}

pub fn client() -> ClientInfo {
    ClientInfo {
        ip_address: Some("203.0.113.7".to_string()),
        user_agent: Some("integration-test".to_string()),
    }
}

/// Application wired to an in-memory store. The audit worker is not running;
/// call [`TestApp::flush_audit`] before looking at persisted entries.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub passwords: PasswordService,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AuthConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let passwords = fast_passwords();
        let state = AppState::with_password_service(
            config,
            store.clone(),
            store.clone(),
            notifier.clone(),
            passwords.clone(),
        );
        Self {
            state,
            store,
            notifier,
            passwords,
        }
    }

    pub fn audit(&self) -> &AuditPipeline {
        &self.state.audit
    }

    pub async fn flush_audit(&self) {
        self.state.audit.flush().await;
    }

    pub async fn tenant(&self, slug: &str) -> Tenant {
        let tenant = Tenant::new(
            slug.to_string(),
            format!("{} Hospital", slug),
            SubscriptionPlan::Professional,
        );
        self.store.insert_tenant(&tenant).await.unwrap();
        tenant
    }

    /// Active, verified user with [`PASSWORD`].
    pub async fn user(&self, tenant_id: Option<Uuid>, email: &str, role: Role) -> User {
        let mut user = User::new(
            tenant_id,
            email.to_string(),
            self.passwords.hash(PASSWORD).unwrap(),
            "Test".to_string(),
            "User".to_string(),
            role,
        );
        user.is_email_verified = true;
        self.store.insert_user(&user).await.unwrap();
        user
    }

    pub async fn user_with_permissions(
        &self,
        tenant_id: Option<Uuid>,
        email: &str,
        role: Role,
        permissions: Vec<Permission>,
    ) -> User {
        let mut user = User::new(
            tenant_id,
            email.to_string(),
            self.passwords.hash(PASSWORD).unwrap(),
            "Custom".to_string(),
            "Grant".to_string(),
            role,
        );
        user.custom_permissions = Some(permissions);
        self.store.insert_user(&user).await.unwrap();
        user
    }

    pub async fn login(&self, user: &User) -> LoginResponse {
        self.state
            .auth_service
            .login(
                LoginRequest {
                    email: user.email.clone(),
                    password: PASSWORD.to_string(),
                    tenant_id: user.tenant_id,
                },
                &client(),
            )
            .await
            .unwrap()
    }

    pub async fn access_token(&self, user: &User) -> String {
        self.login(user).await.tokens.access_token
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }
}

/// Send one request through a fresh router and decode the JSON body.
pub async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

pub fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Verification,
    PasswordReset,
}

#[derive(Debug, Clone)]
pub struct SentNotice {
    pub kind: NoticeKind,
    pub user_id: Uuid,
    pub email: String,
    pub token: String,
}

/// Keeps every notice in memory so tests can pick up the clear-text token.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentNotice> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Most recent token of `kind` sent to `email`.
    pub fn last_token(&self, kind: NoticeKind, email: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|n| n.kind == kind && n.email == email)
            .map(|n| n.token)
    }

    fn record(&self, kind: NoticeKind, user_id: Uuid, email: &str, token: &str) {
        let notice = SentNotice {
            kind,
            user_id,
            email: email.to_string(),
            token: token.to_string(),
        };
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notice),
            Err(poisoned) => poisoned.into_inner().push(notice),
        }
    }
}

#[async_trait]
impl AccountNotifier for RecordingNotifier {
    async fn send_verification(
        &self,
        user_id: Uuid,
        email: &str,
        token: &str,
    ) -> Result<(), anyhow::Error> {
        self.record(NoticeKind::Verification, user_id, email, token);
        Ok(())
    }

    async fn send_password_reset(
        &self,
        user_id: Uuid,
        email: &str,
        token: &str,
    ) -> Result<(), anyhow::Error> {
        self.record(NoticeKind::PasswordReset, user_id, email, token);
        Ok(())
    }
}
