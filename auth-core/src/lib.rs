pub mod config;
pub mod db;
pub mod dtos;
pub mod guards;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::middleware::{metrics::metrics_middleware, tracing::request_id_middleware};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AuthConfig;
use crate::guards::{routes::RouteTable, GuardChain};
use crate::services::{
    AccountNotifier, AuditPipeline, AuditStore, AuthService, CredentialStore, PasswordService,
    TokenService,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub store: Arc<dyn CredentialStore>,
    pub auth_service: AuthService,
    pub guards: GuardChain,
    pub audit: AuditPipeline,
}

impl AppState {
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn CredentialStore>,
        audit_store: Arc<dyn AuditStore>,
        notifier: Arc<dyn AccountNotifier>,
    ) -> Self {
        let passwords = PasswordService::new(&config.tokens);
        Self::with_password_service(config, store, audit_store, notifier, passwords)
    }

    /// Same as [`AppState::new`] with a caller-supplied password hasher.
    pub fn with_password_service(
        config: AuthConfig,
        store: Arc<dyn CredentialStore>,
        audit_store: Arc<dyn AuditStore>,
        notifier: Arc<dyn AccountNotifier>,
        passwords: PasswordService,
    ) -> Self {
        let tokens = TokenService::from_config(&config.jwt);
        let audit = AuditPipeline::new(audit_store, config.audit.queue_capacity);
        let auth_service = AuthService::new(
            store.clone(),
            passwords,
            tokens.clone(),
            notifier,
            audit.clone(),
            config.lockout,
        );
        let guards = GuardChain::new(
            Arc::new(RouteTable::platform()),
            tokens,
            store.clone(),
            audit.clone(),
        );

        Self {
            config,
            store,
            auth_service,
            guards,
            audit,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route(
            "/auth/password-reset/request",
            post(handlers::auth::request_password_reset),
        )
        .route(
            "/auth/password-reset/confirm",
            post(handlers::auth::confirm_password_reset),
        )
        .route("/auth/verify-email", post(handlers::auth::verify_email));

    let guarded_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/change-password", post(handlers::auth::change_password))
        .route("/audit/logs", get(handlers::audit::list_audit_logs))
        .route(
            "/audit/logs/:id/review",
            post(handlers::audit::review_audit_log),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::guard_middleware,
        ));

    let cors = CorsLayer::new()
        .allow_origin(
            state
                .config
                .security
                .allowed_origins
                .iter()
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                        None
                    }
                })
                .collect::<Vec<HeaderValue>>(),
        )
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(guards::tenant::TENANT_HEADER),
            HeaderName::from_static(service_core::middleware::tracing::REQUEST_ID_HEADER),
        ]);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::health::metrics))
        .merge(public_routes)
        .merge(guarded_routes)
        .fallback(handlers::no_route_policy)
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(service_core::middleware::tracing::REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(cors)
}
