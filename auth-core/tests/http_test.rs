//! End-to-end HTTP tests through the full router.

mod common;

use auth_core::models::Role;
use axum::http::{Method, StatusCode};
use common::{get_request, json_request, send, NoticeKind, TestApp, PASSWORD};
use serde_json::json;

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();

    let (status, body) = send(&app, get_request("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "up");
    assert_eq!(body["auditQueue"]["dropped"], 0);
}

#[tokio::test]
async fn test_register_login_and_me() {
    let app = TestApp::new();
    let tenant = app.tenant("mercy").await;

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/auth/register",
            None,
            json!({
                "tenantId": tenant.id,
                "email": "Patient@Mercy.test",
                "password": PASSWORD,
                "firstName": "Sam",
                "lastName": "Reyes",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["email"], "patient@mercy.test");
    assert_eq!(body["user"]["role"], "patient");
    assert!(body["user"].get("passwordHash").is_none());

    let token = app
        .notifier
        .last_token(NoticeKind::Verification, "patient@mercy.test")
        .unwrap();
    let (status, _) = send(
        &app,
        json_request(Method::POST, "/auth/verify-email", None, json!({ "token": token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, login) = send(
        &app,
        json_request(
            Method::POST,
            "/auth/login",
            None,
            json!({
                "email": "patient@mercy.test",
                "password": PASSWORD,
                "tenantId": tenant.id,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["tokenType"], "Bearer");
    let access = login["accessToken"].as_str().unwrap().to_string();
    assert!(login["refreshToken"].is_string());
    assert!(login.get("refreshJti").is_none());

    let (status, me) = send(&app, get_request("/auth/me", Some(&access))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "patient@mercy.test");
    assert_eq!(me["isEmailVerified"], true);

    app.flush_audit().await;
    let read = app
        .store
        .audit_entries()
        .into_iter()
        .find(|e| e.endpoint == "/auth/me")
        .expect("guarded request should be audited");
    assert_eq!(read.status_code, 200);
    assert_eq!(read.action, "read");
    assert_eq!(read.tenant_id, Some(tenant.id));
    assert!(read.new_values.is_none());
}

#[tokio::test]
async fn test_invalid_body_is_bad_request() {
    let app = TestApp::new();

    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/auth/login",
            None,
            json!({ "email": "nope", "password": "" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!body["details"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_weak_password_lists_violations() {
    let app = TestApp::new();
    let tenant = app.tenant("mercy").await;

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/auth/register",
            None,
            json!({
                "tenantId": tenant.id,
                "email": "weak@mercy.test",
                "password": "abc",
                "firstName": "W",
                "lastName": "P",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_guarded_route_without_token() {
    let app = TestApp::new();

    let (status, body) = send(&app, get_request("/auth/me", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Missing bearer token");
}

#[tokio::test]
async fn test_unknown_path_is_forbidden() {
    let app = TestApp::new();

    let (status, body) = send(&app, get_request("/internal/debug", None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "No access policy for this route");
}

#[tokio::test]
async fn test_audit_log_listing_is_tenant_scoped() {
    let app = TestApp::new();
    let tenant_a = app.tenant("a").await;
    let tenant_b = app.tenant("b").await;
    let admin_a = app.user(Some(tenant_a.id), "admin@a.test", Role::TenantAdmin).await;
    let admin_b = app.user(Some(tenant_b.id), "admin@b.test", Role::TenantAdmin).await;
    let doctor = app.user(Some(tenant_a.id), "doc@a.test", Role::Doctor).await;

    let token_a = app.access_token(&admin_a).await;
    app.access_token(&admin_b).await;
    let doctor_token = app.access_token(&doctor).await;
    app.flush_audit().await;

    let (status, page) = send(&app, get_request("/audit/logs?limit=100", Some(&token_a))).await;
    assert_eq!(status, StatusCode::OK);
    let items = page["items"].as_array().unwrap();
    assert!(!items.is_empty());
    let tenant_a_id = tenant_a.id.to_string();
    assert!(items.iter().all(|e| e["tenantId"] == tenant_a_id.as_str()));

    let uri = format!("/audit/logs?tenantId={}", tenant_b.id);
    let (status, _) = send(&app, get_request(&uri, Some(&token_a))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, get_request("/audit/logs", Some(&doctor_token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Insufficient permissions: requires any of [audit:read]");
}

#[tokio::test]
async fn test_review_endpoint() {
    let app = TestApp::new();
    let tenant = app.tenant("a").await;
    let admin = app.user(Some(tenant.id), "admin@a.test", Role::TenantAdmin).await;
    let token = app.access_token(&admin).await;

    let flagged = app.audit().capture(
        auth_core::services::AuditEvent::new("POST", "/billing/invoices", 500)
            .tenant(Some(tenant.id)),
    );
    app.flush_audit().await;

    let uri = format!("/audit/logs/{}/review", flagged);
    let (status, body) = send(&app, json_request(Method::POST, &uri, Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["requiresReview"], false);
    assert_eq!(body["reviewedBy"], admin.id.to_string());

    let (status, _) = send(&app, json_request(Method::POST, &uri, Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_logout_ends_refresh() {
    let app = TestApp::new();
    let tenant = app.tenant("a").await;
    let nurse = app.user(Some(tenant.id), "nurse@a.test", Role::Nurse).await;
    let login = app.login(&nurse).await;

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/auth/logout",
            Some(&login.tokens.access_token),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revokedTokens"], 1);

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/auth/refresh",
            None,
            json!({ "refreshToken": login.tokens.refresh_token }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Token revoked");
}

#[tokio::test]
async fn test_change_password_body_is_redacted_in_audit() {
    let app = TestApp::new();
    let tenant = app.tenant("a").await;
    let doctor = app.user(Some(tenant.id), "doc@a.test", Role::Doctor).await;
    let token = app.access_token(&doctor).await;

    let (status, _) = send(
        &app,
        json_request(
            Method::POST,
            "/auth/change-password",
            Some(&token),
            json!({ "currentPassword": PASSWORD, "newPassword": "N3w!Password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    app.flush_audit().await;
    let entry = app
        .store
        .audit_entries()
        .into_iter()
        .find(|e| e.action == "change_password")
        .expect("password change should be audited");
    assert!(entry.is_sensitive);
    assert_eq!(
        entry.new_values,
        Some(json!({ "currentPassword": "[REDACTED]", "newPassword": "[REDACTED]" }))
    );
}
