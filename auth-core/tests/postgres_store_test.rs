//! PostgreSQL store tests. Run with a database:
//! `DATABASE_URL=postgres://... cargo test -- --ignored`

use auth_core::config::DatabaseConfig;
use auth_core::db;
use auth_core::models::{Role, SubscriptionPlan, Tenant, User};
use auth_core::services::{
    AuditEvent, AuditStore, CredentialStore, PgStore, RetentionJob, StoreError,
};
use chrono::{Duration, Utc};
use secrecy::SecretString;
use uuid::Uuid;

async fn store() -> PgStore {
    let url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/auth_core_test".to_string());
    let config = DatabaseConfig {
        url: None,
        max_connections: 4,
        min_connections: 1,
    };
    let pool = db::create_pool(&config, &SecretString::new(url)).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    PgStore::new(pool)
}

async fn tenant(store: &PgStore) -> Tenant {
    let tenant = Tenant::new(
        format!("pg-{}", Uuid::new_v4().simple()),
        "Postgres Test Hospital".to_string(),
        SubscriptionPlan::Basic,
    );
    store.insert_tenant(&tenant).await.unwrap();
    tenant
}

fn user(tenant_id: Uuid, email: &str) -> User {
    User::new(
        Some(tenant_id),
        email.to_string(),
        "$argon2id$v=19$m=1024,t=1,p=1$c2FsdHNhbHQ$aGFzaGhhc2hoYXNo".to_string(),
        "Pg".to_string(),
        "User".to_string(),
        Role::Nurse,
    )
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn test_email_unique_per_tenant() {
    let store = store().await;
    let t1 = tenant(&store).await;
    let t2 = tenant(&store).await;

    store.insert_user(&user(t1.id, "a@x.com")).await.unwrap();
    let dup = store.insert_user(&user(t1.id, "A@x.com")).await;
    assert!(matches!(dup, Err(StoreError::Duplicate(_))));
    store.insert_user(&user(t2.id, "a@x.com")).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn test_failed_login_counter_locks_atomically() {
    let store = store().await;
    let t = tenant(&store).await;
    let u = user(t.id, "lock@x.com");
    store.insert_user(&u).await.unwrap();

    let now = Utc::now();
    let user_id = u.id;
    let store = std::sync::Arc::new(store);
    let mut attempts = tokio::task::JoinSet::new();
    for _ in 0..5 {
        let store = store.clone();
        attempts.spawn(async move {
            store
                .record_failed_login(user_id, 5, Duration::minutes(30), now)
                .await
                .unwrap()
        });
    }
    let mut outcomes = Vec::new();
    while let Some(outcome) = attempts.join_next().await {
        outcomes.push(outcome.unwrap());
    }

    let max = outcomes.iter().map(|o| o.attempts).max().unwrap();
    assert_eq!(max, 5);
    let stored = store.find_user_by_id(user_id).await.unwrap().unwrap();
    assert_eq!(stored.failed_login_attempts, 5);
    assert!(stored.active_lock(now).is_some());
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn test_retention_skips_flagged_entries() {
    let store = std::sync::Arc::new(store().await);
    let t = tenant(&store).await;
    let now = Utc::now();

    let mut plain = AuditEvent::new("GET", "/appointments", 200)
        .tenant(Some(t.id))
        .into_entry();
    plain.created_at = now - Duration::days(100);
    let mut flagged = AuditEvent::new("POST", "/billing/invoices", 500)
        .tenant(Some(t.id))
        .into_entry();
    flagged.created_at = now - Duration::days(100);
    store.insert_audit(&plain).await.unwrap();
    store.insert_audit(&flagged).await.unwrap();

    RetentionJob::new(store.clone(), 90).run_once(now).await.unwrap();
    assert!(store.find_audit(plain.id).await.unwrap().is_none());
    assert!(store.find_audit(flagged.id).await.unwrap().is_some());
}
