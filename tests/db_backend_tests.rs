//! Database and hybrid backend tests against a live Postgres.
//!
//! Ignored by default; run with a reachable `DATABASE_URL` whose schema
//! has the migrations applied:
//!
//! ```text
//! DATABASE_URL=postgres://... cargo test -- --ignored
//! ```

mod common;

use common::{email_template, sms_template};
use notify_templates::models::{NotificationChannel, TemplateError};
use notify_templates::persistence::database::{create_template_pool, DbTemplateStore};
use notify_templates::persistence::hybrid::{HybridTemplateStore, StorageMode};
use notify_templates::persistence::TemplatePersistenceManager;
use sqlx::PgPool;

async fn test_pool() -> PgPool {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for db tests");
    let pool = create_template_pool(&url).await.expect("connect failed");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations failed");
    pool
}

// throwaway tenant per test so runs do not interfere
fn scratch_tenant() -> i32 {
    (std::process::id() as i32 % 10_000) + 20_000
}

async fn cleanup(pool: &PgPool, tenant_id: i32) {
    let _ = sqlx::query("DELETE FROM notification_template_type WHERE tenant_id = $1")
        .bind(tenant_id)
        .execute(pool)
        .await;
}

#[tokio::test]
#[ignore]
async fn db_round_trip_and_two_step_existence() {
    let pool = test_pool().await;
    let tenant = scratch_tenant();
    let store = DbTemplateStore::new(pool.clone());

    let t = email_template("Account Recovery", "en_US", "Recover", "Use this link", "Team");
    store.add_template(&t, None, tenant).await.unwrap();

    assert!(store
        .template_exists("EN_us", "accountrecovery", NotificationChannel::Email, None, tenant)
        .await
        .unwrap());
    let fetched = store
        .get_template("en_US", "accountrecovery", NotificationChannel::Email, None, tenant)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.subject, t.subject);
    assert_eq!(fetched.body, t.body);
    assert_eq!(fetched.footer, t.footer);

    let err = store.add_template(&t, None, tenant).await.unwrap_err();
    assert!(matches!(err, TemplateError::TemplateAlreadyExists { .. }));

    cleanup(&pool, tenant).await;
}

#[tokio::test]
#[ignore]
async fn hybrid_reads_rows_written_without_unicode() {
    let pool = test_pool().await;
    let tenant = scratch_tenant() + 1;

    // legacy writer fills only the plain-text columns
    let legacy = HybridTemplateStore::new(pool.clone(), StorageMode::WithoutUnicode);
    let t = sms_template("Delivery Update", "en_US", "Out for delivery");
    legacy.add_template(&t, None, tenant).await.unwrap();

    // transition-window reader falls back to them transparently
    let hybrid = HybridTemplateStore::new(pool.clone(), StorageMode::Hybrid);
    let fetched = hybrid
        .get_template("en_US", "deliveryupdate", NotificationChannel::Sms, None, tenant)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.body, "Out for delivery");

    cleanup(&pool, tenant).await;
}

#[tokio::test]
#[ignore]
async fn legacy_only_update_leaves_the_blob_in_place() {
    let pool = test_pool().await;
    let tenant = scratch_tenant() + 3;

    // dual writer fills blob and legacy columns
    let dual = HybridTemplateStore::new(pool.clone(), StorageMode::Hybrid);
    let t = sms_template("Cart Reminder", "en_US", "v1");
    dual.add_template(&t, None, tenant).await.unwrap();

    // legacy-only writer must not clear the existing blob
    let legacy = HybridTemplateStore::new(pool.clone(), StorageMode::WithoutUnicode);
    let mut t2 = t.clone();
    t2.body = "v2".to_string();
    legacy.update_template(&t2, None, tenant).await.unwrap();

    let blob_reader = HybridTemplateStore::new(pool.clone(), StorageMode::UnicodeSupported);
    let from_blob = blob_reader
        .get_template("en_US", "cartreminder", NotificationChannel::Sms, None, tenant)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(from_blob.body, "v1");

    let from_legacy = legacy
        .get_template("en_US", "cartreminder", NotificationChannel::Sms, None, tenant)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(from_legacy.body, "v2");

    cleanup(&pool, tenant).await;
}

#[tokio::test]
#[ignore]
async fn type_delete_cascades_to_templates() {
    let pool = test_pool().await;
    let tenant = scratch_tenant() + 2;
    let store = DbTemplateStore::new(pool.clone());

    let t = sms_template("Otp", "en_US", "code");
    store.add_template(&t, None, tenant).await.unwrap();
    store
        .delete_template_type("otp", NotificationChannel::Sms, tenant)
        .await
        .unwrap();

    assert!(!store
        .template_exists("en_US", "otp", NotificationChannel::Sms, None, tenant)
        .await
        .unwrap());
    assert!(store
        .get_template_type("otp", NotificationChannel::Sms, tenant)
        .await
        .unwrap()
        .is_none());

    cleanup(&pool, tenant).await;
}
