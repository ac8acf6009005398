//! 代理密钥认证集成测试

use axum::http::{HeaderMap, HeaderValue};
use chrono::Utc;
use entity::proxy_keys;
use migration::{Migrator, MigratorTrait};
use model_gateway::auth::{KeyPrincipal, ProxyKeyService};
use model_gateway::GatewayError;
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use serde_json::json;

async fn setup_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to connect to test database");
    Migrator::up(&db, None).await.expect("Failed to migrate");
    db
}

async fn insert_key(db: &DatabaseConnection, key: &str, enabled: bool) -> proxy_keys::Model {
    let now = Utc::now();
    proxy_keys::ActiveModel {
        name: Set("test".to_string()),
        key: Set(key.to_string()),
        enabled: Set(enabled),
        allow_all_models: Set(false),
        allowed_channel_ids: Set(json!([1])),
        allowed_model_ids: Set(json!([])),
        last_used_at: Set(None),
        usage_count: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("插入密钥")
}

fn bearer(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "authorization",
        HeaderValue::from_str(&format!("Bearer {value}")).unwrap(),
    );
    headers
}

#[tokio::test]
async fn test_builtin_key_always_accepted() {
    let db = setup_db().await;
    let service = ProxyKeyService::new(db, Some("builtin-secret".to_string()));

    let principal = service
        .authenticate(&bearer("builtin-secret"))
        .await
        .expect("内置密钥通过");
    assert!(matches!(principal, KeyPrincipal::Builtin));
    assert!(principal.can_access(42, 4242));
}

#[tokio::test]
async fn test_generated_builtin_key_is_stable() {
    let db = setup_db().await;
    let service = ProxyKeyService::new(db, None);
    let first = service.builtin_key().to_string();
    assert!(!first.is_empty());
    assert_eq!(service.builtin_key(), first);
}

#[tokio::test]
async fn test_stored_key_resolution() {
    let db = setup_db().await;
    insert_key(&db, "sk-live", true).await;
    let service = ProxyKeyService::new(db, Some("builtin".to_string()));

    let principal = service
        .authenticate(&bearer("sk-live"))
        .await
        .expect("数据库密钥通过");
    match principal {
        KeyPrincipal::Stored(key) => assert_eq!(key.key, "sk-live"),
        KeyPrincipal::Builtin => panic!("不应识别为内置密钥"),
    }
}

#[tokio::test]
async fn test_disabled_and_unknown_keys_rejected() {
    let db = setup_db().await;
    insert_key(&db, "sk-disabled", false).await;
    let service = ProxyKeyService::new(db, Some("builtin".to_string()));

    assert!(matches!(
        service.authenticate(&bearer("sk-disabled")).await,
        Err(GatewayError::AuthInvalid { .. })
    ));
    assert!(matches!(
        service.authenticate(&bearer("sk-nope")).await,
        Err(GatewayError::AuthInvalid { .. })
    ));
    assert!(matches!(
        service.authenticate(&HeaderMap::new()).await,
        Err(GatewayError::AuthMissing)
    ));
}

#[tokio::test]
async fn test_alternate_headers_accepted() {
    let db = setup_db().await;
    insert_key(&db, "sk-alt", true).await;
    let service = ProxyKeyService::new(db, Some("builtin".to_string()));

    let mut headers = HeaderMap::new();
    headers.insert("x-api-key", HeaderValue::from_static("sk-alt"));
    assert!(service.authenticate(&headers).await.is_ok());

    let mut headers = HeaderMap::new();
    headers.insert("x-goog-api-key", HeaderValue::from_static("sk-alt"));
    assert!(service.authenticate(&headers).await.is_ok());
}
