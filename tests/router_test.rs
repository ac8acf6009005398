//! 路由选择集成测试
//!
//! 覆盖前缀路由、确定性首个匹配、权限过滤与多密钥轮询。

use chrono::Utc;
use entity::{channel_models, channels, proxy_keys};
use migration::{Migrator, MigratorTrait};
use model_gateway::auth::KeyPrincipal;
use model_gateway::proxy::router::{ProxyRouter, split_api_keys};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use serde_json::json;

async fn setup_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to connect to test database");
    Migrator::up(&db, None).await.expect("Failed to migrate");
    db
}

async fn insert_channel(
    db: &DatabaseConnection,
    name: &str,
    base_url: &str,
    api_key: &str,
    enabled: bool,
    sort_order: i32,
) -> channels::Model {
    let now = Utc::now();
    channels::ActiveModel {
        name: Set(name.to_string()),
        base_url: Set(base_url.to_string()),
        api_key: Set(api_key.to_string()),
        proxy: Set(None),
        enabled: Set(enabled),
        sort_order: Set(sort_order),
        model_filter: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("插入渠道")
}

async fn insert_model(
    db: &DatabaseConnection,
    channel_id: i32,
    model_name: &str,
    detected: serde_json::Value,
) -> channel_models::Model {
    let now = Utc::now();
    channel_models::ActiveModel {
        channel_id: Set(channel_id),
        model_name: Set(model_name.to_string()),
        detected_endpoints: Set(detected),
        last_status: Set(None),
        last_latency_ms: Set(None),
        last_checked_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("插入模型")
}

fn restricted_key(allowed_channel_ids: serde_json::Value) -> KeyPrincipal {
    KeyPrincipal::Stored(proxy_keys::Model {
        id: 1,
        name: "restricted".into(),
        key: "sk-restricted".into(),
        enabled: true,
        allow_all_models: false,
        allowed_channel_ids,
        allowed_model_ids: json!([]),
        last_used_at: None,
        usage_count: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    })
}

#[tokio::test]
async fn test_prefix_routes_to_named_channel() {
    let db = setup_db().await;
    let a = insert_channel(&db, "A", "https://a.example", "ka", true, 0).await;
    let b = insert_channel(&db, "B", "https://b.example", "kb", true, 1).await;
    insert_model(&db, a.id, "gpt-4o", json!(["CHAT"])).await;
    insert_model(&db, b.id, "gpt-4o", json!(["CHAT"])).await;

    let router = ProxyRouter::new(db);
    let route = router
        .resolve("B/gpt-4o", &KeyPrincipal::Builtin)
        .await
        .expect("路由成功");
    assert_eq!(route.channel_name, "B");
    assert_eq!(route.base_url, "https://b.example");
    assert_eq!(route.actual_model, "gpt-4o");
    assert_eq!(route.upstream_key, "kb");
}

#[tokio::test]
async fn test_first_match_is_deterministic_by_sort_order_then_name() {
    let db = setup_db().await;
    let second = insert_channel(&db, "zeta", "https://z.example", "kz", true, 1).await;
    let first = insert_channel(&db, "alpha", "https://al.example", "kal", true, 0).await;
    insert_model(&db, second.id, "gpt-4o", json!(["CHAT"])).await;
    insert_model(&db, first.id, "gpt-4o", json!(["CHAT"])).await;

    let router = ProxyRouter::new(db);
    for _ in 0..3 {
        let route = router
            .resolve("gpt-4o", &KeyPrincipal::Builtin)
            .await
            .expect("路由成功");
        assert_eq!(route.channel_name, "alpha");
    }
}

#[tokio::test]
async fn test_disabled_channel_never_matches() {
    let db = setup_db().await;
    let disabled = insert_channel(&db, "off", "https://off.example", "k", false, 0).await;
    insert_model(&db, disabled.id, "gpt-4o", json!(["CHAT"])).await;

    let router = ProxyRouter::new(db);
    let result = router.resolve("gpt-4o", &KeyPrincipal::Builtin).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_permission_denied_presents_as_not_found() {
    let db = setup_db().await;
    let a = insert_channel(&db, "A", "https://a.example", "ka", true, 0).await;
    let b = insert_channel(&db, "B", "https://b.example", "kb", true, 1).await;
    insert_model(&db, a.id, "model-a", json!(["CHAT"])).await;
    insert_model(&db, b.id, "model-b", json!(["CHAT"])).await;

    let router = ProxyRouter::new(db);
    let key = restricted_key(json!([a.id]));

    // 允许的渠道可达
    assert!(router.resolve("model-a", &key).await.is_ok());
    // 目标渠道 B 不在白名单：表现为模型未找到，而非权限错误
    let denied = router.resolve("model-b", &key).await;
    assert!(matches!(
        denied,
        Err(model_gateway::GatewayError::ModelNotFound { .. })
    ));
}

#[tokio::test]
async fn test_model_listing_requires_success_and_permission() {
    let db = setup_db().await;
    let a = insert_channel(&db, "A", "https://a.example", "ka", true, 0).await;
    let b = insert_channel(&db, "B", "https://b.example", "kb", true, 1).await;
    // A 的模型探测成功过，B 的模型从未成功
    insert_model(&db, a.id, "gpt-4o", json!(["CHAT", "CODEX"])).await;
    insert_model(&db, b.id, "gpt-4o", json!([])).await;
    insert_model(&db, b.id, "claude-sonnet-4", json!(["CLAUDE"])).await;

    let router = ProxyRouter::new(db);

    let all = router
        .list_available_models(&KeyPrincipal::Builtin)
        .await
        .expect("列举");
    assert_eq!(
        all,
        vec![
            ("A".to_string(), "gpt-4o".to_string()),
            ("B".to_string(), "claude-sonnet-4".to_string()),
        ]
    );

    // 受限密钥：B 的条目被省略而不是报错
    let limited = router
        .list_available_models(&restricted_key(json!([a.id])))
        .await
        .expect("列举");
    assert_eq!(limited, vec![("A".to_string(), "gpt-4o".to_string())]);
}

#[tokio::test]
async fn test_multi_key_round_robin() {
    let db = setup_db().await;
    let channel = insert_channel(&db, "A", "https://a.example", "k1, k2, k3", true, 0).await;
    insert_model(&db, channel.id, "gpt-4o", json!(["CHAT"])).await;

    assert_eq!(split_api_keys(&channel.api_key), vec!["k1", "k2", "k3"]);

    let router = ProxyRouter::new(db);
    let mut seen = Vec::new();
    for _ in 0..4 {
        let route = router
            .resolve("gpt-4o", &KeyPrincipal::Builtin)
            .await
            .expect("路由成功");
        seen.push(route.upstream_key);
    }
    assert_eq!(seen, vec!["k1", "k2", "k3", "k1"]);
}

#[tokio::test]
async fn test_unknown_prefix_falls_back_to_full_model_name() {
    let db = setup_db().await;
    let channel = insert_channel(&db, "hub", "https://h.example", "k", true, 0).await;
    insert_model(&db, channel.id, "deepseek-ai/DeepSeek-V3", json!(["CHAT"])).await;

    let router = ProxyRouter::new(db);
    let route = router
        .resolve("deepseek-ai/DeepSeek-V3", &KeyPrincipal::Builtin)
        .await
        .expect("路由成功");
    assert_eq!(route.actual_model, "deepseek-ai/DeepSeek-V3");
}
