//! 探测日志保留策略测试

use chrono::{Duration, Utc};
use entity::{channel_models, channels, probe_logs};
use migration::{Migrator, MigratorTrait};
use model_gateway::scheduler::manager::purge_expired_logs;
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, EntityTrait, PaginatorTrait, Set};
use serde_json::json;

async fn setup_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to connect to test database");
    Migrator::up(&db, None).await.expect("Failed to migrate");
    db
}

async fn seed_model(db: &DatabaseConnection) -> channel_models::Model {
    let now = Utc::now();
    let channel = channels::ActiveModel {
        name: Set("c".to_string()),
        base_url: Set("https://u.example".to_string()),
        api_key: Set("k".to_string()),
        proxy: Set(None),
        enabled: Set(true),
        sort_order: Set(0),
        model_filter: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("插入渠道");

    channel_models::ActiveModel {
        channel_id: Set(channel.id),
        model_name: Set("gpt-4o".to_string()),
        detected_endpoints: Set(json!([])),
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

async fn insert_log(db: &DatabaseConnection, model_id: i32, age_days: i64) {
    probe_logs::ActiveModel {
        model_id: Set(model_id),
        endpoint_type: Set("CHAT".to_string()),
        success: Set(true),
        latency_ms: Set(100),
        upstream_status: Set(Some(200)),
        error_message: Set(None),
        response_preview: Set(Some("yes".to_string())),
        created_at: Set(Utc::now() - Duration::days(age_days)),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("插入日志");
}

#[tokio::test]
async fn test_purge_removes_only_expired_rows() {
    let db = setup_db().await;
    let model = seed_model(&db).await;

    insert_log(&db, model.id, 0).await;
    insert_log(&db, model.id, 3).await;
    insert_log(&db, model.id, 10).await;
    insert_log(&db, model.id, 30).await;

    let purged = purge_expired_logs(&db, 7).await.expect("清理");
    assert_eq!(purged, 2);

    let remaining = probe_logs::Entity::find().count(&db).await.expect("计数");
    assert_eq!(remaining, 2);
}

#[tokio::test]
async fn test_purge_is_idempotent() {
    let db = setup_db().await;
    let model = seed_model(&db).await;
    insert_log(&db, model.id, 30).await;

    assert_eq!(purge_expired_logs(&db, 7).await.expect("清理"), 1);
    assert_eq!(purge_expired_logs(&db, 7).await.expect("清理"), 0);
}
