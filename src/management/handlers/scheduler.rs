//! # 调度配置处理器
//!
//! 读取/更新调度配置单例。更新为部分更新语义：只覆盖请求中出现的
//! 字段，校验通过后落库并重建 cron 任务。

use crate::app::AppState;
use crate::management::response::ApiResponse;
use crate::scheduler::SchedulerManager;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use entity::scheduler_configs;
use sea_orm::{ActiveModelTrait, IntoActiveModel, Set};
use serde::Deserialize;
use serde_json::Value;

/// 配置更新请求（全部字段可选）
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSchedulerConfig {
    pub enabled: Option<bool>,
    pub cron_expr: Option<String>,
    pub timezone: Option<String>,
    pub channel_concurrency: Option<i32>,
    pub global_concurrency: Option<i32>,
    pub min_delay_ms: Option<i32>,
    pub max_delay_ms: Option<i32>,
    pub probe_all: Option<bool>,
    pub selected_channel_ids: Option<Vec<i32>>,
    pub selected_model_ids: Option<Value>,
}

/// `GET /api/scheduler/config`
pub async fn get_config(State(state): State<AppState>) -> Response {
    match state.scheduler.load_or_seed_config().await {
        Ok(config) => ApiResponse::Success(config).into_response(),
        Err(e) => ApiResponse::<Value>::from_error(&e).into_response(),
    }
}

/// `PUT /api/scheduler/config`
pub async fn update_config(
    State(state): State<AppState>,
    Json(update): Json<UpdateSchedulerConfig>,
) -> Response {
    let current = match state.scheduler.load_or_seed_config().await {
        Ok(config) => config,
        Err(e) => return ApiResponse::<Value>::from_error(&e).into_response(),
    };

    let merged = merge_config(current, update);
    if let Err(e) = SchedulerManager::validate_config(&merged) {
        return ApiResponse::<Value>::from_error(&e).into_response();
    }

    let mut active = merged.clone().into_active_model();
    active.updated_at = Set(Utc::now());
    // 全字段覆盖写，配置行是单例
    active.enabled = Set(merged.enabled);
    active.cron_expr = Set(merged.cron_expr.clone());
    active.timezone = Set(merged.timezone.clone());
    active.channel_concurrency = Set(merged.channel_concurrency);
    active.global_concurrency = Set(merged.global_concurrency);
    active.min_delay_ms = Set(merged.min_delay_ms);
    active.max_delay_ms = Set(merged.max_delay_ms);
    active.probe_all = Set(merged.probe_all);
    active.selected_channel_ids = Set(merged.selected_channel_ids.clone());
    active.selected_model_ids = Set(merged.selected_model_ids.clone());

    if let Err(e) = active.update(&state.db).await {
        return ApiResponse::<Value>::from_error(&e.into()).into_response();
    }

    if let Err(e) = state.scheduler.reload().await {
        return ApiResponse::<Value>::from_error(&e).into_response();
    }

    match state.scheduler.load_or_seed_config().await {
        Ok(config) => {
            ApiResponse::SuccessWithMessage(config, "调度配置已更新".to_string()).into_response()
        }
        Err(e) => ApiResponse::<Value>::from_error(&e).into_response(),
    }
}

fn merge_config(
    mut current: scheduler_configs::Model,
    update: UpdateSchedulerConfig,
) -> scheduler_configs::Model {
    if let Some(enabled) = update.enabled {
        current.enabled = enabled;
    }
    if let Some(cron_expr) = update.cron_expr {
        current.cron_expr = cron_expr;
    }
    if let Some(timezone) = update.timezone {
        current.timezone = timezone;
    }
    if let Some(value) = update.channel_concurrency {
        current.channel_concurrency = value;
    }
    if let Some(value) = update.global_concurrency {
        current.global_concurrency = value;
    }
    if let Some(value) = update.min_delay_ms {
        current.min_delay_ms = value;
    }
    if let Some(value) = update.max_delay_ms {
        current.max_delay_ms = value;
    }
    if let Some(probe_all) = update.probe_all {
        current.probe_all = probe_all;
    }
    if let Some(ids) = update.selected_channel_ids {
        current.selected_channel_ids = serde_json::json!(ids);
    }
    if let Some(map) = update.selected_model_ids {
        current.selected_model_ids = map;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> scheduler_configs::Model {
        scheduler_configs::Model {
            id: 1,
            enabled: false,
            cron_expr: "0 3 * * *".into(),
            timezone: "UTC".into(),
            channel_concurrency: 5,
            global_concurrency: 30,
            min_delay_ms: 3000,
            max_delay_ms: 5000,
            probe_all: true,
            selected_channel_ids: json!([]),
            selected_model_ids: json!({}),
            updated_at: Utc::now(),
        }
    }

    fn empty_update() -> UpdateSchedulerConfig {
        serde_json::from_value(json!({})).unwrap()
    }

    #[test]
    fn test_merge_keeps_unspecified_fields() {
        let merged = merge_config(base(), empty_update());
        assert_eq!(merged, base_with_same_timestamp(&merged));
    }

    fn base_with_same_timestamp(like: &scheduler_configs::Model) -> scheduler_configs::Model {
        let mut base = base();
        base.updated_at = like.updated_at;
        base
    }

    #[test]
    fn test_merge_disjoint_updates_commute() {
        let update_a: UpdateSchedulerConfig =
            serde_json::from_value(json!({"cronExpr": "0 4 * * *"})).unwrap();
        let update_b: UpdateSchedulerConfig =
            serde_json::from_value(json!({"globalConcurrency": 50})).unwrap();
        let update_a2: UpdateSchedulerConfig =
            serde_json::from_value(json!({"cronExpr": "0 4 * * *"})).unwrap();
        let update_b2: UpdateSchedulerConfig =
            serde_json::from_value(json!({"globalConcurrency": 50})).unwrap();

        let ab = merge_config(merge_config(base(), update_a), update_b2);
        let ba = merge_config(merge_config(base(), update_b), update_a2);
        assert_eq!(ab.cron_expr, ba.cron_expr);
        assert_eq!(ab.global_concurrency, ba.global_concurrency);
        assert_eq!(ab, ba);
    }
}
