//! # 渠道管理处理器
//!
//! 渠道 CRUD、模型列表同步与配置导入导出。导入按
//! `(baseUrl, apiKey)` 元组做幂等对账。

use crate::app::AppState;
use crate::error::GatewayError;
use crate::logging::{LogComponent, LogStage};
use crate::management::response::ApiResponse;
use crate::linfo;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use entity::{channel_models, channels};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 创建/导入渠道的请求体
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPayload {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub model_filter: Option<String>,
}

const fn default_enabled() -> bool {
    true
}

/// 更新渠道的请求体（部分更新）
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelUpdate {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub proxy: Option<Option<String>>,
    pub enabled: Option<bool>,
    pub sort_order: Option<i32>,
    pub model_filter: Option<Option<String>>,
}

/// 渠道列表项（附模型数）
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelListItem {
    #[serde(flatten)]
    pub channel: channels::Model,
    pub model_count: u64,
}

/// `GET /api/channels`
pub async fn list_channels(State(state): State<AppState>) -> Response {
    let channel_list = match channels::Entity::find()
        .order_by_asc(channels::Column::SortOrder)
        .order_by_asc(channels::Column::Name)
        .all(&state.db)
        .await
    {
        Ok(list) => list,
        Err(e) => return ApiResponse::<Value>::from_error(&e.into()).into_response(),
    };

    let mut items = Vec::with_capacity(channel_list.len());
    for channel in channel_list {
        let model_count = channel_models::Entity::find()
            .filter(channel_models::Column::ChannelId.eq(channel.id))
            .count(&state.db)
            .await
            .unwrap_or(0);
        items.push(ChannelListItem {
            channel,
            model_count,
        });
    }
    ApiResponse::Success(items).into_response()
}

/// `POST /api/channels`
pub async fn create_channel(
    State(state): State<AppState>,
    Json(payload): Json<ChannelPayload>,
) -> Response {
    if payload.name.trim().is_empty() || payload.base_url.trim().is_empty() {
        return ApiResponse::<Value>::from_error(&GatewayError::bad_request(
            "渠道名称与基础地址不能为空",
        ))
        .into_response();
    }

    let now = Utc::now();
    let active = channels::ActiveModel {
        name: Set(payload.name.trim().to_string()),
        base_url: Set(payload.base_url.trim().to_string()),
        api_key: Set(payload.api_key),
        proxy: Set(payload.proxy),
        enabled: Set(payload.enabled),
        sort_order: Set(payload.sort_order),
        model_filter: Set(payload.model_filter),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    match active.insert(&state.db).await {
        Ok(channel) => {
            linfo!(
                "system",
                LogStage::Configuration,
                LogComponent::Management,
                "channel_created",
                &format!("渠道已创建: {} ({})", channel.name, channel.id)
            );
            ApiResponse::Success(channel).into_response()
        }
        Err(e) => ApiResponse::<Value>::from_error(&e.into()).into_response(),
    }
}

/// `PUT /api/channels/{id}`
pub async fn update_channel(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(update): Json<ChannelUpdate>,
) -> Response {
    let Some(channel) = (match channels::Entity::find_by_id(id).one(&state.db).await {
        Ok(channel) => channel,
        Err(e) => return ApiResponse::<Value>::from_error(&e.into()).into_response(),
    }) else {
        return ApiResponse::<Value>::from_error(&GatewayError::bad_request(format!(
            "渠道 {id} 不存在"
        )))
        .into_response();
    };

    let mut active = channel.into_active_model();
    if let Some(name) = update.name {
        active.name = Set(name);
    }
    if let Some(base_url) = update.base_url {
        active.base_url = Set(base_url);
    }
    if let Some(api_key) = update.api_key {
        active.api_key = Set(api_key);
    }
    if let Some(proxy) = update.proxy {
        active.proxy = Set(proxy);
    }
    if let Some(enabled) = update.enabled {
        active.enabled = Set(enabled);
    }
    if let Some(sort_order) = update.sort_order {
        active.sort_order = Set(sort_order);
    }
    if let Some(model_filter) = update.model_filter {
        active.model_filter = Set(model_filter);
    }
    active.updated_at = Set(Utc::now());

    match active.update(&state.db).await {
        Ok(channel) => {
            // 凭据可能已变化，丢弃该渠道的轮询游标
            state.router.invalidate_cursor(channel.id);
            ApiResponse::Success(channel).into_response()
        }
        Err(e) => ApiResponse::<Value>::from_error(&e.into()).into_response(),
    }
}

/// `DELETE /api/channels/{id}` — 级联删除其模型与探测日志
pub async fn delete_channel(State(state): State<AppState>, Path(id): Path<i32>) -> Response {
    match channels::Entity::delete_by_id(id).exec(&state.db).await {
        Ok(result) if result.rows_affected > 0 => {
            state.router.invalidate_cursor(id);
            ApiResponse::<Value>::SuccessWithoutData(format!("渠道 {id} 已删除")).into_response()
        }
        Ok(_) => ApiResponse::<Value>::from_error(&GatewayError::bad_request(format!(
            "渠道 {id} 不存在"
        )))
        .into_response(),
        Err(e) => ApiResponse::<Value>::from_error(&e.into()).into_response(),
    }
}

/// `POST /api/channels/{id}/sync` — 拉取并合并上游模型列表
pub async fn sync_channel(State(state): State<AppState>, Path(id): Path<i32>) -> Response {
    let Some(channel) = (match channels::Entity::find_by_id(id).one(&state.db).await {
        Ok(channel) => channel,
        Err(e) => return ApiResponse::<Value>::from_error(&e.into()).into_response(),
    }) else {
        return ApiResponse::<Value>::from_error(&GatewayError::bad_request(format!(
            "渠道 {id} 不存在"
        )))
        .into_response();
    };

    let result = state.detection.sync_channel_models(&channel).await;
    ApiResponse::Success(result).into_response()
}

/// `GET /api/channels/export`
pub async fn export_channels(State(state): State<AppState>) -> Response {
    match channels::Entity::find()
        .order_by_asc(channels::Column::SortOrder)
        .order_by_asc(channels::Column::Name)
        .all(&state.db)
        .await
    {
        Ok(list) => ApiResponse::Success(list).into_response(),
        Err(e) => ApiResponse::<Value>::from_error(&e.into()).into_response(),
    }
}

/// 导入结果
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

/// `POST /api/channels/import`
///
/// 幂等对账：`(baseUrl, apiKey)` 已存在的条目跳过，其余插入。
pub async fn import_channels(
    State(state): State<AppState>,
    Json(payloads): Json<Vec<ChannelPayload>>,
) -> Response {
    let existing = match channels::Entity::find().all(&state.db).await {
        Ok(list) => list,
        Err(e) => return ApiResponse::<Value>::from_error(&e.into()).into_response(),
    };
    let known: std::collections::HashSet<(String, String)> = existing
        .into_iter()
        .map(|c| (c.base_url, c.api_key))
        .collect();

    let mut imported = 0;
    let mut skipped = 0;
    let now = Utc::now();
    for payload in payloads {
        let identity = (payload.base_url.clone(), payload.api_key.clone());
        if known.contains(&identity) {
            skipped += 1;
            continue;
        }
        let active = channels::ActiveModel {
            name: Set(payload.name),
            base_url: Set(payload.base_url),
            api_key: Set(payload.api_key),
            proxy: Set(payload.proxy),
            enabled: Set(payload.enabled),
            sort_order: Set(payload.sort_order),
            model_filter: Set(payload.model_filter),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        match active.insert(&state.db).await {
            Ok(_) => imported += 1,
            Err(e) => {
                return ApiResponse::<Value>::from_error(&e.into()).into_response();
            }
        }
    }

    linfo!(
        "system",
        LogStage::Configuration,
        LogComponent::Management,
        "channels_imported",
        &format!("渠道导入完成: 新增 {imported}，跳过 {skipped}")
    );
    ApiResponse::Success(ImportSummary { imported, skipped }).into_response()
}
