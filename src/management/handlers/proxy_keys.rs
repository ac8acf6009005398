//! # 代理密钥管理处理器
//!
//! 网关密钥 CRUD 与重新生成

use crate::app::AppState;
use crate::auth::proxy_key::generate_proxy_key_value;
use crate::error::GatewayError;
use crate::management::response::ApiResponse;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use entity::proxy_keys;
use sea_orm::{ActiveModelTrait, EntityTrait, IntoActiveModel, QueryOrder, Set};
use serde::Deserialize;
use serde_json::Value;

/// 创建密钥请求体
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyKeyPayload {
    pub name: String,
    /// 不提供时自动生成
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub allow_all_models: bool,
    #[serde(default)]
    pub allowed_channel_ids: Vec<i32>,
    #[serde(default)]
    pub allowed_model_ids: Vec<i32>,
}

const fn default_enabled() -> bool {
    true
}

/// 更新密钥请求体（部分更新）
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyKeyUpdate {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub allow_all_models: Option<bool>,
    pub allowed_channel_ids: Option<Vec<i32>>,
    pub allowed_model_ids: Option<Vec<i32>>,
}

/// `GET /api/proxy-keys`
pub async fn list_keys(State(state): State<AppState>) -> Response {
    match proxy_keys::Entity::find()
        .order_by_asc(proxy_keys::Column::Id)
        .all(&state.db)
        .await
    {
        Ok(keys) => ApiResponse::Success(keys).into_response(),
        Err(e) => ApiResponse::<Value>::from_error(&e.into()).into_response(),
    }
}

/// `POST /api/proxy-keys`
pub async fn create_key(
    State(state): State<AppState>,
    Json(payload): Json<ProxyKeyPayload>,
) -> Response {
    if payload.name.trim().is_empty() {
        return ApiResponse::<Value>::from_error(&GatewayError::bad_request("密钥名称不能为空"))
            .into_response();
    }

    let now = Utc::now();
    let active = proxy_keys::ActiveModel {
        name: Set(payload.name.trim().to_string()),
        key: Set(payload.key.unwrap_or_else(generate_proxy_key_value)),
        enabled: Set(payload.enabled),
        allow_all_models: Set(payload.allow_all_models),
        allowed_channel_ids: Set(serde_json::json!(payload.allowed_channel_ids)),
        allowed_model_ids: Set(serde_json::json!(payload.allowed_model_ids)),
        last_used_at: Set(None),
        usage_count: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    match active.insert(&state.db).await {
        Ok(key) => ApiResponse::Success(key).into_response(),
        Err(e) => ApiResponse::<Value>::from_error(&e.into()).into_response(),
    }
}

/// `PUT /api/proxy-keys/{id}`
pub async fn update_key(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(update): Json<ProxyKeyUpdate>,
) -> Response {
    let Some(key) = (match proxy_keys::Entity::find_by_id(id).one(&state.db).await {
        Ok(key) => key,
        Err(e) => return ApiResponse::<Value>::from_error(&e.into()).into_response(),
    }) else {
        return ApiResponse::<Value>::from_error(&GatewayError::bad_request(format!(
            "代理密钥 {id} 不存在"
        )))
        .into_response();
    };

    let mut active = key.into_active_model();
    if let Some(name) = update.name {
        active.name = Set(name);
    }
    if let Some(enabled) = update.enabled {
        active.enabled = Set(enabled);
    }
    if let Some(allow_all) = update.allow_all_models {
        active.allow_all_models = Set(allow_all);
    }
    if let Some(channel_ids) = update.allowed_channel_ids {
        active.allowed_channel_ids = Set(serde_json::json!(channel_ids));
    }
    if let Some(model_ids) = update.allowed_model_ids {
        active.allowed_model_ids = Set(serde_json::json!(model_ids));
    }
    active.updated_at = Set(Utc::now());

    match active.update(&state.db).await {
        Ok(key) => ApiResponse::Success(key).into_response(),
        Err(e) => ApiResponse::<Value>::from_error(&e.into()).into_response(),
    }
}

/// `DELETE /api/proxy-keys/{id}`
pub async fn delete_key(State(state): State<AppState>, Path(id): Path<i32>) -> Response {
    match proxy_keys::Entity::delete_by_id(id).exec(&state.db).await {
        Ok(result) if result.rows_affected > 0 => {
            ApiResponse::<Value>::SuccessWithoutData(format!("代理密钥 {id} 已删除"))
                .into_response()
        }
        Ok(_) => ApiResponse::<Value>::from_error(&GatewayError::bad_request(format!(
            "代理密钥 {id} 不存在"
        )))
        .into_response(),
        Err(e) => ApiResponse::<Value>::from_error(&e.into()).into_response(),
    }
}

/// `POST /api/proxy-keys/{id}/regenerate` — 更换密钥值
pub async fn regenerate_key(State(state): State<AppState>, Path(id): Path<i32>) -> Response {
    let Some(key) = (match proxy_keys::Entity::find_by_id(id).one(&state.db).await {
        Ok(key) => key,
        Err(e) => return ApiResponse::<Value>::from_error(&e.into()).into_response(),
    }) else {
        return ApiResponse::<Value>::from_error(&GatewayError::bad_request(format!(
            "代理密钥 {id} 不存在"
        )))
        .into_response();
    };

    let mut active = key.into_active_model();
    active.key = Set(generate_proxy_key_value());
    active.updated_at = Set(Utc::now());

    match active.update(&state.db).await {
        Ok(key) => {
            ApiResponse::SuccessWithMessage(key, "密钥已重新生成".to_string()).into_response()
        }
        Err(e) => ApiResponse::<Value>::from_error(&e.into()).into_response(),
    }
}
