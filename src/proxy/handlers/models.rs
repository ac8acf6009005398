//! # 模型列表端点
//!
//! OpenAI 风格 `GET /v1/models`：仅列出至少探测成功过一次、
//! 且当前密钥有权访问的模型。无权条目直接省略，不报 403。

use super::common::{authenticate, proxy_error_response};
use crate::app::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// `GET /v1/models`
pub async fn list_models(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let principal = match authenticate(&state, &headers).await {
        Ok(principal) => principal,
        Err(e) => return proxy_error_response(&e),
    };

    let entries = match state.router.list_available_models(&principal).await {
        Ok(entries) => entries,
        Err(e) => return proxy_error_response(&e),
    };

    let data: Vec<_> = entries
        .into_iter()
        .map(|(channel_name, model_name)| {
            json!({
                "id": format!("{channel_name}/{model_name}"),
                "object": "model",
                "created": 0,
                "owned_by": channel_name,
            })
        })
        .collect();

    Json(json!({"object": "list", "data": data})).into_response()
}
