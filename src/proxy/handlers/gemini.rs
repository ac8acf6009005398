//! # Google Gemini 转发
//!
//! 模型名从路径段 `{model}:{action}` 中取出；`streamGenerateContent`
//! 走流式透传（上游为 JSON 数组流），`alt` 查询参数原样转发。

use super::common::{authenticate, forward_to_upstream, proxy_error_response};
use crate::app::AppState;
use crate::detection::endpoint::normalize_base_url;
use crate::error::GatewayError;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde_json::Value;
use std::collections::HashMap;

/// `POST /v1beta/models/{model}:generateContent|streamGenerateContent`
pub async fn generate(
    State(state): State<AppState>,
    Path(model_action): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let Some((model_spec, action)) = model_action.rsplit_once(':') else {
        return proxy_error_response(&GatewayError::bad_request(format!(
            "路径缺少动作段: {model_action}"
        )));
    };
    if !matches!(action, "generateContent" | "streamGenerateContent") {
        return proxy_error_response(&GatewayError::bad_request(format!(
            "不支持的动作: {action}"
        )));
    }
    let is_stream = action == "streamGenerateContent";

    let principal = match authenticate(&state, &headers).await {
        Ok(principal) => principal,
        Err(e) => return proxy_error_response(&e),
    };

    let route = match state.router.resolve(model_spec, &principal).await {
        Ok(route) => route,
        Err(e) => return proxy_error_response(&e),
    };

    // Gemini 请求体不携带模型名，改写发生在 URL 上
    let mut url = format!(
        "{}/v1beta/models/{}:{action}",
        normalize_base_url(&route.base_url),
        route.actual_model
    );
    if let Some(alt) = query.get("alt") {
        url.push_str(&format!("?alt={alt}"));
    }

    let upstream_headers = vec![("x-goog-api-key".to_string(), route.upstream_key.clone())];
    let payload = serde_json::to_vec(&body).unwrap_or_default();

    forward_to_upstream(&state, &route, url, upstream_headers, Some(payload), is_stream).await
}
