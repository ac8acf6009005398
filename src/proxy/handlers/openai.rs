//! # OpenAI 协议转发
//!
//! Chat Completions 与 Responses 两个端点，均为 Bearer 认证。

use super::common::{
    authenticate, forward_to_upstream, is_stream_request, proxy_error_response,
    require_model_field, rewrite_model_field,
};
use crate::app::AppState;
use crate::detection::endpoint::normalize_base_url;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde_json::Value;

/// `POST /v1/chat/completions`
pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    forward_openai(state, headers, body, "/v1/chat/completions").await
}

/// `POST /v1/responses`
pub async fn responses(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    forward_openai(state, headers, body, "/v1/responses").await
}

async fn forward_openai(
    state: AppState,
    headers: HeaderMap,
    mut body: Value,
    path: &str,
) -> Response {
    let principal = match authenticate(&state, &headers).await {
        Ok(principal) => principal,
        Err(e) => return proxy_error_response(&e),
    };

    let model_spec = match require_model_field(&body) {
        Ok(model) => model,
        Err(e) => return proxy_error_response(&e),
    };

    let route = match state.router.resolve(&model_spec, &principal).await {
        Ok(route) => route,
        Err(e) => return proxy_error_response(&e),
    };

    rewrite_model_field(&mut body, &route.actual_model);
    let is_stream = is_stream_request(&body);

    let url = format!("{}{path}", normalize_base_url(&route.base_url));
    let upstream_headers = vec![(
        "authorization".to_string(),
        format!("Bearer {}", route.upstream_key),
    )];
    let payload = serde_json::to_vec(&body).unwrap_or_default();

    forward_to_upstream(&state, &route, url, upstream_headers, Some(payload), is_stream).await
}
