//! # Anthropic Messages 转发
//!
//! `x-api-key` 认证；客户端的 `anthropic-version` / `anthropic-beta`
//! 原样透传到上游。

use super::common::{
    authenticate, forward_to_upstream, is_stream_request, proxy_error_response,
    require_model_field, rewrite_model_field,
};
use crate::app::AppState;
use crate::detection::endpoint::{ANTHROPIC_VERSION, normalize_base_url};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde_json::Value;

/// `POST /v1/messages`
pub async fn messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut body): Json<Value>,
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

    let url = format!("{}/v1/messages", normalize_base_url(&route.base_url));
    let mut upstream_headers = vec![
        ("x-api-key".to_string(), route.upstream_key.clone()),
        (
            "anthropic-version".to_string(),
            client_header(&headers, "anthropic-version")
                .unwrap_or_else(|| ANTHROPIC_VERSION.to_string()),
        ),
    ];
    if let Some(beta) = client_header(&headers, "anthropic-beta") {
        upstream_headers.push(("anthropic-beta".to_string(), beta));
    }
    let payload = serde_json::to_vec(&body).unwrap_or_default();

    forward_to_upstream(&state, &route, url, upstream_headers, Some(payload), is_stream).await
}

fn client_header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}
