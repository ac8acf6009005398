//! # 转发公共逻辑
//!
//! 入站认证、错误响应形状与上游响应透传

use crate::app::AppState;
use crate::auth::KeyPrincipal;
use crate::error::{GatewayError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::proxy::router::RouteTarget;
use crate::{ldebug, lwarn};
use axum::body::Body;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::Method;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 入站认证；失败时由调用方转换为上游风格错误响应
pub(super) async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<KeyPrincipal> {
    state.proxy_keys.authenticate(headers).await
}

/// 代理面错误响应（OpenAI 风格的 error 包裹）
pub(super) fn proxy_error_response(error: &GatewayError) -> Response {
    let (status, error_type) = match error {
        GatewayError::AuthMissing | GatewayError::AuthInvalid { .. } => {
            (StatusCode::UNAUTHORIZED, "authentication_error")
        }
        // 权限拒绝对外表现与模型不存在一致，避免暴露渠道配置
        GatewayError::PermissionDenied { .. } | GatewayError::ModelNotFound { .. } => {
            (StatusCode::NOT_FOUND, "model_not_found")
        }
        GatewayError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "invalid_request_error"),
        GatewayError::UpstreamTimeout { .. }
        | GatewayError::UpstreamConnect { .. }
        | GatewayError::UpstreamTls { .. }
        | GatewayError::UpstreamProtocol { .. }
        | GatewayError::UpstreamParse { .. }
        | GatewayError::Cancelled { .. } => (error.status_code(), "proxy_error"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };

    (
        status,
        Json(json!({
            "error": {
                "message": error.to_string(),
                "type": error_type,
            }
        })),
    )
        .into_response()
}

/// 从请求体读取 `model` 字段
pub(super) fn require_model_field(body: &Value) -> Result<String> {
    body.get("model")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| GatewayError::bad_request("请求体缺少 model 字段"))
}

/// 改写请求体中的模型名为上游真实模型名
pub(super) fn rewrite_model_field(body: &mut Value, actual_model: &str) {
    if let Some(object) = body.as_object_mut() {
        object.insert("model".to_string(), Value::String(actual_model.to_string()));
    }
}

/// OpenAI/Anthropic 协议的流式判定
pub(super) fn is_stream_request(body: &Value) -> bool {
    body.get("stream").and_then(Value::as_bool) == Some(true)
}

/// 转发到上游并透传响应
///
/// 流式响应逐字节透传，不做行缓冲或聚合；客户端断开时响应流被
/// 丢弃，进而中止上游连接。
pub(super) async fn forward_to_upstream(
    state: &AppState,
    route: &RouteTarget,
    url: String,
    upstream_headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    is_stream: bool,
) -> Response {
    let request_id = Uuid::new_v4();
    ldebug!(
        request_id,
        LogStage::UpstreamRequest,
        LogComponent::ProxyHandler,
        "forward",
        &format!(
            "转发到渠道 {} ({}): {url} stream={is_stream}",
            route.channel_name, route.channel_id
        )
    );

    let cancel = CancellationToken::new();
    let upstream = match state
        .transport
        .forward(
            Method::POST,
            &url,
            &upstream_headers,
            body,
            route.proxy.as_deref(),
            &cancel,
        )
        .await
    {
        Ok(upstream) => upstream,
        Err(e) => {
            lwarn!(
                request_id,
                LogStage::UpstreamRequest,
                LogComponent::ProxyHandler,
                "forward_failed",
                &format!("上游请求失败: {e}")
            );
            return proxy_error_response(&e);
        }
    };

    let status = upstream.status();
    if !status.is_success() {
        let message = read_upstream_error(upstream).await;
        return proxy_error_response(&GatewayError::UpstreamProtocol {
            message,
            status: Some(status.as_u16()),
        });
    }

    if is_stream {
        stream_passthrough(upstream)
    } else {
        json_reemit(upstream).await
    }
}

/// 流式透传：保留上游 Content-Type，强制 no-cache 与 keep-alive
fn stream_passthrough(upstream: reqwest::Response) -> Response {
    let status = StatusCode::from_u16(upstream.status().as_u16())
        .unwrap_or(StatusCode::OK);
    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("text/event-stream")
        .to_string();

    let stream = futures::TryStreamExt::map_err(upstream.bytes_stream(), std::io::Error::other);

    let mut response = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
    response
        .headers_mut()
        .remove(header::CONTENT_LENGTH);
    response
}

/// 非流式：完整解析上游 JSON 后重发
async fn json_reemit(upstream: reqwest::Response) -> Response {
    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json")
        .to_string();

    match upstream.bytes().await {
        Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => (status, Json(value)).into_response(),
            // 上游给了非 JSON 响应体，按原样回放
            Err(_) => (status, [(header::CONTENT_TYPE, content_type)], bytes).into_response(),
        },
        Err(e) => proxy_error_response(&GatewayError::UpstreamParse {
            message: format!("读取上游响应失败: {e}"),
            source: None,
        }),
    }
}

/// 提取上游错误响应里的可读消息
async fn read_upstream_error(upstream: reqwest::Response) -> String {
    let status = upstream.status();
    match upstream.bytes().await {
        Ok(bytes) => {
            if let Ok(body) = serde_json::from_slice::<Value>(&bytes) {
                if let Some(message) = crate::detection::extract::detect_body_error(&body) {
                    return message;
                }
            }
            let text = String::from_utf8_lossy(&bytes);
            let preview = crate::detection::extract::truncate_preview(text.trim());
            if preview.is_empty() {
                format!("上游返回 HTTP {status}")
            } else {
                preview
            }
        }
        Err(_) => format!("上游返回 HTTP {status}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_model_field() {
        assert_eq!(
            require_model_field(&json!({"model": "gpt-4o"})).unwrap(),
            "gpt-4o"
        );
        assert!(require_model_field(&json!({"model": ""})).is_err());
        assert!(require_model_field(&json!({"messages": []})).is_err());
    }

    #[test]
    fn test_rewrite_model_field() {
        let mut body = json!({"model": "B/gpt-4o", "stream": true});
        rewrite_model_field(&mut body, "gpt-4o");
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_is_stream_request() {
        assert!(is_stream_request(&json!({"stream": true})));
        assert!(!is_stream_request(&json!({"stream": false})));
        assert!(!is_stream_request(&json!({})));
        assert!(!is_stream_request(&json!({"stream": "true"})));
    }
}
