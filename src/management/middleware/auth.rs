//! # 认证中间件
//!
//! 校验请求头或 `token` 查询参数里的管理端 JWT；
//! 查询参数形式供 EventSource（无法设置请求头）使用。

use crate::app::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

/// Axum认证中间件
pub async fn auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = bearer_token(&request).or_else(|| query_token(&request));

    let Some(token) = token else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    match state.jwt.validate_token(&token) {
        Ok(_claims) => Ok(next.run(request).await),
        Err(_) => Err(StatusCode::UNAUTHORIZED),
    }
}

fn bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get("authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(ToString::to_string)
}

fn query_token(request: &Request) -> Option<String> {
    let query = request.uri().query()?;
    for pair in query.split('&') {
        if let Some((name, value)) = pair.split_once('=') {
            if name == "token" && !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}
