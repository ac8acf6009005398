//! # 代理转发处理器
//!
//! 每个入站协议端点一个处理器：入站认证 → 路由 → 模型名改写 →
//! 上游转发（流式逐字节透传 / 非流式 JSON 重发）。

mod anthropic;
mod common;
mod gemini;
mod models;
mod openai;

use crate::app::AppState;
use axum::Router;
use axum::routing::{get, post};

/// 代理面路由
pub fn proxy_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/models", get(models::list_models))
        .route("/v1/chat/completions", post(openai::chat_completions))
        .route("/v1/responses", post(openai::responses))
        .route("/v1/messages", post(anthropic::messages))
        .route("/v1beta/models/{model_action}", post(gemini::generate))
}
