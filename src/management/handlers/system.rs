//! # 系统处理器

use crate::management::response::ApiResponse;
use serde_json::{Value, json};

/// `GET /api/ping`
pub async fn ping_handler() -> ApiResponse<Value> {
    ApiResponse::Success(json!({"status": "ok"}))
}
