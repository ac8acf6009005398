//! # 管理端登录
//!
//! 密码校验后签发 7 天有效期的 JWT。密码既可以是 bcrypt 哈希
//! （`$2` 前缀），也可以是明文。

use crate::app::AppState;
use crate::logging::{LogComponent, LogStage};
use crate::management::response::ApiResponse;
use crate::{linfo, lwarn};
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{Value, json};

/// 登录请求体
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

/// `POST /api/auth/login`
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResponse<Value> {
    let configured = &state.config.admin.password;

    let matched = if configured.starts_with("$2") {
        bcrypt::verify(&request.password, configured).unwrap_or(false)
    } else {
        request.password == *configured
    };

    if !matched {
        lwarn!(
            "system",
            LogStage::Authentication,
            LogComponent::Management,
            "login_failed",
            "管理端登录失败：密码错误"
        );
        return ApiResponse::Error(
            StatusCode::UNAUTHORIZED,
            "auth_invalid".to_string(),
            "密码错误".to_string(),
        );
    }

    match state.jwt.generate_token() {
        Ok(token) => {
            linfo!(
                "system",
                LogStage::Authentication,
                LogComponent::Management,
                "login_ok",
                "管理端登录成功"
            );
            ApiResponse::Success(json!({
                "token": token,
                "expiresIn": state.config.admin.jwt_expires_in,
            }))
        }
        Err(e) => ApiResponse::from_error(&e),
    }
}
