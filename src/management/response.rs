//! # API 响应结构
//!
//! 管理端统一的 JSON 响应格式：成功、失败与带消息的变体。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// # 标准成功响应
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// # 标准错误信息
#[derive(Debug, Serialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

/// # 标准错误响应
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorInfo,
}

/// # API响应枚举
///
/// 统一所有管理端出口，方便转换为 `axum::response::Response`
pub enum ApiResponse<T: Serialize> {
    Success(T),
    SuccessWithMessage(T, String),
    SuccessWithoutData(String),
    Error(StatusCode, String, String),
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            ApiResponse::Success(data) => (
                StatusCode::OK,
                Json(SuccessResponse {
                    success: true,
                    data: Some(data),
                    message: None,
                    timestamp: Utc::now(),
                }),
            )
                .into_response(),
            ApiResponse::SuccessWithMessage(data, message) => (
                StatusCode::OK,
                Json(SuccessResponse {
                    success: true,
                    data: Some(data),
                    message: Some(message),
                    timestamp: Utc::now(),
                }),
            )
                .into_response(),
            ApiResponse::SuccessWithoutData(message) => (
                StatusCode::OK,
                Json(SuccessResponse::<()> {
                    success: true,
                    data: None,
                    message: Some(message),
                    timestamp: Utc::now(),
                }),
            )
                .into_response(),
            ApiResponse::Error(status, code, message) => (
                status,
                Json(ErrorResponse {
                    success: false,
                    error: ErrorInfo { code, message },
                }),
            )
                .into_response(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    /// 从应用错误构造错误响应
    #[must_use]
    pub fn from_error(error: &crate::error::GatewayError) -> Self {
        Self::Error(error.status_code(), error_code(error).to_string(), error.to_string())
    }
}

/// 稳定的机器可读错误码
#[must_use]
pub fn error_code(error: &crate::error::GatewayError) -> &'static str {
    use crate::error::GatewayError as E;
    match error {
        E::Config { .. } | E::BadRequest { .. } => "invalid_request",
        E::AuthMissing => "auth_missing",
        E::AuthInvalid { .. } => "auth_invalid",
        E::PermissionDenied { .. } => "permission_denied",
        E::ModelNotFound { .. } => "model_not_found",
        E::ConflictDetectionRunning { .. } => "detection_running",
        E::UpstreamTimeout { .. } => "upstream_timeout",
        E::UpstreamConnect { .. } => "upstream_connect",
        E::UpstreamTls { .. } => "upstream_tls",
        E::UpstreamProtocol { .. } => "upstream_protocol",
        E::UpstreamParse { .. } => "upstream_parse",
        E::Cancelled { .. } => "cancelled",
        E::Database { .. } => "database_error",
        E::Cache { .. } => "cache_error",
        E::Internal { .. } => "internal_error",
    }
}
