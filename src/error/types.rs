//! # 错误类型定义

use axum::http::StatusCode;
use thiserror::Error;

/// 应用主要错误类型
#[derive(Debug, Error)]
pub enum GatewayError {
    /// 配置相关错误（非法 cron、倒置的延迟区间等）
    #[error("配置错误: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 数据库相关错误
    #[error("数据库错误: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 共享内存（Redis）相关错误
    #[error("缓存错误: {message}")]
    Cache {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 请求未携带任何可识别的密钥
    #[error("认证错误: 缺少API密钥")]
    AuthMissing,

    /// 密钥不存在或已禁用
    #[error("认证错误: {message}")]
    AuthInvalid { message: String },

    /// 密钥没有目标渠道/模型的访问权限
    #[error("权限不足: {message}")]
    PermissionDenied { message: String },

    /// 请求的模型无法路由到任何启用渠道
    #[error("模型未找到: {message}")]
    ModelNotFound { message: String },

    /// 请求体缺失字段或格式非法
    #[error("请求错误: {message}")]
    BadRequest { message: String },

    /// 上游请求超时
    #[error("上游超时: {message}")]
    UpstreamTimeout { message: String },

    /// 上游连接失败
    #[error("上游连接失败: {message}")]
    UpstreamConnect { message: String },

    /// 上游 TLS 握手失败
    #[error("上游TLS错误: {message}")]
    UpstreamTls { message: String },

    /// 上游返回非 2xx 或响应体内报告错误
    #[error("上游协议错误: {message}")]
    UpstreamProtocol {
        message: String,
        status: Option<u16>,
    },

    /// 上游响应体无法解析
    #[error("上游响应解析失败: {message}")]
    UpstreamParse {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 传输被取消（停止探测或客户端断开）
    #[error("请求已取消: {message}")]
    Cancelled { message: String },

    /// 已有探测任务在运行
    #[error("检测任务冲突: {message}")]
    ConflictDetectionRunning { message: String },

    /// 系统内部错误
    #[error("内部错误: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl GatewayError {
    /// 创建配置错误
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带源错误的配置错误
    pub fn config_with_source<S: Into<String>, E: Into<anyhow::Error>>(
        message: S,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建数据库错误
    pub fn database<S: Into<String>>(message: S) -> Self {
        Self::Database {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带源错误的数据库错误
    pub fn database_with_source<S: Into<String>, E: Into<anyhow::Error>>(
        message: S,
        source: E,
    ) -> Self {
        Self::Database {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建缓存错误
    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::Cache {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带源错误的缓存错误
    pub fn cache_with_source<S: Into<String>, E: Into<anyhow::Error>>(
        message: S,
        source: E,
    ) -> Self {
        Self::Cache {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建认证失败错误
    pub fn auth_invalid<S: Into<String>>(message: S) -> Self {
        Self::AuthInvalid {
            message: message.into(),
        }
    }

    /// 创建权限不足错误
    pub fn permission_denied<S: Into<String>>(message: S) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// 创建模型未找到错误
    pub fn model_not_found<S: Into<String>>(message: S) -> Self {
        Self::ModelNotFound {
            message: message.into(),
        }
    }

    /// 创建请求错误
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// 创建取消错误
    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// 创建检测冲突错误
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::ConflictDetectionRunning {
            message: message.into(),
        }
    }

    /// 创建内部错误
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带源错误的内部错误
    pub fn internal_with_source<S: Into<String>, E: Into<anyhow::Error>>(
        message: S,
        source: E,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 映射为 HTTP 状态码
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Config { .. } | Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::AuthMissing | Self::AuthInvalid { .. } => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            Self::ModelNotFound { .. } => StatusCode::NOT_FOUND,
            Self::ConflictDetectionRunning { .. } => StatusCode::CONFLICT,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamConnect { .. }
            | Self::UpstreamTls { .. }
            | Self::UpstreamParse { .. }
            | Self::Cancelled { .. } => StatusCode::BAD_GATEWAY,
            Self::UpstreamProtocol { status, .. } => match status {
                Some(code) => match StatusCode::from_u16(*code) {
                    Ok(parsed) => parsed,
                    Err(_) => StatusCode::BAD_GATEWAY,
                },
                None => StatusCode::BAD_GATEWAY,
            },
            Self::Database { .. } | Self::Cache { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 是否属于探测重试策略可恢复的传输层错误
    #[must_use]
    pub const fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::UpstreamTimeout { .. }
                | Self::UpstreamConnect { .. }
                | Self::UpstreamTls { .. }
        )
    }
}

impl From<sea_orm::DbErr> for GatewayError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::database_with_source("数据库操作失败", err)
    }
}

impl From<redis::RedisError> for GatewayError {
    fn from(err: redis::RedisError) -> Self {
        Self::cache_with_source("Redis 操作失败", err)
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal {
            message: "序列化失败".to_string(),
            source: Some(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            GatewayError::conflict("检测进行中").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(GatewayError::AuthMissing.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            GatewayError::model_not_found("gpt-4o").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::UpstreamProtocol {
                message: "quota".into(),
                status: Some(429)
            }
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            GatewayError::UpstreamProtocol {
                message: "bad".into(),
                status: Some(99)
            }
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_transport_error_classification() {
        assert!(GatewayError::UpstreamTimeout {
            message: "30s".into()
        }
        .is_transport_error());
        assert!(!GatewayError::bad_request("缺少 model 字段").is_transport_error());
    }
}
