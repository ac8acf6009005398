//! # 应用配置结构定义
//!
//! 所有配置项从环境变量读取，带默认值；探测相关默认值会在首次启动时
//! 写入调度配置单例行。

use serde::{Deserialize, Serialize};
use std::env;

/// 应用主配置结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP 服务配置
    pub server: ServerConfig,
    /// 数据库配置
    pub database: DatabaseConfig,
    /// Redis配置
    pub redis: RedisConfig,
    /// 管理端认证配置
    pub admin: AdminConfig,
    /// 探测引擎配置
    pub detection: DetectionConfig,
    /// 转发配置
    pub proxy: ProxyConfig,
}

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// 连接URL，支持 sqlite 与 postgres
    pub url: String,
}

/// Redis配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// 连接URL
    pub url: String,
}

/// 管理端认证配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// 管理员密码；`$2` 前缀视为 bcrypt 哈希，否则按明文比较
    pub password: String,
    /// JWT 签名密钥
    pub jwt_secret: String,
    /// JWT 有效期（秒）
    pub jwt_expires_in: i64,
}

/// 探测引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// 单渠道并发上限
    pub channel_concurrency: i32,
    /// 全局并发上限
    pub max_global_concurrency: i32,
    /// 探测间隔抖动下界（毫秒）
    pub min_delay_ms: i32,
    /// 探测间隔抖动上界（毫秒）
    pub max_delay_ms: i32,
    /// 探测提示词
    pub detect_prompt: String,
    /// 定时探测开关
    pub auto_detect_enabled: bool,
    /// 定时探测 cron 表达式
    pub cron_schedule: String,
    /// cron 时区
    pub cron_timezone: String,
    /// 探测日志保留天数
    pub log_retention_days: i64,
}

/// 转发配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// 进程级默认出站代理
    pub global_proxy: Option<String>,
    /// 内置网关密钥；未设置时进程启动生成随机值
    pub proxy_api_key: Option<String>,
}

impl AppConfig {
    /// 从环境变量加载配置
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: env_or("HOST", "0.0.0.0"),
                port: env_parse("PORT", 8080),
            },
            database: DatabaseConfig {
                url: env_or("DATABASE_URL", "sqlite://data/gateway.db"),
            },
            redis: RedisConfig {
                url: env_or("REDIS_URL", "redis://127.0.0.1:6379/0"),
            },
            admin: AdminConfig {
                password: env_or("ADMIN_PASSWORD", "admin"),
                jwt_secret: env_or("JWT_SECRET", "change-me-in-production"),
                // 7 天
                jwt_expires_in: 7 * 24 * 3600,
            },
            detection: DetectionConfig {
                channel_concurrency: env_parse("CHANNEL_CONCURRENCY", 5),
                max_global_concurrency: env_parse("MAX_GLOBAL_CONCURRENCY", 30),
                min_delay_ms: env_parse("DETECTION_MIN_DELAY_MS", 3000),
                max_delay_ms: env_parse("DETECTION_MAX_DELAY_MS", 5000),
                detect_prompt: env_or("DETECT_PROMPT", "1+1=2? yes or no"),
                auto_detect_enabled: env_parse("AUTO_DETECT_ENABLED", false),
                cron_schedule: env_or("CRON_SCHEDULE", "0 3 * * *"),
                cron_timezone: env_or("CRON_TIMEZONE", "UTC"),
                log_retention_days: env_parse("LOG_RETENTION_DAYS", 7),
            },
            proxy: ProxyConfig {
                global_proxy: env::var("GLOBAL_PROXY").ok().filter(|v| !v.is_empty()),
                proxy_api_key: env::var("PROXY_API_KEY").ok().filter(|v| !v.is_empty()),
            },
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        // 不依赖环境变量的默认值检查
        let config = AppConfig::from_env();
        assert!(config.detection.channel_concurrency > 0);
        assert!(config.detection.max_global_concurrency >= config.detection.channel_concurrency);
        assert!(config.detection.min_delay_ms <= config.detection.max_delay_ms);
        assert!(!config.detection.detect_prompt.is_empty());
    }
}
