//! # 配置管理模块
//!
//! 环境变量驱动的应用配置

mod app_config;

pub use app_config::{
    AdminConfig, AppConfig, DatabaseConfig, DetectionConfig, ProxyConfig, RedisConfig,
    ServerConfig,
};
