//! # Entity 模块
//!
//! 包含所有 Sea-ORM 实体定义

pub mod channel_models;
pub mod channels;
pub mod probe_logs;
pub mod proxy_keys;
pub mod scheduler_configs;

pub use channel_models::Entity as ChannelModels;
pub use channels::Entity as Channels;
pub use probe_logs::Entity as ProbeLogs;
pub use proxy_keys::Entity as ProxyKeys;
pub use scheduler_configs::Entity as SchedulerConfigs;
