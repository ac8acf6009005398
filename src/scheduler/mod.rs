//! # 调度控制平面
//!
//! cron 驱动的定时探测、调度配置状态机与日志保留清理

pub mod cron;
pub mod manager;

pub use cron::CronExpr;
pub use manager::SchedulerManager;
