//! # 调度配置实体定义
//!
//! 单例行：定时探测的 cron 表达式、并发上限与抖动区间

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 调度配置实体（单例）
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "scheduler_configs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub enabled: bool,
    /// 标准 5 字段 cron 表达式
    pub cron_expr: String,
    /// IANA 时区名称，如 `Asia/Shanghai`
    pub timezone: String,
    pub channel_concurrency: i32,
    pub global_concurrency: i32,
    pub min_delay_ms: i32,
    pub max_delay_ms: i32,
    /// 为 true 时探测全部启用渠道，忽略下面的选择集
    pub probe_all: bool,
    /// 选中的渠道ID列表(JSON数组)
    #[sea_orm(column_type = "Json")]
    pub selected_channel_ids: Json,
    /// 选中的模型ID映射(JSON对象，渠道ID -> 模型ID列表)
    #[sea_orm(column_type = "Json")]
    pub selected_model_ids: Json,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
