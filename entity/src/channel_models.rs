//! # 渠道模型实体定义
//!
//! `(渠道, 模型名)` 唯一；`detected_endpoints` 记录至少探测成功过一次的端点集合

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 渠道模型实体
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "channel_models")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub channel_id: i32,
    pub model_name: String,
    /// 已确认可达的端点标签列表(JSON数组，集合语义)
    #[sea_orm(column_type = "Json")]
    pub detected_endpoints: Json,
    /// 最近一次探测结果；NULL 表示从未探测
    pub last_status: Option<bool>,
    pub last_latency_ms: Option<i32>,
    pub last_checked_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::channels::Entity",
        from = "Column::ChannelId",
        to = "super::channels::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Channel,
    #[sea_orm(has_many = "super::probe_logs::Entity")]
    ProbeLogs,
}

impl Related<super::channels::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Channel.def()
    }
}

impl Related<super::probe_logs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProbeLogs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
