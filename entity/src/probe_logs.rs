//! # 探测日志实体定义
//!
//! 单次探测的结果记录，仅追加，由保留策略任务定期清理

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 探测日志实体
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "probe_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub model_id: i32,
    /// 端点类型标签（CHAT/CLAUDE/GEMINI/CODEX/IMAGE）
    pub endpoint_type: String,
    pub success: bool,
    pub latency_ms: i32,
    /// 上游 HTTP 状态码（传输层失败时为空）
    pub upstream_status: Option<i32>,
    /// 错误消息，截断至 500 字符
    pub error_message: Option<String>,
    /// 响应内容预览，截断至 500 字符
    pub response_preview: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::channel_models::Entity",
        from = "Column::ModelId",
        to = "super::channel_models::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    ChannelModel,
}

impl Related<super::channel_models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ChannelModel.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
