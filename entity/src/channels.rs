//! # 上游渠道实体定义
//!
//! 渠道表的 Sea-ORM 实体模型，一行对应一个上游 AI 服务提供商

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 上游渠道实体
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "channels")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// 渠道显示名称
    pub name: String,
    /// 上游基础地址，尾部 `/` 与 `/v1` 在使用时归一化
    pub base_url: String,
    /// 上游密钥，允许逗号分隔的多密钥列表（轮询使用）
    pub api_key: String,
    /// 渠道级出站代理地址（http/https/socks5）
    pub proxy: Option<String>,
    pub enabled: bool,
    pub sort_order: i32,
    /// 模型同步时的关键字过滤（可选）
    pub model_filter: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::channel_models::Entity")]
    ChannelModels,
}

impl Related<super::channel_models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ChannelModels.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
