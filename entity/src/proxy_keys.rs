//! # 网关代理密钥实体定义
//!
//! 客户端在网关边界出示的密钥及其模型/渠道访问策略

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 代理密钥实体
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "proxy_keys")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    /// 密钥值，全表唯一
    #[sea_orm(unique)]
    pub key: String,
    pub enabled: bool,
    /// 为 true 时跳过渠道/模型白名单检查
    pub allow_all_models: bool,
    /// 允许的渠道ID列表(JSON数组)
    #[sea_orm(column_type = "Json")]
    pub allowed_channel_ids: Json,
    /// 允许的模型ID列表(JSON数组)
    #[sea_orm(column_type = "Json")]
    pub allowed_model_ids: Json,
    pub last_used_at: Option<DateTimeUtc>,
    pub usage_count: i64,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
