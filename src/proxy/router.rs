//! # 代理路由
//!
//! 把入站 `(代理密钥, 模型串)` 解析为具体的 (渠道, 上游模型, 上游密钥)。
//! 模型串支持 `<渠道名>/<模型名>` 前缀过滤；多密钥凭据按渠道轮询。

use crate::auth::KeyPrincipal;
use crate::error::{GatewayError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::ldebug;
use entity::{channel_models, channels};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// 路由结果
#[derive(Debug, Clone)]
pub struct RouteTarget {
    pub channel_id: i32,
    pub channel_name: String,
    pub base_url: String,
    /// 轮询选出的单个上游密钥
    pub upstream_key: String,
    pub proxy: Option<String>,
    pub actual_model: String,
    pub model_id: i32,
    pub last_status: Option<bool>,
}

/// 解析模型串：`<渠道名>/<模型名>` 或裸模型名
///
/// 斜杠存在且前缀非空时，前缀作为渠道名过滤器；否则整串是模型名。
#[must_use]
pub fn parse_model_spec(spec: &str) -> (Option<&str>, &str) {
    match spec.split_once('/') {
        Some((prefix, rest)) if !prefix.is_empty() && !rest.is_empty() => (Some(prefix), rest),
        _ => (None, spec),
    }
}

/// 拆分逗号分隔的多密钥凭据
///
/// 分隔符约定为英文逗号，条目两端空白会被去除。
#[must_use]
pub fn split_api_keys(credential: &str) -> Vec<String> {
    credential
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// 代理路由器
pub struct ProxyRouter {
    db: DatabaseConnection,
    /// 渠道ID -> 轮询游标；仅进程内有效，渠道编辑时失效
    cursors: Mutex<HashMap<i32, u64>>,
}

impl ProxyRouter {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            cursors: Mutex::new(HashMap::new()),
        }
    }

    /// 解析路由：确定性首个匹配（渠道按 sort_order、name 排序）
    ///
    /// 没有权限的候选渠道被直接跳过；全部未命中返回
    /// `ModelNotFound`（对外表现为 404，而非 403）。
    pub async fn resolve(
        &self,
        model_spec: &str,
        principal: &KeyPrincipal,
    ) -> Result<RouteTarget> {
        let (prefix, model_name) = parse_model_spec(model_spec);

        let channel_list = self.enabled_channels().await?;

        if let Some(prefix) = prefix {
            // 前缀没有命中任何启用渠道时，把整串当作模型名重新匹配
            if channel_list.iter().any(|c| c.name == prefix) {
                return self
                    .first_match(&channel_list, Some(prefix), model_name, principal)
                    .await;
            }
            ldebug!(
                "system",
                LogStage::RequestStart,
                LogComponent::Router,
                "prefix_fallback",
                &format!("前缀 {prefix} 未命中任何渠道，按完整模型名匹配")
            );
        }

        self.first_match(&channel_list, None, model_spec, principal)
            .await
    }

    async fn enabled_channels(&self) -> Result<Vec<channels::Model>> {
        Ok(channels::Entity::find()
            .filter(channels::Column::Enabled.eq(true))
            .order_by_asc(channels::Column::SortOrder)
            .order_by_asc(channels::Column::Name)
            .all(&self.db)
            .await?)
    }

    async fn first_match(
        &self,
        channel_list: &[channels::Model],
        prefix: Option<&str>,
        model_name: &str,
        principal: &KeyPrincipal,
    ) -> Result<RouteTarget> {
        let model_rows: HashMap<i32, channel_models::Model> = channel_models::Entity::find()
            .filter(channel_models::Column::ModelName.eq(model_name))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|row| (row.channel_id, row))
            .collect();

        for channel in channel_list {
            if let Some(prefix) = prefix {
                if channel.name != prefix {
                    continue;
                }
            }
            let Some(model) = model_rows.get(&channel.id) else {
                continue;
            };
            if !principal.can_access(channel.id, model.id) {
                continue;
            }

            let upstream_key = self.select_key(channel.id, &channel.api_key);
            return Ok(RouteTarget {
                channel_id: channel.id,
                channel_name: channel.name.clone(),
                base_url: channel.base_url.clone(),
                upstream_key,
                proxy: channel.proxy.clone(),
                actual_model: model.model_name.clone(),
                model_id: model.id,
                last_status: model.last_status,
            });
        }

        Err(GatewayError::model_not_found(format!(
            "没有可用渠道提供模型 {model_name}"
        )))
    }

    /// 多密钥轮询：进程内单调计数器取模，不持久化游标
    fn select_key(&self, channel_id: i32, credential: &str) -> String {
        let keys = split_api_keys(credential);
        if keys.is_empty() {
            return String::new();
        }
        if keys.len() == 1 {
            return keys.into_iter().next().expect("已检查非空");
        }
        let mut cursors = self.cursors.lock().expect("轮询游标锁");
        let cursor = cursors.entry(channel_id).or_insert(0);
        let selected = keys[(*cursor as usize) % keys.len()].clone();
        *cursor = cursor.wrapping_add(1);
        selected
    }

    /// 渠道编辑后丢弃其轮询游标
    pub fn invalidate_cursor(&self, channel_id: i32) {
        self.cursors.lock().expect("轮询游标锁").remove(&channel_id);
    }

    /// 可对外列出的模型：启用渠道、至少一次探测成功、通过权限过滤
    ///
    /// 返回 `(渠道名, 模型名)`，顺序与路由选择一致。
    pub async fn list_available_models(
        &self,
        principal: &KeyPrincipal,
    ) -> Result<Vec<(String, String)>> {
        let channel_list = self.enabled_channels().await?;
        let mut result = Vec::new();
        for channel in channel_list {
            let models = channel_models::Entity::find()
                .filter(channel_models::Column::ChannelId.eq(channel.id))
                .order_by_asc(channel_models::Column::ModelName)
                .all(&self.db)
                .await?;
            for model in models {
                if !has_detected_endpoint(&model.detected_endpoints) {
                    continue;
                }
                if !principal.can_access(channel.id, model.id) {
                    continue;
                }
                result.push((channel.name.clone(), model.model_name));
            }
        }
        Ok(result)
    }
}

/// 模型是否有过至少一次成功探测
fn has_detected_endpoint(detected_endpoints: &Value) -> bool {
    detected_endpoints
        .as_array()
        .is_some_and(|endpoints| !endpoints.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_model_spec() {
        assert_eq!(parse_model_spec("B/gpt-4o"), (Some("B"), "gpt-4o"));
        assert_eq!(parse_model_spec("gpt-4o"), (None, "gpt-4o"));
        assert_eq!(parse_model_spec("/gpt-4o"), (None, "/gpt-4o"));
        assert_eq!(parse_model_spec("a/b/c"), (Some("a"), "b/c"));
        assert_eq!(parse_model_spec("trailing/"), (None, "trailing/"));
    }

    #[test]
    fn test_split_api_keys() {
        assert_eq!(split_api_keys("sk-a"), vec!["sk-a"]);
        assert_eq!(split_api_keys("sk-a, sk-b,sk-c"), vec!["sk-a", "sk-b", "sk-c"]);
        assert_eq!(split_api_keys(" sk-a ,, "), vec!["sk-a"]);
        assert!(split_api_keys("").is_empty());
    }

    #[test]
    fn test_has_detected_endpoint() {
        assert!(has_detected_endpoint(&json!(["CHAT"])));
        assert!(!has_detected_endpoint(&json!([])));
        assert!(!has_detected_endpoint(&json!(null)));
    }
}
