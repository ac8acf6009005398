//! # 代理密钥与权限服务
//!
//! 网关边界的入站密钥识别：内置密钥 + 数据库密钥，
//! 以及按 (渠道, 模型) 的访问策略判定。

use crate::error::{GatewayError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo, lwarn};
use axum::http::HeaderMap;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use entity::proxy_keys;
use rand::RngCore;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde_json::Value;

/// 入站密钥可出现的请求头，顺序即优先级
const INBOUND_KEY_HEADERS: [&str; 3] = ["authorization", "x-api-key", "x-goog-api-key"];

/// 通过认证的主体
#[derive(Debug, Clone)]
pub enum KeyPrincipal {
    /// 内置密钥：始终启用，放行全部模型
    Builtin,
    /// 数据库中的代理密钥
    Stored(proxy_keys::Model),
}

impl KeyPrincipal {
    /// 对目标 (渠道, 模型) 是否有访问权限
    ///
    /// allow-all 直接放行；否则渠道或模型任一命中白名单即可，
    /// 两个白名单都为空时拒绝一切。
    #[must_use]
    pub fn can_access(&self, channel_id: i32, model_id: i32) -> bool {
        match self {
            Self::Builtin => true,
            Self::Stored(key) => {
                if key.allow_all_models {
                    return true;
                }
                ids_from_json(&key.allowed_channel_ids).contains(&channel_id)
                    || ids_from_json(&key.allowed_model_ids).contains(&model_id)
            }
        }
    }
}

/// 从请求头提取入站密钥（第一个非空值生效）
#[must_use]
pub fn extract_inbound_key(headers: &HeaderMap) -> Option<String> {
    for name in INBOUND_KEY_HEADERS {
        let Some(raw) = headers.get(name).and_then(|v| v.to_str().ok()) else {
            continue;
        };
        let value = if name == "authorization" {
            raw.strip_prefix("Bearer ")
                .or_else(|| raw.strip_prefix("bearer "))
                .unwrap_or(raw)
        } else {
            raw
        };
        let value = value.trim();
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }
    None
}

/// 代理密钥服务
pub struct ProxyKeyService {
    db: DatabaseConnection,
    builtin_key: String,
}

impl ProxyKeyService {
    /// 创建服务；未配置内置密钥时生成进程生命周期内稳定的随机值
    #[must_use]
    pub fn new(db: DatabaseConnection, configured_key: Option<String>) -> Self {
        let builtin_key = configured_key.unwrap_or_else(|| {
            let mut bytes = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut bytes);
            let generated = BASE64.encode(bytes);
            linfo!(
                "system",
                LogStage::Startup,
                LogComponent::Auth,
                "builtin_key_generated",
                "未配置 PROXY_API_KEY，已生成进程级内置密钥"
            );
            generated
        });
        Self { db, builtin_key }
    }

    /// 内置密钥值（管理端展示用）
    #[must_use]
    pub fn builtin_key(&self) -> &str {
        &self.builtin_key
    }

    /// 认证入站请求
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<KeyPrincipal> {
        let presented = extract_inbound_key(headers).ok_or(GatewayError::AuthMissing)?;

        if presented == self.builtin_key {
            return Ok(KeyPrincipal::Builtin);
        }

        let key = proxy_keys::Entity::find()
            .filter(proxy_keys::Column::Key.eq(presented))
            .one(&self.db)
            .await?
            .ok_or_else(|| GatewayError::auth_invalid("无效的API密钥"))?;

        if !key.enabled {
            return Err(GatewayError::auth_invalid("API密钥已禁用"));
        }

        self.touch_usage(&key);
        Ok(KeyPrincipal::Stored(key))
    }

    /// 更新使用计数与最近使用时间（fire-and-forget）
    fn touch_usage(&self, key: &proxy_keys::Model) {
        let db = self.db.clone();
        let key_id = key.id;
        let next_count = key.usage_count + 1;
        tokio::spawn(async move {
            let update = proxy_keys::ActiveModel {
                id: Set(key_id),
                usage_count: Set(next_count),
                last_used_at: Set(Some(Utc::now())),
                ..Default::default()
            };
            if let Err(e) = update.update(&db).await {
                lwarn!(
                    "system",
                    LogStage::Authentication,
                    LogComponent::Auth,
                    "usage_update_failed",
                    &format!("代理密钥使用统计更新失败: {e}")
                );
            } else {
                ldebug!(
                    "system",
                    LogStage::Authentication,
                    LogComponent::Auth,
                    "usage_updated",
                    &format!("代理密钥 {key_id} 使用计数 -> {next_count}")
                );
            }
        });
    }
}

/// 解析 JSON 数组形式的ID列表
#[must_use]
pub fn ids_from_json(value: &Value) -> Vec<i32> {
    serde_json::from_value(value.clone()).unwrap_or_default()
}

/// 生成新的代理密钥值（`sk-` 前缀 + 32 字节随机数）
#[must_use]
pub fn generate_proxy_key_value() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("sk-{}", hex_encode(&bytes))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn stored_key(allow_all: bool, channels: Value, models: Value) -> KeyPrincipal {
        KeyPrincipal::Stored(proxy_keys::Model {
            id: 1,
            name: "test".into(),
            key: "sk-test".into(),
            enabled: true,
            allow_all_models: allow_all,
            allowed_channel_ids: channels,
            allowed_model_ids: models,
            last_used_at: None,
            usage_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
    }

    #[test]
    fn test_extract_key_header_priority() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer sk-a"));
        headers.insert("x-api-key", HeaderValue::from_static("sk-b"));
        assert_eq!(extract_inbound_key(&headers), Some("sk-a".into()));

        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", HeaderValue::from_static("sk-g"));
        assert_eq!(extract_inbound_key(&headers), Some("sk-g".into()));

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static(""));
        headers.insert("x-api-key", HeaderValue::from_static("sk-c"));
        assert_eq!(extract_inbound_key(&headers), Some("sk-c".into()));

        assert_eq!(extract_inbound_key(&HeaderMap::new()), None);
    }

    #[test]
    fn test_permission_allow_all() {
        let principal = stored_key(true, json!([]), json!([]));
        assert!(principal.can_access(9, 99));
        assert!(KeyPrincipal::Builtin.can_access(9, 99));
    }

    #[test]
    fn test_permission_channel_or_model_membership() {
        let principal = stored_key(false, json!([1]), json!([200]));
        assert!(principal.can_access(1, 999));
        assert!(principal.can_access(7, 200));
        assert!(!principal.can_access(7, 999));
    }

    #[test]
    fn test_permission_empty_lists_deny_everything() {
        let principal = stored_key(false, json!([]), json!([]));
        assert!(!principal.can_access(1, 1));
    }

    #[test]
    fn test_generated_key_shape() {
        let value = generate_proxy_key_value();
        assert!(value.starts_with("sk-"));
        assert_eq!(value.len(), 3 + 64);
    }
}
