//! # 探测进度总线
//!
//! 进度事件经 Redis pub/sub 扇出到所有网关进程，每个进程内再经
//! broadcast 通道分发给 SSE 订阅者。慢订阅者只会丢事件，不会反压
//! 工作协程。

use crate::cache::{CacheClient, CacheKey};
use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo, lwarn};
use futures::StreamExt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;

/// 本地扇出通道容量；写满后最老事件被挤掉（订阅端表现为 Lagged）
const LOCAL_FANOUT_CAPACITY: usize = 1024;

/// 订阅重连退避上限
const RECONNECT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// 单次探测的进度载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    pub channel_id: i32,
    pub model_id: i32,
    pub model_name: String,
    /// `SUCCESS` 或 `FAIL`
    pub status: String,
    pub latency: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_type: Option<String>,
    /// 该模型本轮探测的全部端点是否已完结
    pub is_model_complete: bool,
}

/// 进度总线事件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum ProgressEvent {
    Connected,
    Progress(ProgressPayload),
    Heartbeat,
    Error { message: String },
}

impl ProgressEvent {
    /// SSE 事件名
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Progress(_) => "progress",
            Self::Heartbeat => "heartbeat",
            Self::Error { .. } => "error",
        }
    }
}

/// 进度总线
#[derive(Clone)]
pub struct ProgressBus {
    cache: CacheClient,
    sender: broadcast::Sender<ProgressEvent>,
}

impl ProgressBus {
    #[must_use]
    pub fn new(cache: CacheClient) -> Self {
        let (sender, _) = broadcast::channel(LOCAL_FANOUT_CAPACITY);
        Self { cache, sender }
    }

    /// 发布事件；投递尽力而为，失败时退化为仅本进程扇出
    pub async fn publish(&self, event: &ProgressEvent) {
        match serde_json::to_string(event) {
            Ok(payload) => {
                if let Err(e) = self
                    .cache
                    .publish(&CacheKey::ProgressChannel.build(), &payload)
                    .await
                {
                    lwarn!(
                        "system",
                        LogStage::Detection,
                        LogComponent::Progress,
                        "publish_degraded",
                        &format!("进度发布失败，降级为本地扇出: {e}")
                    );
                    let _ = self.sender.send(event.clone());
                }
            }
            Err(e) => {
                lwarn!(
                    "system",
                    LogStage::Detection,
                    LogComponent::Progress,
                    "publish_encode_failed",
                    &format!("进度事件序列化失败: {e}")
                );
            }
        }
    }

    /// 订阅本进程的进度事件流
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// 启动 Redis 订阅转发协程
    ///
    /// 断线采用带抖动的指数退避重连，上限 30 秒；重连后的重复事件
    /// 由订阅端幂等处理。
    pub fn spawn_forwarder(&self) -> tokio::task::JoinHandle<()> {
        let bus = self.clone();
        tokio::spawn(async move {
            let mut backoff = Duration::from_secs(1);
            loop {
                match bus.forward_until_error().await {
                    Ok(()) => backoff = Duration::from_secs(1),
                    Err(e) => {
                        let jitter_ms = rand::thread_rng().gen_range(0..500);
                        let sleep_for = backoff.min(RECONNECT_MAX_BACKOFF)
                            + Duration::from_millis(jitter_ms);
                        lwarn!(
                            "system",
                            LogStage::Detection,
                            LogComponent::Progress,
                            "forwarder_reconnect",
                            &format!("进度订阅断开: {e}，{}ms 后重连", sleep_for.as_millis())
                        );
                        tokio::time::sleep(sleep_for).await;
                        backoff = (backoff * 2).min(RECONNECT_MAX_BACKOFF);
                    }
                }
            }
        })
    }

    async fn forward_until_error(&self) -> Result<()> {
        let mut pubsub = self.cache.pubsub().await?;
        pubsub
            .subscribe(CacheKey::ProgressChannel.build())
            .await
            .map_err(crate::error::GatewayError::from)?;
        linfo!(
            "system",
            LogStage::Detection,
            LogComponent::Progress,
            "forwarder_ready",
            "进度订阅转发已就绪"
        );

        let mut stream = pubsub.on_message();
        while let Some(message) = stream.next().await {
            let payload: String = match message.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    ldebug!(
                        "system",
                        LogStage::Detection,
                        LogComponent::Progress,
                        "bad_payload",
                        &format!("忽略非法进度消息: {e}")
                    );
                    continue;
                }
            };
            match serde_json::from_str::<ProgressEvent>(&payload) {
                Ok(event) => {
                    // 没有任何订阅者时发送会失败，属正常情况
                    let _ = self.sender.send(event);
                }
                Err(e) => {
                    ldebug!(
                        "system",
                        LogStage::Detection,
                        LogComponent::Progress,
                        "bad_event",
                        &format!("忽略无法解析的进度事件: {e}")
                    );
                }
            }
        }
        Err(crate::error::GatewayError::cache("进度订阅流已结束"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_event_wire_format() {
        let event = ProgressEvent::Progress(ProgressPayload {
            channel_id: 1,
            model_id: 2,
            model_name: "gpt-4o".into(),
            status: "SUCCESS".into(),
            latency: Some(320),
            endpoint_type: Some("CHAT".into()),
            is_model_complete: false,
        });
        let json = serde_json::to_value(&event).expect("序列化");
        assert_eq!(json["kind"], "progress");
        assert_eq!(json["data"]["channelId"], 1);
        assert_eq!(json["data"]["endpointType"], "CHAT");
        assert_eq!(json["data"]["isModelComplete"], false);
        assert_eq!(event.kind(), "progress");
    }

    #[test]
    fn test_event_round_trip() {
        let event = ProgressEvent::Error {
            message: "boom".into(),
        };
        let json = serde_json::to_string(&event).expect("序列化");
        let parsed: ProgressEvent = serde_json::from_str(&json).expect("反序列化");
        assert_eq!(parsed.kind(), "error");
    }
}
