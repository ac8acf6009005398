//! # 探测编排服务
//!
//! 触发契约（全量/单渠道/选择集）、队列状态查询与停止排空。

use super::endpoint;
use super::job::ProbeJob;
use super::queue::{JobQueue, QueueCounts};
use super::semaphore::DetectionSemaphores;
use super::worker::WorkerPool;
use crate::cache::{CacheClient, CacheKey};
use crate::error::{GatewayError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::proxy::router::split_api_keys;
use crate::proxy::transport::ProxyFetchClient;
use crate::{ldebug, linfo, lwarn};
use chrono::Utc;
use entity::{channel_models, channels};
use reqwest::Method;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 触发结果摘要
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSummary {
    pub channel_count: usize,
    pub model_count: usize,
    pub job_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_results: Option<Vec<SyncResult>>,
}

/// 单个渠道的模型列表同步结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub channel_id: i32,
    pub channel_name: String,
    /// 本次新增的模型数
    pub added: usize,
    /// 上游返回的模型总数（过滤后）
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 队列状态（含进行中的渠道/模型）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub waiting: u64,
    pub active: u64,
    pub delayed: u64,
    pub completed: u64,
    pub failed: u64,
    pub testing_channel_ids: Vec<i32>,
    pub testing_model_ids: Vec<i32>,
}

/// 探测编排服务
pub struct DetectionService {
    db: DatabaseConnection,
    queue: JobQueue,
    semaphores: DetectionSemaphores,
    transport: Arc<ProxyFetchClient>,
    workers: Arc<WorkerPool>,
    cache: CacheClient,
}

impl DetectionService {
    #[must_use]
    pub fn new(
        db: DatabaseConnection,
        queue: JobQueue,
        semaphores: DetectionSemaphores,
        transport: Arc<ProxyFetchClient>,
        workers: Arc<WorkerPool>,
        cache: CacheClient,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            queue,
            semaphores,
            transport,
            workers,
            cache,
        })
    }

    /// 触发全量探测：所有启用渠道的全部模型
    ///
    /// 队列非空时拒绝（409）；`with_sync` 为 true 时先同步各渠道的
    /// 模型列表，再枚举入队。
    pub async fn trigger_full_detection(&self, with_sync: bool) -> Result<TriggerSummary> {
        let counts = self.queue.counts().await?;
        if counts.has_pending() {
            return Err(GatewayError::conflict("已有探测任务在执行"));
        }
        self.queue.clear_stop_flag().await?;

        let channel_list = channels::Entity::find()
            .filter(channels::Column::Enabled.eq(true))
            .order_by_asc(channels::Column::SortOrder)
            .order_by_asc(channels::Column::Name)
            .all(&self.db)
            .await?;

        let sync_results = if with_sync {
            let mut results = Vec::with_capacity(channel_list.len());
            for channel in &channel_list {
                results.push(self.sync_channel_models(channel).await);
            }
            Some(results)
        } else {
            None
        };

        let mut selection = Vec::with_capacity(channel_list.len());
        for channel in channel_list {
            let models = channel_models::Entity::find()
                .filter(channel_models::Column::ChannelId.eq(channel.id))
                .all(&self.db)
                .await?;
            selection.push((channel, models));
        }

        self.enqueue_selection(selection, sync_results).await
    }

    /// 触发单渠道探测，可选限定模型集合
    ///
    /// 仅当该渠道已有在途任务时拒绝。
    pub async fn trigger_channel_detection(
        &self,
        channel_id: i32,
        model_ids: Option<Vec<i32>>,
    ) -> Result<TriggerSummary> {
        let in_flight = self.queue.pending_jobs().await?;
        if in_flight.iter().any(|job| job.channel_id == channel_id) {
            return Err(GatewayError::conflict(format!(
                "渠道 {channel_id} 已有探测任务在执行"
            )));
        }
        self.queue.clear_stop_flag().await?;

        let channel = channels::Entity::find_by_id(channel_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| GatewayError::bad_request(format!("渠道 {channel_id} 不存在")))?;
        if !channel.enabled {
            return Err(GatewayError::bad_request(format!(
                "渠道 {} 已禁用",
                channel.name
            )));
        }

        let mut query = channel_models::Entity::find()
            .filter(channel_models::Column::ChannelId.eq(channel_id));
        if let Some(ids) = model_ids {
            query = query.filter(channel_models::Column::Id.is_in(ids));
        }
        let models = query.all(&self.db).await?;

        self.enqueue_selection(vec![(channel, models)], None).await
    }

    /// 按调度配置的选择集触发（定时任务使用）
    pub async fn trigger_selective_detection(
        &self,
        channel_ids: &[i32],
        model_ids_by_channel: &HashMap<i32, Vec<i32>>,
    ) -> Result<TriggerSummary> {
        let counts = self.queue.counts().await?;
        if counts.has_pending() {
            return Err(GatewayError::conflict("已有探测任务在执行"));
        }
        self.queue.clear_stop_flag().await?;

        let channel_list = channels::Entity::find()
            .filter(channels::Column::Enabled.eq(true))
            .filter(channels::Column::Id.is_in(channel_ids.to_vec()))
            .order_by_asc(channels::Column::SortOrder)
            .order_by_asc(channels::Column::Name)
            .all(&self.db)
            .await?;

        let mut selection = Vec::with_capacity(channel_list.len());
        for channel in channel_list {
            let mut query = channel_models::Entity::find()
                .filter(channel_models::Column::ChannelId.eq(channel.id));
            if let Some(ids) = model_ids_by_channel.get(&channel.id) {
                if !ids.is_empty() {
                    query = query.filter(channel_models::Column::Id.is_in(ids.clone()));
                }
            }
            let models = query.all(&self.db).await?;
            selection.push((channel, models));
        }

        self.enqueue_selection(selection, None).await
    }

    /// 查询队列状态与进行中的渠道/模型集合
    pub async fn queue_status(&self) -> Result<QueueStatus> {
        let counts: QueueCounts = self.queue.counts().await?;
        let pending = self.queue.pending_jobs().await?;
        let testing_channel_ids: BTreeSet<i32> =
            pending.iter().map(|job| job.channel_id).collect();
        let testing_model_ids: BTreeSet<i32> = pending.iter().map(|job| job.model_id).collect();
        Ok(QueueStatus {
            waiting: counts.waiting,
            active: counts.active,
            delayed: counts.delayed,
            completed: counts.completed,
            failed: counts.failed,
            testing_channel_ids: testing_channel_ids.into_iter().collect(),
            testing_model_ids: testing_model_ids.into_iter().collect(),
        })
    }

    /// 停止并排空：置停止标志、广播取消、丢弃待执行任务、清零信号量
    ///
    /// 幂等：重复调用返回 cleared = 0。
    pub async fn stop_detection(&self) -> Result<u64> {
        self.queue.set_stop_flag().await?;

        // 广播到所有进程；本进程同时直接取消，缩短在途请求存活时间
        if let Err(e) = self
            .cache
            .publish(&CacheKey::ControlChannel.build(), "stop")
            .await
        {
            lwarn!(
                "system",
                LogStage::Detection,
                LogComponent::JobQueue,
                "stop_broadcast_failed",
                &format!("停止信号广播失败: {e}")
            );
        }
        self.workers.cancel_current_run().await;

        let cleared = self.queue.clear_pending().await?;
        self.queue.clear_model_pending().await?;
        self.semaphores.reset_all().await?;

        linfo!(
            "system",
            LogStage::Detection,
            LogComponent::JobQueue,
            "detection_stopped",
            &format!("探测已停止，清除 {cleared} 个待执行任务")
        );
        Ok(cleared)
    }

    /// 同步单个渠道的模型列表：拉取 `/v1/models`，套用关键字过滤，
    /// 插入缺失的模型行
    pub async fn sync_channel_models(&self, channel: &channels::Model) -> SyncResult {
        match self.fetch_and_merge_models(channel).await {
            Ok((added, total)) => SyncResult {
                channel_id: channel.id,
                channel_name: channel.name.clone(),
                added,
                total,
                error: None,
            },
            Err(e) => {
                lwarn!(
                    "system",
                    LogStage::Detection,
                    LogComponent::JobQueue,
                    "model_sync_failed",
                    &format!("渠道 {} 模型同步失败: {e}", channel.name)
                );
                SyncResult {
                    channel_id: channel.id,
                    channel_name: channel.name.clone(),
                    added: 0,
                    total: 0,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn fetch_and_merge_models(&self, channel: &channels::Model) -> Result<(usize, usize)> {
        let url = endpoint::models_list_url(&channel.base_url);
        let api_key = split_api_keys(&channel.api_key)
            .first()
            .cloned()
            .unwrap_or_default();
        let headers = [("authorization", format!("Bearer {api_key}"))];
        let cancel = CancellationToken::new();

        let response = self
            .transport
            .fetch_json(
                Method::GET,
                &url,
                &headers,
                None,
                channel.proxy.as_deref(),
                &cancel,
            )
            .await?;

        let body = response.body.ok_or_else(|| GatewayError::UpstreamParse {
            message: format!("模型列表响应不是 JSON: {}", response.raw_preview),
            source: None,
        })?;
        if !(200..300).contains(&response.status) {
            return Err(GatewayError::UpstreamProtocol {
                message: format!("模型列表请求失败: HTTP {}", response.status),
                status: Some(response.status),
            });
        }

        let names = parse_model_list(&body, channel.model_filter.as_deref());
        let total = names.len();

        let existing: BTreeSet<String> = channel_models::Entity::find()
            .filter(channel_models::Column::ChannelId.eq(channel.id))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|m| m.model_name)
            .collect();

        let now = Utc::now();
        let missing: Vec<channel_models::ActiveModel> = names
            .iter()
            .filter(|name| !existing.contains(*name))
            .map(|name| channel_models::ActiveModel {
                channel_id: Set(channel.id),
                model_name: Set(name.clone()),
                detected_endpoints: Set(serde_json::json!([])),
                last_status: Set(None),
                last_latency_ms: Set(None),
                last_checked_at: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            })
            .collect();

        let added = missing.len();
        if !missing.is_empty() {
            channel_models::Entity::insert_many(missing)
                .exec(&self.db)
                .await?;
        }

        ldebug!(
            "system",
            LogStage::Detection,
            LogComponent::JobQueue,
            "model_sync_done",
            &format!("渠道 {} 同步完成: 新增 {added}/{total}", channel.name)
        );
        Ok((added, total))
    }

    /// 枚举 (渠道, 模型, 端点) 并批量入队
    async fn enqueue_selection(
        &self,
        selection: Vec<(channels::Model, Vec<channel_models::Model>)>,
        sync_results: Option<Vec<SyncResult>>,
    ) -> Result<TriggerSummary> {
        let timestamp_ms = Utc::now().timestamp_millis();
        let mut model_count = 0;
        let mut job_count = 0;
        let channel_count = selection.len();

        for (channel, models) in selection {
            let api_key = split_api_keys(&channel.api_key)
                .first()
                .cloned()
                .unwrap_or_default();
            for model in models {
                let endpoints = endpoint::endpoints_for_model(&model.model_name);
                self.queue
                    .add_model_pending(model.id, endpoints.len() as i64)
                    .await?;
                for ep in endpoints {
                    let seq = self.queue.next_sequence().await?;
                    let job = ProbeJob {
                        job_id: ProbeJob::build_id(channel.id, model.id, ep, timestamp_ms, seq),
                        channel_id: channel.id,
                        channel_name: channel.name.clone(),
                        base_url: channel.base_url.clone(),
                        api_key: api_key.clone(),
                        proxy: channel.proxy.clone(),
                        model_id: model.id,
                        model_name: model.model_name.clone(),
                        endpoint: ep,
                        attempt: 1,
                    };
                    self.queue.enqueue(&job).await?;
                    job_count += 1;
                }
                model_count += 1;
            }
        }

        linfo!(
            "system",
            LogStage::Detection,
            LogComponent::JobQueue,
            "detection_triggered",
            &format!("已入队 {job_count} 个探测任务（{channel_count} 渠道 / {model_count} 模型）")
        );

        Ok(TriggerSummary {
            channel_count,
            model_count,
            job_count,
            sync_results,
        })
    }
}

/// 解析 OpenAI 风格模型列表 `data[].id`，并套用逗号分隔的关键字过滤
fn parse_model_list(body: &Value, filter: Option<&str>) -> Vec<String> {
    let keywords: Vec<String> = filter
        .unwrap_or_default()
        .split(',')
        .map(|k| k.trim().to_ascii_lowercase())
        .filter(|k| !k.is_empty())
        .collect();

    let Some(data) = body.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut names: Vec<String> = data
        .iter()
        .filter_map(|item| item.get("id").and_then(Value::as_str))
        .map(ToString::to_string)
        .filter(|name| {
            keywords.is_empty()
                || keywords
                    .iter()
                    .any(|keyword| name.to_ascii_lowercase().contains(keyword))
        })
        .collect();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_model_list() {
        let body = json!({"data": [
            {"id": "gpt-4o", "object": "model"},
            {"id": "claude-sonnet-4", "object": "model"},
            {"id": "text-embedding-3-small", "object": "model"},
        ]});
        assert_eq!(
            parse_model_list(&body, None),
            vec!["gpt-4o", "claude-sonnet-4", "text-embedding-3-small"]
        );
        assert_eq!(
            parse_model_list(&body, Some("gpt, claude")),
            vec!["gpt-4o", "claude-sonnet-4"]
        );
        assert_eq!(parse_model_list(&json!({"object": "list"}), None), Vec::<String>::new());
    }
}
