//! # 探测工作池
//!
//! 固定数量的工作协程从队列领取任务，在两级信号量准入与
//! 反突发抖动之后执行探测，并负责结果落库、进度发布与槽位释放。

use super::detector::{self, ProbeOutcome};
use super::job::{ProbeJob, REQUEUE_DELAY_MS};
use super::progress::{ProgressBus, ProgressEvent, ProgressPayload};
use super::queue::JobQueue;
use super::semaphore::DetectionSemaphores;
use super::DetectionSettings;
use crate::cache::{CacheClient, CacheKey};
use crate::error::{GatewayError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::proxy::transport::ProxyFetchClient;
use crate::{ldebug, lerror, linfo, lwarn};
use chrono::Utc;
use entity::{channel_models, probe_logs};
use futures::StreamExt;
use rand::Rng;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// 工作协程数量；实际并发由信号量决定，这里只是领取侧的上限
const WORKER_COUNT: usize = 16;

/// 队列为空时的轮询间隔
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// 停止探测时写入失败记录的固定消息
pub const STOP_MESSAGE: &str = "Detection stopped by user";

/// 探测工作池
pub struct WorkerPool {
    queue: JobQueue,
    semaphores: DetectionSemaphores,
    bus: ProgressBus,
    transport: Arc<ProxyFetchClient>,
    db: DatabaseConnection,
    settings: Arc<RwLock<DetectionSettings>>,
    cache: CacheClient,
    prompt: String,
    /// 当前探测轮次的取消句柄；停止信号到来时整体取消并换新
    run_token: RwLock<CancellationToken>,
}

impl WorkerPool {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        queue: JobQueue,
        semaphores: DetectionSemaphores,
        bus: ProgressBus,
        transport: Arc<ProxyFetchClient>,
        db: DatabaseConnection,
        settings: Arc<RwLock<DetectionSettings>>,
        cache: CacheClient,
        prompt: String,
    ) -> Arc<Self> {
        Arc::new(Self {
            queue,
            semaphores,
            bus,
            transport,
            db,
            settings,
            cache,
            prompt,
            run_token: RwLock::new(CancellationToken::new()),
        })
    }

    /// 启动工作协程与停止信号监听
    pub fn spawn(self: &Arc<Self>) {
        for worker_id in 0..WORKER_COUNT {
            let pool = Arc::clone(self);
            tokio::spawn(async move {
                pool.worker_loop(worker_id).await;
            });
        }
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            pool.control_listener_loop().await;
        });
        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Worker,
            "workers_started",
            &format!("探测工作池已启动，{WORKER_COUNT} 个工作协程")
        );
    }

    /// 取消当前轮次的全部在途探测并准备好下一轮
    pub async fn cancel_current_run(&self) {
        let mut guard = self.run_token.write().await;
        guard.cancel();
        *guard = CancellationToken::new();
    }

    async fn current_token(&self) -> CancellationToken {
        self.run_token.read().await.clone()
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize) {
        loop {
            match self.queue.lease().await {
                Ok(Some(job)) => {
                    if let Err(e) = self.process_job(job).await {
                        lerror!(
                            "system",
                            LogStage::Detection,
                            LogComponent::Worker,
                            "job_failed_internally",
                            &format!("worker#{worker_id} 处理任务失败: {e}")
                        );
                    }
                }
                Ok(None) => {
                    tokio::time::sleep(IDLE_POLL_INTERVAL).await;
                }
                Err(e) => {
                    lwarn!(
                        "system",
                        LogStage::Detection,
                        LogComponent::Worker,
                        "lease_failed",
                        &format!("worker#{worker_id} 领取任务失败: {e}")
                    );
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// 监听停止控制信号（所有进程都会收到，各自取消在途任务）
    async fn control_listener_loop(self: Arc<Self>) {
        loop {
            match self.listen_control_until_error().await {
                Ok(()) => {}
                Err(e) => {
                    lwarn!(
                        "system",
                        LogStage::Detection,
                        LogComponent::Worker,
                        "control_reconnect",
                        &format!("控制信号订阅断开: {e}，2s 后重连")
                    );
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    }

    async fn listen_control_until_error(&self) -> Result<()> {
        let mut pubsub = self.cache.pubsub().await?;
        pubsub
            .subscribe(CacheKey::ControlChannel.build())
            .await
            .map_err(GatewayError::from)?;
        let mut stream = pubsub.on_message();
        while let Some(message) = stream.next().await {
            let payload: String = message.get_payload().unwrap_or_default();
            if payload == "stop" {
                linfo!(
                    "system",
                    LogStage::Detection,
                    LogComponent::Worker,
                    "stop_signal",
                    "收到停止信号，取消在途探测"
                );
                self.cancel_current_run().await;
            }
        }
        Err(GatewayError::cache("控制信号订阅流已结束"))
    }

    async fn process_job(&self, job: ProbeJob) -> Result<()> {
        // 停止标志置位时确认并丢弃，不再开始新探测
        if self.queue.is_stopped().await? {
            ldebug!(
                job.job_id,
                LogStage::Detection,
                LogComponent::Worker,
                "job_dropped",
                "停止标志已置位，丢弃任务"
            );
            return self.queue.discard(&job).await;
        }

        let settings = *self.settings.read().await;

        // 先全局后渠道；任一拒绝都延迟重新入队，绝不自旋
        if !self
            .semaphores
            .try_acquire_global(settings.global_concurrency)
            .await?
        {
            return self.queue.requeue_delayed(&job, REQUEUE_DELAY_MS).await;
        }
        if !self
            .semaphores
            .try_acquire_channel(job.channel_id, settings.channel_concurrency)
            .await?
        {
            self.semaphores.release_global().await?;
            return self.queue.requeue_delayed(&job, REQUEUE_DELAY_MS).await;
        }

        let result = self.run_leased(&job, settings).await;

        // 槽位释放在所有完结路径上执行
        if let Err(e) = self.semaphores.release_channel(job.channel_id).await {
            lwarn!(
                job.job_id,
                LogStage::Detection,
                LogComponent::Worker,
                "release_channel_failed",
                &format!("渠道槽位释放失败: {e}")
            );
        }
        if let Err(e) = self.semaphores.release_global().await {
            lwarn!(
                job.job_id,
                LogStage::Detection,
                LogComponent::Worker,
                "release_global_failed",
                &format!("全局槽位释放失败: {e}")
            );
        }
        result
    }

    async fn run_leased(&self, job: &ProbeJob, settings: DetectionSettings) -> Result<()> {
        let token = self.current_token().await;

        // 反突发抖动
        let jitter_ms = {
            let (low, high) = (
                settings.min_delay_ms.max(0) as u64,
                settings.max_delay_ms.max(settings.min_delay_ms).max(0) as u64,
            );
            rand::thread_rng().gen_range(low..=high)
        };
        tokio::select! {
            biased;
            () = token.cancelled() => {
                return self.finalize(job, cancelled_outcome()).await;
            }
            () = tokio::time::sleep(Duration::from_millis(jitter_ms)) => {}
        }

        match detector::run_probe(&self.transport, job, &self.prompt, &token).await {
            Ok(outcome) => self.finalize(job, outcome).await,
            Err(GatewayError::Cancelled { .. }) => {
                self.finalize(job, cancelled_outcome()).await
            }
            Err(e) if e.is_transport_error() && job.can_retry() => {
                let delay = job.retry_delay_ms();
                ldebug!(
                    job.job_id,
                    LogStage::Detection,
                    LogComponent::Worker,
                    "probe_retry",
                    &format!("传输层错误，{delay}ms 后第 {} 次重试: {e}", job.attempt + 1)
                );
                self.queue
                    .requeue_delayed(&job.clone().next_attempt(), delay)
                    .await
            }
            Err(e) => {
                // 重试耗尽或不可重试：记录最终失败
                let outcome = ProbeOutcome {
                    success: false,
                    latency_ms: 0,
                    upstream_status: None,
                    error_message: Some(crate::detection::extract::truncate_preview(
                        &e.to_string(),
                    )),
                    response_preview: None,
                };
                self.finalize(job, outcome).await
            }
        }
    }

    /// 落库、发布进度并完结任务
    async fn finalize(&self, job: &ProbeJob, outcome: ProbeOutcome) -> Result<()> {
        self.append_probe_log(job, &outcome).await?;
        self.refresh_model_row(job, &outcome).await?;

        if outcome.success {
            self.queue.complete(job).await?;
        } else {
            self.queue
                .fail(job, outcome.error_message.as_deref().unwrap_or("probe failed"))
                .await?;
        }

        let is_model_complete = self
            .queue
            .finish_model_endpoint(job.model_id)
            .await
            .unwrap_or(false);

        self.bus
            .publish(&ProgressEvent::Progress(ProgressPayload {
                channel_id: job.channel_id,
                model_id: job.model_id,
                model_name: job.model_name.clone(),
                status: if outcome.success { "SUCCESS" } else { "FAIL" }.to_string(),
                latency: Some(outcome.latency_ms),
                endpoint_type: Some(job.endpoint.as_str().to_string()),
                is_model_complete,
            }))
            .await;
        Ok(())
    }

    /// 追加探测日志（只插入，从不修改既有行）
    async fn append_probe_log(&self, job: &ProbeJob, outcome: &ProbeOutcome) -> Result<()> {
        let log = probe_logs::ActiveModel {
            model_id: Set(job.model_id),
            endpoint_type: Set(job.endpoint.as_str().to_string()),
            success: Set(outcome.success),
            latency_ms: Set(outcome.latency_ms),
            upstream_status: Set(outcome.upstream_status),
            error_message: Set(outcome.error_message.clone()),
            response_preview: Set(outcome.response_preview.clone()),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        probe_logs::Entity::insert(log).exec(&self.db).await?;
        Ok(())
    }

    /// 刷新模型行：成功时并入端点集合；失败不回收已检测端点，
    /// 避免瞬时故障抹掉历史可达性
    async fn refresh_model_row(&self, job: &ProbeJob, outcome: &ProbeOutcome) -> Result<()> {
        let Some(model) = channel_models::Entity::find_by_id(job.model_id)
            .one(&self.db)
            .await?
        else {
            lwarn!(
                job.job_id,
                LogStage::Db,
                LogComponent::Worker,
                "model_row_missing",
                "模型行不存在，跳过状态刷新"
            );
            return Ok(());
        };

        let now = Utc::now();
        let mut endpoints: Vec<String> =
            serde_json::from_value(model.detected_endpoints.clone()).unwrap_or_default();
        let mut active: channel_models::ActiveModel = model.into();

        if outcome.success {
            let tag = job.endpoint.as_str().to_string();
            if !endpoints.contains(&tag) {
                endpoints.push(tag);
                active.detected_endpoints = Set(serde_json::json!(endpoints));
            }
            active.last_status = Set(Some(true));
            active.last_latency_ms = Set(Some(outcome.latency_ms));
        } else {
            active.last_status = Set(Some(false));
        }
        active.last_checked_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(&self.db).await?;
        Ok(())
    }
}

fn cancelled_outcome() -> ProbeOutcome {
    ProbeOutcome {
        success: false,
        latency_ms: 0,
        upstream_status: None,
        error_message: Some(STOP_MESSAGE.to_string()),
        response_preview: None,
    }
}
