//! # 探测任务队列
//!
//! Redis 承载的持久任务队列：等待列表、延迟集合、活跃表与
//! 完成/失败保留队列，外加停止标志与模型剩余端点计数。

use super::job::{FailedJob, ProbeJob};
use crate::cache::{CacheClient, CacheKey};
use crate::error::Result;
use chrono::Utc;
use redis::AsyncCommands;
use serde::Serialize;

/// 完成队列容量与保留时间
const COMPLETED_CAP: isize = 1_000;
const COMPLETED_TTL_SECS: i64 = 3_600;

/// 失败队列容量与保留时间
const FAILED_CAP: isize = 500;
const FAILED_TTL_SECS: i64 = 24 * 3_600;

/// 停止标志 TTL
const STOP_FLAG_TTL_SECS: u64 = 3_600;

/// 队列巡检分页上限：等待/延迟/活跃
pub const INSPECT_WAITING_LIMIT: isize = 1_000;
pub const INSPECT_DELAYED_LIMIT: isize = 1_000;
pub const INSPECT_ACTIVE_LIMIT: usize = 100;

/// 各状态任务数快照
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueCounts {
    pub waiting: u64,
    pub active: u64,
    pub delayed: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueCounts {
    /// 是否存在未完结任务
    #[must_use]
    pub const fn has_pending(&self) -> bool {
        self.waiting > 0 || self.active > 0 || self.delayed > 0
    }
}

/// 探测任务队列
#[derive(Clone)]
pub struct JobQueue {
    cache: CacheClient,
}

impl JobQueue {
    #[must_use]
    pub fn new(cache: CacheClient) -> Self {
        Self { cache }
    }

    /// 取下一个任务序号（用于任务ID去重）
    pub async fn next_sequence(&self) -> Result<i64> {
        self.cache.incr(&CacheKey::JobSequence.build()).await
    }

    /// 任务入队（立即可执行）
    pub async fn enqueue(&self, job: &ProbeJob) -> Result<()> {
        let payload = serde_json::to_string(job)?;
        self.cache
            .list_push(&CacheKey::QueueWaiting.build(), &payload)
            .await
    }

    /// 任务延迟入队
    pub async fn enqueue_delayed(&self, job: &ProbeJob, delay_ms: u64) -> Result<()> {
        let payload = serde_json::to_string(job)?;
        let ready_at = Utc::now().timestamp_millis() + delay_ms as i64;
        self.cache
            .zset_add(&CacheKey::QueueDelayed.build(), ready_at as f64, &payload)
            .await
    }

    /// 领取一个任务：优先提取已到期的延迟任务，其次等待队列
    ///
    /// 领取成功后任务进入活跃表，由调用方负责最终落位
    /// （完成/失败/重新入队）。
    pub async fn lease(&self) -> Result<Option<ProbeJob>> {
        let now_ms = Utc::now().timestamp_millis();
        let payload = match self
            .cache
            .zset_pop_due(&CacheKey::QueueDelayed.build(), now_ms)
            .await?
        {
            Some(payload) => Some(payload),
            None => self.cache.list_pop(&CacheKey::QueueWaiting.build()).await?,
        };

        let Some(payload) = payload else {
            return Ok(None);
        };

        let job: ProbeJob = serde_json::from_str(&payload)?;
        self.cache
            .hash_set(&CacheKey::QueueActive.build(), &job.job_id, &payload)
            .await?;
        Ok(Some(job))
    }

    /// 将活跃任务重新入队（信号量饱和或重试）
    pub async fn requeue_delayed(&self, job: &ProbeJob, delay_ms: u64) -> Result<()> {
        self.cache
            .hash_delete(&CacheKey::QueueActive.build(), &job.job_id)
            .await?;
        self.enqueue_delayed(job, delay_ms).await
    }

    /// 任务成功完结
    pub async fn complete(&self, job: &ProbeJob) -> Result<()> {
        self.cache
            .hash_delete(&CacheKey::QueueActive.build(), &job.job_id)
            .await?;
        let payload = serde_json::to_string(job)?;
        self.cache
            .list_push_capped(
                &CacheKey::QueueCompleted.build(),
                &payload,
                COMPLETED_CAP,
                COMPLETED_TTL_SECS,
            )
            .await
    }

    /// 任务失败完结
    pub async fn fail(&self, job: &ProbeJob, error: &str) -> Result<()> {
        self.cache
            .hash_delete(&CacheKey::QueueActive.build(), &job.job_id)
            .await?;
        let record = FailedJob {
            job: job.clone(),
            error: error.to_string(),
        };
        let payload = serde_json::to_string(&record)?;
        self.cache
            .list_push_capped(
                &CacheKey::QueueFailed.build(),
                &payload,
                FAILED_CAP,
                FAILED_TTL_SECS,
            )
            .await
    }

    /// 停止时确认并丢弃任务（不计入完成/失败）
    pub async fn discard(&self, job: &ProbeJob) -> Result<()> {
        self.cache
            .hash_delete(&CacheKey::QueueActive.build(), &job.job_id)
            .await
    }

    /// 各状态任务数
    pub async fn counts(&self) -> Result<QueueCounts> {
        Ok(QueueCounts {
            waiting: self.cache.list_len(&CacheKey::QueueWaiting.build()).await?,
            active: self.cache.hash_len(&CacheKey::QueueActive.build()).await?,
            delayed: self.cache.zset_len(&CacheKey::QueueDelayed.build()).await?,
            completed: self
                .cache
                .list_len(&CacheKey::QueueCompleted.build())
                .await?,
            failed: self.cache.list_len(&CacheKey::QueueFailed.build()).await?,
        })
    }

    /// 巡检未完结任务（分页上限见常量），用于冲突检查与进行中列表
    pub async fn pending_jobs(&self) -> Result<Vec<ProbeJob>> {
        let mut jobs = Vec::new();
        for payload in self
            .cache
            .list_range(&CacheKey::QueueWaiting.build(), 0, INSPECT_WAITING_LIMIT - 1)
            .await?
        {
            if let Ok(job) = serde_json::from_str::<ProbeJob>(&payload) {
                jobs.push(job);
            }
        }
        for payload in self
            .cache
            .zset_range(&CacheKey::QueueDelayed.build(), 0, INSPECT_DELAYED_LIMIT - 1)
            .await?
        {
            if let Ok(job) = serde_json::from_str::<ProbeJob>(&payload) {
                jobs.push(job);
            }
        }
        for payload in self
            .cache
            .hash_values(&CacheKey::QueueActive.build())
            .await?
            .into_iter()
            .take(INSPECT_ACTIVE_LIMIT)
        {
            if let Ok(job) = serde_json::from_str::<ProbeJob>(&payload) {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    /// 丢弃全部等待与延迟任务，返回清除数量
    pub async fn clear_pending(&self) -> Result<u64> {
        let waiting = self.cache.list_len(&CacheKey::QueueWaiting.build()).await?;
        let delayed = self.cache.zset_len(&CacheKey::QueueDelayed.build()).await?;
        self.cache
            .delete(&[
                CacheKey::QueueWaiting.build(),
                CacheKey::QueueDelayed.build(),
            ])
            .await?;
        Ok(waiting + delayed)
    }

    /// 当前活跃任务列表
    pub async fn active_jobs(&self) -> Result<Vec<ProbeJob>> {
        let mut jobs = Vec::new();
        for payload in self
            .cache
            .hash_values(&CacheKey::QueueActive.build())
            .await?
        {
            if let Ok(job) = serde_json::from_str::<ProbeJob>(&payload) {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    // ---- 停止标志 ----

    pub async fn set_stop_flag(&self) -> Result<()> {
        self.cache
            .set_with_ttl(&CacheKey::StopFlag.build(), "1", STOP_FLAG_TTL_SECS)
            .await
    }

    pub async fn clear_stop_flag(&self) -> Result<()> {
        self.cache.delete(&[CacheKey::StopFlag.build()]).await?;
        Ok(())
    }

    pub async fn is_stopped(&self) -> Result<bool> {
        self.cache.exists(&CacheKey::StopFlag.build()).await
    }

    // ---- 模型剩余端点计数（isModelComplete 判定） ----

    /// 入队时登记模型待完成端点数
    pub async fn add_model_pending(&self, model_id: i32, endpoints: i64) -> Result<()> {
        let mut conn = self.cache.connection();
        let _: i64 = conn
            .hincr(&CacheKey::ModelPending.build(), model_id, endpoints)
            .await
            .map_err(crate::error::GatewayError::from)?;
        Ok(())
    }

    /// 任务完结时递减，返回该模型是否已全部完成
    pub async fn finish_model_endpoint(&self, model_id: i32) -> Result<bool> {
        let mut conn = self.cache.connection();
        let remaining: i64 = conn
            .hincr(&CacheKey::ModelPending.build(), model_id, -1)
            .await
            .map_err(crate::error::GatewayError::from)?;
        if remaining <= 0 {
            let _: i64 = conn
                .hdel(&CacheKey::ModelPending.build(), model_id)
                .await
                .map_err(crate::error::GatewayError::from)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// 清空模型计数（停止/排空时）
    pub async fn clear_model_pending(&self) -> Result<()> {
        self.cache
            .delete(&[CacheKey::ModelPending.build()])
            .await?;
        Ok(())
    }
}
