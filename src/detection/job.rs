//! # 探测任务定义
//!
//! 队列中流转的任务记录与重试退避策略

use super::endpoint::EndpointKind;
use serde::{Deserialize, Serialize};

/// 最大尝试次数
pub const MAX_ATTEMPTS: u32 = 3;

/// 首次重试延迟（毫秒）
pub const BASE_RETRY_DELAY_MS: u64 = 5_000;

/// 信号量饱和时的重新入队延迟（毫秒）
pub const REQUEUE_DELAY_MS: u64 = 1_000;

/// 一次探测任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeJob {
    /// 任务ID：`<channel>-<model>-<endpoint>-<ts>-<seq>`
    pub job_id: String,
    pub channel_id: i32,
    pub channel_name: String,
    pub base_url: String,
    pub api_key: String,
    pub proxy: Option<String>,
    pub model_id: i32,
    pub model_name: String,
    pub endpoint: EndpointKind,
    /// 当前第几次尝试，从 1 开始
    pub attempt: u32,
}

impl ProbeJob {
    /// 生成任务ID
    ///
    /// 时间戳与序号保证同一 `(channel, model, endpoint)` 在并发触发下
    /// 产生不同的任务，重试沿用同一ID。
    #[must_use]
    pub fn build_id(
        channel_id: i32,
        model_id: i32,
        endpoint: EndpointKind,
        timestamp_ms: i64,
        seq: i64,
    ) -> String {
        format!("{channel_id}-{model_id}-{}-{timestamp_ms}-{seq}", endpoint.as_str())
    }

    /// 是否还有重试机会
    #[must_use]
    pub const fn can_retry(&self) -> bool {
        self.attempt < MAX_ATTEMPTS
    }

    /// 下一次重试的指数退避延迟（毫秒）
    #[must_use]
    pub const fn retry_delay_ms(&self) -> u64 {
        BASE_RETRY_DELAY_MS << (self.attempt - 1)
    }

    /// 进入下一次尝试
    #[must_use]
    pub fn next_attempt(mut self) -> Self {
        self.attempt += 1;
        self
    }
}

/// 进入失败保留队列的任务记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedJob {
    #[serde(flatten)]
    pub job: ProbeJob,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job(attempt: u32) -> ProbeJob {
        ProbeJob {
            job_id: ProbeJob::build_id(1, 2, EndpointKind::Chat, 1_700_000_000_000, 7),
            channel_id: 1,
            channel_name: "openai".into(),
            base_url: "https://u.example".into(),
            api_key: "sk-test".into(),
            proxy: None,
            model_id: 2,
            model_name: "gpt-4o".into(),
            endpoint: EndpointKind::Chat,
            attempt,
        }
    }

    #[test]
    fn test_job_id_format() {
        let job = sample_job(1);
        assert_eq!(job.job_id, "1-2-CHAT-1700000000000-7");
    }

    #[test]
    fn test_retry_backoff_doubles() {
        assert_eq!(sample_job(1).retry_delay_ms(), 5_000);
        assert_eq!(sample_job(2).retry_delay_ms(), 10_000);
        assert!(sample_job(1).can_retry());
        assert!(sample_job(2).can_retry());
        assert!(!sample_job(3).can_retry());
    }

    #[test]
    fn test_job_round_trips_through_json() {
        let job = sample_job(2);
        let json = serde_json::to_string(&job).expect("序列化");
        let parsed: ProbeJob = serde_json::from_str(&json).expect("反序列化");
        assert_eq!(parsed, job);
    }
}
