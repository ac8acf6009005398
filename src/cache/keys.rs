//! # 缓存键命名规范
//!
//! 探测引擎在共享内存中的全部既定键名，统一在此生成

use std::fmt;

/// 缓存键类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKey {
    /// 停止标志 - `detection:stop`
    StopFlag,

    /// 全局并发信号量 - `detection:semaphore:global`
    SemaphoreGlobal,

    /// 渠道并发信号量 - `detection:semaphore:channel:{channel_id}`
    SemaphoreChannel { channel_id: i32 },

    /// 等待队列(LIST) - `detection:queue:waiting`
    QueueWaiting,

    /// 延迟队列(ZSET，score为就绪时间戳毫秒) - `detection:queue:delayed`
    QueueDelayed,

    /// 活跃任务(HASH) - `detection:queue:active`
    QueueActive,

    /// 已完成任务(LIST，截断保留) - `detection:queue:completed`
    QueueCompleted,

    /// 失败任务(LIST，截断保留) - `detection:queue:failed`
    QueueFailed,

    /// 任务序号计数器 - `detection:queue:seq`
    JobSequence,

    /// 模型剩余端点计数(HASH) - `detection:model:pending`
    ModelPending,

    /// 进度事件 pub/sub 频道 - `detection:progress`
    ProgressChannel,

    /// 控制信号 pub/sub 频道 - `detection:control`
    ControlChannel,
}

impl CacheKey {
    /// 生成缓存键字符串
    #[must_use]
    pub fn build(&self) -> String {
        match self {
            Self::StopFlag => "detection:stop".to_string(),
            Self::SemaphoreGlobal => "detection:semaphore:global".to_string(),
            Self::SemaphoreChannel { channel_id } => {
                format!("detection:semaphore:channel:{channel_id}")
            }
            Self::QueueWaiting => "detection:queue:waiting".to_string(),
            Self::QueueDelayed => "detection:queue:delayed".to_string(),
            Self::QueueActive => "detection:queue:active".to_string(),
            Self::QueueCompleted => "detection:queue:completed".to_string(),
            Self::QueueFailed => "detection:queue:failed".to_string(),
            Self::JobSequence => "detection:queue:seq".to_string(),
            Self::ModelPending => "detection:model:pending".to_string(),
            Self::ProgressChannel => "detection:progress".to_string(),
            Self::ControlChannel => "detection:control".to_string(),
        }
    }

    /// 渠道信号量的通配模式（用于批量清理）
    #[must_use]
    pub fn channel_semaphore_pattern() -> &'static str {
        "detection:semaphore:channel:*"
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(CacheKey::StopFlag.build(), "detection:stop");
        assert_eq!(
            CacheKey::SemaphoreChannel { channel_id: 7 }.build(),
            "detection:semaphore:channel:7"
        );
        assert_eq!(CacheKey::QueueWaiting.build(), "detection:queue:waiting");
    }
}
