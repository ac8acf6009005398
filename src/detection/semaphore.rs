//! # 探测并发信号量
//!
//! 共享内存中的原子计数器，承担全局与渠道两级准入控制。
//! 计数器带 TTL，进程异常退出后最迟一小时自愈。

use crate::cache::{CacheClient, CacheKey};
use crate::error::{GatewayError, Result};

/// 计数器 TTL（秒）
const SEMAPHORE_TTL_SECS: i64 = 3_600;

/// 低于上限则自增，返回 1；否则拒绝，返回 0
const ACQUIRE_SCRIPT: &str = r"
    local current = tonumber(redis.call('GET', KEYS[1]) or '0')
    if current < tonumber(ARGV[1]) then
        redis.call('INCR', KEYS[1])
        redis.call('EXPIRE', KEYS[1], ARGV[2])
        return 1
    end
    return 0
";

/// 自减但不越过 0
const RELEASE_SCRIPT: &str = r"
    local current = tonumber(redis.call('GET', KEYS[1]) or '0')
    if current > 0 then
        redis.call('DECR', KEYS[1])
    end
    return 0
";

/// 两级并发信号量
#[derive(Clone)]
pub struct DetectionSemaphores {
    cache: CacheClient,
}

impl DetectionSemaphores {
    #[must_use]
    pub fn new(cache: CacheClient) -> Self {
        Self { cache }
    }

    /// 尝试占用全局槽位
    pub async fn try_acquire_global(&self, cap: i32) -> Result<bool> {
        self.try_acquire(&CacheKey::SemaphoreGlobal.build(), cap).await
    }

    /// 尝试占用渠道槽位
    pub async fn try_acquire_channel(&self, channel_id: i32, cap: i32) -> Result<bool> {
        self.try_acquire(&CacheKey::SemaphoreChannel { channel_id }.build(), cap)
            .await
    }

    /// 释放全局槽位
    pub async fn release_global(&self) -> Result<()> {
        self.release(&CacheKey::SemaphoreGlobal.build()).await
    }

    /// 释放渠道槽位
    pub async fn release_channel(&self, channel_id: i32) -> Result<()> {
        self.release(&CacheKey::SemaphoreChannel { channel_id }.build())
            .await
    }

    /// 清零全部计数器（停止排空时调用）
    pub async fn reset_all(&self) -> Result<()> {
        let mut keys = vec![CacheKey::SemaphoreGlobal.build()];
        keys.extend(
            self.cache
                .keys_matching(CacheKey::channel_semaphore_pattern())
                .await?,
        );
        self.cache.delete(&keys).await?;
        Ok(())
    }

    async fn try_acquire(&self, key: &str, cap: i32) -> Result<bool> {
        let mut conn = self.cache.connection();
        let granted: i32 = redis::Script::new(ACQUIRE_SCRIPT)
            .key(key)
            .arg(cap)
            .arg(SEMAPHORE_TTL_SECS)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| GatewayError::cache_with_source(format!("信号量获取失败: {key}"), e))?;
        Ok(granted == 1)
    }

    async fn release(&self, key: &str) -> Result<()> {
        let mut conn = self.cache.connection();
        let _: i32 = redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| GatewayError::cache_with_source(format!("信号量释放失败: {key}"), e))?;
        Ok(())
    }
}
