//! # Redis 缓存客户端
//!
//! 提供 Redis 连接管理和队列/信号量/发布订阅所需的基础操作

use crate::error::{GatewayError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo};
use redis::aio::{ConnectionManager, PubSub};
use redis::{AsyncCommands, Client};

/// Redis 缓存客户端
///
/// `ConnectionManager` 负责自动重连；pub/sub 订阅需要独立连接，
/// 由内部持有的 `Client` 按需创建。
#[derive(Clone)]
pub struct CacheClient {
    client: Client,
    connection_manager: ConnectionManager,
}

impl CacheClient {
    /// 创建新的缓存客户端
    pub async fn new(redis_url: &str) -> Result<Self> {
        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Cache,
            "connect_to_redis",
            &format!("正在连接 Redis: {redis_url}")
        );

        let client = Client::open(redis_url)
            .map_err(|e| GatewayError::cache_with_source("创建 Redis 客户端失败", e))?;

        let connection_manager = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| GatewayError::cache_with_source("建立 Redis 连接失败", e))?;

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Cache,
            "redis_connected",
            "Redis 连接建立成功"
        );

        Ok(Self {
            client,
            connection_manager,
        })
    }

    /// 获取可克隆的连接（供脚本执行等底层操作使用）
    #[must_use]
    pub fn connection(&self) -> ConnectionManager {
        self.connection_manager.clone()
    }

    /// 创建一个独立的 pub/sub 订阅连接
    pub async fn pubsub(&self) -> Result<PubSub> {
        self.client
            .get_async_pubsub()
            .await
            .map_err(|e| GatewayError::cache_with_source("创建 Redis 订阅连接失败", e))
    }

    /// 设置键值并指定 TTL（秒）
    pub async fn set_with_ttl(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        ldebug!(
            "system",
            LogStage::Cache,
            LogComponent::Cache,
            "set_cache",
            &format!("设置缓存: key={key}, ttl={ttl_seconds}s")
        );
        let mut conn = self.connection_manager.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_seconds)
            .await
            .map_err(|e| GatewayError::cache_with_source(format!("设置缓存失败: {key}"), e))?;
        Ok(())
    }

    /// 读取字符串键
    pub async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection_manager.clone();
        let value: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| GatewayError::cache_with_source(format!("读取缓存失败: {key}"), e))?;
        Ok(value)
    }

    /// 删除键，返回删除数量
    pub async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection_manager.clone();
        let removed: u64 = conn
            .del(keys)
            .await
            .map_err(|e| GatewayError::cache_with_source("删除缓存键失败", e))?;
        Ok(removed)
    }

    /// 键是否存在
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection_manager.clone();
        let found: bool = conn
            .exists(key)
            .await
            .map_err(|e| GatewayError::cache_with_source(format!("检查缓存键失败: {key}"), e))?;
        Ok(found)
    }

    /// 自增计数器
    pub async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.connection_manager.clone();
        let value: i64 = conn
            .incr(key, 1)
            .await
            .map_err(|e| GatewayError::cache_with_source(format!("自增失败: {key}"), e))?;
        Ok(value)
    }

    /// 按模式列出键（SCAN 语义，用于渠道信号量清理）
    pub async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.connection_manager.clone();
        let keys: Vec<String> = conn
            .keys(pattern)
            .await
            .map_err(|e| GatewayError::cache_with_source(format!("扫描缓存键失败: {pattern}"), e))?;
        Ok(keys)
    }

    // ---- 列表操作（等待/保留队列） ----

    pub async fn list_push(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.connection_manager.clone();
        conn.lpush::<_, _, ()>(key, value)
            .await
            .map_err(|e| GatewayError::cache_with_source(format!("入队失败: {key}"), e))?;
        Ok(())
    }

    pub async fn list_pop(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection_manager.clone();
        let value: Option<String> = conn
            .rpop(key, None)
            .await
            .map_err(|e| GatewayError::cache_with_source(format!("出队失败: {key}"), e))?;
        Ok(value)
    }

    pub async fn list_len(&self, key: &str) -> Result<u64> {
        let mut conn = self.connection_manager.clone();
        let len: u64 = conn
            .llen(key)
            .await
            .map_err(|e| GatewayError::cache_with_source(format!("读取队列长度失败: {key}"), e))?;
        Ok(len)
    }

    pub async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut conn = self.connection_manager.clone();
        let values: Vec<String> = conn
            .lrange(key, start, stop)
            .await
            .map_err(|e| GatewayError::cache_with_source(format!("读取队列内容失败: {key}"), e))?;
        Ok(values)
    }

    /// 入队并截断到上限，同时刷新 TTL（完成/失败保留队列）
    pub async fn list_push_capped(
        &self,
        key: &str,
        value: &str,
        cap: isize,
        ttl_seconds: i64,
    ) -> Result<()> {
        let mut conn = self.connection_manager.clone();
        redis::pipe()
            .lpush(key, value)
            .ltrim(key, 0, cap - 1)
            .expire(key, ttl_seconds)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| GatewayError::cache_with_source(format!("写入保留队列失败: {key}"), e))?;
        Ok(())
    }

    // ---- 有序集合操作（延迟队列） ----

    pub async fn zset_add(&self, key: &str, score: f64, member: &str) -> Result<()> {
        let mut conn = self.connection_manager.clone();
        conn.zadd::<_, _, _, ()>(key, member, score)
            .await
            .map_err(|e| GatewayError::cache_with_source(format!("写入延迟队列失败: {key}"), e))?;
        Ok(())
    }

    pub async fn zset_len(&self, key: &str) -> Result<u64> {
        let mut conn = self.connection_manager.clone();
        let len: u64 = conn
            .zcard(key)
            .await
            .map_err(|e| GatewayError::cache_with_source(format!("读取延迟队列长度失败: {key}"), e))?;
        Ok(len)
    }

    pub async fn zset_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut conn = self.connection_manager.clone();
        let values: Vec<String> = conn
            .zrange(key, start, stop)
            .await
            .map_err(|e| GatewayError::cache_with_source(format!("读取延迟队列失败: {key}"), e))?;
        Ok(values)
    }

    /// 原子弹出一个已到期的延迟成员
    pub async fn zset_pop_due(&self, key: &str, now_ms: i64) -> Result<Option<String>> {
        // ZRANGEBYSCORE + ZREM 必须原子执行，避免多 worker 重复领取
        const POP_DUE: &str = r"
            local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 1)
            if #due == 0 then return false end
            redis.call('ZREM', KEYS[1], due[1])
            return due[1]
        ";
        let mut conn = self.connection_manager.clone();
        let member: Option<String> = redis::Script::new(POP_DUE)
            .key(key)
            .arg(now_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| GatewayError::cache_with_source(format!("弹出延迟任务失败: {key}"), e))?;
        Ok(member)
    }

    // ---- 哈希操作（活跃任务表） ----

    pub async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.connection_manager.clone();
        conn.hset::<_, _, _, ()>(key, field, value)
            .await
            .map_err(|e| GatewayError::cache_with_source(format!("写入活跃任务失败: {key}"), e))?;
        Ok(())
    }

    pub async fn hash_delete(&self, key: &str, field: &str) -> Result<()> {
        let mut conn = self.connection_manager.clone();
        conn.hdel::<_, _, ()>(key, field)
            .await
            .map_err(|e| GatewayError::cache_with_source(format!("移除活跃任务失败: {key}"), e))?;
        Ok(())
    }

    pub async fn hash_len(&self, key: &str) -> Result<u64> {
        let mut conn = self.connection_manager.clone();
        let len: u64 = conn
            .hlen(key)
            .await
            .map_err(|e| GatewayError::cache_with_source(format!("读取活跃任务数失败: {key}"), e))?;
        Ok(len)
    }

    pub async fn hash_values(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.connection_manager.clone();
        let values: Vec<String> = conn
            .hvals(key)
            .await
            .map_err(|e| GatewayError::cache_with_source(format!("读取活跃任务失败: {key}"), e))?;
        Ok(values)
    }

    // ---- 发布订阅 ----

    /// 向频道发布一条消息，返回接收方数量
    pub async fn publish(&self, channel: &str, payload: &str) -> Result<u64> {
        let mut conn = self.connection_manager.clone();
        let receivers: u64 = conn
            .publish(channel, payload)
            .await
            .map_err(|e| GatewayError::cache_with_source(format!("发布消息失败: {channel}"), e))?;
        Ok(receivers)
    }
}
