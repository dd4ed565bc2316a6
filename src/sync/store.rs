//! 双层键值存储
//!
//! 快层带逐键过期（进程内或Redis），持久层不过期、作为快层未命中
//! 时的事实来源，冷启动后只要持久层还有数据就不必回源抓取。

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::app_config::redis::RedisPool;
use crate::error::{AppError, AppResult};
use crate::sync::record::RecordSet;

/// 存储层接口：载荷是序列化后的字符串
#[async_trait]
pub trait StoreTier: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// ttl 为 None 表示不过期（持久层语义）
    async fn put(&self, key: &str, payload: &str, ttl_secs: Option<u64>) -> AppResult<()>;

    async fn remove(&self, key: &str) -> AppResult<()>;

    /// 管理操作：清空全部键，不得出现在热查询路径上
    async fn clear(&self) -> AppResult<()>;
}

/// 进程内存储层（DashMap），测试与嵌入式部署用作快层
pub struct MemoryTier {
    map: DashMap<String, MemoryEntry>,
}

struct MemoryEntry {
    payload: String,
    expire_at: Option<Instant>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self { map: DashMap::new() }
    }
}

impl Default for MemoryTier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreTier for MemoryTier {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        if let Some(entry) = self.map.get(key) {
            let expired = entry
                .expire_at
                .map(|at| Instant::now() > at)
                .unwrap_or(false);
            if !expired {
                return Ok(Some(entry.payload.clone()));
            }
            drop(entry);
            self.map.remove(key);
        }
        Ok(None)
    }

    async fn put(&self, key: &str, payload: &str, ttl_secs: Option<u64>) -> AppResult<()> {
        let entry = MemoryEntry {
            payload: payload.to_string(),
            expire_at: ttl_secs.map(|secs| Instant::now() + Duration::from_secs(secs)),
        };
        self.map.insert(key.to_string(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        self.map.remove(key);
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        self.map.clear();
        Ok(())
    }
}

/// Redis 存储层，生产部署的快层
pub struct RedisTier {
    pool: RedisPool,
    key_prefix: String,
}

impl RedisTier {
    pub fn new(pool: RedisPool, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.into(),
        }
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }
}

#[async_trait]
impl StoreTier for RedisTier {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.pool.get_connection().await?;
        let redis_key = self.make_key(key);
        let value: Option<String> = conn
            .get(&redis_key)
            .await
            .map_err(|e| AppError::Store(format!("Redis get failed: {}", e)))?;
        Ok(value)
    }

    async fn put(&self, key: &str, payload: &str, ttl_secs: Option<u64>) -> AppResult<()> {
        let mut conn = self.pool.get_connection().await?;
        let redis_key = self.make_key(key);
        match ttl_secs {
            Some(secs) => {
                let _: () = conn
                    .set_ex(&redis_key, payload, secs)
                    .await
                    .map_err(|e| AppError::Store(format!("Redis set_ex failed: {}", e)))?;
            }
            None => {
                let _: () = conn
                    .set(&redis_key, payload)
                    .await
                    .map_err(|e| AppError::Store(format!("Redis set failed: {}", e)))?;
            }
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        let mut conn = self.pool.get_connection().await?;
        let redis_key = self.make_key(key);
        let _: () = conn
            .del(&redis_key)
            .await
            .map_err(|e| AppError::Store(format!("Redis del failed: {}", e)))?;
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        let mut conn = self.pool.get_connection().await?;
        let pattern = format!("{}:*", self.key_prefix);
        let mut keys: Vec<String> = Vec::new();
        {
            let mut iter = conn
                .scan_match::<_, String>(&pattern)
                .await
                .map_err(|e| AppError::Store(format!("Redis scan failed: {}", e)))?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }
        if !keys.is_empty() {
            let mut conn = self.pool.get_connection().await?;
            let _: () = conn
                .del(&keys)
                .await
                .map_err(|e| AppError::Store(format!("Redis del failed: {}", e)))?;
        }
        Ok(())
    }
}

/// 双层存储：快层 + 持久层
pub struct TieredStore {
    fast: Arc<dyn StoreTier>,
    durable: Arc<dyn StoreTier>,
    /// 持久层命中回填快层时使用的 TTL（秒）
    backfill_ttl_secs: u64,
}

impl TieredStore {
    pub fn new(fast: Arc<dyn StoreTier>, durable: Arc<dyn StoreTier>, backfill_ttl_secs: u64) -> Self {
        Self {
            fast,
            durable,
            backfill_ttl_secs,
        }
    }

    /// 读取：快层 → 持久层，持久层命中回填快层
    ///
    /// 快层连接故障只降级不失败；读出的载荷一律重走一遍规范化，
    /// 读路径不信任写路径留下的排序与日期格式。
    pub async fn get(&self, key: &str) -> Option<RecordSet> {
        match self.fast.get(key).await {
            Ok(Some(payload)) => {
                if let Some(records) = decode(key, &payload) {
                    debug!("Cache hit (fast): {}", key);
                    return Some(records);
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Fast tier unavailable, falling back to durable: {}", e);
            }
        }

        match self.durable.get(key).await {
            Ok(Some(payload)) => {
                let records = decode(key, &payload)?;
                debug!("Cache hit (durable): {}", key);
                if let Err(e) = self
                    .fast
                    .put(key, &payload, Some(self.backfill_ttl_secs))
                    .await
                {
                    warn!("Fast tier backfill failed: {}", e);
                }
                Some(records)
            }
            Ok(None) => {
                debug!("Cache miss: {}", key);
                None
            }
            Err(e) => {
                warn!("Durable tier read failed, treating as miss: {}", e);
                None
            }
        }
    }

    /// 写入：快层带 TTL，持久层不过期
    ///
    /// 快层写失败仅告警；持久层写失败作为软错误返回，已完成的
    /// 快层写不回滚，其 TTL 自然限定不一致窗口。
    pub async fn set(&self, key: &str, records: &RecordSet, ttl_secs: u64) -> AppResult<()> {
        let payload = serde_json::to_string(records)?;
        if let Err(e) = self.fast.put(key, &payload, Some(ttl_secs)).await {
            warn!("Fast tier write failed: {}", e);
        }
        self.durable.put(key, &payload, None).await
    }

    /// 两层同时失效指定键
    pub async fn invalidate(&self, key: &str) -> AppResult<()> {
        self.fast.remove(key).await?;
        self.durable.remove(key).await
    }

    /// 管理操作：清空两层全部键
    pub async fn clear(&self) -> AppResult<()> {
        self.fast.clear().await?;
        self.durable.clear().await
    }
}

fn decode(key: &str, payload: &str) -> Option<RecordSet> {
    match serde_json::from_str::<RecordSet>(payload) {
        Ok(records) => Some(records.normalize()),
        Err(e) => {
            warn!("Undecodable cache payload for {}: {}", key, e);
            None
        }
    }
}
