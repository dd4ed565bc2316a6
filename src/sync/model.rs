//! 持久层（MySQL / rbatis）
//!
//! 表结构是一张以缓存键为主键的载荷表，写入走 upsert，
//! 没有过期列：持久层是长期记录。

use async_trait::async_trait;
use rbatis::RBatis;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::sync::store::StoreTier;

#[derive(Debug, Serialize, Deserialize)]
struct SyncCacheRow {
    payload: String,
}

/// MySQL 持久存储层
pub struct MysqlTier {
    db: RBatis,
}

impl MysqlTier {
    pub fn new(db: RBatis) -> Self {
        Self { db }
    }

    /// 建表（不存在则创建）
    pub async fn ensure_table(&self) -> AppResult<()> {
        let create_table_sql = "CREATE TABLE IF NOT EXISTS `sync_cache` (
            `cache_key` varchar(512) NOT NULL COMMENT '缓存键：域+参数+频率',
            `payload` longtext NOT NULL COMMENT '序列化后的行集',
            `created_at` datetime NOT NULL DEFAULT CURRENT_TIMESTAMP,
            `updated_at` datetime DEFAULT NULL ON UPDATE CURRENT_TIMESTAMP,
            PRIMARY KEY (`cache_key`)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_0900_ai_ci;";
        self.db
            .exec(create_table_sql, vec![])
            .await
            .map_err(|e| AppError::Store(format!("Create sync_cache table failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl StoreTier for MysqlTier {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let rows: Vec<SyncCacheRow> = self
            .db
            .query_decode(
                "SELECT payload FROM sync_cache WHERE cache_key = ?",
                vec![key.to_string().into()],
            )
            .await
            .map_err(|e| AppError::Store(format!("MySQL get failed: {}", e)))?;
        Ok(rows.into_iter().next().map(|r| r.payload))
    }

    async fn put(&self, key: &str, payload: &str, _ttl_secs: Option<u64>) -> AppResult<()> {
        // 持久层无过期语义，TTL 忽略
        self.db
            .exec(
                "INSERT INTO sync_cache (cache_key, payload) VALUES (?, ?)
                 ON DUPLICATE KEY UPDATE payload = VALUES(payload), updated_at = CURRENT_TIMESTAMP",
                vec![key.to_string().into(), payload.to_string().into()],
            )
            .await
            .map_err(|e| AppError::Store(format!("MySQL upsert failed: {}", e)))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        self.db
            .exec(
                "DELETE FROM sync_cache WHERE cache_key = ?",
                vec![key.to_string().into()],
            )
            .await
            .map_err(|e| AppError::Store(format!("MySQL delete failed: {}", e)))?;
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        self.db
            .exec("DELETE FROM sync_cache", vec![])
            .await
            .map_err(|e| AppError::Store(format!("MySQL clear failed: {}", e)))?;
        Ok(())
    }
}
