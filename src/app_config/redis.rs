use redis::aio::MultiplexedConnection;
use redis::Client;
use tracing::{debug, error};

use crate::app_config::env::env_or_default;
use crate::error::{AppError, AppResult};

/// Redis连接池管理器
///
/// 显式持有，由调用方注入到需要快层缓存的组件，不注册为全局单例。
pub struct RedisPool {
    client: Client,
}

impl RedisPool {
    /// 创建新的连接池
    pub async fn new(redis_url: &str) -> AppResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| AppError::Config(format!("Failed to create Redis client: {}", e)))?;

        // 测试连接
        let _test_conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!("Redis connection test failed: {}", redis_url);
                AppError::Config(format!("Failed to test Redis connection: {}", e))
            })?;

        debug!("Redis连接池初始化成功");

        Ok(Self { client })
    }

    /// 从 REDIS_HOST 环境变量创建连接池
    pub async fn from_env() -> AppResult<Self> {
        let redis_url = env_or_default("REDIS_HOST", "redis://127.0.0.1:6379/");
        Self::new(&redis_url).await
    }

    /// 获取多路复用连接
    pub async fn get_connection(&self) -> AppResult<MultiplexedConnection> {
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Store(format!("Failed to get multiplexed connection: {}", e)))?;

        Ok(conn)
    }
}
