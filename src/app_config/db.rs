use std::env;

use rbatis::RBatis;
use rbdc_mysql::MysqlDriver;
use tracing::info;

use crate::error::{AppError, AppResult};

/// 初始化 MySQL 连接（rbatis）
///
/// 返回持有连接池的句柄，由调用方传递给持久层，不注册为全局单例。
pub async fn init_db(url: &str) -> AppResult<RBatis> {
    let rb = RBatis::new();
    rb.link(MysqlDriver {}, url)
        .await
        .map_err(|e| AppError::Config(format!("Failed to connect db: {}", e)))?;

    // 这里建议按部署环境调整数据库的最大连接数
    if let Ok(pool) = rb.get_pool() {
        pool.set_max_open_conns(64).await;
    }

    info!("MySQL connection pool initialized");
    Ok(rb)
}

/// 从 DB_HOST 环境变量初始化 MySQL 连接
pub async fn init_db_from_env() -> AppResult<RBatis> {
    let url = env::var("DB_HOST")
        .map_err(|_| AppError::Config("DB_HOST is not set".to_string()))?;
    init_db(&url).await
}
