use thiserror::Error;

/// 应用错误类型
///
/// 传播策略：`Parse` 直接上抛给请求方；`Fetch` 在有缓存时降级为旧数据，
/// 无缓存时上抛；`Store` 在快层失败时静默降级，持久层写失败作为软告警返回。
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type AppResult<T> = Result<T, AppError>;
