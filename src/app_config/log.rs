use std::sync::OnceLock;

use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::app_config::env::env_or_default;
use crate::error::{AppError, AppResult};

// 全局变量用于保持日志文件句柄
static INFO_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// 日志配置结构体
#[derive(Debug, Clone)]
struct LogConfig {
    app_env: String,
    log_level: String,
    log_dir: String,
    log_rotation: String,
    info_file_name: String,
}

impl LogConfig {
    fn from_env() -> Self {
        Self {
            app_env: env_or_default("APP_ENV", "local"),
            log_level: env_or_default("LOG_LEVEL", "info"),
            log_dir: env_or_default("LOG_DIR", "log_files"),
            log_rotation: env_or_default("LOG_ROTATION", "daily"),
            info_file_name: env_or_default("LOG_INFO_FILE", "info.log"),
        }
    }
}

// 解析时间轮转策略
fn parse_rotation(s: &str) -> Rotation {
    match s.to_lowercase().as_str() {
        "minutely" | "minute" | "min" => Rotation::MINUTELY,
        "hourly" | "hour" | "hr" => Rotation::HOURLY,
        "daily" | "day" => Rotation::DAILY,
        _ => Rotation::DAILY,
    }
}

/// 设置日志
///
/// 本地环境仅控制台输出，其他环境写入滚动日志文件。
pub fn setup_logging() -> AppResult<()> {
    let config = LogConfig::from_env();

    // 本地环境：仅控制台输出
    if config.app_env == "local" {
        let subscriber = Registry::default().with(
            fmt::layer()
                .with_ansi(true)
                .with_target(false)
                .with_file(true)
                .with_line_number(true)
                .with_writer(std::io::stdout)
                .with_filter(EnvFilter::new(&config.log_level)),
        );
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| AppError::Config(format!("Failed to set subscriber: {}", e)))?;

        info!("Log configuration setup successfully!");
        return Ok(());
    }

    // 非本地环境：文件输出
    std::fs::create_dir_all(&config.log_dir).map_err(|e| {
        AppError::Config(format!(
            "Failed to create log directory '{}': {}",
            config.log_dir, e
        ))
    })?;

    let info_file = RollingFileAppender::new(
        parse_rotation(&config.log_rotation),
        &config.log_dir,
        &config.info_file_name,
    );
    let (info_non_blocking, info_guard) = tracing_appender::non_blocking(info_file);

    // 保存guard到全局，防止被丢弃
    INFO_GUARD
        .set(info_guard)
        .map_err(|_| AppError::Config("Failed to set INFO_GUARD".to_string()))?;

    let subscriber = Registry::default().with(
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_file(true)
            .with_line_number(true)
            .with_writer(info_non_blocking)
            .with_filter(EnvFilter::new(&config.log_level)),
    );
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Config(format!("Failed to set subscriber: {}", e)))?;

    info!(
        "Log configuration setup successfully! Environment: {}, Log Level: {}",
        config.app_env, config.log_level
    );
    Ok(())
}
