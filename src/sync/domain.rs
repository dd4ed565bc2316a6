//! 数据域声明与上游抓取契约
//!
//! 每个数据域注册时静态声明自己的时间字段与新鲜度等级，
//! 核心逻辑不再在运行时猜测列名。

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime};

use crate::app_config::env::env_u64;
use crate::error::AppResult;
use crate::sync::record::RecordSet;
use crate::time_util::Frequency;

/// 新鲜度等级：决定快层 TTL 的档位，属于数据域属性而非单次请求属性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessClass {
    /// 盘中实时类（指数行情、期权链快照）
    RealTime,
    /// 日终慢变类（融资融券、持仓、历史K线）
    EndOfDay,
}

impl FreshnessClass {
    /// 快层 TTL（秒），支持环境变量覆盖
    pub fn ttl_secs(&self) -> u64 {
        match self {
            FreshnessClass::RealTime => env_u64("SYNC_TTL_REALTIME_SECS", 600),
            FreshnessClass::EndOfDay => env_u64("SYNC_TTL_EOD_SECS", 3600),
        }
    }
}

/// A股主板收盘时间
fn mainland_close() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 0, 0).unwrap()
}

/// 港股收盘时间
fn hk_close() -> NaiveTime {
    NaiveTime::from_hms_opt(16, 0, 0).unwrap()
}

/// 数据域声明
#[derive(Debug, Clone)]
pub struct DomainSpec {
    /// 域名，进入缓存键
    pub name: &'static str,
    /// 静态声明的时间字段；None 表示该域载荷是不可切分的整体快照
    pub temporal_field: Option<&'static str>,
    pub freshness: FreshnessClass,
    /// 分钟级请求的会话收盘时间
    pub session_close: NaiveTime,
}

impl DomainSpec {
    pub fn new(
        name: &'static str,
        temporal_field: Option<&'static str>,
        freshness: FreshnessClass,
        session_close: NaiveTime,
    ) -> Self {
        Self {
            name,
            temporal_field,
            freshness,
            session_close,
        }
    }

    /// 指数行情
    pub fn index_quote() -> Self {
        Self::new("index_quote", Some("日期"), FreshnessClass::RealTime, mainland_close())
    }

    /// 港股指数行情
    pub fn hk_index_quote() -> Self {
        Self::new("hk_index_quote", Some("日期"), FreshnessClass::RealTime, hk_close())
    }

    /// 期权链快照（整体缓存，无时间切分）
    pub fn option_chain() -> Self {
        Self::new("option_chain", None, FreshnessClass::RealTime, mainland_close())
    }

    /// 期货持仓
    pub fn futures_position() -> Self {
        Self::new("futures_position", Some("日期"), FreshnessClass::EndOfDay, mainland_close())
    }

    /// 融资融券统计
    pub fn margin_stats() -> Self {
        Self::new("margin_stats", Some("日期"), FreshnessClass::EndOfDay, mainland_close())
    }

    /// 历史K线
    pub fn ohlc_history() -> Self {
        Self::new("ohlc_history", Some("日期"), FreshnessClass::EndOfDay, mainland_close())
    }
}

/// 上游抓取契约，每个数据域实现一次
///
/// 真实故障必须抛出类型化错误；窗口合法但确无数据（如整段落在
/// 非交易日）时返回空集而不是 None。
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        window_start: NaiveDateTime,
        window_end: NaiveDateTime,
        freq: Frequency,
        params: &BTreeMap<String, String>,
    ) -> AppResult<RecordSet>;
}
