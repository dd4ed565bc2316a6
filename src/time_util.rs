//! 时间对齐工具
//!
//! 覆盖窗口比较要求两侧时间先归一到同一采样粒度的桶起点，
//! 自然日请求还需要先平移到最近的有效交易日，否则每次比较都会
//! 误报"需要更新"。

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};

use crate::error::{AppError, AppResult};

/// 采样频率
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    Min1,
    Min5,
    Min15,
    Min30,
    Min60,
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Min1 => "1m",
            Frequency::Min5 => "5m",
            Frequency::Min15 => "15m",
            Frequency::Min30 => "30m",
            Frequency::Min60 => "60m",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }

    pub fn parse(s: &str) -> AppResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "1m" => Ok(Frequency::Min1),
            "5m" => Ok(Frequency::Min5),
            "15m" => Ok(Frequency::Min15),
            "30m" => Ok(Frequency::Min30),
            "60m" => Ok(Frequency::Min60),
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(AppError::Parse(format!("Unsupported frequency: {}", other))),
        }
    }

    pub fn is_intraday(&self) -> bool {
        matches!(
            self,
            Frequency::Min1
                | Frequency::Min5
                | Frequency::Min15
                | Frequency::Min30
                | Frequency::Min60
        )
    }
}

/// 最近交易日预言机
///
/// 调用方负责缓存取值（每天或每次进程启动刷新一次即可），
/// 协调器每个请求只查询一次。
pub trait TradingCalendar: Send + Sync {
    fn latest_trading_day(&self) -> NaiveDate;
}

/// 固定取值的交易日预言机
pub struct FixedCalendar {
    day: NaiveDate,
}

impl FixedCalendar {
    pub fn new(day: NaiveDate) -> Self {
        Self { day }
    }
}

impl TradingCalendar for FixedCalendar {
    fn latest_trading_day(&self) -> NaiveDate {
        self.day
    }
}

/// 将时间戳对齐到采样频率对应的桶起点
///
/// 分钟级频率截断到分钟，日线截断到零点，周线截断到周一，月线截断到月初。
/// 幂等且保序。
pub fn bucket(ts: NaiveDateTime, freq: Frequency) -> NaiveDateTime {
    match freq {
        Frequency::Min1
        | Frequency::Min5
        | Frequency::Min15
        | Frequency::Min30
        | Frequency::Min60 => {
            let time = NaiveTime::from_hms_opt(ts.hour(), ts.minute(), 0).unwrap_or(ts.time());
            NaiveDateTime::new(ts.date(), time)
        }
        Frequency::Daily => NaiveDateTime::new(ts.date(), NaiveTime::MIN),
        Frequency::Weekly => {
            let offset = ts.date().weekday().num_days_from_monday() as i64;
            NaiveDateTime::new(ts.date() - Duration::days(offset), NaiveTime::MIN)
        }
        Frequency::Monthly => {
            let first = ts.date().with_day(1).unwrap_or(ts.date());
            NaiveDateTime::new(first, NaiveTime::MIN)
        }
    }
}

/// 向后推进一个桶
pub fn next_bucket(ts: NaiveDateTime, freq: Frequency) -> NaiveDateTime {
    match freq {
        Frequency::Min1 => ts + Duration::minutes(1),
        Frequency::Min5 => ts + Duration::minutes(5),
        Frequency::Min15 => ts + Duration::minutes(15),
        Frequency::Min30 => ts + Duration::minutes(30),
        Frequency::Min60 => ts + Duration::minutes(60),
        Frequency::Daily => ts + Duration::days(1),
        Frequency::Weekly => ts + Duration::weeks(1),
        Frequency::Monthly => ts.checked_add_months(Months::new(1)).unwrap_or(ts),
    }
}

/// 向前回退一个桶
pub fn prev_bucket(ts: NaiveDateTime, freq: Frequency) -> NaiveDateTime {
    match freq {
        Frequency::Min1 => ts - Duration::minutes(1),
        Frequency::Min5 => ts - Duration::minutes(5),
        Frequency::Min15 => ts - Duration::minutes(15),
        Frequency::Min30 => ts - Duration::minutes(30),
        Frequency::Min60 => ts - Duration::minutes(60),
        Frequency::Daily => ts - Duration::days(1),
        Frequency::Weekly => ts - Duration::weeks(1),
        Frequency::Monthly => ts.checked_sub_months(Months::new(1)).unwrap_or(ts),
    }
}

/// 请求起始日落在周末时平移到下一个周一
pub fn adjust_requested_start(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date + Duration::days(2),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

/// 请求结束日落在周末时回退到上一个周五，并收敛到最近交易日
pub fn adjust_requested_end(date: NaiveDate, latest_trading_day: NaiveDate) -> NaiveDate {
    let adjusted = match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date - Duration::days(2),
        _ => date,
    };
    if adjusted > latest_trading_day {
        latest_trading_day
    } else {
        adjusted
    }
}

/// 请求结束日对应的会话终点时间戳
///
/// 分钟级频率钉到该市场的收盘时间，使盘中请求也能与前一日的
/// 收盘快照做一致比较；日线及以上取当日零点。
pub fn session_end(date: NaiveDate, freq: Frequency, session_close: NaiveTime) -> NaiveDateTime {
    if freq.is_intraday() {
        NaiveDateTime::new(date, session_close)
    } else {
        NaiveDateTime::new(date, NaiveTime::MIN)
    }
}

/// 解析请求日期（YYYY-MM-DD / YYYYMMDD / YYYY/MM/DD，以及完整时间形式）
pub fn parse_date(s: &str) -> AppResult<NaiveDate> {
    match parse_datetime_flexible(s) {
        Some((dt, _)) => Ok(dt.date()),
        None => Err(AppError::Parse(format!("Malformed date: {}", s))),
    }
}

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y%m%d", "%Y/%m/%d"];

/// 宽松解析时间字符串，返回解析值以及原文是否带时间部分
pub fn parse_datetime_flexible(s: &str) -> Option<(NaiveDateTime, bool)> {
    let s = s.trim();
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some((dt, true));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some((NaiveDateTime::new(d, NaiveTime::MIN), false));
        }
    }
    None
}

/// 规范化的时间字符串：日期型 `%Y-%m-%d`，带时间型 `%Y-%m-%d %H:%M:%S`
pub fn canonical_temporal_string(dt: NaiveDateTime, with_time: bool) -> String {
    if with_time {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        dt.format("%Y-%m-%d").to_string()
    }
}
