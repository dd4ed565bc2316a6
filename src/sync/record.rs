//! 行集：与线格式无关的可增长、去重、按时间排序的数据集
//!
//! 上游抓取结果不论原始形态（表格或字典列表）统一落成 `RecordSet`，
//! 核心逻辑不再做任何形态分派。

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::time_util::{
    bucket, canonical_temporal_string, parse_datetime_flexible, Frequency,
};

/// 单行记录：字段名到标量值的映射
///
/// BTreeMap 保证字段序固定，行的 JSON 序列化因此是规范形，可直接用于去重。
pub type Record = BTreeMap<String, Value>;

/// 时间字段别名优先级表（含上游返回的本地化列名）
const TEMPORAL_ALIASES: [&str; 7] = [
    "date", "日期", "trade_date", "time", "时间", "datetime", "day",
];

/// 按别名优先级扫描单行记录的时间键
pub fn temporal_key_of(record: &Record) -> Option<(&str, &Value)> {
    for alias in TEMPORAL_ALIASES {
        if let Some(v) = record.get(alias) {
            return Some((alias, v));
        }
    }
    None
}

/// 有序去重行集
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    rows: Vec<Record>,
    temporal_field: Option<String>,
}

impl RecordSet {
    /// 由行数据构建，时间字段按别名表自动识别
    pub fn from_rows(rows: Vec<Record>) -> Self {
        let temporal_field = Self::detect_temporal_field(&rows);
        Self {
            rows,
            temporal_field,
        }
    }

    /// 由行数据构建，时间字段由数据域静态声明
    pub fn with_field(rows: Vec<Record>, temporal_field: impl Into<String>) -> Self {
        Self {
            rows,
            temporal_field: Some(temporal_field.into()),
        }
    }

    /// 套用数据域声明的时间字段；未声明时保留已有识别结果
    pub fn with_temporal_hint(mut self, hint: Option<&str>) -> Self {
        if let Some(field) = hint {
            self.temporal_field = Some(field.to_string());
        } else if self.temporal_field.is_none() {
            self.temporal_field = Self::detect_temporal_field(&self.rows);
        }
        self
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn temporal_field(&self) -> Option<&str> {
        self.temporal_field.as_deref()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn detect_temporal_field(rows: &[Record]) -> Option<String> {
        for alias in TEMPORAL_ALIASES {
            if rows.iter().any(|r| r.contains_key(alias)) {
                return Some(alias.to_string());
            }
        }
        None
    }

    /// 合并两个行集
    ///
    /// 拼接后重写时间字段为规范字符串，删除全字段完全相同的行
    /// （同一时间戳但其他字段不同的行全部保留，上游修正值只能以这种
    /// 形式表达），最后按时间键升序排序，无时间键的行排在最前。
    /// 可交换，且对相同输入幂等。
    pub fn merge(&self, other: &RecordSet) -> RecordSet {
        let temporal_field = self
            .temporal_field
            .clone()
            .or_else(|| other.temporal_field.clone());

        let mut rows: Vec<Record> = self
            .rows
            .iter()
            .chain(other.rows.iter())
            .cloned()
            .collect();

        let field = temporal_field
            .clone()
            .or_else(|| Self::detect_temporal_field(&rows));

        for row in &mut rows {
            canonicalize_row(row, field.as_deref());
        }

        let mut seen = HashSet::new();
        rows.retain(|row| seen.insert(row_fingerprint(row)));

        let mut keyed: Vec<(Option<String>, String, Record)> = rows
            .into_iter()
            .map(|r| {
                let key = temporal_sort_key(&r, field.as_deref());
                let fingerprint = row_fingerprint(&r);
                (key, fingerprint, r)
            })
            .collect();
        keyed.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));

        RecordSet {
            rows: keyed.into_iter().map(|(_, _, r)| r).collect(),
            temporal_field: field,
        }
    }

    /// 规范化：对自身执行一遍合并语义（时间字段改写、去重、排序）
    ///
    /// 存储读路径对载荷不作信任假设，读出后统一走这一遍。
    pub fn normalize(&self) -> RecordSet {
        self.merge(&RecordSet::default())
    }

    /// 行集覆盖的时间窗口（按频率桶对齐后的最小/最大时间键）
    ///
    /// 空集或无时间键时返回 None；个别无法解析的时间值跳过并告警，
    /// 不让脏数据污染窗口边界。
    pub fn coverage(&self, freq: Frequency) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let declared = self.temporal_field.as_deref();
        let mut min: Option<NaiveDateTime> = None;
        let mut max: Option<NaiveDateTime> = None;

        for row in &self.rows {
            let value = match temporal_value_of(row, declared) {
                Some(v) => v,
                None => continue,
            };
            let dt = match value_to_datetime(value) {
                Some(dt) => dt,
                None => {
                    warn!("Unparseable temporal value skipped: {}", value);
                    continue;
                }
            };
            min = Some(min.map_or(dt, |m| m.min(dt)));
            max = Some(max.map_or(dt, |m| m.max(dt)));
        }

        match (min, max) {
            (Some(lo), Some(hi)) => Some((bucket(lo, freq), bucket(hi, freq))),
            _ => None,
        }
    }
}

/// 行内时间值：优先声明字段，行缺失该字段时退回别名扫描
fn temporal_value_of<'a>(row: &'a Record, declared: Option<&str>) -> Option<&'a Value> {
    if let Some(field) = declared {
        if let Some(v) = row.get(field) {
            return Some(v);
        }
    }
    temporal_key_of(row).map(|(_, v)| v)
}

fn canonicalize_row(row: &mut Record, declared: Option<&str>) {
    let field = match declared {
        Some(f) if row.contains_key(f) => f.to_string(),
        _ => match temporal_key_of(row) {
            Some((name, _)) => name.to_string(),
            None => return,
        },
    };
    if let Some(value) = row.get(&field) {
        if let Some(canonical) = canonicalize_value(value) {
            row.insert(field, Value::String(canonical));
        }
    }
}

fn canonicalize_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            parse_datetime_flexible(s).map(|(dt, with_time)| canonical_temporal_string(dt, with_time))
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(epoch_to_datetime)
            .map(|dt| canonical_temporal_string(dt, true)),
        _ => None,
    }
}

/// 纪元数值转时间：13位按毫秒，10位按秒
fn epoch_to_datetime(v: i64) -> Option<NaiveDateTime> {
    if v >= 100_000_000_000 {
        DateTime::from_timestamp_millis(v).map(|d| d.naive_utc())
    } else if v >= 1_000_000_000 {
        DateTime::from_timestamp(v, 0).map(|d| d.naive_utc())
    } else {
        None
    }
}

fn temporal_sort_key(row: &Record, declared: Option<&str>) -> Option<String> {
    temporal_value_of(row, declared).and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => n
            .as_i64()
            .and_then(epoch_to_datetime)
            .map(|dt| canonical_temporal_string(dt, true)),
        _ => None,
    })
}

fn row_fingerprint(row: &Record) -> String {
    serde_json::to_string(row).unwrap_or_default()
}
