//! 同步协调器端到端测试：内存双层存储 + 脚本化抓取器

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::json;

use stock_sync::{
    AppError, AppResult, DomainSpec, Fetcher, FixedCalendar, Frequency, FreshnessClass,
    MemoryTier, Record, RecordSet, SyncCoordinator, TieredStore,
};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    NaiveDateTime::new(date, NaiveTime::MIN)
}

/// 生成逐日行情行（无间隙）
fn daily_rows(start: NaiveDate, end: NaiveDate) -> Vec<Record> {
    let mut rows = Vec::new();
    let mut day = start;
    while day <= end {
        let mut row = Record::new();
        row.insert("date".to_string(), json!(day.format("%Y-%m-%d").to_string()));
        row.insert("close".to_string(), json!(10.0));
        rows.push(row);
        day += Duration::days(1);
    }
    rows
}

/// 脚本化抓取器：记录每次调用的窗口，可切换为故障或空窗口模式
struct MockFetcher {
    calls: Mutex<Vec<(NaiveDateTime, NaiveDateTime)>>,
    fail: AtomicBool,
    empty: AtomicBool,
}

impl MockFetcher {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            empty: AtomicBool::new(false),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn window(&self, i: usize) -> (NaiveDateTime, NaiveDateTime) {
        self.calls.lock().unwrap()[i]
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(
        &self,
        window_start: NaiveDateTime,
        window_end: NaiveDateTime,
        _freq: Frequency,
        _params: &BTreeMap<String, String>,
    ) -> AppResult<RecordSet> {
        self.calls.lock().unwrap().push((window_start, window_end));
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Fetch("upstream down".to_string()));
        }
        if self.empty.load(Ordering::SeqCst) {
            return Ok(RecordSet::default());
        }
        Ok(RecordSet::from_rows(daily_rows(
            window_start.date(),
            window_end.date(),
        )))
    }
}

fn test_spec() -> DomainSpec {
    DomainSpec::new(
        "ohlc_history",
        Some("date"),
        FreshnessClass::EndOfDay,
        NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
    )
}

fn build_coordinator(
    latest_trading_day: NaiveDate,
) -> (SyncCoordinator, Arc<MockFetcher>, Arc<TieredStore>) {
    let store = Arc::new(TieredStore::new(
        Arc::new(MemoryTier::new()),
        Arc::new(MemoryTier::new()),
        60,
    ));
    let fetcher = MockFetcher::new();
    let coordinator = SyncCoordinator::new(
        store.clone(),
        Arc::new(FixedCalendar::new(latest_trading_day)),
        test_spec(),
        fetcher.clone(),
    );
    (coordinator, fetcher, store)
}

fn params() -> BTreeMap<String, String> {
    let mut p = BTreeMap::new();
    p.insert("symbol".to_string(), "sh000001".to_string());
    p
}

fn dates_of(rs: &RecordSet) -> Vec<String> {
    rs.rows()
        .iter()
        .filter_map(|r| r.get("date").and_then(|v| v.as_str()))
        .map(|s| s.to_string())
        .collect()
}

#[tokio::test]
async fn test_cold_fetch_populates_cache() {
    let (coordinator, fetcher, store) = build_coordinator(d(2024, 1, 15));

    let result = coordinator
        .sync(&params(), "2024-01-01", "2024-01-10", Frequency::Daily)
        .await
        .unwrap();

    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(
        fetcher.window(0),
        (midnight(d(2024, 1, 1)), midnight(d(2024, 1, 10)))
    );
    assert_eq!(result.len(), 10);

    // 第二次相同请求完全命中缓存，不再回源
    let again = coordinator
        .sync(&params(), "2024-01-01", "2024-01-10", Frequency::Daily)
        .await
        .unwrap();
    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(again, result);

    let key = stock_sync::sync::cache_key::build("ohlc_history", &params(), Frequency::Daily);
    assert!(store.get(&key).await.is_some());
}

#[tokio::test]
async fn test_extension_fetches_exactly_the_missing_window() {
    // 规格场景：缓存 [01-01, 01-10]，请求 [01-01, 01-15]，
    // 最近交易日 01-15，期望抓取窗口恰为 [01-11, 01-15]
    let (coordinator, fetcher, _store) = build_coordinator(d(2024, 1, 15));

    coordinator
        .sync(&params(), "2024-01-01", "2024-01-10", Frequency::Daily)
        .await
        .unwrap();

    let merged = coordinator
        .sync(&params(), "2024-01-01", "2024-01-15", Frequency::Daily)
        .await
        .unwrap();

    assert_eq!(fetcher.call_count(), 2);
    assert_eq!(
        fetcher.window(1),
        (midnight(d(2024, 1, 11)), midnight(d(2024, 1, 15)))
    );

    // 15 个交易日行，升序且无重复日期
    let dates = dates_of(&merged);
    assert_eq!(dates.len(), 15);
    let mut sorted = dates.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(dates, sorted);
    assert_eq!(dates.first().map(String::as_str), Some("2024-01-01"));
    assert_eq!(dates.last().map(String::as_str), Some("2024-01-15"));

    // 覆盖单调性：合并后的窗口包含请求窗口
    let (lo, hi) = merged.coverage(Frequency::Daily).unwrap();
    assert!(lo <= midnight(d(2024, 1, 1)));
    assert!(hi >= midnight(d(2024, 1, 15)));
}

#[tokio::test]
async fn test_backfill_fetches_older_window() {
    let (coordinator, fetcher, _store) = build_coordinator(d(2024, 1, 15));

    coordinator
        .sync(&params(), "2024-01-05", "2024-01-12", Frequency::Daily)
        .await
        .unwrap();

    let merged = coordinator
        .sync(&params(), "2024-01-01", "2024-01-10", Frequency::Daily)
        .await
        .unwrap();

    // 右端已覆盖，只向左回补 [01-01, 01-04]
    assert_eq!(fetcher.call_count(), 2);
    assert_eq!(
        fetcher.window(1),
        (midnight(d(2024, 1, 1)), midnight(d(2024, 1, 4)))
    );
    assert_eq!(merged.len(), 12);
}

#[tokio::test]
async fn test_both_sides_short_prefers_extension() {
    let (coordinator, fetcher, _store) = build_coordinator(d(2024, 1, 15));

    coordinator
        .sync(&params(), "2024-01-05", "2024-01-08", Frequency::Daily)
        .await
        .unwrap();

    // 两侧都不够，单次请求只向前延伸一次
    coordinator
        .sync(&params(), "2024-01-01", "2024-01-12", Frequency::Daily)
        .await
        .unwrap();

    assert_eq!(fetcher.call_count(), 2);
    assert_eq!(
        fetcher.window(1),
        (midnight(d(2024, 1, 9)), midnight(d(2024, 1, 12)))
    );
}

#[tokio::test]
async fn test_weekend_request_end_is_adjusted() {
    let (coordinator, fetcher, _store) = build_coordinator(d(2024, 1, 15));

    coordinator
        .sync(&params(), "2024-01-01", "2024-01-10", Frequency::Daily)
        .await
        .unwrap();

    // 2024-01-13 是周六，结束日回退到周五 01-12
    coordinator
        .sync(&params(), "2024-01-01", "2024-01-13", Frequency::Daily)
        .await
        .unwrap();

    assert_eq!(
        fetcher.window(1),
        (midnight(d(2024, 1, 11)), midnight(d(2024, 1, 12)))
    );
}

#[tokio::test]
async fn test_fetch_failure_returns_cached_unchanged() {
    let (coordinator, fetcher, _store) = build_coordinator(d(2024, 1, 15));

    let cached = coordinator
        .sync(&params(), "2024-01-01", "2024-01-10", Frequency::Daily)
        .await
        .unwrap();

    fetcher.fail.store(true, Ordering::SeqCst);
    let degraded = coordinator
        .sync(&params(), "2024-01-01", "2024-01-15", Frequency::Daily)
        .await
        .unwrap();

    // 抓取失败不丢已有数据，返回值与同步前的缓存完全一致
    assert_eq!(degraded, cached);
}

#[tokio::test]
async fn test_cold_fetch_failure_propagates() {
    let (coordinator, fetcher, _store) = build_coordinator(d(2024, 1, 15));
    fetcher.fail.store(true, Ordering::SeqCst);

    let result = coordinator
        .sync(&params(), "2024-01-01", "2024-01-10", Frequency::Daily)
        .await;

    assert!(matches!(result, Err(AppError::Fetch(_))));
}

#[tokio::test]
async fn test_malformed_request_date_is_parse_error() {
    let (coordinator, fetcher, _store) = build_coordinator(d(2024, 1, 15));

    let result = coordinator
        .sync(&params(), "01/05 last year", "2024-01-10", Frequency::Daily)
        .await;

    // 解析失败立即上抛，不得被当作"无需更新"
    assert!(matches!(result, Err(AppError::Parse(_))));
    assert_eq!(fetcher.call_count(), 0);
}

#[tokio::test]
async fn test_legitimately_empty_window_returns_empty_set() {
    let (coordinator, fetcher, store) = build_coordinator(d(2024, 1, 15));
    fetcher.empty.store(true, Ordering::SeqCst);

    let result = coordinator
        .sync(&params(), "2024-01-01", "2024-01-10", Frequency::Daily)
        .await
        .unwrap();

    assert!(result.is_empty());
    // 空结果不落缓存
    let key = stock_sync::sync::cache_key::build("ohlc_history", &params(), Frequency::Daily);
    assert!(store.get(&key).await.is_none());
}

#[tokio::test]
async fn test_opaque_snapshot_served_without_fetch() {
    let store = Arc::new(TieredStore::new(
        Arc::new(MemoryTier::new()),
        Arc::new(MemoryTier::new()),
        60,
    ));
    let fetcher = MockFetcher::new();
    let spec = DomainSpec::option_chain();
    let coordinator = SyncCoordinator::new(
        store.clone(),
        Arc::new(FixedCalendar::new(d(2024, 1, 15))),
        spec,
        fetcher.clone(),
    );

    // 预置一份无时间键的整体快照
    let mut row = Record::new();
    row.insert("contract".to_string(), json!("io2403-C-3900"));
    row.insert("price".to_string(), json!(88.6));
    let snapshot = RecordSet::from_rows(vec![row]);
    let key = stock_sync::sync::cache_key::build("option_chain", &params(), Frequency::Daily);
    store.set(&key, &snapshot, 60).await.unwrap();

    let served = coordinator
        .sync(&params(), "2024-01-01", "2024-01-10", Frequency::Daily)
        .await
        .unwrap();

    // TTL 未到期之前整体快照原样返回，不触发回源
    assert_eq!(fetcher.call_count(), 0);
    assert_eq!(served.len(), 1);
}

#[tokio::test]
async fn test_invalidate_forces_refetch() {
    let (coordinator, fetcher, _store) = build_coordinator(d(2024, 1, 15));

    coordinator
        .sync(&params(), "2024-01-01", "2024-01-10", Frequency::Daily)
        .await
        .unwrap();
    coordinator.invalidate(&params(), Frequency::Daily).await.unwrap();

    coordinator
        .sync(&params(), "2024-01-01", "2024-01-10", Frequency::Daily)
        .await
        .unwrap();

    assert_eq!(fetcher.call_count(), 2);
}
