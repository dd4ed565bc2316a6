//! 同步协调器
//!
//! 唯一判断"缓存数据是否仍然够用"的组件：算覆盖窗口、定最小抓取
//! 区间、调上游、合并、回写。各数据域通过注入各自的 Fetcher 复用
//! 同一套流程。

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDateTime, NaiveTime};
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::sync::cache_key;
use crate::sync::domain::{DomainSpec, Fetcher};
use crate::sync::record::RecordSet;
use crate::sync::store::TieredStore;
use crate::time_util::{self, Frequency, TradingCalendar};

/// 按数据域构造的同步协调器
///
/// 存储、交易日历、域声明、抓取器全部显式注入，
/// 多套独立配置的缓存可以共存并各自测试。
pub struct SyncCoordinator {
    store: Arc<TieredStore>,
    calendar: Arc<dyn TradingCalendar>,
    spec: DomainSpec,
    fetcher: Arc<dyn Fetcher>,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<TieredStore>,
        calendar: Arc<dyn TradingCalendar>,
        spec: DomainSpec,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            store,
            calendar,
            spec,
            fetcher,
        }
    }

    /// 同步并返回请求窗口对应的行集
    ///
    /// 每个请求至多一次上游抓取；抓取失败时已有缓存原样返回，
    /// 绝不丢数据。返回的行集始终按时间键升序且无完全重复行。
    pub async fn sync(
        &self,
        params: &BTreeMap<String, String>,
        start: &str,
        end: &str,
        freq: Frequency,
    ) -> AppResult<RecordSet> {
        let key = cache_key::build(self.spec.name, params, freq);

        // 自然日请求先平移到有效交易日，再对齐到频率桶
        let start_date = time_util::adjust_requested_start(time_util::parse_date(start)?);
        let end_date = time_util::adjust_requested_end(
            time_util::parse_date(end)?,
            self.calendar.latest_trading_day(),
        );
        let want_start = time_util::bucket(NaiveDateTime::new(start_date, NaiveTime::MIN), freq);
        let want_end = time_util::bucket(
            time_util::session_end(end_date, freq, self.spec.session_close),
            freq,
        );

        let cached = match self.store.get(&key).await {
            Some(c) => c,
            None => return self.cold_fetch(&key, params, want_start, want_end, freq).await,
        };

        let (have_start, have_end) = match cached.coverage(freq) {
            Some(win) => win,
            None => {
                // 无时间键的整体快照：新鲜度完全由快层 TTL 决定
                debug!("Opaque snapshot hit, served as-is: key={}", key);
                return Ok(cached);
            }
        };

        // 右端不够新或左端不够深都算未覆盖，但单次请求只补一侧：
        // 统一优先向前延伸，过期的最新数据比缺失的历史深度更有害
        let window = if have_end < want_end {
            Some((time_util::next_bucket(have_end, freq), want_end))
        } else if have_start > want_start {
            Some((want_start, time_util::prev_bucket(have_start, freq)))
        } else {
            None
        };

        let (fetch_start, fetch_end) = match window {
            Some(w) => w,
            None => {
                debug!("Coverage satisfied by cache: key={}", key);
                return Ok(cached);
            }
        };

        debug!(
            "增量抓取窗口: key={}, {} ~ {}",
            key, fetch_start, fetch_end
        );
        let fetched = match self.fetcher.fetch(fetch_start, fetch_end, freq, params).await {
            Ok(set) => set.with_temporal_hint(self.spec.temporal_field),
            Err(e) => {
                warn!("上游抓取失败，降级返回已缓存数据: key={}, err={}", key, e);
                return Ok(cached);
            }
        };

        let merged = cached.merge(&fetched);
        if let Err(e) = self
            .store
            .set(&key, &merged, self.spec.freshness.ttl_secs())
            .await
        {
            warn!("缓存回写失败（数据仍正常返回）: key={}, err={}", key, e);
        }
        Ok(merged)
    }

    /// 两层缓存均未命中时的全窗口抓取
    async fn cold_fetch(
        &self,
        key: &str,
        params: &BTreeMap<String, String>,
        want_start: NaiveDateTime,
        want_end: NaiveDateTime,
        freq: Frequency,
    ) -> AppResult<RecordSet> {
        info!(
            "缓存未命中，全窗口抓取: key={}, {} ~ {}",
            key, want_start, want_end
        );
        // 无缓存可降级，抓取失败直接上抛
        let fetched = self.fetcher.fetch(want_start, want_end, freq, params).await?;
        let records = fetched
            .with_temporal_hint(self.spec.temporal_field)
            .normalize();

        if records.is_empty() {
            // 窗口合法但确无数据（如整段非交易日），不落缓存
            debug!("Window legitimately empty: key={}", key);
            return Ok(records);
        }

        if let Err(e) = self
            .store
            .set(key, &records, self.spec.freshness.ttl_secs())
            .await
        {
            warn!("缓存回写失败（数据仍正常返回）: key={}, err={}", key, e);
        }
        Ok(records)
    }

    /// 失效该域指定查询的缓存条目（两层）
    pub async fn invalidate(
        &self,
        params: &BTreeMap<String, String>,
        freq: Frequency,
    ) -> AppResult<()> {
        let key = cache_key::build(self.spec.name, params, freq);
        self.store.invalidate(&key).await
    }
}
