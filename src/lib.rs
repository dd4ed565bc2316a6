//! 行情数据增量同步缓存
//!
//! 指数行情、期权链、期货持仓、融资融券、历史K线等查询路径共用的
//! 缓存纪律：覆盖窗口判断、最小抓取区间、幂等合并、双层存储。

pub mod app_config;
pub mod error;
pub mod sync;
pub mod time_util;

pub use error::{AppError, AppResult};
pub use sync::coordinator::SyncCoordinator;
pub use sync::domain::{DomainSpec, Fetcher, FreshnessClass};
pub use sync::model::MysqlTier;
pub use sync::record::{temporal_key_of, Record, RecordSet};
pub use sync::store::{MemoryTier, RedisTier, StoreTier, TieredStore};
pub use time_util::{FixedCalendar, Frequency, TradingCalendar};
