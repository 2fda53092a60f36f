//! `market` crate 入口。
//!
//! 职责：单品种有界历史缓冲、行情入口、聚合循环与快照广播（fan-out）。
//! 该文件只做模块装配与统一导出，具体实现位于各子模块。
//!
//! 模块分工：
//! - `history`：有界、按时间戳有序的历史缓冲。
//! - `feed`：上游 ingest 的统一入口（历史 + 最新价格 + 新 bar 通知）。
//! - `snapshot`：不可变广播快照。
//! - `hub`：订阅者注册表与带超时的并发投递。
//! - `aggregator`：变化检测、指标计算与发布循环。
//! - `metrics`：运行指标快照。
//!
//! 快速示例：
//! ```rust
//! use std::sync::Arc;
//! use market::{Aggregator, AggregatorConfig, BroadcastHub, Feed};
//! use pulse::{StandardIndicators, Timeframe};
//!
//! let feed = Arc::new(Feed::new("EUR/GBP", Timeframe::M1));
//! let hub = Arc::new(BroadcastHub::default());
//! let aggregator = Aggregator::new(
//!     feed.clone(),
//!     Arc::new(StandardIndicators::new()),
//!     hub.clone(),
//!     AggregatorConfig::default(),
//! );
//! let mut sub = hub.subscribe();
//! assert!(sub.try_recv().is_none());
//! assert!(aggregator.last_processed().is_none());
//! ```

mod aggregator;
mod feed;
mod history;
mod hub;
mod metrics;
mod snapshot;

pub use aggregator::{shutdown_requested, Aggregator, AggregatorConfig, CycleOutcome};
pub use feed::{Feed, FeedConfig};
pub use history::{HistoryBuffer, HistoryPushResult};
pub use hub::{BroadcastHub, HubConfig, PublishReport, SubscriberHandle};
pub use metrics::{AggregatorStats, FeedMetrics, HubMetrics};
pub use snapshot::{SharedSnapshot, Snapshot};
