//! `Feed` 主模块。
//!
//! 聚合历史缓冲、最新价格 tick 与新 bar 通知，是上游 ingest 的唯一入口；
//! 下游（聚合循环）只通过只读副本访问历史。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use pulse::{Bar, PriceTick, Timeframe};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::{FeedMetrics, HistoryBuffer, HistoryPushResult};

/// `Feed` 初始化配置。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedConfig {
	/// 历史缓冲容量。
	pub history_capacity: usize,
}

impl Default for FeedConfig {
	fn default() -> Self {
		Self {
			history_capacity: 300,
		}
	}
}

/// 单一品种的行情入口。
#[derive(Debug)]
pub struct Feed {
	/// 品种标识。
	pub symbol: String,
	/// bar 周期。
	pub timeframe: Timeframe,
	history: HistoryBuffer,
	latest_price: RwLock<Option<PriceTick>>,
	bar_committed: Notify,
	appended: AtomicU64,
	replaced: AtomicU64,
	evicted: AtomicU64,
	rejected_out_of_order: AtomicU64,
	rejected_invalid: AtomicU64,
	price_ticks: AtomicU64,
}

impl Feed {
	/// 使用默认配置创建 `Feed`。
	pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
		Self::with_config(symbol, timeframe, FeedConfig::default())
	}

	/// 使用完整配置创建 `Feed`。
	pub fn with_config(symbol: impl Into<String>, timeframe: Timeframe, config: FeedConfig) -> Self {
		Self {
			symbol: symbol.into(),
			timeframe,
			history: HistoryBuffer::new(config.history_capacity),
			latest_price: RwLock::new(None),
			bar_committed: Notify::new(),
			appended: AtomicU64::new(0),
			replaced: AtomicU64::new(0),
			evicted: AtomicU64::new(0),
			rejected_out_of_order: AtomicU64::new(0),
			rejected_invalid: AtomicU64::new(0),
			price_ticks: AtomicU64::new(0),
		}
	}

	/// 启动阶段一次性灌入历史 bar（按时间排序后逐条写入）。
	///
	/// 返回被接受（追加或替换）的数量。
	pub fn bootstrap(&self, mut bars: Vec<Bar>) -> usize {
		bars.sort_by_key(|bar| bar.datetime);
		let total = bars.len();
		let accepted = bars
			.into_iter()
			.map(|bar| self.ingest_bar(bar))
			.filter(|result| {
				!matches!(
					result,
					HistoryPushResult::RejectedOutOfOrder | HistoryPushResult::RejectedInvalid
				)
			})
			.count();
		info!(
			symbol = %self.symbol,
			total,
			accepted,
			history_len = self.history.len(),
			"history bootstrap complete"
		);
		accepted
	}

	/// 写入一条 bar；产生新末尾 bar 时唤醒聚合循环。
	pub fn ingest_bar(&self, bar: Bar) -> HistoryPushResult {
		let result = self.history.append_or_update(bar);
		match result {
			HistoryPushResult::Appended => {
				self.appended.fetch_add(1, Ordering::Relaxed);
			}
			HistoryPushResult::AppendedEvicted => {
				self.appended.fetch_add(1, Ordering::Relaxed);
				self.evicted.fetch_add(1, Ordering::Relaxed);
			}
			HistoryPushResult::Replaced => {
				self.replaced.fetch_add(1, Ordering::Relaxed);
			}
			HistoryPushResult::RejectedOutOfOrder => {
				self.rejected_out_of_order.fetch_add(1, Ordering::Relaxed);
			}
			HistoryPushResult::RejectedInvalid => {
				self.rejected_invalid.fetch_add(1, Ordering::Relaxed);
			}
		}

		if result.is_new_bar() {
			self.bar_committed.notify_one();
		}
		result
	}

	/// 更新最新价格 tick（与 bar 完成无关）。
	pub fn ingest_price(&self, tick: PriceTick) {
		debug!(symbol = %tick.symbol, price = tick.price, "price tick");
		*self
			.latest_price
			.write()
			.unwrap_or_else(PoisonError::into_inner) = Some(tick);
		self.price_ticks.fetch_add(1, Ordering::Relaxed);
	}

	/// 最新价格 tick。
	pub fn latest_price(&self) -> Option<PriceTick> {
		self.latest_price
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}

	/// 历史缓冲（只读访问）。
	pub fn history(&self) -> &HistoryBuffer {
		&self.history
	}

	/// 等待下一条新 bar；若此前已有未消费的通知则立即返回。
	pub async fn bar_committed(&self) {
		self.bar_committed.notified().await;
	}

	/// 返回当前指标快照。
	pub fn metrics(&self) -> FeedMetrics {
		FeedMetrics {
			appended: self.appended.load(Ordering::Relaxed),
			replaced: self.replaced.load(Ordering::Relaxed),
			evicted: self.evicted.load(Ordering::Relaxed),
			rejected_out_of_order: self.rejected_out_of_order.load(Ordering::Relaxed),
			rejected_invalid: self.rejected_invalid.load(Ordering::Relaxed),
			price_ticks: self.price_ticks.load(Ordering::Relaxed),
			history_len: self.history.len(),
			history_capacity: self.history.capacity(),
		}
	}
}
