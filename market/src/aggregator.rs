//! 聚合循环模块。
//!
//! 以固定节拍（并在新 bar 写入时提前唤醒）检查历史缓冲末尾 bar 的时间戳；
//! 与上次已处理时间戳不同则触发指标计算、构建快照并交给广播中心。
//! 指标计算在阻塞线程池执行，历史缓冲锁不会跨越计算持有。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pulse::{Bar, IndicatorEngine};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::{AggregatorStats, BroadcastHub, Feed, PublishReport, SharedSnapshot, Snapshot};

/// 聚合循环配置。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorConfig {
	/// 轮询间隔。
	pub poll_interval: Duration,
	/// 快照中携带的最近 bar 数量（K）。
	pub recent_window: usize,
}

impl Default for AggregatorConfig {
	fn default() -> Self {
		Self {
			poll_interval: Duration::from_millis(500),
			recent_window: 50,
		}
	}
}

/// 单个周期的结果。
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
	/// 没有新的末尾 bar。
	Idle,
	/// 已构建并发布新快照。
	Published {
		snapshot: SharedSnapshot,
		report: PublishReport,
	},
	/// 指标结果为空，跳过发布（时间戳仍记为已处理）。
	Skipped { as_of: DateTime<Utc> },
	/// 指标计算失败，保留上一份快照。
	Failed { as_of: DateTime<Utc> },
}

/// 单品种聚合循环。
pub struct Aggregator {
	feed: Arc<Feed>,
	engine: Arc<dyn IndicatorEngine>,
	hub: Arc<BroadcastHub>,
	config: AggregatorConfig,
	last_processed: Option<DateTime<Utc>>,
	stats: AggregatorStats,
}

impl Aggregator {
	/// 创建聚合循环。
	pub fn new(
		feed: Arc<Feed>,
		engine: Arc<dyn IndicatorEngine>,
		hub: Arc<BroadcastHub>,
		config: AggregatorConfig,
	) -> Self {
		Self {
			feed,
			engine,
			hub,
			config: AggregatorConfig {
				poll_interval: config.poll_interval.max(Duration::from_millis(1)),
				recent_window: config.recent_window.max(1),
			},
			last_processed: None,
			stats: AggregatorStats::default(),
		}
	}

	/// 上次已处理的 bar 时间戳。
	pub fn last_processed(&self) -> Option<DateTime<Utc>> {
		self.last_processed
	}

	/// 返回当前统计。
	pub fn stats(&self) -> AggregatorStats {
		self.stats.clone()
	}

	/// 执行一个周期：检测新 bar → 计算指标 → 构建并发布快照。
	pub async fn run_cycle(&mut self) -> CycleOutcome {
		let detected = match self.feed.history().latest() {
			Some(bar) => bar.datetime,
			None => return CycleOutcome::Idle,
		};
		if self.last_processed == Some(detected) {
			return CycleOutcome::Idle;
		}

		let bars = Arc::new(self.feed.history().snapshot_sequence());
		let as_of = bars.last().map_or(detected, |bar| bar.datetime);
		self.stats.cycles += 1;
		// 无论结果如何都记为已处理，避免同一 bar 无限重算
		self.last_processed = Some(as_of);
		info!(bar_ts = %as_of, bars = bars.len(), "new bar detected, recomputing indicators");

		let engine = Arc::clone(&self.engine);
		let input = Arc::clone(&bars);
		let computed = tokio::task::spawn_blocking(move || engine.compute(&input)).await;

		let rows = match computed {
			Ok(Ok(rows)) => rows,
			Ok(Err(err)) => {
				self.stats.failed += 1;
				error!(bar_ts = %as_of, error = %err, "indicator computation failed, keeping previous snapshot");
				return CycleOutcome::Failed { as_of };
			}
			Err(err) => {
				self.stats.failed += 1;
				error!(bar_ts = %as_of, error = %err, "indicator task aborted, keeping previous snapshot");
				return CycleOutcome::Failed { as_of };
			}
		};

		let Some(row) = rows.last() else {
			self.stats.skipped += 1;
			warn!(bar_ts = %as_of, bars = bars.len(), "indicator result empty, skipping broadcast");
			return CycleOutcome::Skipped { as_of };
		};

		let snapshot = Arc::new(Snapshot {
			symbol: self.feed.symbol.clone(),
			interval: self.feed.timeframe,
			latest_price: self.feed.latest_price(),
			latest_indicators: row.values.clone(),
			recent_bars: recent_window(&bars, self.config.recent_window),
			as_of,
		});

		let report = self.hub.publish(Arc::clone(&snapshot)).await;
		self.stats.published += 1;
		debug!(
			bar_ts = %as_of,
			delivered = report.delivered,
			dropped = report.dropped.len(),
			"snapshot published"
		);
		CycleOutcome::Published { snapshot, report }
	}

	/// 持续运行直到收到关闭信号；进行中的周期在关闭时被放弃。
	pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> AggregatorStats {
		let mut ticker = tokio::time::interval(self.config.poll_interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		info!(
			symbol = %self.feed.symbol,
			poll_ms = self.config.poll_interval.as_millis() as u64,
			recent_window = self.config.recent_window,
			"aggregator started"
		);

		loop {
			tokio::select! {
				biased;
				_ = shutdown_requested(&mut shutdown) => break,
				_ = ticker.tick() => {}
				_ = self.feed.bar_committed() => {}
			}

			tokio::select! {
				biased;
				_ = shutdown_requested(&mut shutdown) => {
					info!("aggregator shutdown during cycle, in-flight work abandoned");
					break;
				}
				_ = self.run_cycle() => {}
			}
		}

		info!(stats = ?self.stats, "aggregator stopped");
		self.stats
	}
}

/// 关闭信号为 `true` 或发送端已释放时返回。
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
	loop {
		if *shutdown.borrow_and_update() {
			return;
		}
		if shutdown.changed().await.is_err() {
			return;
		}
	}
}

fn recent_window(bars: &[Bar], count: usize) -> Vec<Bar> {
	let start = bars.len().saturating_sub(count);
	bars[start..].to_vec()
}
