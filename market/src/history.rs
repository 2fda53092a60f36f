//! 历史 bar 缓冲模块。
//!
//! 固定容量、按时间戳有序的环形缓冲：满载时淘汰最旧 bar，
//! 同时间戳视为盘中更新（原地替换），乱序 bar 直接拒绝。

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use pulse::Bar;
use tracing::warn;

/// 单次 `append_or_update` 的结果，供上层统计替换、淘汰与乱序行为。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryPushResult {
	/// 追加到末尾。
	Appended,
	/// 追加到末尾，并淘汰了最旧的一条。
	AppendedEvicted,
	/// 与最后一条同时间戳，原地替换。
	Replaced,
	/// 时间戳早于最后一条，已丢弃。
	RejectedOutOfOrder,
	/// 价格非有限值或成交量为负，已丢弃。
	RejectedInvalid,
}

impl HistoryPushResult {
	/// 是否产生了新的末尾 bar（追加而非替换/拒绝）。
	pub fn is_new_bar(self) -> bool {
		matches!(self, Self::Appended | Self::AppendedEvicted)
	}
}

/// 有界历史缓冲。
///
/// 内部互斥锁只在单次修改或复制期间持有，调用方拿到的永远是副本。
#[derive(Debug)]
pub struct HistoryBuffer {
	bars: Mutex<VecDeque<Bar>>,
	capacity: usize,
}

impl HistoryBuffer {
	/// 创建缓冲；容量为 0 时按 1 处理。
	pub fn new(capacity: usize) -> Self {
		let bounded_capacity = capacity.max(1);
		Self {
			bars: Mutex::new(VecDeque::with_capacity(bounded_capacity)),
			capacity: bounded_capacity,
		}
	}

	/// 写入一条 bar：追加、同时间戳替换或乱序拒绝。
	pub fn append_or_update(&self, bar: Bar) -> HistoryPushResult {
		if !bar.is_valid() {
			warn!(bar_ts = %bar.datetime, "invalid bar rejected");
			return HistoryPushResult::RejectedInvalid;
		}

		let mut bars = self.lock();
		let last_datetime = bars.back().map(|last| last.datetime);
		match last_datetime {
			Some(last) if bar.datetime == last => {
				if let Some(slot) = bars.back_mut() {
					*slot = bar;
				}
				HistoryPushResult::Replaced
			}
			Some(last) if bar.datetime < last => {
				warn!(
					bar_ts = %bar.datetime,
					last_ts = %last,
					"out-of-order bar rejected"
				);
				HistoryPushResult::RejectedOutOfOrder
			}
			_ => {
				let evicted = if bars.len() >= self.capacity {
					bars.pop_front();
					true
				} else {
					false
				};
				bars.push_back(bar);
				if evicted {
					HistoryPushResult::AppendedEvicted
				} else {
					HistoryPushResult::Appended
				}
			}
		}
	}

	/// 返回全部内容的有序副本。
	pub fn snapshot_sequence(&self) -> Vec<Bar> {
		self.lock().iter().cloned().collect()
	}

	/// 返回最近 `count` 条（时间正序）。
	pub fn tail(&self, count: usize) -> Vec<Bar> {
		let bars = self.lock();
		let skip = bars.len().saturating_sub(count);
		bars.iter().skip(skip).cloned().collect()
	}

	/// 最新一条 bar。
	pub fn latest(&self) -> Option<Bar> {
		self.lock().back().cloned()
	}

	/// 当前长度。
	pub fn len(&self) -> usize {
		self.lock().len()
	}

	/// 是否为空。
	pub fn is_empty(&self) -> bool {
		self.lock().is_empty()
	}

	/// 容量上限。
	pub fn capacity(&self) -> usize {
		self.capacity
	}

	/// 清空缓冲。
	pub fn clear(&self) {
		self.lock().clear();
	}

	fn lock(&self) -> MutexGuard<'_, VecDeque<Bar>> {
		self.bars.lock().unwrap_or_else(PoisonError::into_inner)
	}
}
