//! 指标快照模块。
//!
//! 提供 feed、广播中心与聚合循环关键运行指标的只读快照结构。

/// feed 运行指标快照。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedMetrics {
	/// 追加到历史缓冲的 bar 数量（含淘汰旧 bar 的追加）。
	pub appended: u64,
	/// 同时间戳原地替换次数。
	pub replaced: u64,
	/// 因容量淘汰的旧 bar 数量。
	pub evicted: u64,
	/// 乱序拒绝数量。
	pub rejected_out_of_order: u64,
	/// 数据质量不合格被丢弃的数量。
	pub rejected_invalid: u64,
	/// 收到的价格 tick 数量。
	pub price_ticks: u64,
	/// 历史缓冲当前长度。
	pub history_len: usize,
	/// 历史缓冲容量上限。
	pub history_capacity: usize,
}

/// 广播中心运行指标快照。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubMetrics {
	/// `publish` 调用次数。
	pub published: u64,
	/// 成功投递的消息总数。
	pub delivered: u64,
	/// 因投递失败或超时被移除的订阅者数量。
	pub dropped_subscribers: u64,
	/// 当前订阅者数量。
	pub subscribers: usize,
}

/// 聚合循环运行指标快照。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatorStats {
	/// 检测到新 bar 并进入计算的次数。
	pub cycles: u64,
	/// 成功发布快照次数。
	pub published: u64,
	/// 指标结果为空而跳过的次数。
	pub skipped: u64,
	/// 指标计算失败次数。
	pub failed: u64,
}
