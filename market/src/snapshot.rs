//! 广播快照模块。
//!
//! `Snapshot` 是单次发布周期的完整、不可变载荷；每个周期整体替换，
//! 订阅者永远不会看到被部分修改的视图。

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pulse::{Bar, PriceTick, Timeframe};
use serde::{Deserialize, Serialize};

/// 单次发布的不可变快照。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
	/// 品种标识。
	pub symbol: String,
	/// bar 周期标签。
	pub interval: Timeframe,
	/// 最新价格 tick（可能比 bar 收盘价更新得更频繁）。
	pub latest_price: Option<PriceTick>,
	/// 最近一行完整计算的指标值。
	pub latest_indicators: BTreeMap<String, f64>,
	/// 最近 K 条 bar（时间正序），用于绘图。
	pub recent_bars: Vec<Bar>,
	/// 触发本次计算的 bar 时间戳。
	#[serde(rename = "timestamp")]
	pub as_of: DateTime<Utc>,
}

/// 在订阅者之间共享的快照指针类型。
pub type SharedSnapshot = Arc<Snapshot>;

impl Snapshot {
	/// 序列化为推送给客户端的 JSON 文本。
	pub fn to_json(&self) -> serde_json::Result<String> {
		serde_json::to_string(self)
	}
}
