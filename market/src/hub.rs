//! 广播中心模块（fan-out）。
//!
//! 维护订阅者注册表与最新快照。`publish` 在锁内完成"记录最新快照 + 复制订阅者集合"，
//! 投递在锁外并发进行，每个订阅者独立超时；投递失败或超时的订阅者被移除，
//! 不影响其他订阅者。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{HubMetrics, SharedSnapshot};

/// 广播中心配置。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
	/// 单个订阅者单次投递的超时上限。
	pub publish_timeout: Duration,
	/// 每个订阅者的待投递缓冲容量。
	pub subscriber_buffer: usize,
}

impl Default for HubConfig {
	fn default() -> Self {
		Self {
			publish_timeout: Duration::from_secs(1),
			subscriber_buffer: 16,
		}
	}
}

/// 订阅者持有的接收端。
///
/// 丢弃 handle 等同于断开：下一次投递失败时该订阅者会被移除。
#[derive(Debug)]
pub struct SubscriberHandle {
	id: u64,
	receiver: mpsc::Receiver<SharedSnapshot>,
}

impl SubscriberHandle {
	/// 订阅者 id（用于 `unsubscribe`）。
	pub fn id(&self) -> u64 {
		self.id
	}

	/// 等待下一份快照；广播中心关闭或已被移除时返回 `None`。
	pub async fn recv(&mut self) -> Option<SharedSnapshot> {
		self.receiver.recv().await
	}

	/// 非阻塞读取一份已投递的快照。
	pub fn try_recv(&mut self) -> Option<SharedSnapshot> {
		self.receiver.try_recv().ok()
	}
}

/// 单次 `publish` 的投递结果。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
	/// 本次发布锁定的目标订阅者数量。
	pub targeted: usize,
	/// 投递成功数量。
	pub delivered: usize,
	/// 投递失败或超时而被移除的订阅者 id。
	pub dropped: Vec<u64>,
}

#[derive(Debug, Default)]
struct Registry {
	subscribers: HashMap<u64, mpsc::Sender<SharedSnapshot>>,
	latest: Option<SharedSnapshot>,
	closed: bool,
}

/// 快照广播中心。
#[derive(Debug)]
pub struct BroadcastHub {
	registry: Mutex<Registry>,
	config: HubConfig,
	next_id: AtomicU64,
	published: AtomicU64,
	delivered: AtomicU64,
	dropped_subscribers: AtomicU64,
}

impl Default for BroadcastHub {
	fn default() -> Self {
		Self::new(HubConfig::default())
	}
}

impl BroadcastHub {
	/// 创建广播中心。
	pub fn new(config: HubConfig) -> Self {
		Self {
			registry: Mutex::new(Registry::default()),
			config: HubConfig {
				publish_timeout: config.publish_timeout,
				subscriber_buffer: config.subscriber_buffer.max(1),
			},
			next_id: AtomicU64::new(1),
			published: AtomicU64::new(0),
			delivered: AtomicU64::new(0),
			dropped_subscribers: AtomicU64::new(0),
		}
	}

	/// 注册新订阅者；若已有最新快照，先于任何实时发布投递给它。
	pub fn subscribe(&self) -> SubscriberHandle {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let (tx, receiver) = mpsc::channel(self.config.subscriber_buffer);

		let mut registry = self.lock();
		if registry.closed {
			debug!(subscriber = id, "hub closed, subscriber stream ends immediately");
			return SubscriberHandle { id, receiver };
		}
		if let Some(latest) = registry.latest.clone() {
			// fresh channel, capacity >= 1
			let _ = tx.try_send(latest);
		}
		registry.subscribers.insert(id, tx);
		let total = registry.subscribers.len();
		drop(registry);

		info!(subscriber = id, total, "subscriber registered");
		SubscriberHandle { id, receiver }
	}

	/// 移除订阅者；重复调用无副作用。返回本次是否真正移除。
	pub fn unsubscribe(&self, id: u64) -> bool {
		let mut registry = self.lock();
		let removed = registry.subscribers.remove(&id).is_some();
		let total = registry.subscribers.len();
		drop(registry);

		if removed {
			info!(subscriber = id, total, "subscriber removed");
		}
		removed
	}

	/// 向发布时刻的全部订阅者投递快照。
	///
	/// 订阅者集合在开始时一次性复制；期间新加入的订阅者由订阅时的初始投递补偿。
	pub async fn publish(&self, snapshot: SharedSnapshot) -> PublishReport {
		let targets = {
			let mut registry = self.lock();
			if registry.closed {
				return PublishReport::default();
			}
			registry.latest = Some(snapshot.clone());
			registry
				.subscribers
				.iter()
				.map(|(id, tx)| (*id, tx.clone()))
				.collect::<Vec<_>>()
		};
		self.published.fetch_add(1, Ordering::Relaxed);

		let timeout = self.config.publish_timeout;
		let outcomes = join_all(targets.into_iter().map(|(id, tx)| {
			let snapshot = snapshot.clone();
			async move {
				let delivered = matches!(
					tokio::time::timeout(timeout, tx.send(snapshot)).await,
					Ok(Ok(()))
				);
				(id, delivered)
			}
		}))
		.await;

		let mut report = PublishReport {
			targeted: outcomes.len(),
			..PublishReport::default()
		};
		for (id, delivered) in outcomes {
			if delivered {
				report.delivered += 1;
			} else {
				report.dropped.push(id);
			}
		}

		if !report.dropped.is_empty() {
			let mut registry = self.lock();
			for id in &report.dropped {
				registry.subscribers.remove(id);
			}
			drop(registry);
			warn!(
				dropped = ?report.dropped,
				"subscribers removed after failed or timed out delivery"
			);
		}

		self.delivered
			.fetch_add(report.delivered as u64, Ordering::Relaxed);
		self.dropped_subscribers
			.fetch_add(report.dropped.len() as u64, Ordering::Relaxed);
		report
	}

	/// 当前生效的配置。
	pub fn config(&self) -> HubConfig {
		self.config
	}

	/// 最新快照（查询接口）。
	pub fn latest(&self) -> Option<SharedSnapshot> {
		self.lock().latest.clone()
	}

	/// 当前订阅者数量。
	pub fn subscriber_count(&self) -> usize {
		self.lock().subscribers.len()
	}

	/// 是否已关闭。
	pub fn is_closed(&self) -> bool {
		self.lock().closed
	}

	/// 关闭广播中心：释放全部发送端，订阅者流在排空后结束。
	pub fn close(&self) {
		let mut registry = self.lock();
		registry.closed = true;
		let closed = registry.subscribers.len();
		registry.subscribers.clear();
		drop(registry);
		info!(closed, "broadcast hub closed");
	}

	/// 返回当前指标快照。
	pub fn metrics(&self) -> HubMetrics {
		HubMetrics {
			published: self.published.load(Ordering::Relaxed),
			delivered: self.delivered.load(Ordering::Relaxed),
			dropped_subscribers: self.dropped_subscribers.load(Ordering::Relaxed),
			subscribers: self.subscriber_count(),
		}
	}

	fn lock(&self) -> MutexGuard<'_, Registry> {
		self.registry.lock().unwrap_or_else(PoisonError::into_inner)
	}
}
