pub mod adapters;
pub mod error;
pub mod lifecycle;
pub mod pump;
pub mod protocol;

pub use adapters::{CsvReplayAdapter, MockAdapter, TwelveDataAdapter, TwelveDataConfig};
pub use error::BrokerError;
pub use lifecycle::{
	BrokerLifecycleConfig, BrokerLifecycleStats, ReconnectPolicy, ResilientAdapter,
};
pub use protocol::{ExchangeAdapter, MarketEvent, StopSignal};
pub use pump::{bootstrap_history, pump_events, route_event, IngressPump, PumpConfig, PumpStats};

#[cfg(test)]
mod tests {
	use super::{
		bootstrap_history, pump_events, BrokerError, BrokerLifecycleConfig, ExchangeAdapter,
		MarketEvent, ReconnectPolicy, ResilientAdapter,
	};
	use chrono::{Duration, TimeZone, Utc};
	use market::Feed;
	use pulse::{Bar, Timeframe};

	struct FlakyAdapter {
		connected: bool,
		connect_calls: u32,
		subscribe_calls: u32,
		poll_calls: u32,
		fail_first_connect: bool,
		fail_first_poll: bool,
	}

	impl FlakyAdapter {
		fn new() -> Self {
			Self {
				connected: false,
				connect_calls: 0,
				subscribe_calls: 0,
				poll_calls: 0,
				fail_first_connect: true,
				fail_first_poll: true,
			}
		}
	}

	impl ExchangeAdapter for FlakyAdapter {
		fn venue(&self) -> &str {
			"TEST"
		}

		fn connect(&mut self) -> Result<(), BrokerError> {
			self.connect_calls += 1;
			if self.fail_first_connect {
				self.fail_first_connect = false;
				return Err(BrokerError::ConnectionFailed("first connect fails".to_string()));
			}
			self.connected = true;
			Ok(())
		}

		fn subscribe_symbol(&mut self, _symbol: &str) -> Result<(), BrokerError> {
			if !self.connected {
				return Err(BrokerError::NotConnected);
			}
			self.subscribe_calls += 1;
			Ok(())
		}

		fn heartbeat(&mut self) -> Result<(), BrokerError> {
			if self.connected {
				Ok(())
			} else {
				Err(BrokerError::NotConnected)
			}
		}

		fn poll_event(&mut self) -> Result<Option<MarketEvent>, BrokerError> {
			if !self.connected {
				return Err(BrokerError::NotConnected);
			}

			self.poll_calls += 1;
			if self.fail_first_poll {
				self.fail_first_poll = false;
				self.connected = false;
				return Err(BrokerError::NotConnected);
			}

			let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
			let at = start + Duration::minutes(self.poll_calls as i64);
			Ok(Some(MarketEvent::Bar(Bar::new(at, 0.85, 0.86, 0.84, 0.855, 100.0))))
		}

		fn fetch_history(
			&mut self,
			_symbol: &str,
			_timeframe: Timeframe,
			_limit: usize,
		) -> Result<Vec<Bar>, BrokerError> {
			Err(BrokerError::HistoryUnavailable("no history endpoint".to_string()))
		}
	}

	fn fast_lifecycle() -> BrokerLifecycleConfig {
		BrokerLifecycleConfig {
			heartbeat_interval_ms: 5,
			heartbeat_timeout_ms: 50,
			reconnect: ReconnectPolicy {
				initial_delay_ms: 0,
				max_delay_ms: 0,
				max_retries: 3,
			},
		}
	}

	#[test]
	fn resilient_adapter_reconnects_and_recovers_subscription() {
		let feed = Feed::new("EUR/GBP", Timeframe::M1);
		let mut resilient = ResilientAdapter::new(FlakyAdapter::new(), fast_lifecycle());

		resilient
			.subscribe_symbol("EUR/GBP")
			.expect("pre-connection subscription must be accepted");

		let stats = pump_events(&feed, 2, &mut resilient)
			.expect("resilient pumping should recover and publish");
		assert_eq!(stats.bars, 2);
		assert_eq!(feed.history().len(), 2);

		let lifecycle = resilient.stats();
		assert!(lifecycle.reconnect_total >= 2);
		assert!(lifecycle.subscription_replays >= 1);
		assert!(resilient.inner().subscribe_calls >= 2);
		assert!(resilient.is_connected());
	}

	#[test]
	fn reconnect_gives_up_after_retries() {
		struct Dead;
		impl ExchangeAdapter for Dead {
			fn venue(&self) -> &str {
				"DEAD"
			}
			fn connect(&mut self) -> Result<(), BrokerError> {
				Err(BrokerError::ConnectionFailed("down".to_string()))
			}
			fn poll_event(&mut self) -> Result<Option<MarketEvent>, BrokerError> {
				Err(BrokerError::NotConnected)
			}
		}

		let mut resilient = ResilientAdapter::new(Dead, fast_lifecycle());
		assert!(matches!(resilient.poll_event(), Err(BrokerError::ConnectionFailed(_))));
		assert_eq!(resilient.stats().connect_failures, 3);
		assert!(!resilient.is_connected());
	}

	#[test]
	fn failed_bootstrap_leaves_feed_empty() {
		let feed = Feed::new("EUR/GBP", Timeframe::M1);
		let mut adapter = FlakyAdapter::new();
		assert_eq!(bootstrap_history(&feed, &mut adapter, 300), 0);
		assert!(feed.history().is_empty());
	}
}
