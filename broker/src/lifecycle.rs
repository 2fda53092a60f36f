use std::thread;
use std::time::{Duration as StdDuration, Instant};

use crossbeam::channel::{RecvTimeoutError, TryRecvError};
use pulse::{Bar, Timeframe};
use tracing::{info, warn};

use crate::error::BrokerError;
use crate::protocol::{ExchangeAdapter, MarketEvent, StopSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_retries: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            max_retries: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry `attempt` (1-based): doubles from the initial delay,
    /// capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> StdDuration {
        let shift = attempt.saturating_sub(1).min(16);
        let ms = self
            .initial_delay_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_delay_ms.max(self.initial_delay_ms));
        StdDuration::from_millis(ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerLifecycleConfig {
    pub heartbeat_interval_ms: u64,
    /// Longest gap between successful polls before the link is rebuilt.
    pub heartbeat_timeout_ms: u64,
    pub reconnect: ReconnectPolicy,
}

impl Default for BrokerLifecycleConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 10_000,
            heartbeat_timeout_ms: 60_000,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerLifecycleStats {
    pub reconnect_total: u64,
    pub connect_failures: u64,
    pub heartbeat_failures: u64,
    pub subscription_replays: u64,
}

#[derive(Debug, Clone, Copy)]
enum Link {
    Down,
    Up { last_ok: Instant, last_heartbeat: Instant },
}

/// Keeps an adapter connected: reconnects with backoff, sends heartbeats and
/// replays subscriptions after every reconnect.
pub struct ResilientAdapter<A: ExchangeAdapter> {
    adapter: A,
    config: BrokerLifecycleConfig,
    link: Link,
    subscriptions: Vec<String>,
    stats: BrokerLifecycleStats,
    stop: Option<StopSignal>,
}

impl<A: ExchangeAdapter> ResilientAdapter<A> {
    pub fn new(adapter: A, config: BrokerLifecycleConfig) -> Self {
        Self {
            adapter,
            config,
            link: Link::Down,
            subscriptions: Vec::new(),
            stats: BrokerLifecycleStats::default(),
            stop: None,
        }
    }

    pub fn stats(&self) -> BrokerLifecycleStats {
        self.stats.clone()
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.link, Link::Up { .. })
    }

    pub fn inner(&self) -> &A {
        &self.adapter
    }

    fn mark_down(&mut self, reason: &str, error: Option<&BrokerError>) {
        self.link = Link::Down;
        match error {
            Some(error) => warn!(venue = self.adapter.venue(), reason, %error, "link down"),
            None => warn!(venue = self.adapter.venue(), reason, "link down"),
        }
    }

    fn stopping(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|stop| !matches!(stop.try_recv(), Err(TryRecvError::Empty)))
    }

    /// Returns false when the stop signal fired during the wait.
    fn pause(&self, delay: StdDuration) -> bool {
        match &self.stop {
            Some(stop) => matches!(stop.recv_timeout(delay), Err(RecvTimeoutError::Timeout)),
            None => {
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                true
            }
        }
    }

    fn ensure_live(&mut self) -> Result<(), BrokerError> {
        let Link::Up { last_ok, last_heartbeat } = self.link else {
            return self.reconnect_with_backoff();
        };

        if last_ok.elapsed() >= StdDuration::from_millis(self.config.heartbeat_timeout_ms) {
            self.stats.heartbeat_failures += 1;
            self.mark_down("no successful poll within heartbeat timeout", None);
            return self.reconnect_with_backoff();
        }

        if last_heartbeat.elapsed() >= StdDuration::from_millis(self.config.heartbeat_interval_ms) {
            self.link = Link::Up {
                last_ok,
                last_heartbeat: Instant::now(),
            };
            if let Err(error) = self.adapter.heartbeat() {
                self.stats.heartbeat_failures += 1;
                self.mark_down("heartbeat rejected", Some(&error));
                return self.reconnect_with_backoff();
            }
        }

        Ok(())
    }

    fn reconnect_with_backoff(&mut self) -> Result<(), BrokerError> {
        let policy = self.config.reconnect;
        let mut last_error = None;

        for attempt in 0..policy.max_retries.max(1) {
            let proceed = if attempt == 0 {
                !self.stopping()
            } else {
                self.pause(policy.delay_for(attempt))
            };
            if !proceed {
                info!(venue = self.adapter.venue(), attempt, "reconnect abandoned, ingress stopping");
                return Err(BrokerError::Stopped);
            }

            if let Err(error) = self.adapter.connect() {
                self.stats.connect_failures += 1;
                warn!(venue = self.adapter.venue(), attempt, %error, "connect attempt failed");
                last_error = Some(error);
                continue;
            }

            let now = Instant::now();
            self.link = Link::Up {
                last_ok: now,
                last_heartbeat: now,
            };
            self.stats.reconnect_total += 1;
            info!(venue = self.adapter.venue(), attempt, "upstream connected");

            for symbol in &self.subscriptions {
                self.adapter.subscribe_symbol(symbol)?;
                self.stats.subscription_replays += 1;
            }
            return Ok(());
        }

        let detail = last_error.map_or_else(|| "no attempt made".to_string(), |e| e.to_string());
        Err(BrokerError::ConnectionFailed(format!(
            "gave up after {} attempts: {}",
            policy.max_retries.max(1),
            detail
        )))
    }

    fn touch(&mut self) {
        if let Link::Up { last_heartbeat, .. } = self.link {
            self.link = Link::Up {
                last_ok: Instant::now(),
                last_heartbeat,
            };
        }
    }
}

impl<A: ExchangeAdapter> ExchangeAdapter for ResilientAdapter<A> {
    fn venue(&self) -> &str {
        self.adapter.venue()
    }

    fn connect(&mut self) -> Result<(), BrokerError> {
        self.reconnect_with_backoff()
    }

    fn poll_event(&mut self) -> Result<Option<MarketEvent>, BrokerError> {
        self.ensure_live()?;

        let event = match self.adapter.poll_event() {
            Ok(event) => event,
            Err(error) => {
                self.stats.connect_failures += 1;
                self.mark_down("poll failed", Some(&error));
                self.reconnect_with_backoff()?;
                self.adapter.poll_event()?
            }
        };
        self.touch();
        Ok(event)
    }

    fn fetch_history(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, BrokerError> {
        self.adapter.fetch_history(symbol, timeframe, limit)
    }

    /// Remembered for replay; forwarded at once when the link is up.
    fn subscribe_symbol(&mut self, symbol: &str) -> Result<(), BrokerError> {
        if !self.subscriptions.iter().any(|x| x == symbol) {
            self.subscriptions.push(symbol.to_string());
        }
        if self.is_connected() {
            self.adapter.subscribe_symbol(symbol)?;
        }
        Ok(())
    }

    fn heartbeat(&mut self) -> Result<(), BrokerError> {
        self.adapter.heartbeat()
    }

    fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.link = Link::Down;
        self.adapter.disconnect()
    }

    fn bind_stop_signal(&mut self, stop: StopSignal) {
        self.adapter.bind_stop_signal(stop.clone());
        self.stop = Some(stop);
    }
}

#[cfg(test)]
mod tests {
    use super::ReconnectPolicy;
    use std::time::Duration;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = ReconnectPolicy {
            initial_delay_ms: 100,
            max_delay_ms: 500,
            max_retries: 5,
        };
        let delays = (1..=5).map(|n| policy.delay_for(n)).collect::<Vec<_>>();
        assert_eq!(
            delays,
            [100, 200, 400, 500, 500].map(Duration::from_millis).to_vec()
        );
    }

    #[test]
    fn zero_policy_never_sleeps() {
        let policy = ReconnectPolicy {
            initial_delay_ms: 0,
            max_delay_ms: 0,
            max_retries: 3,
        };
        assert!(policy.delay_for(3).is_zero());
    }
}
