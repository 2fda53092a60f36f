use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use market::{Feed, HistoryPushResult};
use tracing::{debug, info, warn};

use crate::error::BrokerError;
use crate::protocol::{ExchangeAdapter, MarketEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpConfig {
    pub idle_backoff: Duration,
    pub error_backoff: Duration,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            idle_backoff: Duration::from_millis(20),
            error_backoff: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub bars: u64,
    pub prices: u64,
    pub heartbeats: u64,
    pub statuses: u64,
    pub errors: u64,
}

/// Loads bulk history into an empty feed before live streaming starts.
///
/// Returns the number of accepted bars; a provider failure is logged and
/// leaves the buffer untouched.
pub fn bootstrap_history<A: ExchangeAdapter + ?Sized>(
    feed: &Feed,
    adapter: &mut A,
    limit: usize,
) -> usize {
    match adapter.fetch_history(&feed.symbol, feed.timeframe, limit) {
        Ok(bars) => {
            let fetched = bars.len();
            let accepted = feed.bootstrap(bars);
            info!(
                venue = adapter.venue(),
                symbol = %feed.symbol,
                fetched,
                accepted,
                "history bootstrap finished"
            );
            accepted
        }
        Err(error) => {
            warn!(
                venue = adapter.venue(),
                symbol = %feed.symbol,
                %error,
                "history bootstrap failed, starting with empty buffer"
            );
            0
        }
    }
}

/// Applies one decoded event to the feed.
pub fn route_event(feed: &Feed, event: MarketEvent, stats: &mut PumpStats) {
    match event {
        MarketEvent::Price(tick) => {
            stats.prices += 1;
            feed.ingest_price(tick);
        }
        MarketEvent::Bar(bar) => {
            stats.bars += 1;
            let result = feed.ingest_bar(bar);
            if matches!(
                result,
                HistoryPushResult::RejectedInvalid | HistoryPushResult::RejectedOutOfOrder
            ) {
                debug!(?result, "bar not stored");
            }
        }
        MarketEvent::Heartbeat => stats.heartbeats += 1,
        MarketEvent::Status { ok, message } => {
            stats.statuses += 1;
            if ok {
                info!(%message, "upstream status");
            } else {
                warn!(%message, "upstream reported failure");
            }
        }
    }
}

/// Polls `count` times and routes whatever arrives. Stops at the first error.
pub fn pump_events<A: ExchangeAdapter + ?Sized>(
    feed: &Feed,
    count: usize,
    adapter: &mut A,
) -> Result<PumpStats, BrokerError> {
    let mut stats = PumpStats::default();
    for _ in 0..count {
        if let Some(event) = adapter.poll_event()? {
            route_event(feed, event, &mut stats);
        }
    }
    Ok(stats)
}

/// Dedicated thread moving adapter events into the feed until stopped.
pub struct IngressPump {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<PumpStats>>,
}

impl IngressPump {
    pub fn spawn<A>(feed: Arc<Feed>, mut adapter: A, config: PumpConfig) -> io::Result<Self>
    where
        A: ExchangeAdapter + 'static,
    {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        adapter.bind_stop_signal(stop_rx.clone());
        let handle = thread::Builder::new()
            .name(format!("ingress-{}", adapter.venue().to_ascii_lowercase()))
            .spawn(move || run_pump(&feed, &mut adapter, config, &stop_rx))?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signals the thread, waits for it and returns its counters.
    pub fn stop(mut self) -> PumpStats {
        self.shutdown()
    }

    fn shutdown(&mut self) -> PumpStats {
        drop(self.stop_tx.take());
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                warn!("ingress thread panicked");
                PumpStats::default()
            }),
            None => PumpStats::default(),
        }
    }
}

impl Drop for IngressPump {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown();
        }
    }
}

fn run_pump<A: ExchangeAdapter + ?Sized>(
    feed: &Feed,
    adapter: &mut A,
    config: PumpConfig,
    stop_rx: &Receiver<()>,
) -> PumpStats {
    let mut stats = PumpStats::default();
    let venue = adapter.venue().to_string();

    if let Err(error) = adapter.connect() {
        stats.errors += 1;
        warn!(%venue, %error, "initial connect failed, will retry while polling");
    }
    if let Err(error) = adapter.subscribe_symbol(&feed.symbol) {
        stats.errors += 1;
        warn!(%venue, symbol = %feed.symbol, %error, "subscribe failed");
    }
    info!(%venue, symbol = %feed.symbol, "ingress pump started");

    loop {
        match stop_rx.try_recv() {
            Err(TryRecvError::Empty) => {}
            _ => break,
        }

        let wait = match adapter.poll_event() {
            Ok(Some(event)) => {
                route_event(feed, event, &mut stats);
                continue;
            }
            Ok(None) => config.idle_backoff,
            Err(error) => {
                stats.errors += 1;
                warn!(%venue, %error, "poll failed, backing off");
                config.error_backoff
            }
        };

        match stop_rx.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => break,
        }
    }

    if let Err(error) = adapter.disconnect() {
        warn!(%venue, %error, "disconnect failed");
    }
    info!(%venue, ?stats, "ingress pump stopped");
    stats
}
