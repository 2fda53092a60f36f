use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, DurationRound, Utc};
use pulse::{Bar, PriceTick, Timeframe};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{BrokerError, ExchangeAdapter, MarketEvent};

/// Synthetic random-walk source. The same seed and anchor always produce the
/// same bars.
pub struct MockAdapter {
    symbol: String,
    timeframe: Timeframe,
    price: f64,
    rng: StdRng,
    next_datetime: DateTime<Utc>,
    pending_price: Option<PriceTick>,
    pacing: Option<StdDuration>,
    last_emit: Option<Instant>,
    connected: bool,
}

impl MockAdapter {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, start_price: f64, seed: u64) -> Self {
        let step = timeframe.duration();
        let anchor = Utc::now().duration_trunc(step).unwrap_or_else(|_| Utc::now());
        Self::with_anchor(symbol, timeframe, start_price, seed, anchor)
    }

    /// Pins the first live bar to `anchor`; history ends one step before it.
    pub fn with_anchor(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        start_price: f64,
        seed: u64,
        anchor: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            price: start_price,
            rng: StdRng::seed_from_u64(seed),
            next_datetime: anchor,
            pending_price: None,
            pacing: None,
            last_emit: None,
            connected: false,
        }
    }

    /// Emits at most one bar per `interval` instead of on every poll.
    pub fn with_pacing(mut self, interval: StdDuration) -> Self {
        self.pacing = Some(interval);
        self
    }

    fn next_noise(&mut self) -> f64 {
        self.rng.gen_range(-1.0..1.0)
    }

    fn walk(&mut self, datetime: DateTime<Utc>) -> Bar {
        let open = self.price;
        let close = (open * (1.0 + self.next_noise() * 0.002)).max(0.0001);
        let wick = open.max(close) * self.next_noise().abs() * 0.001;
        let high = open.max(close) + wick;
        let low = (open.min(close) - wick).max(0.0);
        let volume = (500.0 + self.next_noise().abs() * 1500.0).round();

        self.price = close;
        Bar::new(datetime, open, high, low, close, volume)
    }
}

impl ExchangeAdapter for MockAdapter {
    fn venue(&self) -> &str {
        "MOCK"
    }

    fn connect(&mut self) -> Result<(), BrokerError> {
        self.connected = true;
        Ok(())
    }

    fn poll_event(&mut self) -> Result<Option<MarketEvent>, BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }

        if let Some(tick) = self.pending_price.take() {
            return Ok(Some(MarketEvent::Price(tick)));
        }

        if let (Some(pacing), Some(last)) = (self.pacing, self.last_emit) {
            if last.elapsed() < pacing {
                return Ok(None);
            }
        }

        let datetime = self.next_datetime;
        self.next_datetime += self.timeframe.duration();
        let bar = self.walk(datetime);
        self.pending_price = Some(PriceTick::new(
            self.symbol.clone(),
            bar.close_price,
            bar.datetime,
        ));
        self.last_emit = Some(Instant::now());
        Ok(Some(MarketEvent::Bar(bar)))
    }

    fn fetch_history(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, BrokerError> {
        if symbol != self.symbol || timeframe != self.timeframe {
            return Err(BrokerError::HistoryUnavailable(format!(
                "mock serves {} {} only",
                self.symbol, self.timeframe
            )));
        }

        let count = i32::try_from(limit).map_err(|_| {
            BrokerError::HistoryUnavailable(format!("history limit {limit} out of range"))
        })?;
        let step = self.timeframe.duration();
        let mut bars = Vec::with_capacity(limit.min(4096));
        for back in (1..=count).rev() {
            let datetime = step
                .checked_mul(back)
                .and_then(|offset| self.next_datetime.checked_sub_signed(offset))
                .ok_or_else(|| {
                    BrokerError::HistoryUnavailable(format!("{back} bars back is out of range"))
                })?;
            bars.push(self.walk(datetime));
        }
        Ok(bars)
    }

    fn subscribe_symbol(&mut self, symbol: &str) -> Result<(), BrokerError> {
        self.symbol = symbol.to_string();
        Ok(())
    }

    fn heartbeat(&mut self) -> Result<(), BrokerError> {
        if self.connected {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }

    fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.connected = false;
        Ok(())
    }
}
