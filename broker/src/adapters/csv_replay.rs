use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration as StdDuration, Instant};

use pulse::{load_bars_csv, Bar, PriceTick, Timeframe};
use tracing::info;

use crate::{BrokerError, ExchangeAdapter, MarketEvent};

/// Serves a CSV file as history plus a live replay of its last rows.
pub struct CsvReplayAdapter {
    symbol: String,
    history: Vec<Bar>,
    replay: VecDeque<Bar>,
    pending_price: Option<PriceTick>,
    pacing: Option<StdDuration>,
    last_emit: Option<Instant>,
    connected: bool,
}

impl CsvReplayAdapter {
    /// Loads `path`; the last `replay_bars` rows are held back for `poll_event`.
    pub fn open(
        path: impl AsRef<Path>,
        symbol: impl Into<String>,
        replay_bars: usize,
    ) -> Result<Self, BrokerError> {
        let path = path.as_ref();
        let mut history = load_bars_csv(path)?;
        let split = history.len().saturating_sub(replay_bars);
        let replay: VecDeque<Bar> = history.split_off(split).into();
        info!(
            path = %path.display(),
            history = history.len(),
            replay = replay.len(),
            "csv source loaded"
        );
        Ok(Self::from_bars(symbol, history, replay))
    }

    pub fn from_bars(symbol: impl Into<String>, history: Vec<Bar>, replay: VecDeque<Bar>) -> Self {
        Self {
            symbol: symbol.into(),
            history,
            replay,
            pending_price: None,
            pacing: None,
            last_emit: None,
            connected: false,
        }
    }

    pub fn with_pacing(mut self, interval: StdDuration) -> Self {
        self.pacing = Some(interval);
        self
    }

    pub fn remaining(&self) -> usize {
        self.replay.len()
    }
}

impl ExchangeAdapter for CsvReplayAdapter {
    fn venue(&self) -> &str {
        "CSV"
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

        let Some(bar) = self.replay.pop_front() else {
            return Ok(None);
        };
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
        _symbol: &str,
        _timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, BrokerError> {
        let start = self.history.len().saturating_sub(limit);
        Ok(self.history[start..].to_vec())
    }

    fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.connected = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::CsvReplayAdapter;
    use crate::{ExchangeAdapter, MarketEvent};
    use pulse::Timeframe;

    fn fixture() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "datetime,open,high,low,close,volume").unwrap();
        writeln!(file, "2024-03-01 10:02:00,1.2,1.3,1.1,1.25,10").unwrap();
        writeln!(file, "2024-03-01 10:00:00,1.0,1.1,0.9,1.05,10").unwrap();
        writeln!(file, "2024-03-01 10:01:00,1.1,1.2,1.0,1.15,").unwrap();
        writeln!(file, "2024-03-01 10:03:00,abc,1.4,1.2,1.35,10").unwrap();
        writeln!(file, "2024-03-01 10:04:00,1.3,1.5,1.3,1.45,12").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn splits_history_and_replay_dropping_bad_rows() {
        let file = fixture();
        let mut adapter = CsvReplayAdapter::open(file.path(), "EUR/GBP", 1).unwrap();

        let history = adapter.fetch_history("EUR/GBP", Timeframe::M1, 300).unwrap();
        let closes = history.iter().map(|b| b.close_price).collect::<Vec<_>>();
        assert_eq!(closes, vec![1.05, 1.15, 1.25]);
        assert_eq!(history[1].volume, 0.0);
        assert_eq!(adapter.remaining(), 1);

        let tail = adapter.fetch_history("EUR/GBP", Timeframe::M1, 2).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].close_price, 1.15);
    }

    #[test]
    fn replays_bar_then_price_then_goes_idle() {
        let file = fixture();
        let mut adapter = CsvReplayAdapter::open(file.path(), "EUR/GBP", 1).unwrap();
        assert!(adapter.poll_event().is_err());
        adapter.connect().unwrap();

        let Some(MarketEvent::Bar(bar)) = adapter.poll_event().unwrap() else {
            panic!("expected replayed bar");
        };
        assert_eq!(bar.close_price, 1.45);
        let Some(MarketEvent::Price(tick)) = adapter.poll_event().unwrap() else {
            panic!("expected price after bar");
        };
        assert_eq!(tick.price, 1.45);
        assert!(adapter.poll_event().unwrap().is_none());
    }

    #[test]
    fn missing_file_reports_history_unavailable() {
        let result = CsvReplayAdapter::open("/nonexistent/bars.csv", "EUR/GBP", 0);
        assert!(matches!(result, Err(crate::BrokerError::HistoryUnavailable(_))));
    }
}
