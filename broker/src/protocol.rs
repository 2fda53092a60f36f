use crossbeam::channel::Receiver;
use pulse::{Bar, PriceTick, Timeframe};

use crate::error::BrokerError;

/// One decoded upstream message.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Price(PriceTick),
    Bar(Bar),
    Heartbeat,
    Status { ok: bool, message: String },
}

/// Disconnected by the driving pump when it is told to stop.
pub type StopSignal = Receiver<()>;

/// Upstream market-data provider. Driven from a dedicated thread, so every
/// call may block.
pub trait ExchangeAdapter: Send {
    fn venue(&self) -> &str;
    fn connect(&mut self) -> Result<(), BrokerError>;
    fn poll_event(&mut self) -> Result<Option<MarketEvent>, BrokerError>;

    /// Bulk history, oldest first, at most `limit` bars.
    fn fetch_history(
        &mut self,
        _symbol: &str,
        _timeframe: Timeframe,
        _limit: usize,
    ) -> Result<Vec<Bar>, BrokerError> {
        Ok(Vec::new())
    }

    fn subscribe_symbol(&mut self, _symbol: &str) -> Result<(), BrokerError> {
        Ok(())
    }

    fn heartbeat(&mut self) -> Result<(), BrokerError> {
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BrokerError> {
        Ok(())
    }

    /// Lets long waits inside the adapter end early when ingestion stops.
    fn bind_stop_signal(&mut self, _stop: StopSignal) {}
}

impl<A: ExchangeAdapter + ?Sized> ExchangeAdapter for Box<A> {
    fn venue(&self) -> &str {
        (**self).venue()
    }

    fn connect(&mut self) -> Result<(), BrokerError> {
        (**self).connect()
    }

    fn poll_event(&mut self) -> Result<Option<MarketEvent>, BrokerError> {
        (**self).poll_event()
    }

    fn fetch_history(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, BrokerError> {
        (**self).fetch_history(symbol, timeframe, limit)
    }

    fn subscribe_symbol(&mut self, symbol: &str) -> Result<(), BrokerError> {
        (**self).subscribe_symbol(symbol)
    }

    fn heartbeat(&mut self) -> Result<(), BrokerError> {
        (**self).heartbeat()
    }

    fn disconnect(&mut self) -> Result<(), BrokerError> {
        (**self).disconnect()
    }

    fn bind_stop_signal(&mut self, stop: StopSignal) {
        (**self).bind_stop_signal(stop)
    }
}
