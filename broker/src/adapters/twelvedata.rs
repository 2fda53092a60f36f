use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use crossbeam::channel;
use crossbeam::queue::SegQueue;
use futures_util::{SinkExt, StreamExt};
use pulse::{bar_from_fields, parse_datetime, Bar, PriceTick, Timeframe};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::BrokerError;
use crate::protocol::{ExchangeAdapter, MarketEvent, StopSignal};

pub const DEFAULT_WS_URL: &str = "wss://ws.twelvedata.com/v1/quotes/price";
pub const DEFAULT_REST_URL: &str = "https://api.twelvedata.com/time_series";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwelveDataConfig {
    pub api_key: String,
    pub ws_url: String,
    pub rest_url: String,
    pub request_timeout: StdDuration,
    /// Upper bound on the websocket handshake and initial subscribe.
    pub connect_timeout: StdDuration,
    /// A stream with no inbound frame for this long fails its next heartbeat.
    pub stale_after: StdDuration,
}

impl TwelveDataConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ws_url: DEFAULT_WS_URL.to_string(),
            rest_url: DEFAULT_REST_URL.to_string(),
            request_timeout: StdDuration::from_secs(15),
            connect_timeout: StdDuration::from_secs(10),
            stale_after: StdDuration::from_secs(60),
        }
    }
}

#[derive(Debug)]
enum StreamCommand {
    Subscribe(Vec<String>),
    Heartbeat,
    Close,
}

pub struct TwelveDataAdapter {
    config: TwelveDataConfig,
    symbol: String,
    connected: bool,
    subscriptions: BTreeSet<String>,
    queue: Arc<SegQueue<MarketEvent>>,
    ws_running: Arc<AtomicBool>,
    ws_epoch: Arc<AtomicU64>,
    last_message_ms: Arc<AtomicI64>,
    commands: Option<mpsc::UnboundedSender<StreamCommand>>,
    stop: Option<StopSignal>,
}

impl TwelveDataAdapter {
    pub fn new(symbol: impl Into<String>, config: TwelveDataConfig) -> Self {
        Self {
            config,
            symbol: symbol.into(),
            connected: false,
            subscriptions: BTreeSet::new(),
            queue: Arc::new(SegQueue::new()),
            ws_running: Arc::new(AtomicBool::new(false)),
            ws_epoch: Arc::new(AtomicU64::new(0)),
            last_message_ms: Arc::new(AtomicI64::new(0)),
            commands: None,
            stop: None,
        }
    }

    fn stream_url(&self) -> String {
        if self.config.api_key.is_empty() {
            return self.config.ws_url.clone();
        }
        let separator = if self.config.ws_url.contains('?') { '&' } else { '?' };
        format!("{}{}apikey={}", self.config.ws_url, separator, self.config.api_key)
    }

    fn spawn_ws_reader(&mut self) -> Result<(), BrokerError> {
        let queue = Arc::clone(&self.queue);
        let ws_running = Arc::clone(&self.ws_running);
        let ws_epoch = Arc::clone(&self.ws_epoch);
        let last_message_ms = Arc::clone(&self.last_message_ms);
        let endpoint = self.stream_url();
        let symbols = self.subscriptions.iter().cloned().collect::<Vec<_>>();
        let current_epoch = ws_epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let (tx, mut rx) = mpsc::unbounded_channel::<StreamCommand>();
        let (ready_tx, ready_rx) = channel::bounded::<Result<(), String>>(1);

        ws_running.store(true, Ordering::Release);
        last_message_ms.store(Utc::now().timestamp_millis(), Ordering::Release);
        let spawned = thread::Builder::new()
            .name("twelvedata-ws".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(error) => {
                        let _ = ready_tx.send(Err(format!("stream runtime: {error}")));
                        return;
                    }
                };

                runtime.block_on(async move {
                    let (stream, _) = match tokio_tungstenite::connect_async(endpoint.as_str()).await {
                        Ok(ok) => ok,
                        Err(error) => {
                            let _ = ready_tx.send(Err(error.to_string()));
                            return;
                        }
                    };

                    let (mut write, mut read) = stream.split();
                    if write
                        .send(Message::Text(subscribe_action(&symbols)))
                        .await
                        .is_err()
                    {
                        let _ = ready_tx.send(Err("subscribe rejected by stream".to_string()));
                        return;
                    }
                    info!(symbols = ?symbols, "stream connected");
                    let _ = ready_tx.send(Ok(()));

                    loop {
                        if ws_epoch.load(Ordering::Acquire) != current_epoch {
                            break;
                        }

                        tokio::select! {
                            command = rx.recv() => {
                                let outgoing = match command {
                                    Some(StreamCommand::Subscribe(symbols)) => subscribe_action(&symbols),
                                    Some(StreamCommand::Heartbeat) => heartbeat_action(),
                                    Some(StreamCommand::Close) | None => {
                                        let _ = write.send(Message::Close(None)).await;
                                        break;
                                    }
                                };
                                if write.send(Message::Text(outgoing)).await.is_err() {
                                    break;
                                }
                            }
                            message = read.next() => {
                                if matches!(message, Some(Ok(_))) {
                                    last_message_ms.store(Utc::now().timestamp_millis(), Ordering::Release);
                                }
                                match message {
                                    Some(Ok(Message::Text(text))) => match parse_event(&text) {
                                        Ok(Some(event)) => queue.push(event),
                                        Ok(None) => debug!(%text, "ignoring stream message"),
                                        Err(error) => warn!(%error, "malformed stream message"),
                                    },
                                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                    Some(Ok(_)) => {}
                                }
                            }
                        }
                    }

                    if ws_epoch.load(Ordering::Acquire) == current_epoch {
                        ws_running.store(false, Ordering::Release);
                    }
                });
            });

        if let Err(error) = spawned {
            self.ws_running.store(false, Ordering::Release);
            return Err(BrokerError::ConnectionFailed(error.to_string()));
        }

        let stop = self.stop.clone().unwrap_or_else(channel::never);
        let outcome = channel::select! {
            recv(ready_rx) -> ready => ready.unwrap_or_else(|_| Err("stream reader exited".to_string())),
            recv(stop) -> _ => Err("ingress stopping".to_string()),
            default(self.config.connect_timeout) => Err(format!(
                "handshake not finished within {}ms",
                self.config.connect_timeout.as_millis()
            )),
        };
        match outcome {
            Ok(()) => {
                self.commands = Some(tx);
                Ok(())
            }
            Err(reason) => {
                // retire the reader in case it is still mid-handshake
                self.ws_epoch.fetch_add(1, Ordering::AcqRel);
                self.ws_running.store(false, Ordering::Release);
                Err(BrokerError::ConnectionFailed(reason))
            }
        }
    }

    fn send_command(&self, command: StreamCommand) -> Result<(), BrokerError> {
        let sender = self.commands.as_ref().ok_or(BrokerError::NotConnected)?;
        sender
            .send(command)
            .map_err(|_| BrokerError::ConnectionFailed("stream reader gone".to_string()))
    }
}

impl ExchangeAdapter for TwelveDataAdapter {
    fn venue(&self) -> &str {
        "TWELVEDATA"
    }

    fn connect(&mut self) -> Result<(), BrokerError> {
        self.connected = false;
        self.subscriptions.insert(self.symbol.clone());
        self.spawn_ws_reader()?;
        self.connected = true;
        Ok(())
    }

    fn poll_event(&mut self) -> Result<Option<MarketEvent>, BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }

        if let Some(event) = self.queue.pop() {
            return Ok(Some(event));
        }

        if !self.ws_running.load(Ordering::Acquire) {
            self.connected = false;
            return Err(BrokerError::ConnectionFailed("stream closed".to_string()));
        }

        Ok(None)
    }

    fn fetch_history(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, BrokerError> {
        let outputsize = limit.to_string();
        let url = reqwest::Url::parse_with_params(
            &self.config.rest_url,
            &[
                ("symbol", symbol),
                ("interval", timeframe.as_str()),
                ("outputsize", outputsize.as_str()),
                ("timezone", "UTC"),
                ("apikey", self.config.api_key.as_str()),
            ],
        )
        .map_err(|e| BrokerError::HistoryUnavailable(e.to_string()))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(self.config.request_timeout)
            .build()
            .map_err(|e| BrokerError::HistoryUnavailable(e.to_string()))?;
        let body = client
            .get(url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.text())
            .map_err(|e| BrokerError::HistoryUnavailable(e.to_string()))?;

        let mut bars = parse_time_series(&body)?;
        let start = bars.len().saturating_sub(limit);
        Ok(bars.split_off(start))
    }

    fn subscribe_symbol(&mut self, symbol: &str) -> Result<(), BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }
        if self.subscriptions.insert(symbol.to_string()) {
            self.send_command(StreamCommand::Subscribe(vec![symbol.to_string()]))?;
        }
        Ok(())
    }

    fn heartbeat(&mut self) -> Result<(), BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }
        let silent_ms = Utc::now().timestamp_millis() - self.last_message_ms.load(Ordering::Acquire);
        if silent_ms > self.config.stale_after.as_millis() as i64 {
            return Err(BrokerError::ConnectionFailed(format!(
                "stream silent for {}ms",
                silent_ms
            )));
        }
        self.send_command(StreamCommand::Heartbeat)
    }

    fn bind_stop_signal(&mut self, stop: StopSignal) {
        self.stop = Some(stop);
    }

    fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.connected = false;
        self.ws_epoch.fetch_add(1, Ordering::AcqRel);
        if let Some(sender) = self.commands.take() {
            let _ = sender.send(StreamCommand::Close);
        }
        Ok(())
    }
}

fn subscribe_action(symbols: &[String]) -> String {
    json!({"action": "subscribe", "params": {"symbols": symbols.join(",")}}).to_string()
}

fn heartbeat_action() -> String {
    json!({"action": "heartbeat"}).to_string()
}

/// Decodes one stream message. Unknown event kinds yield `Ok(None)`.
pub fn parse_event(text: &str) -> Result<Option<MarketEvent>, BrokerError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| BrokerError::AdapterError(format!("invalid json: {e}")))?;
    let kind = value.get("event").and_then(Value::as_str).unwrap_or_default();

    match kind {
        "price" => {
            let symbol = value
                .get("symbol")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("price", "symbol"))?;
            let price = number_field(&value, "price").ok_or_else(|| malformed("price", "price"))?;
            let timestamp =
                datetime_field(&value, "timestamp").ok_or_else(|| malformed("price", "timestamp"))?;
            Ok(Some(MarketEvent::Price(PriceTick::new(symbol, price, timestamp))))
        }
        "ohlc" => {
            let timestamp =
                datetime_field(&value, "timestamp").ok_or_else(|| malformed("ohlc", "timestamp"))?;
            let mut ohlc = [0.0; 4];
            for (slot, key) in ohlc.iter_mut().zip(["open", "high", "low", "close"]) {
                *slot = number_field(&value, key).ok_or_else(|| malformed("ohlc", key))?;
            }
            let volume = number_field(&value, "volume").unwrap_or(0.0);
            let [open, high, low, close] = ohlc;
            Ok(Some(MarketEvent::Bar(Bar::new(timestamp, open, high, low, close, volume))))
        }
        "heartbeat" => Ok(Some(MarketEvent::Heartbeat)),
        "subscribe-status" => {
            let ok = value.get("status").and_then(Value::as_str) != Some("error");
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string());
            Ok(Some(MarketEvent::Status { ok, message }))
        }
        _ => Ok(None),
    }
}

/// Decodes a `time_series` response into bars, oldest first.
pub fn parse_time_series(body: &str) -> Result<Vec<Bar>, BrokerError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| BrokerError::HistoryUnavailable(format!("invalid json: {e}")))?;

    if value.get("status").and_then(Value::as_str) == Some("error") {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("provider error");
        return Err(BrokerError::HistoryUnavailable(message.to_string()));
    }

    let rows = value
        .get("values")
        .and_then(Value::as_array)
        .ok_or_else(|| BrokerError::HistoryUnavailable("response has no values".to_string()))?;

    let mut bars = Vec::with_capacity(rows.len());
    for row in rows {
        let text = |key: &str| match row.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        let volume = text("volume");
        let volume = (!volume.is_empty()).then_some(volume);
        match bar_from_fields(
            &text("datetime"),
            &text("open"),
            &text("high"),
            &text("low"),
            &text("close"),
            volume.as_deref(),
        ) {
            Ok(bar) => bars.push(bar),
            Err(error) => warn!(%error, "dropping malformed time_series row"),
        }
    }

    bars.sort_by_key(|bar| bar.datetime);
    Ok(bars)
}

fn malformed(kind: &str, field: &str) -> BrokerError {
    BrokerError::AdapterError(format!("{kind} event missing or invalid `{field}`"))
}

fn number_field(value: &Value, key: &str) -> Option<f64> {
    let number = match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|x| x.is_finite())
}

fn datetime_field(value: &Value, key: &str) -> Option<DateTime<Utc>> {
    match value.get(key)? {
        Value::Number(n) => parse_datetime(&n.as_i64()?.to_string()).ok(),
        Value::String(s) => parse_datetime(s).ok(),
        _ => None,
    }
}
