use std::fmt::{Display, Formatter};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use broker::{bootstrap_history, IngressPump, PumpConfig, PumpStats, ResilientAdapter};
use config::{ConfigError, PipelineConfig};
use gateway::AppState;
use market::{
	Aggregator, AggregatorConfig, AggregatorStats, BroadcastHub, Feed, FeedConfig, FeedMetrics,
	HubConfig, HubMetrics,
};
use pulse::StandardIndicators;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

mod provider;

pub use provider::{build_adapter, lifecycle_config};

#[derive(Debug)]
pub enum RuntimeError {
	Config(ConfigError),
	Bind { addr: String, source: io::Error },
	Spawn(io::Error),
	Task(String),
}

impl Display for RuntimeError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Config(err) => write!(f, "config: {}", err),
			Self::Bind { addr, source } => write!(f, "bind {}: {}", addr, source),
			Self::Spawn(err) => write!(f, "spawn ingress thread: {}", err),
			Self::Task(msg) => write!(f, "task failed: {}", msg),
		}
	}
}

impl std::error::Error for RuntimeError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Config(err) => Some(err),
			Self::Bind { source, .. } => Some(source),
			Self::Spawn(err) => Some(err),
			Self::Task(_) => None,
		}
	}
}

impl From<ConfigError> for RuntimeError {
	fn from(value: ConfigError) -> Self {
		Self::Config(value)
	}
}

/// Counters collected once every activity has stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
	pub aggregator: AggregatorStats,
	pub pump: PumpStats,
	pub hub: HubMetrics,
	pub feed: FeedMetrics,
}

pub struct Runtime {
	config: PipelineConfig,
}

impl Runtime {
	pub fn new(config: PipelineConfig) -> Self {
		Self { config }
	}

	pub fn config(&self) -> &PipelineConfig {
		&self.config
	}

	/// Binds the gateway, bootstraps history and starts every activity.
	pub async fn start(self) -> Result<RunningPipeline, RuntimeError> {
		let config = self.config;
		config.validate()?;

		let listener = TcpListener::bind(&config.bind_addr)
			.await
			.map_err(|source| RuntimeError::Bind {
				addr: config.bind_addr.clone(),
				source,
			})?;
		let local_addr = listener.local_addr().map_err(|source| RuntimeError::Bind {
			addr: config.bind_addr.clone(),
			source,
		})?;

		let feed = Arc::new(Feed::with_config(
			config.symbol.clone(),
			config.interval,
			FeedConfig {
				history_capacity: config.history_capacity,
			},
		));
		let hub = Arc::new(BroadcastHub::new(HubConfig {
			publish_timeout: config.publish_timeout(),
			subscriber_buffer: config.subscriber_buffer,
		}));

		let adapter = build_adapter(&config);
		let (adapter, loaded) = {
			let feed = Arc::clone(&feed);
			let limit = config.history_capacity;
			tokio::task::spawn_blocking(move || {
				let mut adapter = adapter;
				let loaded = bootstrap_history(&feed, &mut adapter, limit);
				(adapter, loaded)
			})
			.await
			.map_err(|err| RuntimeError::Task(err.to_string()))?
		};

		let resilient = ResilientAdapter::new(adapter, lifecycle_config(&config));
		let pump = IngressPump::spawn(
			Arc::clone(&feed),
			resilient,
			PumpConfig {
				idle_backoff: Duration::from_millis(20),
				error_backoff: Duration::from_millis(config.provider.reconnect.max_delay_ms.max(1)),
			},
		)
		.map_err(RuntimeError::Spawn)?;

		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		let aggregator = Aggregator::new(
			Arc::clone(&feed),
			Arc::new(StandardIndicators::new()),
			Arc::clone(&hub),
			AggregatorConfig {
				poll_interval: config.poll_interval(),
				recent_window: config.recent_window,
			},
		);
		let aggregator = tokio::spawn(aggregator.run(shutdown_rx.clone()));

		let app = gateway::router(
			AppState::new(Arc::clone(&hub), Arc::clone(&feed)),
			&config.cors_origins,
		);
		let server = tokio::spawn(gateway::serve(listener, app, shutdown_rx));

		info!(
			symbol = %config.symbol,
			interval = %config.interval,
			%local_addr,
			history = loaded,
			"pipeline started"
		);

		Ok(RunningPipeline {
			grace: config.shutdown_grace(),
			local_addr,
			feed,
			hub,
			shutdown_tx,
			aggregator,
			server: Some(server),
			pump,
		})
	}

	/// Runs until Ctrl-C.
	pub async fn run(self) -> Result<RunSummary, RuntimeError> {
		self.run_until(async {
			match tokio::signal::ctrl_c().await {
				Ok(()) => info!("interrupt received, shutting down"),
				Err(err) => error!(error = %err, "ctrl-c handler unavailable, shutting down"),
			}
		})
		.await
	}

	pub async fn run_until(self, signal: impl Future<Output = ()>) -> Result<RunSummary, RuntimeError> {
		let mut running = self.start().await?;
		let finished = match running.server.as_mut() {
			Some(server) => tokio::select! {
				_ = signal => None,
				result = server => Some(result),
			},
			None => {
				signal.await;
				None
			}
		};
		if let Some(result) = finished {
			running.server = None;
			match result {
				Ok(Ok(())) => warn!("gateway exited on its own"),
				Ok(Err(err)) => error!(error = %err, "gateway failed"),
				Err(err) => error!(error = %err, "gateway task aborted"),
			}
		}
		Ok(running.shutdown().await)
	}
}

/// Handles to a started pipeline.
pub struct RunningPipeline {
	grace: Duration,
	local_addr: SocketAddr,
	feed: Arc<Feed>,
	hub: Arc<BroadcastHub>,
	shutdown_tx: watch::Sender<bool>,
	aggregator: JoinHandle<AggregatorStats>,
	server: Option<JoinHandle<io::Result<()>>>,
	pump: IngressPump,
}

impl RunningPipeline {
	pub fn local_addr(&self) -> SocketAddr {
		self.local_addr
	}

	pub fn feed(&self) -> &Arc<Feed> {
		&self.feed
	}

	pub fn hub(&self) -> &Arc<BroadcastHub> {
		&self.hub
	}

	/// Stops the aggregator and gateway, the ingress thread, then closes the hub.
	/// Each stage is bounded by the shutdown grace period.
	pub async fn shutdown(self) -> RunSummary {
		let Self {
			grace,
			feed,
			hub,
			shutdown_tx,
			mut aggregator,
			server,
			pump,
			..
		} = self;

		let _ = shutdown_tx.send(true);

		let aggregator_stats = match tokio::time::timeout(grace, &mut aggregator).await {
			Ok(Ok(stats)) => stats,
			Ok(Err(err)) => {
				error!(error = %err, "aggregator task failed");
				AggregatorStats::default()
			}
			Err(_) => {
				warn!(grace_ms = grace.as_millis() as u64, "aggregator exceeded grace period, aborting");
				aggregator.abort();
				AggregatorStats::default()
			}
		};

		let pump_stop = tokio::task::spawn_blocking(move || pump.stop());
		let pump_stats = match tokio::time::timeout(grace, pump_stop).await {
			Ok(Ok(stats)) => stats,
			Ok(Err(err)) => {
				error!(error = %err, "ingress stop failed");
				PumpStats::default()
			}
			Err(_) => {
				warn!(grace_ms = grace.as_millis() as u64, "ingress exceeded grace period, detaching");
				PumpStats::default()
			}
		};

		hub.close();

		if let Some(mut server) = server {
			match tokio::time::timeout(grace, &mut server).await {
				Ok(Ok(Ok(()))) => {}
				Ok(Ok(Err(err))) => error!(error = %err, "gateway failed during shutdown"),
				Ok(Err(err)) if err.is_cancelled() => {}
				Ok(Err(err)) => error!(error = %err, "gateway task failed"),
				Err(_) => {
					warn!("gateway exceeded grace period, aborting");
					server.abort();
				}
			}
		}

		let summary = RunSummary {
			aggregator: aggregator_stats,
			pump: pump_stats,
			hub: hub.metrics(),
			feed: feed.metrics(),
		};
		info!(?summary, "pipeline stopped");
		summary
	}
}
