use std::collections::VecDeque;
use std::time::Duration;

use broker::{
	BrokerLifecycleConfig, CsvReplayAdapter, ExchangeAdapter, MockAdapter, ReconnectPolicy,
	TwelveDataAdapter, TwelveDataConfig,
};
use config::{PipelineConfig, ProviderKind};
use tracing::{error, info};

/// Builds the configured upstream source.
///
/// A CSV file that cannot be read degrades to an empty source so the gateway
/// still comes up.
pub fn build_adapter(config: &PipelineConfig) -> Box<dyn ExchangeAdapter> {
	let provider = &config.provider;
	let pacing = Duration::from_millis(provider.emit_interval_ms);
	info!(kind = ?provider.kind, symbol = %config.symbol, interval = %config.interval, "building provider");

	match provider.kind {
		ProviderKind::Mock => Box::new(
			MockAdapter::new(config.symbol.clone(), config.interval, 1.0, provider.seed)
				.with_pacing(pacing),
		),
		ProviderKind::Csv => {
			let path = provider.csv_path.clone().unwrap_or_default();
			match CsvReplayAdapter::open(&path, config.symbol.clone(), provider.replay_bars) {
				Ok(adapter) => Box::new(adapter.with_pacing(pacing)),
				Err(err) => {
					error!(path = %path.display(), error = %err, "csv source unavailable, serving no data");
					Box::new(CsvReplayAdapter::from_bars(
						config.symbol.clone(),
						Vec::new(),
						VecDeque::new(),
					))
				}
			}
		}
		ProviderKind::TwelveData => {
			let mut td = TwelveDataConfig::new(provider.api_key.clone().unwrap_or_default());
			if let Some(url) = &provider.ws_url {
				td.ws_url = url.clone();
			}
			if let Some(url) = &provider.rest_url {
				td.rest_url = url.clone();
			}
			td.stale_after = Duration::from_millis(provider.heartbeat_timeout_ms);
			Box::new(TwelveDataAdapter::new(config.symbol.clone(), td))
		}
	}
}

pub fn lifecycle_config(config: &PipelineConfig) -> BrokerLifecycleConfig {
	let provider = &config.provider;
	BrokerLifecycleConfig {
		heartbeat_interval_ms: provider.heartbeat_interval_ms,
		heartbeat_timeout_ms: provider.heartbeat_timeout_ms,
		reconnect: ReconnectPolicy {
			initial_delay_ms: provider.reconnect.initial_delay_ms,
			max_delay_ms: provider.reconnect.max_delay_ms,
			max_retries: provider.reconnect.max_retries,
		},
	}
}
