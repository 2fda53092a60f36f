use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use config::PipelineConfig;
use runtime::Runtime;
use tracing::{error, info};

fn main() -> ExitCode {
	let config_path = std::env::args_os().nth(1).map(PathBuf::from);
	let config = match PipelineConfig::load(config_path.as_deref()) {
		Ok(config) => config,
		Err(err) => {
			eprintln!("pulse: {err}");
			return ExitCode::FAILURE;
		}
	};

	pulse::init_logging(&config.log_level);
	let grace = config.shutdown_grace();

	let tokio_runtime = match tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.thread_name("pulse-worker")
		.build()
	{
		Ok(rt) => rt,
		Err(err) => {
			error!(error = %err, "failed to build async runtime");
			return ExitCode::FAILURE;
		}
	};

	let outcome = tokio_runtime.block_on(Runtime::new(config).run());
	// work detached during shutdown must not hold the process open
	tokio_runtime.shutdown_timeout(grace.max(Duration::from_millis(100)));

	match outcome {
		Ok(summary) => {
			info!(
				published = summary.aggregator.published,
				bars = summary.pump.bars,
				delivered = summary.hub.delivered,
				"pulse live runtime done"
			);
			ExitCode::SUCCESS
		}
		Err(err) => {
			error!(error = %err, "pulse live runtime failed");
			ExitCode::FAILURE
		}
	}
}
