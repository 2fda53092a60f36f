//! Pipeline configuration: defaults, optional YAML file, `PULSE_*` overrides.

use std::fmt::{Display, Formatter};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pulse::Timeframe;
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "PULSE_";
pub const CONFIG_PATH_ENV: &str = "PULSE_CONFIG";
pub const MAX_PUBLISH_TIMEOUT_MS: u64 = 2000;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_yaml::Error),
    InvalidEnv { key: String, value: String },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "read {}: {}", path.display(), source),
            Self::Parse(error) => write!(f, "parse config: {}", error),
            Self::InvalidEnv { key, value } => write!(f, "invalid value {:?} for {}", value, key),
            Self::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(error) => Some(error),
            _ => None,
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Parse(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Mock,
    Csv,
    #[serde(rename = "twelvedata")]
    TwelveData,
}

impl ProviderKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mock" => Some(Self::Mock),
            "csv" => Some(Self::Csv),
            "twelvedata" | "twelve_data" => Some(Self::TwelveData),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_retries: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            max_retries: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: Option<String>,
    pub ws_url: Option<String>,
    pub rest_url: Option<String>,
    pub csv_path: Option<PathBuf>,
    /// CSV rows held back from history and replayed live.
    pub replay_bars: usize,
    /// Minimum spacing between synthetic or replayed bars.
    pub emit_interval_ms: u64,
    pub seed: u64,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
    pub reconnect: ReconnectSettings,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Mock,
            api_key: None,
            ws_url: None,
            rest_url: None,
            csv_path: None,
            replay_bars: 100,
            emit_interval_ms: 1000,
            seed: 7,
            heartbeat_interval_ms: 10_000,
            heartbeat_timeout_ms: 60_000,
            reconnect: ReconnectSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub symbol: String,
    pub interval: Timeframe,
    pub history_capacity: usize,
    pub recent_window: usize,
    pub poll_interval_ms: u64,
    pub publish_timeout_ms: u64,
    pub subscriber_buffer: usize,
    pub shutdown_grace_ms: u64,
    pub bind_addr: String,
    pub log_level: String,
    /// `*` allows any origin.
    pub cors_origins: Vec<String>,
    pub provider: ProviderConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            symbol: "EUR/GBP".to_string(),
            interval: Timeframe::M1,
            history_capacity: 300,
            recent_window: 50,
            poll_interval_ms: 500,
            publish_timeout_ms: 1000,
            subscriber_buffer: 16,
            shutdown_grace_ms: 2000,
            bind_addr: "0.0.0.0:8000".to_string(),
            log_level: "info".to_string(),
            cors_origins: [
                "http://localhost:3000",
                "http://localhost:8080",
                "http://localhost:8000",
                "http://127.0.0.1:3000",
                "http://127.0.0.1:8080",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            provider: ProviderConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads from the process environment: `path` (or `PULSE_CONFIG`) then
    /// `PULSE_*` overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Same as [`PipelineConfig::load`] with an explicit variable lookup.
    pub fn load_with(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let from_env = lookup(CONFIG_PATH_ENV).filter(|x| !x.trim().is_empty()).map(PathBuf::from);
        let path = path.map(Path::to_path_buf).or(from_env);

        let mut config = match path {
            Some(path) => Self::from_yaml_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(|value| (key, value))
        };

        if let Some((_, value)) = get("SYMBOL") {
            self.symbol = value;
        }
        if let Some((key, value)) = get("INTERVAL") {
            self.interval = Timeframe::parse(&value).map_err(|_| ConfigError::InvalidEnv { key, value })?;
        }
        if let Some(kv) = get("HISTORY_CAPACITY") {
            self.history_capacity = parse_env(kv)?;
        }
        if let Some(kv) = get("RECENT_WINDOW") {
            self.recent_window = parse_env(kv)?;
        }
        if let Some(kv) = get("POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_env(kv)?;
        }
        if let Some(kv) = get("PUBLISH_TIMEOUT_MS") {
            self.publish_timeout_ms = parse_env(kv)?;
        }
        if let Some(kv) = get("SUBSCRIBER_BUFFER") {
            self.subscriber_buffer = parse_env(kv)?;
        }
        if let Some(kv) = get("SHUTDOWN_GRACE_MS") {
            self.shutdown_grace_ms = parse_env(kv)?;
        }
        if let Some((_, value)) = get("BIND_ADDR") {
            self.bind_addr = value;
        }
        if let Some((_, value)) = get("LOG_LEVEL") {
            self.log_level = value;
        }
        if let Some((_, value)) = get("CORS_ORIGINS") {
            self.cors_origins = value
                .split(',')
                .map(str::trim)
                .filter(|x| !x.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some((key, value)) = get("PROVIDER") {
            self.provider.kind =
                ProviderKind::parse(&value).ok_or(ConfigError::InvalidEnv { key, value })?;
        }
        if let Some((_, value)) = get("API_KEY") {
            self.provider.api_key = Some(value);
        }
        if let Some((_, value)) = get("WS_URL") {
            self.provider.ws_url = Some(value);
        }
        if let Some((_, value)) = get("REST_URL") {
            self.provider.rest_url = Some(value);
        }
        if let Some((_, value)) = get("CSV_PATH") {
            self.provider.csv_path = Some(PathBuf::from(value));
        }
        if let Some(kv) = get("REPLAY_BARS") {
            self.provider.replay_bars = parse_env(kv)?;
        }
        if let Some(kv) = get("EMIT_INTERVAL_MS") {
            self.provider.emit_interval_ms = parse_env(kv)?;
        }
        if let Some(kv) = get("HEARTBEAT_INTERVAL_MS") {
            self.provider.heartbeat_interval_ms = parse_env(kv)?;
        }
        if let Some(kv) = get("RECONNECT_MAX_RETRIES") {
            self.provider.reconnect.max_retries = parse_env(kv)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(invalid("symbol must not be empty"));
        }
        if self.history_capacity == 0 {
            return Err(invalid("history_capacity must be at least 1"));
        }
        if self.recent_window == 0 {
            return Err(invalid("recent_window must be at least 1"));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms must be at least 1"));
        }
        if !(1..=MAX_PUBLISH_TIMEOUT_MS).contains(&self.publish_timeout_ms) {
            return Err(invalid(format!(
                "publish_timeout_ms must be within 1..={MAX_PUBLISH_TIMEOUT_MS}"
            )));
        }
        if self.subscriber_buffer == 0 {
            return Err(invalid("subscriber_buffer must be at least 1"));
        }
        if self.bind_addr.parse::<SocketAddr>().is_err() {
            return Err(invalid(format!("bind_addr {:?} is not host:port", self.bind_addr)));
        }
        if self.provider.heartbeat_interval_ms == 0
            || self.provider.heartbeat_timeout_ms < self.provider.heartbeat_interval_ms
        {
            return Err(invalid(
                "heartbeat_timeout_ms must be >= heartbeat_interval_ms > 0",
            ));
        }

        match self.provider.kind {
            ProviderKind::Mock => {}
            ProviderKind::Csv => {
                if self.provider.csv_path.is_none() {
                    return Err(invalid("provider csv requires csv_path"));
                }
            }
            ProviderKind::TwelveData => {
                if self.provider.api_key.as_deref().is_none_or(|k| k.trim().is_empty()) {
                    return Err(invalid("provider twelvedata requires api_key"));
                }
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn parse_env<T: std::str::FromStr>((key, value): (String, String)) -> Result<T, ConfigError> {
    value
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}
