use std::collections::HashMap;
use std::io::Write;

use config::{ConfigError, PipelineConfig, ProviderKind};
use pulse::Timeframe;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<HashMap<_, _>>();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn env_overrides_win_over_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "symbol: EUR/GBP\nhistory_capacity: 120\npoll_interval_ms: 250").unwrap();

    let config = PipelineConfig::load_with(
        Some(file.path()),
        env(&[
            ("PULSE_HISTORY_CAPACITY", "500"),
            ("PULSE_INTERVAL", "1h"),
            ("PULSE_CORS_ORIGINS", "http://a.test, http://b.test"),
        ]),
    )
    .unwrap();

    assert_eq!(config.history_capacity, 500);
    assert_eq!(config.poll_interval_ms, 250);
    assert_eq!(config.interval, Timeframe::H1);
    assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
}

#[test]
fn config_path_can_come_from_environment() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "symbol: USD/JPY").unwrap();
    let path = file.path().to_string_lossy().to_string();

    let config = PipelineConfig::load_with(None, env(&[("PULSE_CONFIG", path.as_str())])).unwrap();
    assert_eq!(config.symbol, "USD/JPY");
}

#[test]
fn no_file_and_no_env_gives_defaults() {
    let config = PipelineConfig::load_with(None, env(&[])).unwrap();
    assert_eq!(config, PipelineConfig::default());
}

#[test]
fn missing_file_is_io_error() {
    let result = PipelineConfig::load_with(Some("/nonexistent/pulse.yaml".as_ref()), env(&[]));
    assert!(matches!(result, Err(ConfigError::Io { .. })));
}

#[test]
fn malformed_yaml_is_parse_error() {
    let result = PipelineConfig::from_yaml_str("history_capacity: [1, 2");
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn unparseable_env_value_is_rejected() {
    let result = PipelineConfig::load_with(None, env(&[("PULSE_HISTORY_CAPACITY", "lots")]));
    assert!(matches!(
        result,
        Err(ConfigError::InvalidEnv { ref key, .. }) if key == "PULSE_HISTORY_CAPACITY"
    ));

    let result = PipelineConfig::load_with(None, env(&[("PULSE_PROVIDER", "bloomberg")]));
    assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));
}

#[test]
fn validation_rejects_out_of_range_values() {
    let cases: Vec<(&str, fn(&mut PipelineConfig))> = vec![
        ("zero capacity", |c| c.history_capacity = 0),
        ("zero window", |c| c.recent_window = 0),
        ("zero poll", |c| c.poll_interval_ms = 0),
        ("zero timeout", |c| c.publish_timeout_ms = 0),
        ("timeout above cap", |c| c.publish_timeout_ms = 2001),
        ("zero buffer", |c| c.subscriber_buffer = 0),
        ("bad bind", |c| c.bind_addr = "localhost".to_string()),
        ("empty symbol", |c| c.symbol = " ".to_string()),
        ("csv without path", |c| c.provider.kind = ProviderKind::Csv),
        ("twelvedata without key", |c| c.provider.kind = ProviderKind::TwelveData),
    ];

    for (name, mutate) in cases {
        let mut config = PipelineConfig::default();
        mutate(&mut config);
        assert!(
            matches!(config.validate(), Err(ConfigError::Invalid(_))),
            "{name} should be rejected"
        );
    }

    let mut config = PipelineConfig::default();
    config.publish_timeout_ms = 2000;
    config.provider.kind = ProviderKind::TwelveData;
    config.provider.api_key = Some("demo".to_string());
    config.validate().unwrap();
}

#[test]
fn provider_kind_uses_lowercase_labels() {
    let config = PipelineConfig::from_yaml_str("provider:\n  kind: twelvedata\n  api_key: k\n").unwrap();
    assert_eq!(config.provider.kind, ProviderKind::TwelveData);
    assert_eq!(config.provider.api_key.as_deref(), Some("k"));
}
