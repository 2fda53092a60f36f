use chrono::{Duration, TimeZone, Utc};

use pulse::indicator::{Atr, Ema, Indicator, IndicatorSet, Roc, Rsi, Sma};
use pulse::{Bar, IndicatorEngine, IndicatorError, IndicatorKind, IndicatorSpec, StandardIndicators};

fn bar_at(index: i64, high: f64, low: f64, close: f64) -> Bar {
    let start = Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap();
    Bar::new(start + Duration::minutes(index), close, high, low, close, 100.0)
}

fn closes(values: &[f64]) -> Vec<Bar> {
    values
        .iter()
        .enumerate()
        .map(|(i, c)| bar_at(i as i64, c + 0.5, c - 0.5, *c))
        .collect()
}

fn series(count: usize) -> Vec<Bar> {
    (0..count)
        .map(|i| {
            let wave = ((i % 7) as f64 - 3.0) * 0.15;
            let close = 1.0 + i as f64 * 0.01 + wave;
            bar_at(i as i64, close + 0.05, close - 0.05, close)
        })
        .collect()
}

fn run(indicator: &mut dyn Indicator, bars: &[Bar]) -> Vec<Option<f64>> {
    bars.iter().map(|b| indicator.update(b)).collect()
}

fn approx(actual: Option<f64>, expected: f64) {
    let actual = actual.expect("value should be defined");
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn sma_needs_full_window() {
    let mut sma = Sma::new(3).unwrap();
    let out = run(&mut sma, &closes(&[1.0, 2.0, 3.0, 4.0]));
    assert_eq!(out[0], None);
    assert_eq!(out[1], None);
    approx(out[2], 2.0);
    approx(out[3], 3.0);
    assert_eq!(sma.name(), "SMA_3");
}

#[test]
fn ema_is_seeded_with_simple_average() {
    let mut ema = Ema::new(3).unwrap();
    let out = run(&mut ema, &closes(&[1.0, 2.0, 3.0, 4.0, 5.0]));
    assert_eq!(out[1], None);
    approx(out[2], 2.0);
    approx(out[3], 3.0);
    approx(out[4], 4.0);
}

#[test]
fn rsi_uses_wilder_averages() {
    let mut rsi = Rsi::new(3).unwrap();
    let out = run(&mut rsi, &closes(&[10.0, 11.0, 10.0, 12.0]));
    assert_eq!(out[2], None);
    approx(out[3], 75.0);

    let mut rising = Rsi::new(3).unwrap();
    let out = run(&mut rising, &closes(&[1.0, 2.0, 3.0, 4.0]));
    approx(out[3], 100.0);
}

#[test]
fn roc_is_percent_change_and_flat_on_zero_base() {
    let mut roc = Roc::new(2).unwrap();
    let out = run(&mut roc, &closes(&[100.0, 50.0, 110.0]));
    assert_eq!(out[1], None);
    approx(out[2], 10.0);

    let mut zero = Roc::new(1).unwrap();
    let out = run(&mut zero, &closes(&[0.0, 1.0, 2.0]));
    assert_eq!(out[0], None);
    assert_eq!(out[1], Some(0.0));
    approx(out[2], 100.0);
}

#[test]
fn atr_starts_after_period_true_ranges() {
    let bars = vec![
        bar_at(0, 10.0, 8.0, 9.0),
        bar_at(1, 11.0, 9.0, 10.0),
        bar_at(2, 12.0, 10.5, 11.0),
        bar_at(3, 11.0, 10.0, 10.5),
    ];
    let mut atr = Atr::new(2).unwrap();
    let out = run(&mut atr, &bars);
    assert_eq!(out[0], None);
    assert_eq!(out[1], None);
    approx(out[2], 2.0);
    approx(out[3], 1.5);
}

#[test]
fn zero_period_is_rejected() {
    assert_eq!(
        Sma::new(0).unwrap_err(),
        IndicatorError::InvalidPeriod {
            kind: "sma",
            period: 0
        }
    );
    assert!(StandardIndicators::with_specs(vec![IndicatorSpec::new(IndicatorKind::Atr, 0)]).is_err());
}

#[test]
fn duplicate_names_are_rejected() {
    let result = StandardIndicators::with_specs(vec![
        IndicatorSpec::new(IndicatorKind::Sma, 5),
        IndicatorSpec::new(IndicatorKind::Ema, 5).named("SMA_5"),
    ]);
    assert_eq!(result, Err(IndicatorError::DuplicateName("SMA_5".to_string())));
}

#[test]
fn set_drops_leading_rows_and_keeps_later_gaps() {
    let mut set = IndicatorSet::default();
    set.register(Box::new(Sma::new(1).unwrap())).unwrap();
    set.register(Box::new(Roc::new(1).unwrap())).unwrap();

    let rows = set.rows(&closes(&[0.0, 1.0, 2.0, 0.0, 5.0]));
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].values.len(), 2);
    assert_eq!(rows[1].values.get("ROC_1").copied(), Some(-100.0));
    assert!(rows[2].values.get("ROC_1").is_none());
    assert_eq!(rows[2].values.get("SMA_1").copied(), Some(5.0));
}

#[test]
fn standard_engine_drops_rows_without_full_lookback() {
    let engine = StandardIndicators::new();
    assert!(engine.compute(&[]).unwrap().is_empty());
    assert!(engine.compute(&series(49)).unwrap().is_empty());
    assert_eq!(engine.compute(&series(50)).unwrap().len(), 1);

    let bars = series(60);
    let rows = engine.compute(&bars).unwrap();
    assert_eq!(rows.len(), 11);
    assert_eq!(rows.first().unwrap().bar, bars[49]);
    assert_eq!(rows.last().unwrap().bar, bars[59]);

    let names = rows.last().unwrap().values.keys().cloned().collect::<Vec<_>>();
    assert_eq!(
        names,
        vec!["ATR", "EMA_20", "EMA_50", "MOMENTUM_ROC_10", "RSI", "SMA_20", "SMA_50"]
    );
}

#[test]
fn standard_engine_is_deterministic_and_never_grows() {
    let engine = StandardIndicators::new();
    let bars = series(120);
    let first = engine.compute(&bars).unwrap();
    let second = engine.compute(&bars).unwrap();
    assert_eq!(first, second);
    assert!(first.len() <= bars.len());
}

#[test]
fn invalid_bars_are_excluded_from_input() {
    let engine = StandardIndicators::new();
    let mut bars = series(60);
    bars[30].close_price = f64::NAN;
    let rows = engine.compute(&bars).unwrap();
    assert_eq!(rows.len(), 10);
    assert!(rows.iter().all(|row| row.bar.is_valid()));
}
