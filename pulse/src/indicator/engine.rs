use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::bar::Bar;

use super::core::{IndicatorError, IndicatorKind, IndicatorSpec};
use super::manager::IndicatorSet;

/// A bar annotated with derived values. Undefined values are absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorRow {
    pub bar: Bar,
    pub values: BTreeMap<String, f64>,
}

/// Pure mapping from an ordered bar sequence to indicator rows.
///
/// Implementations must be deterministic, keep input order and never return
/// more rows than bars given.
pub trait IndicatorEngine: Send + Sync {
    fn compute(&self, bars: &[Bar]) -> Result<Vec<IndicatorRow>, IndicatorError>;
}

impl<F> IndicatorEngine for F
where
    F: Fn(&[Bar]) -> Result<Vec<IndicatorRow>, IndicatorError> + Send + Sync,
{
    fn compute(&self, bars: &[Bar]) -> Result<Vec<IndicatorRow>, IndicatorError> {
        self(bars)
    }
}

/// RSI, SMA/EMA 20 and 50, 10-bar momentum and ATR by default.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardIndicators {
    specs: Vec<IndicatorSpec>,
}

impl Default for StandardIndicators {
    fn default() -> Self {
        Self {
            specs: default_specs(),
        }
    }
}

impl StandardIndicators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the specs up front so `compute` cannot fail on them later.
    pub fn with_specs(specs: Vec<IndicatorSpec>) -> Result<Self, IndicatorError> {
        build_set(&specs)?;
        Ok(Self { specs })
    }

    pub fn specs(&self) -> &[IndicatorSpec] {
        &self.specs
    }
}

impl IndicatorEngine for StandardIndicators {
    fn compute(&self, bars: &[Bar]) -> Result<Vec<IndicatorRow>, IndicatorError> {
        let mut set = build_set(&self.specs)?;
        if bars.iter().all(Bar::is_valid) {
            return Ok(set.rows(bars));
        }

        let clean = bars.iter().filter(|b| b.is_valid()).cloned().collect::<Vec<_>>();
        debug!(
            dropped = bars.len() - clean.len(),
            "invalid bars excluded from indicator input"
        );
        Ok(set.rows(&clean))
    }
}

pub fn default_specs() -> Vec<IndicatorSpec> {
    vec![
        IndicatorSpec::new(IndicatorKind::Rsi, 14).named("RSI"),
        IndicatorSpec::new(IndicatorKind::Sma, 20),
        IndicatorSpec::new(IndicatorKind::Sma, 50),
        IndicatorSpec::new(IndicatorKind::Ema, 20),
        IndicatorSpec::new(IndicatorKind::Ema, 50),
        IndicatorSpec::new(IndicatorKind::Roc, 10).named("MOMENTUM_ROC_10"),
        IndicatorSpec::new(IndicatorKind::Atr, 14).named("ATR"),
    ]
}

fn build_set(specs: &[IndicatorSpec]) -> Result<IndicatorSet, IndicatorError> {
    let mut set = IndicatorSet::default();
    for spec in specs {
        set.register(spec.build()?)?;
    }
    Ok(set)
}
