use std::collections::BTreeMap;

use crate::bar::Bar;

use super::core::{Indicator, IndicatorError};
use super::engine::IndicatorRow;

/// Ordered collection of indicators evaluated together over one bar series.
#[derive(Default)]
pub struct IndicatorSet {
    indicators: Vec<Box<dyn Indicator>>,
}

impl IndicatorSet {
    pub fn register(&mut self, indicator: Box<dyn Indicator>) -> Result<(), IndicatorError> {
        if self.indicators.iter().any(|x| x.name() == indicator.name()) {
            return Err(IndicatorError::DuplicateName(indicator.name().to_string()));
        }
        self.indicators.push(indicator);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.indicators.iter().map(|x| x.name().to_string()).collect()
    }

    pub fn reset(&mut self) {
        for indicator in &mut self.indicators {
            indicator.reset();
        }
    }

    /// Feeds one bar to every indicator. Undefined or non-finite values are
    /// left out of the returned map.
    pub fn update(&mut self, bar: &Bar) -> BTreeMap<String, f64> {
        let mut values = BTreeMap::new();
        for indicator in &mut self.indicators {
            if let Some(value) = indicator.update(bar).filter(|v| v.is_finite()) {
                values.insert(indicator.name().to_string(), value);
            }
        }
        values
    }

    /// Recomputes from scratch over `bars`, dropping leading rows until
    /// every indicator has produced a value.
    pub fn rows(&mut self, bars: &[Bar]) -> Vec<IndicatorRow> {
        self.reset();
        let expected = self.indicators.len();
        let mut rows = Vec::with_capacity(bars.len());
        for bar in bars {
            let values = self.update(bar);
            if rows.is_empty() && values.len() < expected {
                continue;
            }
            rows.push(IndicatorRow {
                bar: bar.clone(),
                values,
            });
        }
        rows
    }
}
