use crate::bar::Bar;

use super::core::{check_period, Indicator, IndicatorError};

/// Wilder ATR. True range starts at the second bar; the first value is the
/// plain mean of the first `period` true ranges.
#[derive(Debug, Clone)]
pub struct Atr {
    name: String,
    period: usize,
    value: Option<f64>,
    prev_close: Option<f64>,
    seed_sum: f64,
    seen: usize,
}

impl Atr {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        let period = check_period("atr", period)?;
        Ok(Self {
            name: format!("ATR_{period}"),
            period,
            value: None,
            prev_close: None,
            seed_sum: 0.0,
            seen: 0,
        })
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        if let Some(name) = name {
            self.name = name;
        }
        self
    }
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&mut self) {
        self.value = None;
        self.prev_close = None;
        self.seed_sum = 0.0;
        self.seen = 0;
    }

    fn update(&mut self, bar: &Bar) -> Option<f64> {
        let prev_close = self.prev_close.replace(bar.close_price)?;
        let tr = bar.true_range(Some(prev_close));
        let period = self.period as f64;

        self.value = match self.value {
            Some(prev) => Some((prev * (period - 1.0) + tr) / period),
            None => {
                self.seed_sum += tr;
                self.seen += 1;
                (self.seen == self.period).then(|| self.seed_sum / period)
            }
        };
        self.value
    }
}
