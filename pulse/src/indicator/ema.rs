use crate::bar::Bar;

use super::core::{check_period, Indicator, IndicatorError};

/// Exponential moving average seeded with the simple average of the first
/// `period` closes.
#[derive(Debug, Clone)]
pub struct Ema {
    name: String,
    period: usize,
    alpha: f64,
    seed_sum: f64,
    seen: usize,
    value: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        let period = check_period("ema", period)?;
        Ok(Self {
            name: format!("EMA_{period}"),
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            seed_sum: 0.0,
            seen: 0,
            value: None,
        })
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        if let Some(name) = name {
            self.name = name;
        }
        self
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&mut self) {
        self.seed_sum = 0.0;
        self.seen = 0;
        self.value = None;
    }

    fn update(&mut self, bar: &Bar) -> Option<f64> {
        let price = bar.close_price;
        self.value = match self.value {
            Some(prev) => Some(prev + self.alpha * (price - prev)),
            None => {
                self.seed_sum += price;
                self.seen += 1;
                (self.seen == self.period).then(|| self.seed_sum / self.period as f64)
            }
        };
        self.value
    }
}
