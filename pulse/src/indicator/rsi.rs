use crate::bar::Bar;

use super::core::{check_period, Indicator, IndicatorError};

/// Wilder RSI. The first value needs `period` price changes.
#[derive(Debug, Clone)]
pub struct Rsi {
    name: String,
    period: usize,
    prev_close: Option<f64>,
    changes: usize,
    avg_gain: f64,
    avg_loss: f64,
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        let period = check_period("rsi", period)?;
        Ok(Self {
            name: format!("RSI_{period}"),
            period,
            prev_close: None,
            changes: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        })
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        if let Some(name) = name {
            self.name = name;
        }
        self
    }

    fn value(&self) -> f64 {
        let total = self.avg_gain + self.avg_loss;
        if total == 0.0 {
            0.0
        } else {
            100.0 * self.avg_gain / total
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&mut self) {
        self.prev_close = None;
        self.changes = 0;
        self.avg_gain = 0.0;
        self.avg_loss = 0.0;
    }

    fn update(&mut self, bar: &Bar) -> Option<f64> {
        let close = bar.close_price;
        let prev = self.prev_close.replace(close)?;
        let diff = close - prev;
        let (gain, loss) = if diff > 0.0 { (diff, 0.0) } else { (0.0, -diff) };
        let period = self.period as f64;

        self.changes += 1;
        if self.changes <= self.period {
            self.avg_gain += gain / period;
            self.avg_loss += loss / period;
            return (self.changes == self.period).then(|| self.value());
        }

        self.avg_gain = (self.avg_gain * (period - 1.0) + gain) / period;
        self.avg_loss = (self.avg_loss * (period - 1.0) + loss) / period;
        Some(self.value())
    }
}
