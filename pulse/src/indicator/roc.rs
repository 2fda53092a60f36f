use std::collections::VecDeque;

use crate::bar::Bar;

use super::core::{check_period, Indicator, IndicatorError};

/// Rate of change in percent against the close `period` bars back.
#[derive(Debug, Clone)]
pub struct Roc {
    name: String,
    period: usize,
    closes: VecDeque<f64>,
}

impl Roc {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        let period = check_period("roc", period)?;
        Ok(Self {
            name: format!("ROC_{period}"),
            period,
            closes: VecDeque::with_capacity(period + 2),
        })
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        if let Some(name) = name {
            self.name = name;
        }
        self
    }
}

impl Indicator for Roc {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&mut self) {
        self.closes.clear();
    }

    fn update(&mut self, bar: &Bar) -> Option<f64> {
        self.closes.push_back(bar.close_price);
        if self.closes.len() > self.period + 1 {
            self.closes.pop_front();
        }
        if self.closes.len() <= self.period {
            return None;
        }
        let base = *self.closes.front()?;
        // zero base reads as no change, as TA-Lib does
        if base == 0.0 {
            return Some(0.0);
        }
        Some((bar.close_price / base - 1.0) * 100.0)
    }
}
