use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::bar::Bar;

use super::{Atr, Ema, Roc, Rsi, Sma};

/// Streaming indicator: fed bars oldest first, yields `None` until its
/// lookback is satisfied.
pub trait Indicator: Send {
    fn name(&self) -> &str;
    fn reset(&mut self);
    fn update(&mut self, bar: &Bar) -> Option<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorKind {
    Sma,
    Ema,
    Rsi,
    Roc,
    Atr,
}

/// Declarative description of one indicator column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorSpec {
    pub kind: IndicatorKind,
    pub period: usize,
    #[serde(default)]
    pub name: Option<String>,
}

impl IndicatorSpec {
    pub fn new(kind: IndicatorKind, period: usize) -> Self {
        Self {
            kind,
            period,
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn build(&self) -> Result<Box<dyn Indicator>, IndicatorError> {
        let name = self.name.clone();
        Ok(match self.kind {
            IndicatorKind::Sma => Box::new(Sma::new(self.period)?.with_name(name)),
            IndicatorKind::Ema => Box::new(Ema::new(self.period)?.with_name(name)),
            IndicatorKind::Rsi => Box::new(Rsi::new(self.period)?.with_name(name)),
            IndicatorKind::Roc => Box::new(Roc::new(self.period)?.with_name(name)),
            IndicatorKind::Atr => Box::new(Atr::new(self.period)?.with_name(name)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorError {
    InvalidPeriod { kind: &'static str, period: usize },
    DuplicateName(String),
}

impl Display for IndicatorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPeriod { kind, period } => {
                write!(f, "invalid period {period} for {kind}")
            }
            Self::DuplicateName(name) => write!(f, "duplicate indicator name: {name}"),
        }
    }
}

impl std::error::Error for IndicatorError {}

pub(crate) fn check_period(kind: &'static str, period: usize) -> Result<usize, IndicatorError> {
    if period == 0 {
        Err(IndicatorError::InvalidPeriod { kind, period })
    } else {
        Ok(period)
    }
}
