pub mod atr;
pub mod core;
pub mod ema;
pub mod engine;
pub mod manager;
pub mod roc;
pub mod rsi;
pub mod sma;

pub use atr::Atr;
pub use self::core::{Indicator, IndicatorError, IndicatorKind, IndicatorSpec};
pub use ema::Ema;
pub use engine::{IndicatorEngine, IndicatorRow, StandardIndicators};
pub use manager::IndicatorSet;
pub use roc::Roc;
pub use rsi::Rsi;
pub use sma::Sma;
