pub mod bar;
pub mod constant;
pub mod dataset;
pub mod indicator;
pub mod logging;
pub mod tick;

pub use bar::Bar;
pub use constant::{DataError, Timeframe};
pub use dataset::{bar_from_fields, load_bars_csv, parse_datetime};
pub use indicator::{
	IndicatorEngine, IndicatorError, IndicatorKind, IndicatorRow, IndicatorSpec, StandardIndicators,
};
pub use logging::init_logging;
pub use tick::PriceTick;
