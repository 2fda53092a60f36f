pub mod csv_replay;
pub mod mock;
pub mod twelvedata;

pub use csv_replay::CsvReplayAdapter;
pub use mock::MockAdapter;
pub use twelvedata::{TwelveDataAdapter, TwelveDataConfig};
