use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV candlestick. `datetime` is the ordering key of the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    #[serde(rename = "timestamp")]
    pub datetime: DateTime<Utc>,
    #[serde(rename = "open")]
    pub open_price: f64,
    #[serde(rename = "high")]
    pub high_price: f64,
    #[serde(rename = "low")]
    pub low_price: f64,
    #[serde(rename = "close")]
    pub close_price: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Bar {
    pub fn new(
        datetime: DateTime<Utc>,
        open_price: f64,
        high_price: f64,
        low_price: f64,
        close_price: f64,
        volume: f64,
    ) -> Self {
        Self {
            datetime,
            open_price,
            high_price,
            low_price,
            close_price,
            volume,
        }
    }

    /// OHLC finite, volume finite and non-negative.
    pub fn is_valid(&self) -> bool {
        self.open_price.is_finite()
            && self.high_price.is_finite()
            && self.low_price.is_finite()
            && self.close_price.is_finite()
            && self.volume.is_finite()
            && self.volume >= 0.0
    }

    pub fn total_range(&self) -> f64 {
        self.high_price - self.low_price
    }

    /// Wilder true range against the previous close.
    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        match prev_close {
            Some(prev_close) => self
                .total_range()
                .max((self.high_price - prev_close).abs())
                .max((self.low_price - prev_close).abs()),
            None => self.total_range(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Bar;
    use chrono::{TimeZone, Utc};

    fn bar(close: f64) -> Bar {
        Bar::new(
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap(),
            1.0,
            2.0,
            0.5,
            close,
            10.0,
        )
    }

    #[test]
    fn validity_rejects_non_finite_and_negative_volume() {
        assert!(bar(1.5).is_valid());
        assert!(!bar(f64::NAN).is_valid());
        assert!(!bar(f64::INFINITY).is_valid());

        let mut negative = bar(1.5);
        negative.volume = -1.0;
        assert!(!negative.is_valid());
    }

    #[test]
    fn true_range_uses_previous_close_gap() {
        let b = bar(1.5);
        assert_eq!(b.true_range(None), 1.5);
        assert_eq!(b.true_range(Some(3.0)), 2.5);
        assert_eq!(b.true_range(Some(1.0)), 1.5);
    }

    #[test]
    fn serializes_with_short_field_names() {
        let json = serde_json::to_value(bar(1.5)).expect("bar serializes");
        assert_eq!(json["close"], 1.5);
        assert_eq!(json["timestamp"], "2024-01-02T09:30:00Z");
        assert!(json.get("close_price").is_none());
    }
}
