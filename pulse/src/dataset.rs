use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::bar::Bar;
use crate::constant::DataError;

#[derive(Debug, Deserialize)]
struct CsvBarRow {
    #[serde(alias = "timestamp")]
    datetime: String,
    #[serde(alias = "open_price")]
    open: String,
    #[serde(alias = "high_price")]
    high: String,
    #[serde(alias = "low_price")]
    low: String,
    #[serde(alias = "close_price")]
    close: String,
    #[serde(default)]
    volume: Option<String>,
}

/// Loads `datetime,open,high,low,close[,volume]` rows sorted by datetime.
///
/// Rows with an unparseable datetime or non-numeric OHLC are dropped with a
/// warning; a missing or empty volume counts as `0`.
pub fn load_bars_csv(file_path: impl AsRef<Path>) -> Result<Vec<Bar>, DataError> {
    let file_path = file_path.as_ref();
    let mut reader = csv::Reader::from_path(file_path)?;
    let mut out = Vec::new();
    let mut dropped = 0usize;

    for row in reader.deserialize::<CsvBarRow>() {
        let row = row?;
        match bar_from_fields(
            &row.datetime,
            &row.open,
            &row.high,
            &row.low,
            &row.close,
            row.volume.as_deref(),
        ) {
            Ok(bar) => out.push(bar),
            Err(error) => {
                dropped += 1;
                warn!(path = %file_path.display(), %error, "dropping malformed csv row");
            }
        }
    }

    if dropped > 0 {
        warn!(path = %file_path.display(), dropped, kept = out.len(), "csv rows dropped");
    }

    out.sort_by_key(|bar| bar.datetime);
    Ok(out)
}

/// Builds a validated bar from textual provider fields.
pub fn bar_from_fields(
    datetime: &str,
    open: &str,
    high: &str,
    low: &str,
    close: &str,
    volume: Option<&str>,
) -> Result<Bar, DataError> {
    let volume = match volume.map(str::trim) {
        None | Some("") => 0.0,
        Some(raw) => parse_number("volume", raw)?,
    };
    let bar = Bar::new(
        parse_datetime(datetime)?,
        parse_number("open", open)?,
        parse_number("high", high)?,
        parse_number("low", low)?,
        parse_number("close", close)?,
        volume,
    );
    if bar.is_valid() {
        Ok(bar)
    } else {
        Err(DataError::InvalidNumber {
            field: "ohlcv",
            value: format!("{bar:?}"),
        })
    }
}

pub fn parse_number(field: &'static str, value: &str) -> Result<f64, DataError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DataError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD` and epoch
/// seconds / milliseconds. Naive values are taken as UTC.
pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>, DataError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    let patterns = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S%.f",
        "%Y%m%d%H%M%S%.f",
    ];

    for pattern in patterns {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, pattern) {
            return Ok(DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc));
        }
    }

    if let Ok(epoch) = value.parse::<i64>() {
        let parsed = if epoch.abs() >= 100_000_000_000 {
            DateTime::<Utc>::from_timestamp_millis(epoch)
        } else {
            DateTime::<Utc>::from_timestamp(epoch, 0)
        };
        if let Some(dt) = parsed {
            return Ok(dt);
        }
    }

    Err(DataError::InvalidDatetime(value.to_string()))
}
