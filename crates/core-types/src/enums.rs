use crate::error::CoreError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of movement a ledger row records. Persisted as a SMALLINT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Exchange = 0,
    Fee = 1,
    Adjustment = 2,
}

/// Whether a cutoff timestamp itself belongs to the range being aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Only rows strictly before the cutoff.
    Exclusive,
    /// Rows at or before the cutoff.
    Inclusive,
}

/// Fixed-width time buckets used for candles and chart compression.
///
/// Buckets are aligned to UTC midnight, and a `1w` bucket starts on Monday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BucketInterval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "1w")]
    OneWeek,
}

impl BucketInterval {
    pub const ACCEPTED: &'static str = "1m, 5m, 15m, 30m, 1h, 4h, 1d, 1w";

    /// Parses a bucket label, falling back to one minute when the label is blank.
    pub fn parse_or_default(raw: &str) -> Result<Self, CoreError> {
        if raw.trim().is_empty() {
            return Ok(BucketInterval::OneMinute);
        }
        raw.parse()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BucketInterval::OneMinute => "1m",
            BucketInterval::FiveMinutes => "5m",
            BucketInterval::FifteenMinutes => "15m",
            BucketInterval::ThirtyMinutes => "30m",
            BucketInterval::OneHour => "1h",
            BucketInterval::FourHours => "4h",
            BucketInterval::OneDay => "1d",
            BucketInterval::OneWeek => "1w",
        }
    }

    /// Width of the bucket in whole seconds.
    pub fn seconds(&self) -> i64 {
        match self {
            BucketInterval::OneMinute => 60,
            BucketInterval::FiveMinutes => 5 * 60,
            BucketInterval::FifteenMinutes => 15 * 60,
            BucketInterval::ThirtyMinutes => 30 * 60,
            BucketInterval::OneHour => 60 * 60,
            BucketInterval::FourHours => 4 * 60 * 60,
            BucketInterval::OneDay => 24 * 60 * 60,
            BucketInterval::OneWeek => 7 * 24 * 60 * 60,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.seconds())
    }

    /// Buckets are measured from Monday 1970-01-05 UTC so weekly buckets start
    /// on a Monday. Every narrower width divides the four-day offset evenly.
    pub const ORIGIN_SECS: i64 = 4 * 24 * 60 * 60;

    /// The start of the bucket that contains `at`.
    pub fn bucket_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let width = self.seconds();
        let start = (at.timestamp() - Self::ORIGIN_SECS).div_euclid(width) * width
            + Self::ORIGIN_SECS;
        DateTime::<Utc>::from_timestamp(start, 0).unwrap_or(at)
    }
}

impl FromStr for BucketInterval {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "1m" => Ok(BucketInterval::OneMinute),
            "5m" => Ok(BucketInterval::FiveMinutes),
            "15m" => Ok(BucketInterval::FifteenMinutes),
            "30m" => Ok(BucketInterval::ThirtyMinutes),
            "1h" => Ok(BucketInterval::OneHour),
            "4h" => Ok(BucketInterval::FourHours),
            "1d" => Ok(BucketInterval::OneDay),
            "1w" => Ok(BucketInterval::OneWeek),
            other => Err(CoreError::invalid(
                "bucket",
                format!("unsupported bucket '{}'; use one of: {}", other, Self::ACCEPTED),
            )),
        }
    }
}

impl fmt::Display for BucketInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
