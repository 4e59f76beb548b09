use crate::enums::EntryType;
use crate::error::CoreError;
use crate::meta::EntryMeta;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ==============================================================================
// Rate time series
// ==============================================================================

/// An optional, inclusive `[from, to]` window over sample timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self::new(Some(from), Some(to))
    }

    /// A window containing exactly one instant.
    pub fn at(at: DateTime<Utc>) -> Self {
        Self::between(at, at)
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| t >= from) && self.to.is_none_or(|to| t <= to)
    }
}

/// One observation: 1 unit of `base` buys `rate` units of `ticker` at `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSample {
    pub ticker: String,
    pub base: String,
    pub rate: f64,
    pub timestamp: DateTime<Utc>,
}

/// All rates produced by one ingestion cycle, sharing a base and a timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub base: String,
    pub result: BTreeMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    /// Checks that the snapshot can be stored: a base, at least one ticker,
    /// and only finite positive rates.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.base.trim().is_empty() {
            return Err(CoreError::invalid("base", "snapshot base is required"));
        }
        if self.result.is_empty() {
            return Err(CoreError::invalid("result", "snapshot carries no rates"));
        }
        for (ticker, rate) in &self.result {
            if ticker.trim().is_empty() {
                return Err(CoreError::invalid("result", "empty ticker in snapshot"));
            }
            if !rate.is_finite() || *rate <= 0.0 {
                return Err(CoreError::invalid(
                    "result",
                    format!("rate for {} must be positive, got {}", ticker, rate),
                ));
            }
        }
        Ok(())
    }

    /// Flattens the snapshot into one sample per ticker.
    pub fn samples(&self) -> Vec<RateSample> {
        self.result
            .iter()
            .map(|(ticker, rate)| RateSample {
                ticker: ticker.clone(),
                base: self.base.clone(),
                rate: *rate,
                timestamp: self.timestamp,
            })
            .collect()
    }

    /// Rebuilds a snapshot from samples that share one timestamp.
    /// The base is taken from the first sample; returns `None` for an empty slice.
    pub fn from_samples(timestamp: DateTime<Utc>, samples: &[RateSample]) -> Option<Self> {
        let first = samples.first()?;
        Some(Self {
            base: first.base.clone(),
            result: samples
                .iter()
                .map(|s| (s.ticker.clone(), s.rate))
                .collect(),
            timestamp,
        })
    }
}

/// Two tickers observed at the same instant under the same base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairedRate {
    pub time: DateTime<Utc>,
    pub rate_a: f64,
    pub rate_b: f64,
    pub base: String,
}

/// OHLC aggregate of one ticker over a single time bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub bucket: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub samples: i64,
}

// ==============================================================================
// Ledger
// ==============================================================================

/// A persisted, immutable ledger row. Positive amounts are inflows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: i64,
    pub trade_id: Uuid,
    pub currency: String,
    pub amount: Decimal,
    pub executed_at: DateTime<Utc>,
    pub entry_type: EntryType,
    pub meta: EntryMeta,
    pub created_at: DateTime<Utc>,
}

/// A ledger row before the store has assigned its id and creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub user_id: i64,
    pub trade_id: Uuid,
    pub currency: String,
    pub amount: Decimal,
    pub executed_at: DateTime<Utc>,
    pub entry_type: EntryType,
    pub meta: EntryMeta,
}

/// A user's request to record a currency exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRequest {
    pub user_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_id: Option<Uuid>,
    pub from_currency: String,
    pub from_amount: Decimal,
    pub to_currency: String,
    pub to_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_currency: Option<String>,
    #[serde(default)]
    pub fee_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub meta: EntryMeta,
}

/// Response body for a recorded exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeReceipt {
    pub trade_id: Uuid,
}

// ==============================================================================
// Analytics outputs
// ==============================================================================

/// Price of one unit of `a` expressed in `b` at `time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossPoint {
    pub time: DateTime<Utc>,
    pub rate: f64,
    pub base: String,
    pub a: String,
    pub b: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub a: String,
    pub b: String,
    pub base: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
    /// Number of log-return pairs that entered the coefficient.
    pub samples: usize,
    pub correlation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioValue {
    pub time: DateTime<Utc>,
    #[serde(rename = "in")]
    pub in_currency: String,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot() -> Snapshot {
        Snapshot {
            base: "USD".to_string(),
            result: BTreeMap::from([("EUR".to_string(), 0.9), ("GBP".to_string(), 0.8)]),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn time_range_bounds_are_inclusive() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert!(TimeRange::at(t).contains(t));
        assert!(!TimeRange::at(t).contains(t + chrono::Duration::seconds(1)));
        assert!(TimeRange::unbounded().contains(t));
        assert!(TimeRange::new(Some(t), None).contains(t + chrono::Duration::days(3)));
    }

    #[test]
    fn samples_share_base_and_timestamp() {
        let snap = snapshot();
        let samples = snap.samples();
        assert_eq!(samples.len(), 2);
        assert!(samples.iter().all(|s| s.base == "USD" && s.timestamp == snap.timestamp));

        let rebuilt = Snapshot::from_samples(snap.timestamp, &samples).unwrap();
        assert_eq!(rebuilt, snap);
        assert!(Snapshot::from_samples(snap.timestamp, &[]).is_none());
    }

    #[test]
    fn validate_rejects_bad_rates() {
        let mut snap = snapshot();
        assert!(snap.validate().is_ok());

        snap.result.insert("JPY".to_string(), 0.0);
        assert!(snap.validate().is_err());

        snap.result.insert("JPY".to_string(), f64::NAN);
        assert!(snap.validate().is_err());
    }

    #[test]
    fn exchange_request_defaults_optional_fields() {
        let req: ExchangeRequest = serde_json::from_str(
            r#"{"user_id":7,"from_currency":"usd","from_amount":"100","to_currency":"eur","to_amount":"90"}"#,
        )
        .unwrap();
        assert_eq!(req.trade_id, None);
        assert!(req.fee_amount.is_zero());
        assert!(req.meta.is_empty());
        assert!(req.executed_at.is_none());
    }

    #[test]
    fn portfolio_value_serializes_target_as_in() {
        let value = PortfolioValue {
            time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            in_currency: "EUR".to_string(),
            value: 12.5,
        };
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["in"], "EUR");
    }
}
