use crate::error::ApiError;
use chrono::{DateTime, Utc};
use core_types::Snapshot;
use serde::Deserialize;
use std::collections::HashMap;

/// The body of a successful feed response: `{"base": "USD", "result": {"EUR": 0.92, ...}}`.
/// Any other fields the provider sends are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RatesResponse {
    pub base: String,
    #[serde(default)]
    pub result: HashMap<String, f64>,
}

impl RatesResponse {
    /// Turns the raw payload into a storable snapshot stamped with `fetched_at`.
    ///
    /// Codes are upper-cased. Rates that are not finite and positive are dropped,
    /// as is any row for the base itself.
    pub fn into_snapshot(self, fetched_at: DateTime<Utc>) -> Result<Snapshot, ApiError> {
        let base = core_types::normalize_currency(&self.base);
        if base.is_empty() {
            return Err(ApiError::InvalidData("response carries no base currency".to_string()));
        }

        let total = self.result.len();
        let result = self
            .result
            .into_iter()
            .map(|(ticker, rate)| (core_types::normalize_currency(&ticker), rate))
            .filter(|(ticker, rate)| {
                !ticker.is_empty() && *ticker != base && rate.is_finite() && *rate > 0.0
            })
            .collect::<std::collections::BTreeMap<_, _>>();

        if result.is_empty() {
            return Err(ApiError::InvalidData(format!(
                "response for base {base} carries no usable rates"
            )));
        }
        if result.len() < total {
            tracing::debug!(dropped = total - result.len(), %base, "Dropped unusable rows from feed response.");
        }

        Ok(Snapshot {
            base,
            result,
            timestamp: fetched_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn payload_is_normalized_into_a_snapshot() {
        let raw: RatesResponse = serde_json::from_str(
            r#"{"base":"usd","ms":4,"result":{"eur":0.92,"GBP":0.79,"USD":1.0,"XXX":0,"BAD":-1.5}}"#,
        )
        .unwrap();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();

        let snapshot = raw.into_snapshot(at).unwrap();
        assert_eq!(snapshot.base, "USD");
        assert_eq!(snapshot.timestamp, at);
        assert_eq!(
            snapshot.result.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["EUR", "GBP"]
        );
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn payload_without_usable_rates_is_rejected() {
        let raw: RatesResponse =
            serde_json::from_str(r#"{"base":"USD","result":{"USD":1.0}}"#).unwrap();
        assert!(matches!(raw.into_snapshot(Utc::now()), Err(ApiError::InvalidData(_))));

        let raw: RatesResponse = serde_json::from_str(r#"{"base":" ","result":{"EUR":0.9}}"#).unwrap();
        assert!(matches!(raw.into_snapshot(Utc::now()), Err(ApiError::InvalidData(_))));
    }
}
