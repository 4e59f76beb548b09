use crate::error::ApiError;
use crate::responses::RatesResponse;
use async_trait::async_trait;
use chrono::Utc;
use configuration::IngestionSettings;
use core_types::Snapshot;

pub mod error;
pub mod responses;

/// A source of exchange-rate snapshots.
/// Ingestion depends on this trait so the HTTP feed can be swapped for a fake.
#[async_trait]
pub trait RateFeed: Send + Sync {
    /// Fetches the current rates as one snapshot stamped with the fetch time.
    async fn fetch_snapshot(&self) -> Result<Snapshot, ApiError>;
}

/// HTTP client for the ExConvert-style rate feed configured under `[ingestion]`.
#[derive(Clone)]
pub struct ExConvertClient {
    client: reqwest::Client,
    url: String,
}

impl ExConvertClient {
    pub fn new(settings: &IngestionSettings) -> Result<Self, ApiError> {
        let url = settings
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ApiError::NotConfigured("ingestion.url is not set".to_string()))?
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl RateFeed for ExConvertClient {
    async fn fetch_snapshot(&self) -> Result<Snapshot, ApiError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::ApiError(format!(
                "received non-200 response: {status}"
            )));
        }

        let payload: RatesResponse = serde_json::from_str(&text)?;
        let snapshot = payload.into_snapshot(Utc::now())?;

        tracing::debug!(
            base = %snapshot.base,
            tickers = snapshot.result.len(),
            "Fetched rate snapshot."
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_requires_a_feed_url() {
        let settings = IngestionSettings::default();
        assert!(matches!(
            ExConvertClient::new(&settings),
            Err(ApiError::NotConfigured(_))
        ));

        let settings = IngestionSettings {
            url: Some("https://api.example.com/latest".to_string()),
            ..IngestionSettings::default()
        };
        assert!(ExConvertClient::new(&settings).is_ok());
    }
}
