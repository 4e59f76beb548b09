use crate::error::AnalyticsError;
use crate::stats;
use chrono::{DateTime, Utc};
use core_types::{
    BucketInterval, Candle, CorrelationResult, CrossPoint, RateSample, Snapshot, TimeRange,
};
use database::{RateStore, RequestContext, limits};
use std::sync::Arc;

/// Rate analytics computed on top of a [`RateStore`].
///
/// The engine holds no state of its own; every call reads what it needs from
/// the store, so it can be shared freely between concurrent requests.
#[derive(Clone)]
pub struct AnalyticsEngine {
    rates: Arc<dyn RateStore>,
}

fn currency_pair(a: &str, b: &str) -> Result<(String, String), AnalyticsError> {
    let a = core_types::require_currency("currency_a", a)?;
    let b = core_types::require_currency("currency_b", b)?;
    if a == b {
        return Err(AnalyticsError::Validation(
            "currencies must be different".to_string(),
        ));
    }
    Ok((a, b))
}

impl AnalyticsEngine {
    pub fn new(rates: Arc<dyn RateStore>) -> Self {
        Self { rates }
    }

    /// The most recent snapshot, served from cache when the store has one.
    pub async fn latest_snapshot(&self, ctx: &RequestContext) -> Result<Snapshot, AnalyticsError> {
        Ok(self.rates.latest_snapshot(ctx).await?)
    }

    /// Samples of one ticker, newest first.
    pub async fn history(
        &self,
        ctx: &RequestContext,
        ticker: &str,
        range: TimeRange,
        limit: Option<i64>,
    ) -> Result<Vec<RateSample>, AnalyticsError> {
        let ticker = core_types::require_currency("ticker", ticker)?;
        Ok(self.rates.history(ctx, &ticker, range, limit).await?)
    }

    /// OHLC candles of one ticker. A blank bucket label means one minute.
    pub async fn candles(
        &self,
        ctx: &RequestContext,
        ticker: &str,
        bucket: &str,
        range: TimeRange,
        limit: Option<i64>,
    ) -> Result<Vec<Candle>, AnalyticsError> {
        let ticker = core_types::require_currency("ticker", ticker)?;
        let bucket = BucketInterval::parse_or_default(bucket)?;
        Ok(self.rates.candles(ctx, &ticker, bucket, range, limit).await?)
    }

    /// The price of one unit of `a` in `b` over time, oldest first.
    ///
    /// Both stored rates are quoted from the same base, so `a` in `b` is
    /// `rate_b / rate_a`. Rows with a zero `rate_a` are dropped.
    pub async fn cross_rate_history(
        &self,
        ctx: &RequestContext,
        a: &str,
        b: &str,
        range: TimeRange,
        limit: Option<i64>,
    ) -> Result<Vec<CrossPoint>, AnalyticsError> {
        let (a, b) = currency_pair(a, b)?;
        let rows = self.rates.paired_rates(ctx, &a, &b, range, limit).await?;

        Ok(rows
            .into_iter()
            .filter(|row| row.rate_a != 0.0)
            .map(|row| CrossPoint {
                time: row.time,
                rate: row.rate_b / row.rate_a,
                base: row.base,
                a: a.clone(),
                b: b.clone(),
            })
            .collect())
    }

    /// The cross rate at exactly `at`.
    pub async fn cross_rate_at(
        &self,
        ctx: &RequestContext,
        a: &str,
        b: &str,
        at: DateTime<Utc>,
    ) -> Result<CrossPoint, AnalyticsError> {
        self.cross_rate_history(ctx, a, b, TimeRange::at(at), Some(1))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AnalyticsError::NotFound("no rate available at requested time".to_string()))
    }

    /// The cross-rate series for charting. With a bucket label only the last
    /// point of each bucket is kept; without one the series is returned as is.
    pub async fn chart(
        &self,
        ctx: &RequestContext,
        a: &str,
        b: &str,
        range: TimeRange,
        limit: Option<i64>,
        bucket: Option<&str>,
    ) -> Result<Vec<CrossPoint>, AnalyticsError> {
        let bucket = bucket.map(BucketInterval::parse_or_default).transpose()?;
        let points = self.cross_rate_history(ctx, a, b, range, limit).await?;
        Ok(match bucket {
            Some(bucket) => bucket_compress(&points, bucket),
            None => points,
        })
    }

    /// Pearson correlation of the log returns of `a` and `b`.
    pub async fn correlation(
        &self,
        ctx: &RequestContext,
        a: &str,
        b: &str,
        range: TimeRange,
        limit: Option<i64>,
    ) -> Result<CorrelationResult, AnalyticsError> {
        let (a, b) = currency_pair(a, b)?;
        let limit = limits::CORRELATION.resolve(limit);
        let rows = self.rates.paired_rates(ctx, &a, &b, range, Some(limit)).await?;
        if rows.len() < 3 {
            return Err(AnalyticsError::InsufficientData(format!(
                "not enough samples to compute correlation: {} aligned rows",
                rows.len()
            )));
        }

        let (returns_a, returns_b) = stats::paired_log_returns(&rows);
        if returns_a.len() < 2 {
            return Err(AnalyticsError::InsufficientData(
                "not enough valid samples to compute correlation".to_string(),
            ));
        }
        let correlation = stats::pearson(&returns_a, &returns_b)?;

        tracing::debug!(%a, %b, samples = returns_a.len(), correlation, "Computed correlation.");
        Ok(CorrelationResult {
            base: rows[0].base.clone(),
            a,
            b,
            from: range.from,
            to: range.to,
            samples: returns_a.len(),
            correlation,
        })
    }
}

/// Thins a time-ascending series for charting: only the last point seen in
/// each bucket is kept, with its own timestamp.
pub fn bucket_compress(points: &[CrossPoint], bucket: BucketInterval) -> Vec<CrossPoint> {
    let mut out: Vec<CrossPoint> = Vec::new();
    for point in points {
        let start = bucket.bucket_start(point.time);
        match out.last_mut() {
            Some(last) if bucket.bucket_start(last.time) == start => *last = point.clone(),
            _ => out.push(point.clone()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use database::MemoryRateStore;

    fn t(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn sample(ticker: &str, rate: f64, at: DateTime<Utc>) -> RateSample {
        RateSample {
            ticker: ticker.to_string(),
            base: "USD".to_string(),
            rate,
            timestamp: at,
        }
    }

    fn engine_with(samples: Vec<RateSample>) -> AnalyticsEngine {
        let store = MemoryRateStore::new("USD");
        for s in samples {
            store.insert_sample(s);
        }
        AnalyticsEngine::new(Arc::new(store))
    }

    #[tokio::test]
    async fn cross_rate_against_the_base_uses_a_constant_one() {
        let ctx = RequestContext::background();
        let engine = engine_with(vec![sample("EUR", 0.9, t(0))]);

        let points = engine
            .cross_rate_history(&ctx, "usd", "eur", TimeRange::unbounded(), None)
            .await
            .unwrap();
        assert_eq!(points.len(), 1);
        assert!((points[0].rate - 0.9).abs() < 1e-12);
        assert_eq!((points[0].a.as_str(), points[0].b.as_str()), ("USD", "EUR"));
    }

    #[tokio::test]
    async fn cross_rate_between_two_tickers() {
        let ctx = RequestContext::background();
        let engine = engine_with(vec![sample("EUR", 0.9, t(0)), sample("GBP", 0.8, t(0))]);

        let point = engine.cross_rate_at(&ctx, "EUR", "GBP", t(0)).await.unwrap();
        assert!((point.rate - 0.8 / 0.9).abs() < 1e-12);
        assert!((point.rate - 0.8889).abs() < 1e-4);

        assert!(matches!(
            engine.cross_rate_at(&ctx, "EUR", "GBP", t(1)).await,
            Err(AnalyticsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn cross_rate_rejects_bad_pairs() {
        let ctx = RequestContext::background();
        let engine = engine_with(Vec::new());
        for (a, b) in [("EUR", "eur"), ("", "EUR"), ("EUR", " ")] {
            assert!(matches!(
                engine.cross_rate_history(&ctx, a, b, TimeRange::unbounded(), None).await,
                Err(AnalyticsError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn correlation_needs_three_aligned_rows() {
        let ctx = RequestContext::background();
        let engine = engine_with(vec![
            sample("EUR", 0.9, t(0)),
            sample("GBP", 0.8, t(0)),
            sample("EUR", 0.91, t(1)),
            sample("GBP", 0.81, t(1)),
        ]);
        assert!(matches!(
            engine.correlation(&ctx, "EUR", "GBP", TimeRange::unbounded(), None).await,
            Err(AnalyticsError::InsufficientData(_))
        ));
    }

    #[tokio::test]
    async fn correlation_of_co_moving_series() {
        let ctx = RequestContext::background();
        let eur = [0.90, 0.92, 0.91, 0.95];
        let gbp = [0.80, 0.82, 0.81, 0.85];
        let mut samples = Vec::new();
        for (i, (e, g)) in eur.iter().zip(gbp.iter()).enumerate() {
            samples.push(sample("EUR", *e, t(i as i64)));
            samples.push(sample("GBP", *g, t(i as i64)));
        }
        let engine = engine_with(samples);

        let result = engine
            .correlation(&ctx, "EUR", "GBP", TimeRange::unbounded(), None)
            .await
            .unwrap();
        assert_eq!(result.samples, 3);
        assert_eq!(result.base, "USD");
        assert!(result.correlation > 0.99);
    }

    #[tokio::test]
    async fn correlation_of_exactly_three_rows_is_bounded() {
        let ctx = RequestContext::background();
        let engine = engine_with(vec![
            sample("EUR", 0.9, t(0)),
            sample("GBP", 0.8, t(0)),
            sample("EUR", 0.93, t(1)),
            sample("GBP", 0.81, t(1)),
            sample("EUR", 0.91, t(2)),
            sample("GBP", 0.79, t(2)),
        ]);

        let result = engine
            .correlation(&ctx, "EUR", "GBP", TimeRange::unbounded(), None)
            .await
            .unwrap();
        assert_eq!(result.samples, 2);
        let r = result.correlation;
        assert!(-1.0 <= r && r <= 1.0, "r = {r}");
        assert!((r.abs() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn correlation_reads_two_thousand_rows_by_default() {
        let ctx = RequestContext::background();
        let mut samples = Vec::new();
        for i in 0..2100i64 {
            samples.push(sample("EUR", 0.9 + (i % 7) as f64 / 1000.0, t(i)));
            samples.push(sample("GBP", 0.8 + (i % 5) as f64 / 1000.0, t(i)));
        }
        let engine = engine_with(samples);

        let result = engine
            .correlation(&ctx, "EUR", "GBP", TimeRange::unbounded(), None)
            .await
            .unwrap();
        assert_eq!(result.samples, 1999);

        let capped = engine
            .correlation(&ctx, "EUR", "GBP", TimeRange::unbounded(), Some(10))
            .await
            .unwrap();
        assert_eq!(capped.samples, 9);
    }

    #[tokio::test]
    async fn candles_default_to_one_minute_and_reject_unknown_buckets() {
        let ctx = RequestContext::background();
        let engine = engine_with(vec![
            sample("EUR", 1.0, t(0)),
            sample("EUR", 1.2, t(0) + Duration::seconds(20)),
            sample("EUR", 0.9, t(0) + Duration::seconds(40)),
        ]);

        let candles = engine
            .candles(&ctx, "eur", "", TimeRange::unbounded(), None)
            .await
            .unwrap();
        assert_eq!(candles.len(), 1);
        let c = &candles[0];
        assert_eq!((c.open, c.high, c.low, c.close, c.samples), (1.0, 1.2, 0.9, 0.9, 3));

        assert!(matches!(
            engine.candles(&ctx, "EUR", "2d", TimeRange::unbounded(), None).await,
            Err(AnalyticsError::Validation(_))
        ));
        assert!(matches!(
            engine.history(&ctx, " ", TimeRange::unbounded(), None).await,
            Err(AnalyticsError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn empty_store_has_no_latest_snapshot() {
        let ctx = RequestContext::background();
        let engine = engine_with(Vec::new());
        assert!(matches!(
            engine.latest_snapshot(&ctx).await,
            Err(AnalyticsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn chart_compresses_only_when_a_bucket_is_given() {
        let ctx = RequestContext::background();
        let engine = engine_with(vec![
            sample("EUR", 0.90, t(1)),
            sample("EUR", 0.91, t(4)),
            sample("EUR", 0.92, t(7)),
        ]);

        let raw = engine
            .chart(&ctx, "USD", "EUR", TimeRange::unbounded(), None, None)
            .await
            .unwrap();
        assert_eq!(raw.iter().map(|p| p.time).collect::<Vec<_>>(), vec![t(1), t(4), t(7)]);

        let bucketed = engine
            .chart(&ctx, "USD", "EUR", TimeRange::unbounded(), None, Some("5m"))
            .await
            .unwrap();
        assert_eq!(bucketed.iter().map(|p| p.time).collect::<Vec<_>>(), vec![t(4), t(7)]);

        assert!(matches!(
            engine.chart(&ctx, "USD", "EUR", TimeRange::unbounded(), None, Some("3m")).await,
            Err(AnalyticsError::Validation(_))
        ));
    }

    #[test]
    fn bucket_compress_keeps_the_last_point_per_bucket() {
        let point = |minute: i64, rate: f64| CrossPoint {
            time: t(minute),
            rate,
            base: "USD".to_string(),
            a: "EUR".to_string(),
            b: "GBP".to_string(),
        };
        let points = vec![point(1, 1.0), point(4, 1.1), point(5, 1.2), point(12, 1.3)];

        let compressed = bucket_compress(&points, BucketInterval::FiveMinutes);
        let got: Vec<(DateTime<Utc>, f64)> = compressed.iter().map(|p| (p.time, p.rate)).collect();
        assert_eq!(got, vec![(t(4), 1.1), (t(5), 1.2), (t(12), 1.3)]);
    }
}
