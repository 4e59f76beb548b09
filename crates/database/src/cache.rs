use crate::context::RequestContext;
use crate::error::DbError;
use crate::store::{RateStore, SnapshotCache};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{BucketInterval, Candle, PairedRate, RateSample, Snapshot, TimeRange};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Cache key under which the latest snapshot lives.
pub const LATEST_SNAPSHOT_KEY: &str = "latest_snapshot";

struct CacheSlot {
    encoded: Vec<u8>,
    expires_at: Instant,
}

/// Process-local snapshot cache. Values are held JSON-encoded, as a remote
/// cache would hold them, and expire after their TTL.
#[derive(Default)]
pub struct InMemorySnapshotCache {
    slots: DashMap<String, CacheSlot>,
}

impl InMemorySnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotCache for InMemorySnapshotCache {
    async fn get(&self, key: &str) -> Result<Option<Snapshot>, DbError> {
        // The shard guard must be released before the removal below.
        let cached = self
            .slots
            .get(key)
            .map(|slot| (slot.expires_at, slot.encoded.clone()));

        match cached {
            Some((expires_at, encoded)) if Instant::now() < expires_at => {
                Ok(Some(serde_json::from_slice(&encoded)?))
            }
            Some(_) => {
                self.slots
                    .remove_if(key, |_, slot| Instant::now() >= slot.expires_at);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, snapshot: &Snapshot, ttl: Duration) -> Result<(), DbError> {
        let encoded = serde_json::to_vec(snapshot)?;
        self.slots.insert(
            key.to_string(),
            CacheSlot {
                encoded,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}

/// A [`RateStore`] that keeps the latest snapshot in a [`SnapshotCache`].
///
/// Writes go to durable storage first; the cache is refreshed only after the
/// rows have committed. Reads of the latest snapshot try the cache and fall back
/// to storage, repopulating the cache on the way out. Every other query is
/// delegated unchanged.
pub struct CachedRateStore {
    inner: Arc<dyn RateStore>,
    cache: Arc<dyn SnapshotCache>,
    ttl: Duration,
}

impl CachedRateStore {
    pub fn new(inner: Arc<dyn RateStore>, cache: Arc<dyn SnapshotCache>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    async fn refresh_cache(&self, ctx: &RequestContext, snapshot: &Snapshot) {
        let put = ctx.run("cache_put", self.cache.put(LATEST_SNAPSHOT_KEY, snapshot, self.ttl));
        if let Err(e) = put.await {
            tracing::warn!(error = %e, "Failed to refresh the latest-snapshot cache.");
        }
    }
}

#[async_trait]
impl RateStore for CachedRateStore {
    async fn store_snapshot(
        &self,
        ctx: &RequestContext,
        snapshot: &Snapshot,
    ) -> Result<(), DbError> {
        self.inner.store_snapshot(ctx, snapshot).await?;
        self.refresh_cache(ctx, snapshot).await;
        Ok(())
    }

    async fn latest_snapshot(&self, ctx: &RequestContext) -> Result<Snapshot, DbError> {
        match ctx.run("cache_get", self.cache.get(LATEST_SNAPSHOT_KEY)).await {
            Ok(Some(snapshot)) => return Ok(snapshot),
            Ok(None) => tracing::debug!("Latest snapshot not cached; reading from storage."),
            Err(DbError::Cancelled { operation }) => {
                return Err(DbError::Cancelled { operation });
            }
            Err(e) => tracing::warn!(error = %e, "Snapshot cache read failed; reading from storage."),
        }

        let snapshot = self.inner.latest_snapshot(ctx).await?;
        self.refresh_cache(ctx, &snapshot).await;
        Ok(snapshot)
    }

    async fn history(
        &self,
        ctx: &RequestContext,
        ticker: &str,
        range: TimeRange,
        limit: Option<i64>,
    ) -> Result<Vec<RateSample>, DbError> {
        self.inner.history(ctx, ticker, range, limit).await
    }

    async fn snapshot_times(
        &self,
        ctx: &RequestContext,
        range: TimeRange,
        limit: Option<i64>,
    ) -> Result<Vec<DateTime<Utc>>, DbError> {
        self.inner.snapshot_times(ctx, range, limit).await
    }

    async fn rates_at_times(
        &self,
        ctx: &RequestContext,
        tickers: &[String],
        times: &[DateTime<Utc>],
    ) -> Result<Vec<RateSample>, DbError> {
        self.inner.rates_at_times(ctx, tickers, times).await
    }

    async fn latest_at_or_before(
        &self,
        ctx: &RequestContext,
        tickers: &[String],
        at: DateTime<Utc>,
    ) -> Result<Vec<RateSample>, DbError> {
        self.inner.latest_at_or_before(ctx, tickers, at).await
    }

    async fn paired_rates(
        &self,
        ctx: &RequestContext,
        ticker_a: &str,
        ticker_b: &str,
        range: TimeRange,
        limit: Option<i64>,
    ) -> Result<Vec<PairedRate>, DbError> {
        self.inner
            .paired_rates(ctx, ticker_a, ticker_b, range, limit)
            .await
    }

    async fn candles(
        &self,
        ctx: &RequestContext,
        ticker: &str,
        bucket: BucketInterval,
        range: TimeRange,
        limit: Option<i64>,
    ) -> Result<Vec<Candle>, DbError> {
        self.inner.candles(ctx, ticker, bucket, range, limit).await
    }
}
