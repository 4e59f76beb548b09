use crate::context::RequestContext;
use crate::error::DbError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{
    Boundary, BucketInterval, Candle, LedgerEntry, NewLedgerEntry, PairedRate, RateSample,
    Snapshot, TimeRange,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// The append-only exchange-rate time series.
///
/// Tickers are expected in canonical (upper-case) form; callers normalize them.
/// `limit` arguments follow the rules in [`crate::limits`].
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Writes one sample per ticker in the snapshot. All or nothing.
    async fn store_snapshot(&self, ctx: &RequestContext, snapshot: &Snapshot)
    -> Result<(), DbError>;

    /// The most recent snapshot. `DbError::NotFound` when nothing has been stored.
    async fn latest_snapshot(&self, ctx: &RequestContext) -> Result<Snapshot, DbError>;

    /// Samples for one ticker, newest first.
    async fn history(
        &self,
        ctx: &RequestContext,
        ticker: &str,
        range: TimeRange,
        limit: Option<i64>,
    ) -> Result<Vec<RateSample>, DbError>;

    /// Distinct sample timestamps in the window, oldest first.
    async fn snapshot_times(
        &self,
        ctx: &RequestContext,
        range: TimeRange,
        limit: Option<i64>,
    ) -> Result<Vec<DateTime<Utc>>, DbError>;

    /// Exact `(ticker, timestamp)` matches only, ordered by time then ticker.
    async fn rates_at_times(
        &self,
        ctx: &RequestContext,
        tickers: &[String],
        times: &[DateTime<Utc>],
    ) -> Result<Vec<RateSample>, DbError>;

    /// For each ticker, the newest sample at or before `at`, ordered by ticker.
    /// Tickers never sampled by then are absent from the result.
    async fn latest_at_or_before(
        &self,
        ctx: &RequestContext,
        tickers: &[String],
        at: DateTime<Utc>,
    ) -> Result<Vec<RateSample>, DbError>;

    /// Rows where both tickers were sampled at the same instant under the same base,
    /// oldest first. The reporting base is synthesized as a constant 1.0 series.
    async fn paired_rates(
        &self,
        ctx: &RequestContext,
        ticker_a: &str,
        ticker_b: &str,
        range: TimeRange,
        limit: Option<i64>,
    ) -> Result<Vec<PairedRate>, DbError>;

    /// OHLC buckets for one ticker, oldest first. Empty buckets are omitted.
    async fn candles(
        &self,
        ctx: &RequestContext,
        ticker: &str,
        bucket: BucketInterval,
        range: TimeRange,
        limit: Option<i64>,
    ) -> Result<Vec<Candle>, DbError>;
}

/// The append-only ledger of signed currency movements.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Inserts all entries atomically. An empty slice is a no-op.
    async fn append(&self, ctx: &RequestContext, entries: &[NewLedgerEntry])
    -> Result<(), DbError>;

    /// All legs of a trade, newest first, optionally restricted to one user.
    async fn by_trade(
        &self,
        ctx: &RequestContext,
        user_id: Option<i64>,
        trade_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, DbError>;

    /// A user's entries, newest first, optionally for one currency.
    async fn by_user(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        currency: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<LedgerEntry>, DbError>;

    /// A user's entries executed within `[from, to]`, oldest first.
    async fn by_user_between(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, DbError>;

    /// Net amount per currency over entries before `cutoff`.
    /// Currencies that net to zero are left out.
    async fn balances_before(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        cutoff: DateTime<Utc>,
        boundary: Boundary,
    ) -> Result<BTreeMap<String, Decimal>, DbError>;
}

/// Short-lived storage for the latest snapshot.
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Snapshot>, DbError>;

    async fn put(&self, key: &str, snapshot: &Snapshot, ttl: Duration) -> Result<(), DbError>;
}
