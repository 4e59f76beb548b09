//! In-process implementations of the store traits.
//!
//! They follow the same ordering, limit, and atomicity contracts as the
//! PostgreSQL repositories and back the service-level tests of the workspace.

use crate::context::RequestContext;
use crate::error::DbError;
use crate::ledger::require_user;
use crate::limits;
use crate::store::{LedgerStore, RateStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{
    Boundary, BucketInterval, Candle, LedgerEntry, NewLedgerEntry, PairedRate,
    RateSample, Snapshot, TimeRange,
};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredSample {
    id: i64,
    sample: RateSample,
}

#[derive(Debug, Default)]
struct RateTable {
    next_id: i64,
    rows: Vec<StoredSample>,
}

/// Rate time series held in memory.
#[derive(Debug)]
pub struct MemoryRateStore {
    reporting_base: String,
    table: RwLock<RateTable>,
}

impl MemoryRateStore {
    pub fn new(reporting_base: &str) -> Self {
        Self {
            reporting_base: core_types::normalize_currency(reporting_base),
            table: RwLock::new(RateTable::default()),
        }
    }

    /// Inserts one sample directly, bypassing snapshot validation.
    pub fn insert_sample(&self, sample: RateSample) {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        table.next_id += 1;
        let id = table.next_id;
        table.rows.push(StoredSample { id, sample });
    }

    /// Rows matching `filter`, ordered oldest first (ties broken by insertion order).
    fn select<F>(&self, filter: F) -> Vec<StoredSample>
    where
        F: Fn(&RateSample) -> bool,
    {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        let mut rows: Vec<StoredSample> = table
            .rows
            .iter()
            .filter(|row| filter(&row.sample))
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.sample.timestamp, row.id));
        rows
    }

    /// Samples of `ticker` under the reporting base, paired against a constant 1.0.
    fn synthesized_pairs(&self, ticker: &str, range: TimeRange, base_first: bool) -> Vec<PairedRate> {
        self.select(|s| {
            s.ticker == ticker && s.base == self.reporting_base && range.contains(s.timestamp)
        })
        .into_iter()
        .map(|row| {
            let (rate_a, rate_b) = if base_first {
                (1.0, row.sample.rate)
            } else {
                (row.sample.rate, 1.0)
            };
            PairedRate {
                time: row.sample.timestamp,
                rate_a,
                rate_b,
                base: row.sample.base,
            }
        })
        .collect()
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn store_snapshot(
        &self,
        ctx: &RequestContext,
        snapshot: &Snapshot,
    ) -> Result<(), DbError> {
        ctx.run("store_snapshot", async {
            snapshot.validate()?;
            let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
            for sample in snapshot.samples() {
                table.next_id += 1;
                let id = table.next_id;
                table.rows.push(StoredSample { id, sample });
            }
            Ok(())
        })
        .await
    }

    async fn latest_snapshot(&self, ctx: &RequestContext) -> Result<Snapshot, DbError> {
        ctx.run("latest_snapshot", async {
            let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
            let latest = table
                .rows
                .iter()
                .map(|row| row.sample.timestamp)
                .max()
                .ok_or_else(|| DbError::NotFound("no currency snapshots found".to_string()))?;
            let samples: Vec<RateSample> = table
                .rows
                .iter()
                .filter(|row| row.sample.timestamp == latest)
                .map(|row| row.sample.clone())
                .collect();
            Snapshot::from_samples(latest, &samples)
                .ok_or_else(|| DbError::NotFound("no currencies found for latest snapshot".to_string()))
        })
        .await
    }

    async fn history(
        &self,
        ctx: &RequestContext,
        ticker: &str,
        range: TimeRange,
        limit: Option<i64>,
    ) -> Result<Vec<RateSample>, DbError> {
        let limit = limits::HISTORY.resolve(limit) as usize;
        ctx.run("history", async {
            let rows = self.select(|s| s.ticker == ticker && range.contains(s.timestamp));
            Ok(rows
                .into_iter()
                .rev()
                .take(limit)
                .map(|row| row.sample)
                .collect())
        })
        .await
    }

    async fn snapshot_times(
        &self,
        ctx: &RequestContext,
        range: TimeRange,
        limit: Option<i64>,
    ) -> Result<Vec<DateTime<Utc>>, DbError> {
        let limit = limits::SNAPSHOT_TIMES.resolve(limit) as usize;
        ctx.run("snapshot_times", async {
            let times: BTreeSet<DateTime<Utc>> = self
                .select(|s| range.contains(s.timestamp))
                .into_iter()
                .map(|row| row.sample.timestamp)
                .collect();
            Ok(times.into_iter().take(limit).collect())
        })
        .await
    }

    async fn rates_at_times(
        &self,
        ctx: &RequestContext,
        tickers: &[String],
        times: &[DateTime<Utc>],
    ) -> Result<Vec<RateSample>, DbError> {
        ctx.run("rates_at_times", async {
            if tickers.is_empty() || times.is_empty() {
                return Ok(Vec::new());
            }
            let wanted_tickers: HashSet<&str> = tickers.iter().map(String::as_str).collect();
            let wanted_times: HashSet<DateTime<Utc>> = times.iter().copied().collect();
            let mut rows = self.select(|s| {
                wanted_tickers.contains(s.ticker.as_str()) && wanted_times.contains(&s.timestamp)
            });
            rows.sort_by(|x, y| {
                (x.sample.timestamp, &x.sample.ticker, x.id)
                    .cmp(&(y.sample.timestamp, &y.sample.ticker, y.id))
            });
            Ok(rows.into_iter().map(|row| row.sample).collect())
        })
        .await
    }

    async fn latest_at_or_before(
        &self,
        ctx: &RequestContext,
        tickers: &[String],
        at: DateTime<Utc>,
    ) -> Result<Vec<RateSample>, DbError> {
        ctx.run("latest_at_or_before", async {
            let wanted: HashSet<&str> = tickers.iter().map(String::as_str).collect();
            // Rows are oldest first, so the last write per ticker wins.
            let latest: BTreeMap<String, RateSample> = self
                .select(|s| wanted.contains(s.ticker.as_str()) && s.timestamp <= at)
                .into_iter()
                .map(|row| (row.sample.ticker.clone(), row.sample))
                .collect();
            Ok(latest.into_values().collect())
        })
        .await
    }

    async fn paired_rates(
        &self,
        ctx: &RequestContext,
        ticker_a: &str,
        ticker_b: &str,
        range: TimeRange,
        limit: Option<i64>,
    ) -> Result<Vec<PairedRate>, DbError> {
        let limit = limits::PAIRED_RATES.resolve(limit) as usize;
        ctx.run("paired_rates", async {
            let a_is_base = ticker_a == self.reporting_base;
            let b_is_base = ticker_b == self.reporting_base;

            let mut pairs = match (a_is_base, b_is_base) {
                (true, false) => self.synthesized_pairs(ticker_b, range, true),
                (false, true) => self.synthesized_pairs(ticker_a, range, false),
                _ => {
                    let b_rows: BTreeMap<(DateTime<Utc>, String), f64> = self
                        .select(|s| s.ticker == ticker_b && range.contains(s.timestamp))
                        .into_iter()
                        .map(|row| ((row.sample.timestamp, row.sample.base), row.sample.rate))
                        .collect();
                    self.select(|s| s.ticker == ticker_a && range.contains(s.timestamp))
                        .into_iter()
                        .filter_map(|row| {
                            let key = (row.sample.timestamp, row.sample.base.clone());
                            b_rows.get(&key).map(|rate_b| PairedRate {
                                time: row.sample.timestamp,
                                rate_a: row.sample.rate,
                                rate_b: *rate_b,
                                base: row.sample.base,
                            })
                        })
                        .collect()
                }
            };
            pairs.truncate(limit);
            Ok(pairs)
        })
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
        let limit = limits::CANDLES.resolve(limit) as usize;
        ctx.run("candles", async {
            let mut buckets: BTreeMap<DateTime<Utc>, Candle> = BTreeMap::new();
            for row in self.select(|s| s.ticker == ticker && range.contains(s.timestamp)) {
                let rate = row.sample.rate;
                buckets
                    .entry(bucket.bucket_start(row.sample.timestamp))
                    .and_modify(|candle| {
                        candle.high = candle.high.max(rate);
                        candle.low = candle.low.min(rate);
                        candle.close = rate;
                        candle.samples += 1;
                    })
                    .or_insert_with_key(|start| Candle {
                        bucket: *start,
                        open: rate,
                        high: rate,
                        low: rate,
                        close: rate,
                        samples: 1,
                    });
            }
            Ok(buckets.into_values().take(limit).collect())
        })
        .await
    }
}

#[derive(Debug, Default)]
struct LedgerTable {
    next_id: i64,
    rows: Vec<LedgerEntry>,
}

/// Ledger held in memory.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    table: RwLock<LedgerTable>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored row in insertion order.
    pub fn all_entries(&self) -> Vec<LedgerEntry> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .rows
            .clone()
    }

    fn select<F>(&self, filter: F) -> Vec<LedgerEntry>
    where
        F: Fn(&LedgerEntry) -> bool,
    {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        let mut rows: Vec<LedgerEntry> = table.rows.iter().filter(|&e| filter(e)).cloned().collect();
        rows.sort_by_key(|e| (e.executed_at, e.id));
        rows
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn append(&self, ctx: &RequestContext, entries: &[NewLedgerEntry]) -> Result<(), DbError> {
        ctx.run("append", async {
            if entries.is_empty() {
                return Ok(());
            }
            // Validate the whole batch before the first row lands.
            for entry in entries {
                require_user(entry.user_id)?;
            }
            let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
            let created_at = Utc::now();
            for entry in entries {
                table.next_id += 1;
                let id = table.next_id;
                table.rows.push(LedgerEntry {
                    id,
                    user_id: entry.user_id,
                    trade_id: entry.trade_id,
                    currency: entry.currency.clone(),
                    amount: entry.amount,
                    executed_at: entry.executed_at,
                    entry_type: entry.entry_type,
                    meta: entry.meta.clone(),
                    created_at,
                });
            }
            Ok(())
        })
        .await
    }

    async fn by_trade(
        &self,
        ctx: &RequestContext,
        user_id: Option<i64>,
        trade_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, DbError> {
        ctx.run("by_trade", async {
            let mut rows = self.select(|e| {
                e.trade_id == trade_id && user_id.is_none_or(|user| e.user_id == user)
            });
            rows.reverse();
            Ok(rows)
        })
        .await
    }

    async fn by_user(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        currency: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<LedgerEntry>, DbError> {
        let limit = limits::LEDGER_ENTRIES.resolve(limit) as usize;
        ctx.run("by_user", async {
            require_user(user_id)?;
            let rows = self.select(|e| {
                e.user_id == user_id && currency.is_none_or(|c| e.currency == c)
            });
            Ok(rows.into_iter().rev().take(limit).collect())
        })
        .await
    }

    async fn by_user_between(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, DbError> {
        ctx.run("by_user_between", async {
            require_user(user_id)?;
            Ok(self.select(|e| e.user_id == user_id && e.executed_at >= from && e.executed_at <= to))
        })
        .await
    }

    async fn balances_before(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        cutoff: DateTime<Utc>,
        boundary: Boundary,
    ) -> Result<BTreeMap<String, Decimal>, DbError> {
        ctx.run("balances_before", async {
            require_user(user_id)?;
            let mut balances: BTreeMap<String, Decimal> = BTreeMap::new();
            let included = |e: &LedgerEntry| match boundary {
                Boundary::Exclusive => e.executed_at < cutoff,
                Boundary::Inclusive => e.executed_at <= cutoff,
            };
            for entry in self.select(|e| e.user_id == user_id && included(e)) {
                *balances.entry(entry.currency).or_default() += entry.amount;
            }
            balances.retain(|_, amount| !amount.is_zero());
            Ok(balances)
        })
        .await
    }
}
