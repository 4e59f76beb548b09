use crate::context::RequestContext;
use crate::error::DbError;
use crate::limits;
use crate::store::RateStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{BucketInterval, Candle, PairedRate, RateSample, Snapshot, TimeRange};
use sqlx::postgres::PgPool;
use sqlx::FromRow;

/// Database-specific sample struct that matches the `rate_samples` table schema.
#[derive(Debug, Clone, FromRow)]
pub struct DbRateSample {
    pub ticker: String,
    pub base: String,
    pub rate: f64,
    pub fetched_time: DateTime<Utc>,
}

impl From<DbRateSample> for RateSample {
    fn from(row: DbRateSample) -> Self {
        Self {
            ticker: row.ticker,
            base: row.base,
            rate: row.rate,
            timestamp: row.fetched_time,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbPairedRate {
    pub time: DateTime<Utc>,
    pub rate_a: f64,
    pub rate_b: f64,
    pub base: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbCandle {
    pub bucket: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub samples: i64,
}

const SAMPLE_COLUMNS: &str = "ticker, base, rate, fetched_time";

// Rows whose counterpart ticker is the reporting base, which is never stored.
const PAIRED_WITH_BASE_FIRST: &str = r#"
    SELECT fetched_time AS time, 1.0::float8 AS rate_a, rate AS rate_b, base
    FROM rate_samples
    WHERE ticker = $1 AND base = $2
      AND ($3::timestamptz IS NULL OR fetched_time >= $3)
      AND ($4::timestamptz IS NULL OR fetched_time <= $4)
    ORDER BY fetched_time ASC, id ASC
    LIMIT $5
"#;

const PAIRED_WITH_BASE_SECOND: &str = r#"
    SELECT fetched_time AS time, rate AS rate_a, 1.0::float8 AS rate_b, base
    FROM rate_samples
    WHERE ticker = $1 AND base = $2
      AND ($3::timestamptz IS NULL OR fetched_time >= $3)
      AND ($4::timestamptz IS NULL OR fetched_time <= $4)
    ORDER BY fetched_time ASC, id ASC
    LIMIT $5
"#;

const PAIRED_JOIN: &str = r#"
    SELECT a.fetched_time AS time, a.rate AS rate_a, b.rate AS rate_b, a.base
    FROM rate_samples AS a
    JOIN rate_samples AS b
      ON b.fetched_time = a.fetched_time AND b.base = a.base AND b.ticker = $2
    WHERE a.ticker = $1
      AND ($3::timestamptz IS NULL OR a.fetched_time >= $3)
      AND ($4::timestamptz IS NULL OR a.fetched_time <= $4)
    ORDER BY a.fetched_time ASC, a.id ASC
    LIMIT $5
"#;

/// PostgreSQL-backed [`RateStore`] over the `rate_samples` table.
#[derive(Debug, Clone)]
pub struct PgRateRepository {
    pool: PgPool,
    reporting_base: String,
}

impl PgRateRepository {
    /// `reporting_base` is the currency the feed quotes against; it is
    /// synthesized as a constant 1.0 series by [`RateStore::paired_rates`].
    pub fn new(pool: PgPool, reporting_base: &str) -> Self {
        Self {
            pool,
            reporting_base: core_types::normalize_currency(reporting_base),
        }
    }
}

#[async_trait]
impl RateStore for PgRateRepository {
    async fn store_snapshot(
        &self,
        ctx: &RequestContext,
        snapshot: &Snapshot,
    ) -> Result<(), DbError> {
        snapshot.validate()?;
        ctx.run("store_snapshot", async {
            let mut tx = self.pool.begin().await?;
            for (ticker, rate) in &snapshot.result {
                sqlx::query(
                    "INSERT INTO rate_samples (ticker, base, rate, fetched_time) VALUES ($1, $2, $3, $4)",
                )
                .bind(ticker)
                .bind(&snapshot.base)
                .bind(rate)
                .bind(snapshot.timestamp)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            Ok(())
        })
        .await?;

        tracing::debug!(
            base = %snapshot.base,
            tickers = snapshot.result.len(),
            at = %snapshot.timestamp,
            "Stored currency snapshot."
        );
        Ok(())
    }

    async fn latest_snapshot(&self, ctx: &RequestContext) -> Result<Snapshot, DbError> {
        let rows = ctx
            .run("latest_snapshot", async {
                let rows = sqlx::query_as::<_, DbRateSample>(&format!(
                    "SELECT {SAMPLE_COLUMNS} FROM rate_samples \
                     WHERE fetched_time = (SELECT MAX(fetched_time) FROM rate_samples) \
                     ORDER BY ticker ASC"
                ))
                .fetch_all(&self.pool)
                .await?;
                Ok(rows)
            })
            .await?;

        let samples: Vec<RateSample> = rows.into_iter().map(RateSample::from).collect();
        let timestamp = samples
            .first()
            .map(|s| s.timestamp)
            .ok_or_else(|| DbError::NotFound("no currency snapshots found".to_string()))?;
        Snapshot::from_samples(timestamp, &samples)
            .ok_or_else(|| DbError::NotFound("no currencies found for latest snapshot".to_string()))
    }

    async fn history(
        &self,
        ctx: &RequestContext,
        ticker: &str,
        range: TimeRange,
        limit: Option<i64>,
    ) -> Result<Vec<RateSample>, DbError> {
        let limit = limits::HISTORY.resolve(limit);
        ctx.run("history", async {
            let rows = sqlx::query_as::<_, DbRateSample>(&format!(
                "SELECT {SAMPLE_COLUMNS} FROM rate_samples \
                 WHERE ticker = $1 \
                   AND ($2::timestamptz IS NULL OR fetched_time >= $2) \
                   AND ($3::timestamptz IS NULL OR fetched_time <= $3) \
                 ORDER BY fetched_time DESC, id DESC \
                 LIMIT $4"
            ))
            .bind(ticker)
            .bind(range.from)
            .bind(range.to)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(RateSample::from).collect())
        })
        .await
    }

    async fn snapshot_times(
        &self,
        ctx: &RequestContext,
        range: TimeRange,
        limit: Option<i64>,
    ) -> Result<Vec<DateTime<Utc>>, DbError> {
        let limit = limits::SNAPSHOT_TIMES.resolve(limit);
        ctx.run("snapshot_times", async {
            let times = sqlx::query_scalar::<_, DateTime<Utc>>(
                r#"
                SELECT DISTINCT fetched_time
                FROM rate_samples
                WHERE ($1::timestamptz IS NULL OR fetched_time >= $1)
                  AND ($2::timestamptz IS NULL OR fetched_time <= $2)
                ORDER BY fetched_time ASC
                LIMIT $3
                "#,
            )
            .bind(range.from)
            .bind(range.to)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(times)
        })
        .await
    }

    async fn rates_at_times(
        &self,
        ctx: &RequestContext,
        tickers: &[String],
        times: &[DateTime<Utc>],
    ) -> Result<Vec<RateSample>, DbError> {
        if tickers.is_empty() || times.is_empty() {
            return Ok(Vec::new());
        }
        ctx.run("rates_at_times", async {
            let rows = sqlx::query_as::<_, DbRateSample>(&format!(
                "SELECT {SAMPLE_COLUMNS} FROM rate_samples \
                 WHERE ticker = ANY($1) AND fetched_time = ANY($2) \
                 ORDER BY fetched_time ASC, ticker ASC, id ASC"
            ))
            .bind(tickers)
            .bind(times)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(RateSample::from).collect())
        })
        .await
    }

    async fn latest_at_or_before(
        &self,
        ctx: &RequestContext,
        tickers: &[String],
        at: DateTime<Utc>,
    ) -> Result<Vec<RateSample>, DbError> {
        if tickers.is_empty() {
            return Ok(Vec::new());
        }
        ctx.run("latest_at_or_before", async {
            let rows = sqlx::query_as::<_, DbRateSample>(&format!(
                "SELECT DISTINCT ON (ticker) {SAMPLE_COLUMNS} FROM rate_samples \
                 WHERE ticker = ANY($1) AND fetched_time <= $2 \
                 ORDER BY ticker ASC, fetched_time DESC, id DESC"
            ))
            .bind(tickers)
            .bind(at)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(RateSample::from).collect())
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
        let limit = limits::PAIRED_RATES.resolve(limit);
        let a_is_base = ticker_a == self.reporting_base;
        let b_is_base = ticker_b == self.reporting_base;

        let query = match (a_is_base, b_is_base) {
            (true, false) => sqlx::query_as::<_, DbPairedRate>(PAIRED_WITH_BASE_FIRST)
                .bind(ticker_b)
                .bind(&self.reporting_base),
            (false, true) => sqlx::query_as::<_, DbPairedRate>(PAIRED_WITH_BASE_SECOND)
                .bind(ticker_a)
                .bind(&self.reporting_base),
            _ => sqlx::query_as::<_, DbPairedRate>(PAIRED_JOIN)
                .bind(ticker_a)
                .bind(ticker_b),
        };

        ctx.run("paired_rates", async {
            let rows = query
                .bind(range.from)
                .bind(range.to)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows
                .into_iter()
                .map(|row| PairedRate {
                    time: row.time,
                    rate_a: row.rate_a,
                    rate_b: row.rate_b,
                    base: row.base,
                })
                .collect())
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
        let limit = limits::CANDLES.resolve(limit);
        // date_bin needs PostgreSQL 14 or newer. The origin is a Monday, as in BucketInterval.
        ctx.run("candles", async {
            let rows = sqlx::query_as::<_, DbCandle>(
                r#"
                SELECT
                    date_bin(make_interval(secs => $2), fetched_time, TIMESTAMPTZ '1970-01-05 00:00:00+00') AS bucket,
                    (array_agg(rate ORDER BY fetched_time ASC, id ASC))[1] AS open,
                    MAX(rate) AS high,
                    MIN(rate) AS low,
                    (array_agg(rate ORDER BY fetched_time DESC, id DESC))[1] AS close,
                    COUNT(*) AS samples
                FROM rate_samples
                WHERE ticker = $1
                  AND ($3::timestamptz IS NULL OR fetched_time >= $3)
                  AND ($4::timestamptz IS NULL OR fetched_time <= $4)
                GROUP BY bucket
                ORDER BY bucket ASC
                LIMIT $5
                "#,
            )
            .bind(ticker)
            .bind(bucket.seconds() as f64)
            .bind(range.from)
            .bind(range.to)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows
                .into_iter()
                .map(|row| Candle {
                    bucket: row.bucket,
                    open: row.open,
                    high: row.high,
                    low: row.low,
                    close: row.close,
                    samples: row.samples,
                })
                .collect())
        })
        .await
    }
}
