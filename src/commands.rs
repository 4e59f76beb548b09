use crate::App;
use crate::output;
use anyhow::Context;
use api_client::{ExConvertClient, RateFeed};
use chrono::{DateTime, Utc};
use clap::Args;
use core_types::{EntryMeta, ExchangeRequest, TimeRange, TradeReceipt};
use database::RequestContext;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// An optional `[from, to]` window shared by the read commands.
#[derive(Args, Debug, Clone, Copy)]
pub struct WindowArgs {
    /// Inclusive lower bound (RFC 3339, e.g. "2024-01-01T00:00:00Z").
    #[arg(long)]
    from: Option<DateTime<Utc>>,

    /// Inclusive upper bound (RFC 3339).
    #[arg(long)]
    to: Option<DateTime<Utc>>,

    /// Maximum number of rows; out-of-range values fall back to the defaults.
    #[arg(long)]
    limit: Option<i64>,
}

impl WindowArgs {
    fn range(&self) -> TimeRange {
        TimeRange::new(self.from, self.to)
    }
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Fetch and store a single snapshot, then exit.
    #[arg(long)]
    once: bool,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    #[arg(long)]
    ticker: String,

    #[command(flatten)]
    window: WindowArgs,

    /// Render as a table instead of JSON.
    #[arg(long)]
    table: bool,
}

#[derive(Args, Debug)]
pub struct CandlesArgs {
    #[arg(long)]
    ticker: String,

    /// Bucket width: 1m, 5m, 15m, 30m, 1h, 4h, 1d or 1w.
    #[arg(long, default_value = "1m")]
    bucket: String,

    #[command(flatten)]
    window: WindowArgs,
}

#[derive(Args, Debug)]
pub struct CrossRateArgs {
    /// The currency being priced.
    #[arg(long)]
    a: String,

    /// The currency the price is expressed in.
    #[arg(long)]
    b: String,

    /// Return only the cross rate at exactly this instant.
    #[arg(long, conflicts_with_all = ["from", "to", "limit"])]
    at: Option<DateTime<Utc>>,

    #[command(flatten)]
    window: WindowArgs,
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    #[arg(long)]
    amount: Decimal,

    #[arg(long = "from-currency")]
    from_currency: String,

    #[arg(long = "to-currency")]
    to_currency: String,

    /// Snapshot instant to convert at; defaults to the latest snapshot.
    #[arg(long)]
    at: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
pub struct CorrelationArgs {
    #[arg(long)]
    a: String,

    #[arg(long)]
    b: String,

    #[command(flatten)]
    window: WindowArgs,
}

#[derive(Args, Debug)]
pub struct ChartArgs {
    #[arg(long)]
    a: String,

    #[arg(long)]
    b: String,

    /// Keep only the last point per bucket of this width; omit for the raw series.
    #[arg(long)]
    bucket: Option<String>,

    #[command(flatten)]
    window: WindowArgs,
}

#[derive(Args, Debug)]
pub struct ExchangeArgs {
    #[arg(long = "user")]
    user_id: i64,

    /// Reuse an existing trade id instead of generating one.
    #[arg(long)]
    trade_id: Option<Uuid>,

    #[arg(long = "from-currency")]
    from_currency: String,

    #[arg(long = "from-amount")]
    from_amount: Decimal,

    #[arg(long = "to-currency")]
    to_currency: String,

    #[arg(long = "to-amount")]
    to_amount: Decimal,

    /// Defaults to the source currency.
    #[arg(long = "fee-currency")]
    fee_currency: Option<String>,

    #[arg(long = "fee-amount", default_value = "0")]
    fee_amount: Decimal,

    /// Defaults to now.
    #[arg(long = "executed-at")]
    executed_at: Option<DateTime<Utc>>,

    /// A JSON object stored with every leg.
    #[arg(long)]
    meta: Option<String>,
}

#[derive(Args, Debug)]
pub struct EntriesArgs {
    #[arg(long = "user")]
    user_id: i64,

    #[arg(long)]
    currency: Option<String>,

    #[arg(long)]
    limit: Option<i64>,

    /// Render as a table instead of JSON.
    #[arg(long)]
    table: bool,
}

#[derive(Args, Debug)]
pub struct TradeArgs {
    #[arg(long)]
    trade_id: Uuid,

    /// Only return legs owned by this user.
    #[arg(long = "user")]
    user_id: Option<i64>,
}

#[derive(Args, Debug)]
pub struct PortfolioValueArgs {
    #[arg(long = "user")]
    user_id: i64,

    /// Target currency; defaults to `[analytics].default_currency`.
    #[arg(long = "in", default_value = "")]
    in_currency: String,

    /// Defaults to now.
    #[arg(long)]
    at: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
pub struct PortfolioHistoryArgs {
    #[arg(long = "user")]
    user_id: i64,

    #[arg(long = "in", default_value = "")]
    in_currency: String,

    #[arg(long)]
    from: DateTime<Utc>,

    #[arg(long)]
    to: DateTime<Utc>,

    #[arg(long)]
    limit: Option<i64>,
}

#[derive(Serialize)]
struct Conversion {
    from_currency: String,
    to_currency: String,
    amount: Decimal,
    rate: f64,
    converted: f64,
    time: DateTime<Utc>,
}

fn request_context(app: &App) -> RequestContext {
    RequestContext::with_timeout(app.config.analytics.request_timeout())
}

async fn ingest_once(app: &App, feed: &dyn RateFeed) -> anyhow::Result<()> {
    let snapshot = feed.fetch_snapshot().await?;
    let ctx = request_context(app);
    app.rates.store_snapshot(&ctx, &snapshot).await?;
    tracing::info!(
        base = %snapshot.base,
        tickers = snapshot.result.len(),
        at = %snapshot.timestamp,
        "Ingested rate snapshot."
    );
    Ok(())
}

/// Polls the feed. Each tick stands alone: a failed cycle is logged and the
/// next tick tries again.
pub async fn ingest(app: &App, args: IngestArgs) -> anyhow::Result<()> {
    let feed = ExConvertClient::new(&app.config.ingestion)?;
    if args.once {
        return ingest_once(app, &feed).await;
    }

    let mut ticker = tokio::time::interval(app.config.ingestion.interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tracing::info!(
        interval_secs = app.config.ingestion.interval_secs,
        "Starting rate ingestion loop."
    );
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = ingest_once(app, &feed).await {
                    tracing::error!(error = %e, "Ingestion cycle failed.");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested; stopping ingestion.");
                return Ok(());
            }
        }
    }
}

pub async fn latest(app: &App) -> anyhow::Result<()> {
    let snapshot = app.analytics.latest_snapshot(&request_context(app)).await?;
    output::print_json(&snapshot)
}

pub async fn history(app: &App, args: HistoryArgs) -> anyhow::Result<()> {
    let samples = app
        .analytics
        .history(&request_context(app), &args.ticker, args.window.range(), args.window.limit)
        .await?;
    if args.table {
        println!("{}", output::samples_table(&samples));
        return Ok(());
    }
    output::print_json(&samples)
}

pub async fn candles(app: &App, args: CandlesArgs) -> anyhow::Result<()> {
    let candles = app
        .analytics
        .candles(
            &request_context(app),
            &args.ticker,
            &args.bucket,
            args.window.range(),
            args.window.limit,
        )
        .await?;
    output::print_json(&candles)
}

pub async fn cross_rate(app: &App, args: CrossRateArgs) -> anyhow::Result<()> {
    let ctx = request_context(app);
    if let Some(at) = args.at {
        let point = app.analytics.cross_rate_at(&ctx, &args.a, &args.b, at).await?;
        return output::print_json(&point);
    }
    let points = app
        .analytics
        .cross_rate_history(&ctx, &args.a, &args.b, args.window.range(), args.window.limit)
        .await?;
    output::print_json(&points)
}

pub async fn convert(app: &App, args: ConvertArgs) -> anyhow::Result<()> {
    let ctx = request_context(app);
    let at = match args.at {
        Some(at) => at,
        None => app.analytics.latest_snapshot(&ctx).await?.timestamp,
    };
    let point = app
        .analytics
        .cross_rate_at(&ctx, &args.from_currency, &args.to_currency, at)
        .await?;
    let amount = f64::try_from(args.amount).context("amount is out of range")?;

    output::print_json(&Conversion {
        from_currency: point.a,
        to_currency: point.b,
        amount: args.amount,
        rate: point.rate,
        converted: amount * point.rate,
        time: point.time,
    })
}

pub async fn correlation(app: &App, args: CorrelationArgs) -> anyhow::Result<()> {
    let result = app
        .analytics
        .correlation(
            &request_context(app),
            &args.a,
            &args.b,
            args.window.range(),
            args.window.limit,
        )
        .await?;
    output::print_json(&result)
}

pub async fn chart(app: &App, args: ChartArgs) -> anyhow::Result<()> {
    let points = app
        .analytics
        .chart(
            &request_context(app),
            &args.a,
            &args.b,
            args.window.range(),
            args.window.limit,
            args.bucket.as_deref(),
        )
        .await?;
    output::print_json(&points)
}

pub async fn exchange(app: &App, args: ExchangeArgs) -> anyhow::Result<()> {
    let meta = match args.meta.as_deref() {
        Some(raw) => {
            let value: serde_json::Value = serde_json::from_str(raw).context("--meta is not valid JSON")?;
            EntryMeta::from_value(value)?
        }
        None => EntryMeta::empty(),
    };

    let request = ExchangeRequest {
        user_id: args.user_id,
        trade_id: args.trade_id,
        from_currency: args.from_currency,
        from_amount: args.from_amount,
        to_currency: args.to_currency,
        to_amount: args.to_amount,
        fee_currency: args.fee_currency,
        fee_amount: args.fee_amount,
        executed_at: args.executed_at,
        meta,
    };
    let trade_id = app
        .ledger
        .record_exchange(&request_context(app), request)
        .await?;
    output::print_json(&TradeReceipt { trade_id })
}

pub async fn entries(app: &App, args: EntriesArgs) -> anyhow::Result<()> {
    let entries = app
        .ledger
        .list_entries(
            &request_context(app),
            args.user_id,
            args.currency.as_deref(),
            args.limit,
        )
        .await?;
    if args.table {
        println!("{}", output::entries_table(&entries));
        return Ok(());
    }
    output::print_json(&entries)
}

pub async fn trade(app: &App, args: TradeArgs) -> anyhow::Result<()> {
    let legs = app
        .ledger
        .get_trade_entries(&request_context(app), args.user_id, args.trade_id)
        .await?;
    output::print_json(&legs)
}

pub async fn portfolio_value(app: &App, args: PortfolioValueArgs) -> anyhow::Result<()> {
    let at = args.at.unwrap_or_else(Utc::now);
    let value = app
        .valuation
        .portfolio_value_at(&request_context(app), args.user_id, &args.in_currency, at)
        .await?;
    output::print_json(&value)
}

pub async fn portfolio_history(app: &App, args: PortfolioHistoryArgs) -> anyhow::Result<()> {
    let points = app
        .valuation
        .portfolio_value_history(
            &request_context(app),
            args.user_id,
            &args.in_currency,
            args.from,
            args.to,
            args.limit,
        )
        .await?;
    output::print_json(&points)
}
