use analytics::{AnalyticsEngine, ValuationEngine};
use anyhow::Context;
use clap::{Parser, Subcommand};
use configuration::Config;
use database::{
    CachedRateStore, InMemorySnapshotCache, LedgerStore, PgLedgerRepository, PgRateRepository,
    RateStore, connect, run_migrations,
};
use ledger::LedgerService;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

mod commands;
mod output;

use commands::{
    CandlesArgs, ChartArgs, ConvertArgs, CorrelationArgs, CrossRateArgs, EntriesArgs,
    ExchangeArgs, HistoryArgs, IngestArgs, PortfolioHistoryArgs, PortfolioValueArgs, TradeArgs,
};

/// Exchange-rate analytics and a multi-currency trading ledger.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the database migrations.
    Migrate,
    /// Fetch rates from the configured feed and store them.
    Ingest(IngestArgs),
    /// Print the most recent snapshot.
    Latest,
    /// Print stored samples of one ticker, newest first.
    History(HistoryArgs),
    /// Print OHLC candles of one ticker.
    Candles(CandlesArgs),
    /// Print the cross rate of two currencies over time, or at one instant.
    CrossRate(CrossRateArgs),
    /// Convert an amount between two currencies at a snapshot.
    Convert(ConvertArgs),
    /// Correlate the log returns of two currencies.
    Correlation(CorrelationArgs),
    /// Print a bucketed cross-rate series for charting.
    Chart(ChartArgs),
    /// Record a currency exchange in the ledger.
    Exchange(ExchangeArgs),
    /// List a user's ledger entries.
    Entries(EntriesArgs),
    /// Show every leg of one trade.
    Trade(TradeArgs),
    /// Value a user's holdings at one instant.
    PortfolioValue(PortfolioValueArgs),
    /// Value a user's holdings at every snapshot in a window.
    PortfolioHistory(PortfolioHistoryArgs),
}

/// Shared services, constructed once and handed to every command.
pub struct App {
    pub config: Config,
    pub rates: Arc<dyn RateStore>,
    pub analytics: AnalyticsEngine,
    pub valuation: ValuationEngine,
    pub ledger: LedgerService,
}

/// Installs the global subscriber. `RUST_LOG` overrides `[logging].level`.
/// The returned guard flushes the file writer and must outlive the program's work.
fn init_tracing(config: &Config) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("invalid log filter")?;

    let (file_layer, guard) = match &config.logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "trading-insights.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("failed to install the tracing subscriber")?;

    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = configuration::load_config().context("failed to load configuration")?;
    let _guard = init_tracing(&config)?;

    let pool = connect(&config.database)
        .await
        .context("failed to connect to the database")?;

    if let Commands::Migrate = cli.command {
        run_migrations(&pool).await?;
        tracing::info!("Database migrations applied.");
        return Ok(());
    }

    let durable: Arc<dyn RateStore> =
        Arc::new(PgRateRepository::new(pool.clone(), &config.rates.reporting_base));
    let rates: Arc<dyn RateStore> = Arc::new(CachedRateStore::new(
        durable,
        Arc::new(InMemorySnapshotCache::new()),
        config.cache.snapshot_ttl(),
    ));
    let ledger_store: Arc<dyn LedgerStore> = Arc::new(PgLedgerRepository::new(pool));

    let app = App {
        analytics: AnalyticsEngine::new(rates.clone()),
        valuation: ValuationEngine::new(
            rates.clone(),
            ledger_store.clone(),
            &config.analytics.default_currency,
            &config.rates.reporting_base,
        ),
        ledger: LedgerService::new(ledger_store),
        rates,
        config,
    };

    match cli.command {
        Commands::Migrate => Ok(()),
        Commands::Ingest(args) => commands::ingest(&app, args).await,
        Commands::Latest => commands::latest(&app).await,
        Commands::History(args) => commands::history(&app, args).await,
        Commands::Candles(args) => commands::candles(&app, args).await,
        Commands::CrossRate(args) => commands::cross_rate(&app, args).await,
        Commands::Convert(args) => commands::convert(&app, args).await,
        Commands::Correlation(args) => commands::correlation(&app, args).await,
        Commands::Chart(args) => commands::chart(&app, args).await,
        Commands::Exchange(args) => commands::exchange(&app, args).await,
        Commands::Entries(args) => commands::entries(&app, args).await,
        Commands::Trade(args) => commands::trade(&app, args).await,
        Commands::PortfolioValue(args) => commands::portfolio_value(&app, args).await,
        Commands::PortfolioHistory(args) => commands::portfolio_history(&app, args).await,
    }
}
