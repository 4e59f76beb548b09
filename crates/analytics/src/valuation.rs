use crate::error::AnalyticsError;
use chrono::{DateTime, Utc};
use core_types::{Boundary, PortfolioValue, RateSample, TimeRange};
use database::{LedgerStore, RateStore, RequestContext, limits};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Prices of one instant: Base->ticker rates and the base they are quoted from.
#[derive(Debug, Default)]
struct PriceTable {
    base: Option<String>,
    rates: HashMap<String, f64>,
}

impl PriceTable {
    fn from_samples<'a>(samples: impl IntoIterator<Item = &'a RateSample>) -> Self {
        let mut table = PriceTable::default();
        for sample in samples {
            let base = core_types::normalize_currency(&sample.base);
            if table.base.is_none() && !base.is_empty() {
                table.base = Some(base);
            }
            table
                .rates
                .insert(core_types::normalize_currency(&sample.ticker), sample.rate);
        }
        table
    }
}

/// Values a set of balances in `in_currency`.
///
/// Rates are Base->currency, so a holding converts to the base by dividing by
/// its rate, and the base total converts out by multiplying by the target's rate.
/// Balances already in the base pass through. Any non-zero holding without a
/// positive rate fails with `NotFound`, as does a target without one.
fn value_balances_in(
    balances: &BTreeMap<String, Decimal>,
    rates: &HashMap<String, f64>,
    base: &str,
    in_currency: &str,
) -> Result<f64, AnalyticsError> {
    let rate_of = |currency: &str| {
        rates
            .get(currency)
            .copied()
            .filter(|rate| *rate > 0.0)
            .ok_or_else(|| AnalyticsError::NotFound(format!("missing rate for currency {currency}")))
    };

    let rate_in = if in_currency == base {
        1.0
    } else {
        rate_of(in_currency)?
    };

    let mut total_base = 0.0;
    for (currency, amount) in balances {
        if amount.is_zero() {
            continue;
        }
        let amount = amount.to_f64().ok_or_else(|| {
            AnalyticsError::Validation(format!("balance of {currency} is not representable"))
        })?;
        if currency == base {
            total_base += amount;
        } else {
            total_base += amount / rate_of(currency.as_str())?;
        }
    }
    Ok(total_base * rate_in)
}

/// Values a user's ledger balances using stored exchange rates.
#[derive(Clone)]
pub struct ValuationEngine {
    rates: Arc<dyn RateStore>,
    ledger: Arc<dyn LedgerStore>,
    default_currency: String,
    fallback_base: String,
}

impl ValuationEngine {
    /// `default_currency` is used when a caller names no target currency and
    /// `fallback_base` when no rate row reveals the pricing base.
    pub fn new(
        rates: Arc<dyn RateStore>,
        ledger: Arc<dyn LedgerStore>,
        default_currency: &str,
        fallback_base: &str,
    ) -> Self {
        Self {
            rates,
            ledger,
            default_currency: core_types::normalize_currency(default_currency),
            fallback_base: core_types::normalize_currency(fallback_base),
        }
    }

    fn target_currency(&self, in_currency: &str) -> String {
        let code = core_types::normalize_currency(in_currency);
        if code.is_empty() {
            self.default_currency.clone()
        } else {
            code
        }
    }

    /// The value of everything the user holds at `at`, entries at `at` included.
    /// Each currency is priced at its latest rate at or before `at`.
    pub async fn portfolio_value_at(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        in_currency: &str,
        at: DateTime<Utc>,
    ) -> Result<PortfolioValue, AnalyticsError> {
        require_user(user_id)?;
        let in_currency = self.target_currency(in_currency);

        let balances = self
            .ledger
            .balances_before(ctx, user_id, at, Boundary::Inclusive)
            .await?;

        let tickers: Vec<String> = balances
            .keys()
            .cloned()
            .chain(std::iter::once(in_currency.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let samples = self.rates.latest_at_or_before(ctx, &tickers, at).await?;
        let prices = PriceTable::from_samples(&samples);
        let base = prices.base.as_deref().unwrap_or(&self.fallback_base);

        let value = value_balances_in(&balances, &prices.rates, base, &in_currency)?;
        Ok(PortfolioValue {
            time: at,
            in_currency,
            value,
        })
    }

    /// The portfolio's value at every snapshot time in `[from, to]`.
    ///
    /// Ledger entries are replayed forward from the balances held before `from`,
    /// and each point is priced only with rates sampled at exactly its own
    /// timestamp. A snapshot lacking a rate for a held currency yields no point.
    pub async fn portfolio_value_history(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        in_currency: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: Option<i64>,
    ) -> Result<Vec<PortfolioValue>, AnalyticsError> {
        require_user(user_id)?;
        if to < from {
            return Err(AnalyticsError::Validation("to must be >= from".to_string()));
        }
        let in_currency = self.target_currency(in_currency);
        let limit = limits::PORTFOLIO_HISTORY.resolve(limit);

        let mut balances = self
            .ledger
            .balances_before(ctx, user_id, from, Boundary::Exclusive)
            .await?;
        let entries = self.ledger.by_user_between(ctx, user_id, from, to).await?;
        let times = self
            .rates
            .snapshot_times(ctx, TimeRange::between(from, to), Some(limit))
            .await?;
        if times.is_empty() {
            return Err(AnalyticsError::NotFound(
                "no price snapshots in requested time range".to_string(),
            ));
        }

        let tickers: Vec<String> = balances
            .keys()
            .cloned()
            .chain(entries.iter().map(|e| e.currency.clone()))
            .chain(std::iter::once(in_currency.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let samples = self.rates.rates_at_times(ctx, &tickers, &times).await?;

        let mut by_time: BTreeMap<DateTime<Utc>, Vec<&RateSample>> = BTreeMap::new();
        for sample in &samples {
            by_time.entry(sample.timestamp).or_default().push(sample);
        }

        let mut pending = entries.iter().peekable();
        let mut points = Vec::with_capacity(times.len());
        for time in times {
            while let Some(entry) = pending.next_if(|e| e.executed_at <= time) {
                *balances.entry(entry.currency.clone()).or_default() += entry.amount;
            }

            let Some(rows) = by_time.get(&time) else {
                tracing::debug!(%time, "No rates at snapshot time; skipping valuation point.");
                continue;
            };
            let prices = PriceTable::from_samples(rows.iter().copied());
            let base = prices.base.as_deref().unwrap_or(&self.fallback_base);

            match value_balances_in(&balances, &prices.rates, base, &in_currency) {
                Ok(value) => points.push(PortfolioValue {
                    time,
                    in_currency: in_currency.clone(),
                    value,
                }),
                Err(AnalyticsError::NotFound(missing)) => {
                    tracing::debug!(%time, %missing, "Incomplete prices at snapshot time; skipping valuation point.");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(user_id, points = points.len(), "Computed portfolio value history.");
        Ok(points)
    }
}

fn require_user(user_id: i64) -> Result<(), AnalyticsError> {
    if user_id <= 0 {
        return Err(AnalyticsError::Validation("user_id is required".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use core_types::{EntryMeta, EntryType, NewLedgerEntry};
    use database::{MemoryLedgerStore, MemoryRateStore};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

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

    fn leg(currency: &str, amount: Decimal, at: DateTime<Utc>) -> NewLedgerEntry {
        NewLedgerEntry {
            user_id: 1,
            trade_id: Uuid::from_u128(1),
            currency: currency.to_string(),
            amount,
            executed_at: at,
            entry_type: EntryType::Exchange,
            meta: EntryMeta::empty(),
        }
    }

    async fn engine(samples: Vec<RateSample>, legs: Vec<NewLedgerEntry>) -> ValuationEngine {
        let rates = MemoryRateStore::new("USD");
        for s in samples {
            rates.insert_sample(s);
        }
        let ledger = MemoryLedgerStore::new();
        ledger
            .append(&RequestContext::background(), &legs)
            .await
            .unwrap();
        ValuationEngine::new(Arc::new(rates), Arc::new(ledger), "USD", "USD")
    }

    #[tokio::test]
    async fn holding_only_the_target_currency_values_to_its_balance() {
        let ctx = RequestContext::background();
        let legs = vec![leg("USD", dec!(100), t(0))];

        let empty_rates = engine(Vec::new(), legs.clone()).await;
        let value = empty_rates.portfolio_value_at(&ctx, 1, "usd", t(10)).await.unwrap();
        assert_eq!(value.value, 100.0);
        assert_eq!(value.in_currency, "USD");

        let with_rates = engine(vec![sample("EUR", 0.9, t(5))], legs).await;
        let value = with_rates.portfolio_value_at(&ctx, 1, "", t(10)).await.unwrap();
        assert_eq!(value.value, 100.0);
    }

    #[tokio::test]
    async fn value_at_includes_entries_at_the_instant_and_carries_rates_forward() {
        let ctx = RequestContext::background();
        let engine = engine(
            vec![sample("EUR", 0.8, t(0)), sample("EUR", 0.9, t(5))],
            vec![leg("EUR", dec!(90), t(10))],
        )
        .await;

        let value = engine.portfolio_value_at(&ctx, 1, "USD", t(10)).await.unwrap();
        assert!((value.value - 100.0).abs() < 1e-9);

        let in_eur = engine.portfolio_value_at(&ctx, 1, "EUR", t(10)).await.unwrap();
        assert!((in_eur.value - 90.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unpriced_holding_is_not_found() {
        let ctx = RequestContext::background();
        let engine = engine(vec![sample("EUR", 0.9, t(0))], vec![leg("JPY", dec!(1000), t(0))]).await;
        assert!(matches!(
            engine.portfolio_value_at(&ctx, 1, "USD", t(1)).await,
            Err(AnalyticsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn valuation_is_deterministic() {
        let ctx = RequestContext::background();
        let engine = engine(
            vec![
                sample("EUR", 0.9137, t(0)),
                sample("GBP", 0.7911, t(0)),
                sample("JPY", 147.31, t(0)),
            ],
            vec![
                leg("EUR", dec!(12.34), t(0)),
                leg("GBP", dec!(56.78), t(0)),
                leg("JPY", dec!(9012.5), t(0)),
                leg("USD", dec!(0.01), t(0)),
            ],
        )
        .await;

        let first = engine.portfolio_value_at(&ctx, 1, "EUR", t(1)).await.unwrap();
        for _ in 0..5 {
            let again = engine.portfolio_value_at(&ctx, 1, "EUR", t(1)).await.unwrap();
            assert_eq!(again.value.to_bits(), first.value.to_bits());
        }
    }

    #[tokio::test]
    async fn history_replays_entries_and_skips_unpriced_snapshots() {
        let ctx = RequestContext::background();
        let engine = engine(
            vec![
                sample("EUR", 0.9, t(0)),
                sample("EUR", 0.9, t(10)),
                // Only an unrelated ticker was sampled here.
                sample("JPY", 150.0, t(20)),
                sample("EUR", 0.8, t(30)),
            ],
            vec![
                leg("USD", dec!(100), t(-60)),
                leg("USD", dec!(-100), t(5)),
                leg("EUR", dec!(90), t(5)),
            ],
        )
        .await;

        let points = engine
            .portfolio_value_history(&ctx, 1, "USD", t(0), t(30), None)
            .await
            .unwrap();
        let times: Vec<DateTime<Utc>> = points.iter().map(|p| p.time).collect();
        assert_eq!(times, vec![t(0), t(10), t(30)]);
        assert_eq!(points[0].value, 100.0);
        assert!((points[1].value - 100.0).abs() < 1e-9);
        assert!((points[2].value - 112.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn history_omits_a_snapshot_missing_one_held_currency() {
        let ctx = RequestContext::background();
        let engine = engine(
            vec![
                sample("EUR", 0.9, t(0)),
                sample("GBP", 0.8, t(0)),
                // GBP was not sampled in this cycle.
                sample("EUR", 0.9, t(10)),
                sample("EUR", 0.9, t(20)),
                sample("GBP", 0.8, t(20)),
            ],
            vec![leg("EUR", dec!(90), t(-5)), leg("GBP", dec!(80), t(-5))],
        )
        .await;

        let points = engine
            .portfolio_value_history(&ctx, 1, "USD", t(0), t(20), None)
            .await
            .unwrap();
        let times: Vec<DateTime<Utc>> = points.iter().map(|p| p.time).collect();
        assert_eq!(times, vec![t(0), t(20)]);
        assert!(points.iter().all(|p| (p.value - 200.0).abs() < 1e-9));
    }

    #[tokio::test]
    async fn history_validates_its_window() {
        let ctx = RequestContext::background();
        let engine = engine(vec![sample("EUR", 0.9, t(0))], Vec::new()).await;

        assert!(matches!(
            engine.portfolio_value_history(&ctx, 1, "USD", t(10), t(0), None).await,
            Err(AnalyticsError::Validation(_))
        ));
        assert!(matches!(
            engine.portfolio_value_history(&ctx, 0, "USD", t(0), t(10), None).await,
            Err(AnalyticsError::Validation(_))
        ));
        assert!(matches!(
            engine.portfolio_value_history(&ctx, 1, "USD", t(100), t(200), None).await,
            Err(AnalyticsError::NotFound(_))
        ));
    }
}
