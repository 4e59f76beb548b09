use crate::error::LedgerError;
use chrono::Utc;
use core_types::{EntryType, ExchangeRequest, LedgerEntry, NewLedgerEntry};
use database::{LedgerStore, RequestContext};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Writes exchanges into the ledger and reads a user's entries back.
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Records one exchange as a trade of two or three legs and returns its id.
    ///
    /// The legs are a debit in the source currency, a credit in the destination
    /// currency and, when `fee_amount` is non-zero, a fee debit (in the fee
    /// currency, or the source currency when none is given). Every leg shares the
    /// trade id, user, execution time and metadata, and all are appended in a
    /// single atomic batch.
    pub async fn record_exchange(
        &self,
        ctx: &RequestContext,
        request: ExchangeRequest,
    ) -> Result<Uuid, LedgerError> {
        if request.user_id <= 0 {
            return Err(LedgerError::Validation("user_id is required".to_string()));
        }
        let from_currency = core_types::require_currency("from_currency", &request.from_currency)?;
        let to_currency = core_types::require_currency("to_currency", &request.to_currency)?;
        if request.from_amount <= Decimal::ZERO || request.to_amount <= Decimal::ZERO {
            return Err(LedgerError::Validation(
                "amounts must be positive values".to_string(),
            ));
        }

        let trade_id = request.trade_id.unwrap_or_else(Uuid::new_v4);
        let executed_at = request.executed_at.unwrap_or_else(Utc::now);
        let leg = |currency: String, amount: Decimal, entry_type: EntryType| NewLedgerEntry {
            user_id: request.user_id,
            trade_id,
            currency,
            amount,
            executed_at,
            entry_type,
            meta: request.meta.clone(),
        };

        let mut legs = vec![
            leg(from_currency.clone(), -request.from_amount, EntryType::Exchange),
            leg(to_currency, request.to_amount, EntryType::Exchange),
        ];
        if !request.fee_amount.is_zero() {
            let fee_currency = request
                .fee_currency
                .as_deref()
                .map(core_types::normalize_currency)
                .filter(|c| !c.is_empty())
                .unwrap_or(from_currency);
            legs.push(leg(fee_currency, -request.fee_amount, EntryType::Fee));
        }

        self.store.append(ctx, &legs).await?;

        tracing::info!(
            user_id = request.user_id,
            %trade_id,
            legs = legs.len(),
            "Recorded exchange."
        );
        Ok(trade_id)
    }

    /// A user's entries, newest first, optionally for a single currency.
    pub async fn list_entries(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        currency: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        if user_id <= 0 {
            return Err(LedgerError::Validation("user_id is required".to_string()));
        }
        let currency = currency
            .map(core_types::normalize_currency)
            .filter(|c| !c.is_empty());
        Ok(self
            .store
            .by_user(ctx, user_id, currency.as_deref(), limit)
            .await?)
    }

    /// Every leg of one trade. A `user_id` scopes the lookup to that user.
    pub async fn get_trade_entries(
        &self,
        ctx: &RequestContext,
        user_id: Option<i64>,
        trade_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        if trade_id.is_nil() {
            return Err(LedgerError::Validation("trade_id is required".to_string()));
        }
        Ok(self.store.by_trade(ctx, user_id, trade_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use core_types::{Boundary, EntryMeta};
    use database::MemoryLedgerStore;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn executed() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn request() -> ExchangeRequest {
        ExchangeRequest {
            user_id: 7,
            trade_id: None,
            from_currency: "usd".to_string(),
            from_amount: dec!(100),
            to_currency: "eur".to_string(),
            to_amount: dec!(90),
            fee_currency: None,
            fee_amount: dec!(1),
            executed_at: Some(executed()),
            meta: EntryMeta::from_value(json!({"provider": "desk"})).unwrap(),
        }
    }

    fn service() -> (LedgerService, Arc<MemoryLedgerStore>) {
        let store = Arc::new(MemoryLedgerStore::new());
        (LedgerService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn exchange_with_fee_writes_three_legs() {
        let ctx = RequestContext::background();
        let (service, store) = service();

        let trade_id = service.record_exchange(&ctx, request()).await.unwrap();
        let legs = store.all_entries();

        assert_eq!(legs.len(), 3);
        assert_eq!(
            legs.iter().map(|e| e.amount).collect::<Vec<_>>(),
            vec![dec!(-100), dec!(90), dec!(-1)]
        );
        assert_eq!(
            legs.iter().map(|e| e.currency.as_str()).collect::<Vec<_>>(),
            vec!["USD", "EUR", "USD"]
        );
        assert_eq!(
            legs.iter().map(|e| e.entry_type).collect::<Vec<_>>(),
            vec![EntryType::Exchange, EntryType::Exchange, EntryType::Fee]
        );
        assert!(legs.iter().all(|e| e.trade_id == trade_id
            && e.user_id == 7
            && e.executed_at == executed()
            && e.meta.get("provider") == Some(&json!("desk"))));
    }

    #[tokio::test]
    async fn zero_fee_writes_two_legs_and_keeps_the_given_trade_id() {
        let ctx = RequestContext::background();
        let (service, store) = service();
        let given = Uuid::new_v4();

        let trade_id = service
            .record_exchange(
                &ctx,
                ExchangeRequest {
                    trade_id: Some(given),
                    fee_amount: Decimal::ZERO,
                    ..request()
                },
            )
            .await
            .unwrap();

        assert_eq!(trade_id, given);
        assert_eq!(store.all_entries().len(), 2);
    }

    #[tokio::test]
    async fn fee_currency_is_normalized() {
        let ctx = RequestContext::background();
        let (service, store) = service();
        service
            .record_exchange(
                &ctx,
                ExchangeRequest {
                    fee_currency: Some(" gbp ".to_string()),
                    ..request()
                },
            )
            .await
            .unwrap();
        assert_eq!(store.all_entries()[2].currency, "GBP");
    }

    #[tokio::test]
    async fn invalid_requests_write_nothing() {
        let ctx = RequestContext::background();
        let (service, store) = service();

        let cases = vec![
            ExchangeRequest { user_id: 0, ..request() },
            ExchangeRequest { from_currency: "  ".to_string(), ..request() },
            ExchangeRequest { to_currency: String::new(), ..request() },
            ExchangeRequest { from_amount: dec!(0), ..request() },
            ExchangeRequest { to_amount: dec!(-5), ..request() },
        ];
        for case in cases {
            let result = service.record_exchange(&ctx, case).await;
            assert!(matches!(result, Err(LedgerError::Validation(_))));
        }
        assert!(store.all_entries().is_empty());
    }

    #[tokio::test]
    async fn recorded_trade_is_reflected_in_balances() {
        let ctx = RequestContext::background();
        let (service, store) = service();
        service.record_exchange(&ctx, request()).await.unwrap();

        let balances = store
            .balances_before(&ctx, 7, executed(), Boundary::Inclusive)
            .await
            .unwrap();
        assert_eq!(balances.get("USD"), Some(&dec!(-101)));
        assert_eq!(balances.get("EUR"), Some(&dec!(90)));

        let before = store
            .balances_before(&ctx, 7, executed(), Boundary::Exclusive)
            .await
            .unwrap();
        assert!(before.is_empty());
    }

    #[tokio::test]
    async fn list_and_trade_lookups() {
        let ctx = RequestContext::background();
        let (service, _store) = service();
        let trade_id = service.record_exchange(&ctx, request()).await.unwrap();

        let eur = service.list_entries(&ctx, 7, Some("eur"), None).await.unwrap();
        assert_eq!(eur.len(), 1);
        assert_eq!(eur[0].amount, dec!(90));

        assert_eq!(service.list_entries(&ctx, 7, None, Some(2)).await.unwrap().len(), 2);

        assert_eq!(
            service.get_trade_entries(&ctx, Some(7), trade_id).await.unwrap().len(),
            3
        );
        assert!(service
            .get_trade_entries(&ctx, Some(8), trade_id)
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(
            service.get_trade_entries(&ctx, None, Uuid::nil()).await,
            Err(LedgerError::Validation(_))
        ));
    }
}
