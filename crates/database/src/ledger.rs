use crate::context::RequestContext;
use crate::error::DbError;
use crate::limits;
use crate::store::LedgerStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{Boundary, CoreError, EntryMeta, EntryType, LedgerEntry, NewLedgerEntry};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgPool, Postgres};
use sqlx::types::Json;
use sqlx::{FromRow, Transaction};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Database-specific entry struct that matches the `ledger_entries` table schema.
#[derive(Debug, Clone, FromRow)]
pub struct DbLedgerEntry {
    pub id: i64,
    pub user_id: i64,
    pub trade_id: Uuid,
    pub currency: String,
    pub amount: Decimal,
    pub executed_at: DateTime<Utc>,
    pub entry_type: EntryType,
    pub meta: Json<JsonValue>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbLedgerEntry> for LedgerEntry {
    type Error = DbError;

    fn try_from(row: DbLedgerEntry) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            trade_id: row.trade_id,
            currency: row.currency,
            amount: row.amount,
            executed_at: row.executed_at,
            entry_type: row.entry_type,
            meta: EntryMeta::from_value(row.meta.0)?,
            created_at: row.created_at,
        })
    }
}

const ENTRY_COLUMNS: &str =
    "id, user_id, trade_id, currency, amount, executed_at, entry_type, meta, created_at";

const BALANCES_EXCLUSIVE: &str = r#"
    SELECT currency, SUM(amount) AS balance
    FROM ledger_entries
    WHERE user_id = $1 AND executed_at < $2
    GROUP BY currency
    HAVING SUM(amount) <> 0
    ORDER BY currency ASC
"#;

const BALANCES_INCLUSIVE: &str = r#"
    SELECT currency, SUM(amount) AS balance
    FROM ledger_entries
    WHERE user_id = $1 AND executed_at <= $2
    GROUP BY currency
    HAVING SUM(amount) <> 0
    ORDER BY currency ASC
"#;

/// Ledger reads scoped to a user need a real one.
pub(crate) fn require_user(user_id: i64) -> Result<(), DbError> {
    if user_id <= 0 {
        return Err(CoreError::invalid("user_id", "user_id is required").into());
    }
    Ok(())
}

fn into_entries(rows: Vec<DbLedgerEntry>) -> Result<Vec<LedgerEntry>, DbError> {
    rows.into_iter().map(LedgerEntry::try_from).collect()
}

/// PostgreSQL-backed [`LedgerStore`] over the `ledger_entries` table.
#[derive(Debug, Clone)]
pub struct PgLedgerRepository {
    pool: PgPool,
}

impl PgLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerRepository {
    async fn append(&self, ctx: &RequestContext, entries: &[NewLedgerEntry]) -> Result<(), DbError> {
        if entries.is_empty() {
            return Ok(());
        }
        for entry in entries {
            require_user(entry.user_id)?;
        }

        ctx.run("append", async {
            let mut tx: Transaction<Postgres> = self.pool.begin().await?;
            for entry in entries {
                sqlx::query(
                    r#"
                    INSERT INTO ledger_entries (
                        user_id, trade_id, currency, amount, executed_at, entry_type, meta
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                    "#,
                )
                .bind(entry.user_id)
                .bind(entry.trade_id)
                .bind(&entry.currency)
                .bind(entry.amount)
                .bind(entry.executed_at)
                .bind(entry.entry_type)
                .bind(Json(&entry.meta))
                .execute(&mut *tx)
                .await?;
            }
            // Dropping an uncommitted transaction rolls every leg back.
            tx.commit().await?;
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
        let rows = ctx
            .run("by_trade", async {
                let rows = sqlx::query_as::<_, DbLedgerEntry>(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM ledger_entries \
                     WHERE trade_id = $1 AND ($2::bigint IS NULL OR user_id = $2) \
                     ORDER BY executed_at DESC, id DESC"
                ))
                .bind(trade_id)
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
                Ok(rows)
            })
            .await?;
        into_entries(rows)
    }

    async fn by_user(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        currency: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<LedgerEntry>, DbError> {
        require_user(user_id)?;
        let limit = limits::LEDGER_ENTRIES.resolve(limit);
        let rows = ctx
            .run("by_user", async {
                let rows = sqlx::query_as::<_, DbLedgerEntry>(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM ledger_entries \
                     WHERE user_id = $1 AND ($2::text IS NULL OR currency = $2) \
                     ORDER BY executed_at DESC, id DESC \
                     LIMIT $3"
                ))
                .bind(user_id)
                .bind(currency)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
                Ok(rows)
            })
            .await?;
        into_entries(rows)
    }

    async fn by_user_between(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, DbError> {
        require_user(user_id)?;
        let rows = ctx
            .run("by_user_between", async {
                let rows = sqlx::query_as::<_, DbLedgerEntry>(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM ledger_entries \
                     WHERE user_id = $1 AND executed_at >= $2 AND executed_at <= $3 \
                     ORDER BY executed_at ASC, id ASC"
                ))
                .bind(user_id)
                .bind(from)
                .bind(to)
                .fetch_all(&self.pool)
                .await?;
                Ok(rows)
            })
            .await?;
        into_entries(rows)
    }

    async fn balances_before(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        cutoff: DateTime<Utc>,
        boundary: Boundary,
    ) -> Result<BTreeMap<String, Decimal>, DbError> {
        require_user(user_id)?;
        let sql = match boundary {
            Boundary::Exclusive => BALANCES_EXCLUSIVE,
            Boundary::Inclusive => BALANCES_INCLUSIVE,
        };
        // One aggregate statement, so the sums come from a single consistent read.
        ctx.run("balances_before", async {
            let rows = sqlx::query_as::<_, (String, Decimal)>(sql)
                .bind(user_id)
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows.into_iter().collect())
        })
        .await
    }
}
