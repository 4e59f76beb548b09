//! # Database Crate
//!
//! Durable storage for the two append-only datasets of the system: the
//! exchange-rate time series and the per-user ledger.
//!
//! ## Architectural Principles
//!
//! - **Traits at the seam:** services depend on [`RateStore`] and [`LedgerStore`]
//!   through `Arc<dyn ...>`, so the PostgreSQL repositories and the in-memory
//!   stores are interchangeable.
//! - **Append-only:** neither store exposes an update or delete. Balances are
//!   always derived on read with a single aggregate query.
//! - **Deadlines:** every store call takes a [`RequestContext`] and is aborted
//!   with [`DbError::Cancelled`] once the request deadline passes.
//!
//! ## Public API
//!
//! - `connect` / `run_migrations`: pool construction and schema setup.
//! - `PgRateRepository` / `PgLedgerRepository`: the PostgreSQL stores.
//! - `MemoryRateStore` / `MemoryLedgerStore`: in-process stores with the same contracts.
//! - `CachedRateStore` / `InMemorySnapshotCache`: latest-snapshot caching.
//! - `limits`: default and maximum row counts per query.

pub mod cache;
pub mod connection;
pub mod context;
pub mod error;
pub mod ledger;
pub mod limits;
pub mod memory;
pub mod rates;
pub mod store;

pub use cache::{CachedRateStore, InMemorySnapshotCache, LATEST_SNAPSHOT_KEY};
pub use connection::{connect, run_migrations};
pub use context::RequestContext;
pub use error::DbError;
pub use ledger::{DbLedgerEntry, PgLedgerRepository};
pub use memory::{MemoryLedgerStore, MemoryRateStore};
pub use rates::{DbCandle, DbPairedRate, DbRateSample, PgRateRepository};
pub use store::{LedgerStore, RateStore, SnapshotCache};
