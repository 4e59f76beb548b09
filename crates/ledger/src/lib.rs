//! # Ledger Crate
//!
//! Records currency exchanges as append-only, multi-leg ledger trades and
//! serves a user's entries back.
//!
//! ## Public API
//!
//! - `LedgerService`: `record_exchange`, `list_entries`, `get_trade_entries`.
//! - `LedgerError`: validation failures and wrapped storage errors.

pub mod error;
pub mod service;

pub use error::LedgerError;
pub use service::LedgerService;
