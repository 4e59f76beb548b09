//! # Core Types
//!
//! The shared vocabulary of the workspace: rate samples and snapshots, ledger
//! entries, and the outputs of the analytics and valuation engines. Every other
//! crate depends on this one; it depends on nothing in the workspace.

pub mod currency;
pub mod enums;
pub mod error;
pub mod meta;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use currency::{normalize_currency, require_currency};
pub use enums::{Boundary, BucketInterval, EntryType};
pub use error::CoreError;
pub use meta::EntryMeta;
pub use structs::{
    Candle, CorrelationResult, CrossPoint, ExchangeRequest, LedgerEntry, NewLedgerEntry,
    PairedRate, PortfolioValue, RateSample, Snapshot, TimeRange, TradeReceipt,
};
