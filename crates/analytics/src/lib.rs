//! # Analytics Crate
//!
//! Read-side computations over the rate series and the ledger.
//!
//! ## Architectural Principles
//!
//! - **Stateless:** both engines hold only `Arc`s to their stores. Every result is
//!   computed from what the stores return for that one call.
//! - **Explicit gaps:** portfolio history prices each point only with rates
//!   sampled at that exact instant and omits points it cannot price.
//!
//! ## Public API
//!
//! - `AnalyticsEngine`: cross rates, correlation, candles, history and the latest snapshot.
//! - `bucket_compress`: last-point-per-bucket thinning for charts.
//! - `ValuationEngine`: point-in-time and historical portfolio value.
//! - `AnalyticsError`: the error types that can be returned from this crate.

pub mod engine;
pub mod error;
pub mod stats;
pub mod valuation;

pub use engine::{AnalyticsEngine, bucket_compress};
pub use error::AnalyticsError;
pub use valuation::ValuationEngine;
