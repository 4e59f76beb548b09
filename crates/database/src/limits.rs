/// Default and ceiling for the row count of one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimit {
    pub default: i64,
    pub max: i64,
}

impl QueryLimit {
    pub const fn new(default: i64, max: i64) -> Self {
        Self { default, max }
    }

    /// Missing or non-positive requests get the default; oversized ones are clamped.
    pub fn resolve(&self, requested: Option<i64>) -> i64 {
        match requested {
            Some(n) if n > self.max => self.max,
            Some(n) if n > 0 => n,
            _ => self.default,
        }
    }
}

pub const HISTORY: QueryLimit = QueryLimit::new(500, 2000);
pub const SNAPSHOT_TIMES: QueryLimit = QueryLimit::new(500, 5000);
pub const PAIRED_RATES: QueryLimit = QueryLimit::new(1000, 5000);
pub const CORRELATION: QueryLimit = QueryLimit::new(2000, 5000);
pub const CANDLES: QueryLimit = QueryLimit::new(500, 5000);
pub const LEDGER_ENTRIES: QueryLimit = QueryLimit::new(200, 2000);
pub const PORTFOLIO_HISTORY: QueryLimit = QueryLimit::new(500, 2000);
