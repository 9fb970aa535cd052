//! Projection store port trait.
//!
//! Holdings and forecasts are derived projections, never truth: holdings are
//! replaced whole on every recomputation, forecasts are named point-in-time
//! snapshots that are never re-derived automatically.

use crate::domain::error::CoinfolioError;
use crate::domain::forecast::Forecast;
use crate::domain::holding::Holding;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredHolding {
    pub holding: Holding,
    pub version: i64,
}

pub trait ProjectionStorePort {
    fn fetch_holding(
        &self,
        portfolio_id: &str,
        asset: &str,
        sub_account: Option<&str>,
    ) -> Result<Option<StoredHolding>, CoinfolioError>;

    /// Replace-if-exists write keyed (portfolio, asset, sub-account).
    /// `expected_version` is the version the caller read (0 for a fresh
    /// key); a mismatch means another recomputation won the race and is
    /// surfaced as `ConcurrencyConflict` for a re-read-and-recompute retry.
    fn upsert_holding(
        &self,
        portfolio_id: &str,
        holding: &Holding,
        expected_version: i64,
    ) -> Result<(), CoinfolioError>;

    fn save_forecast(&self, name: &str, forecast: &Forecast) -> Result<(), CoinfolioError>;

    fn fetch_forecast(&self, name: &str) -> Result<Option<Forecast>, CoinfolioError>;
}
