//! Quote source port trait.

use crate::domain::error::CoinfolioError;

/// Latest externally-supplied price per asset. There is no live feed behind
/// this trait; whoever owns price discovery loads quotes before the core
/// runs.
pub trait QuotePort {
    fn latest_price(&self, asset: &str) -> Result<Option<f64>, CoinfolioError>;
}
