//! Derived holding projection.
//!
//! A [`Holding`] is never authoritative: it is always exactly reproducible by
//! replaying the owning ledger slice, and is recomputed whole whenever that
//! slice changes.

use serde::{Deserialize, Serialize};

use crate::domain::error::CoinfolioError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub asset: String,
    pub quantity: f64,
    pub invested_amount: f64,
    pub average_price: f64,
    pub sub_account: Option<String>,
}

impl Holding {
    pub fn empty(asset: &str, sub_account: Option<&str>) -> Self {
        Holding {
            asset: asset.to_string(),
            quantity: 0.0,
            invested_amount: 0.0,
            average_price: 0.0,
            sub_account: sub_account.map(str::to_string),
        }
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.market_value(price) - self.invested_amount
    }

    /// A holding with negative quantity or invested amount cannot arise from
    /// the clamped replay rules; seeing one means the ledger data is corrupt.
    /// Surfaced as a fatal error, never clamped a second time.
    pub fn check_invariants(&self) -> Result<(), CoinfolioError> {
        if !self.quantity.is_finite() || self.quantity < 0.0 {
            return Err(CoinfolioError::InvariantViolation {
                asset: self.asset.clone(),
                reason: format!("quantity is {}", self.quantity),
            });
        }
        if !self.invested_amount.is_finite() || self.invested_amount < 0.0 {
            return Err(CoinfolioError::InvariantViolation {
                asset: self.asset.clone(),
                reason: format!("invested amount is {}", self.invested_amount),
            });
        }
        if self.quantity == 0.0 && self.average_price != 0.0 {
            return Err(CoinfolioError::InvariantViolation {
                asset: self.asset.clone(),
                reason: format!(
                    "average price {} with zero quantity",
                    self.average_price
                ),
            });
        }
        Ok(())
    }
}
