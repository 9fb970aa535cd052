//! Transaction ledger records.
//!
//! A [`Transaction`] is an immutable economic event in a per-(owner, asset,
//! sub-account) ledger slice. The ledger is append-only; records are removed
//! only by explicit user action, after which the owning holding is re-derived
//! from the remaining slice.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::error::CoinfolioError;

/// Wire format for `occurred_at` in CSV files and the SQLite store.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxKind {
    Acquire,
    Dispose,
    TransferIn,
    TransferOut,
    Stake,
    Reward,
}

impl TxKind {
    /// Kinds that add to quantity and invested amount.
    pub fn accumulates(self) -> bool {
        matches!(
            self,
            TxKind::Acquire | TxKind::TransferIn | TxKind::Stake | TxKind::Reward
        )
    }

    /// Kinds that reduce quantity and invested amount.
    pub fn reduces(self) -> bool {
        matches!(self, TxKind::Dispose | TxKind::TransferOut)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TxKind::Acquire => "ACQUIRE",
            TxKind::Dispose => "DISPOSE",
            TxKind::TransferIn => "TRANSFER_IN",
            TxKind::TransferOut => "TRANSFER_OUT",
            TxKind::Stake => "STAKE",
            TxKind::Reward => "REWARD",
        }
    }

    /// Parse a kind from its wire form. Unknown kinds are rejected here,
    /// before any record reaches the cost-basis accumulation.
    pub fn parse(value: &str) -> Result<Self, CoinfolioError> {
        match value {
            "ACQUIRE" => Ok(TxKind::Acquire),
            "DISPOSE" => Ok(TxKind::Dispose),
            "TRANSFER_IN" => Ok(TxKind::TransferIn),
            "TRANSFER_OUT" => Ok(TxKind::TransferOut),
            "STAKE" => Ok(TxKind::Stake),
            "REWARD" => Ok(TxKind::Reward),
            other => Err(CoinfolioError::Validation {
                field: "kind".to_string(),
                reason: format!("unknown transaction kind '{}'", other),
            }),
        }
    }
}

impl std::fmt::Display for TxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub asset: String,
    pub kind: TxKind,
    pub quantity: f64,
    /// Fiat amount invested (or recovered) by this event. `0.0` means the
    /// amount was not supplied; reducing kinds then fall back to
    /// `quantity * unit_price` as the cost-reduction basis.
    pub amount_invested: f64,
    pub unit_price: f64,
    pub occurred_at: NaiveDateTime,
    pub owner: String,
    pub sub_account: Option<String>,
}

impl Transaction {
    pub fn validate(&self) -> Result<(), CoinfolioError> {
        if self.asset.trim().is_empty() {
            return Err(CoinfolioError::Validation {
                field: "asset".to_string(),
                reason: "asset symbol must not be empty".to_string(),
            });
        }
        if !self.quantity.is_finite() || self.quantity < 0.0 {
            return Err(CoinfolioError::Validation {
                field: "quantity".to_string(),
                reason: format!("must be a finite non-negative number, got {}", self.quantity),
            });
        }
        if !self.amount_invested.is_finite() || self.amount_invested < 0.0 {
            return Err(CoinfolioError::Validation {
                field: "amount_invested".to_string(),
                reason: format!(
                    "must be a finite non-negative number, got {}",
                    self.amount_invested
                ),
            });
        }
        if !self.unit_price.is_finite() || self.unit_price < 0.0 {
            return Err(CoinfolioError::Validation {
                field: "unit_price".to_string(),
                reason: format!("must be a finite non-negative number, got {}", self.unit_price),
            });
        }
        Ok(())
    }

    /// Cost amount removed by a reducing transaction. Uses the explicit
    /// `amount_invested` when one was supplied, otherwise `quantity *
    /// unit_price`. Which basis applies changes the resulting average price,
    /// so the fallback condition must stay exactly as-is.
    pub fn reduction_basis(&self) -> f64 {
        if self.amount_invested > 0.0 {
            self.amount_invested
        } else {
            self.quantity * self.unit_price
        }
    }
}
