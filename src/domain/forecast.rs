//! Portfolio-level projection across chosen ladders.
//!
//! One ladder outcome is chosen per asset; the aggregator assumes every step
//! executes at its target and values the remainder at the supplied quote.
//! The result is a point-in-time artifact: safe to discard, cheap to
//! recompute, never re-derived automatically when holdings change.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::error::CoinfolioError;
use crate::domain::holding::Holding;
use crate::domain::ladder::Ladder;

/// One asset's chosen ladder plus the price used to value the remainder.
#[derive(Debug, Clone)]
pub struct Selection {
    pub holding: Holding,
    pub ladder: Ladder,
    /// Current or last known quote for the asset; supplied externally.
    pub last_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetProjection {
    pub asset: String,
    pub invested_amount: f64,
    pub projected_proceeds: f64,
    pub remaining_quantity: f64,
    pub last_price: f64,
    pub projected_value: f64,
    pub profit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub portfolio_id: String,
    pub per_asset: BTreeMap<String, AssetProjection>,
    pub total_invested: f64,
    pub total_projected_value: f64,
    pub total_profit: f64,
    pub return_percent: f64,
}

/// Combine one chosen ladder outcome per asset into portfolio totals.
///
/// Totals are plain sums, so the order of `selections` cannot change the
/// result. Two selections for the same asset are rejected — "one ladder per
/// asset" is the contract, not a merge.
pub fn aggregate(portfolio_id: &str, selections: &[Selection]) -> Result<Forecast, CoinfolioError> {
    let mut per_asset = BTreeMap::new();

    for selection in selections {
        let asset = selection.holding.asset.clone();
        let projected_value = selection.ladder.remaining_quantity() * selection.last_price
            + selection.ladder.projected_proceeds();
        let projection = AssetProjection {
            asset: asset.clone(),
            invested_amount: selection.holding.invested_amount,
            projected_proceeds: selection.ladder.projected_proceeds(),
            remaining_quantity: selection.ladder.remaining_quantity(),
            last_price: selection.last_price,
            projected_value,
            profit: projected_value - selection.holding.invested_amount,
        };
        if per_asset.insert(asset.clone(), projection).is_some() {
            return Err(CoinfolioError::Validation {
                field: "selections".to_string(),
                reason: format!("more than one ladder selected for {}", asset),
            });
        }
    }

    let total_invested: f64 = per_asset.values().map(|p| p.invested_amount).sum();
    let total_projected_value: f64 = per_asset.values().map(|p| p.projected_value).sum();
    let total_profit = total_projected_value - total_invested;
    let return_percent = if total_invested > 0.0 {
        total_profit / total_invested * 100.0
    } else {
        0.0
    };

    Ok(Forecast {
        portfolio_id: portfolio_id.to_string(),
        per_asset,
        total_invested,
        total_projected_value,
        total_profit,
        return_percent,
    })
}
