//! Ledger replay into a current holding.
//!
//! [`compute_holding`] is a pure function of the ordered slice: identical
//! input produces identical output, so recomputing after any ledger edit is
//! the recovery mechanism — there is no incremental patching. Average price
//! is path-dependent under the clamped reduction rule, which makes the
//! replay order load-bearing: ascending `occurred_at`, ties broken by ledger
//! insertion order.

use crate::domain::error::CoinfolioError;
use crate::domain::holding::Holding;
use crate::domain::transaction::Transaction;

/// Replay a per-(owner, asset, sub-account) ledger slice into its holding.
///
/// Steps:
/// 1. Validate every transaction and its slice scope; reject before any
///    accumulation.
/// 2. Stable-sort by `occurred_at` (idempotent on already-ordered slices,
///    pins the tie-break to insertion order).
/// 3. Accumulate: accumulating kinds add quantity and invested amount;
///    reducing kinds subtract with a floor at zero on both counters.
/// 4. Derive average price, guarding the zero-quantity case.
pub fn compute_holding(
    asset: &str,
    sub_account: Option<&str>,
    transactions: &[Transaction],
) -> Result<Holding, CoinfolioError> {
    for tx in transactions {
        tx.validate()?;
        if tx.asset != asset {
            return Err(CoinfolioError::Validation {
                field: "asset".to_string(),
                reason: format!("transaction for {} in slice for {}", tx.asset, asset),
            });
        }
        if tx.sub_account.as_deref() != sub_account {
            return Err(CoinfolioError::Validation {
                field: "sub_account".to_string(),
                reason: format!(
                    "transaction for sub-account {:?} in slice for {:?}",
                    tx.sub_account, sub_account
                ),
            });
        }
    }

    let mut ordered: Vec<&Transaction> = transactions.iter().collect();
    ordered.sort_by_key(|tx| tx.occurred_at);

    let mut quantity = 0.0_f64;
    let mut invested = 0.0_f64;

    for tx in ordered {
        if tx.kind.accumulates() {
            quantity += tx.quantity;
            invested += tx.amount_invested;
        } else {
            quantity = (quantity - tx.quantity).max(0.0);
            invested = (invested - tx.reduction_basis()).max(0.0);
        }
    }

    let average_price = if quantity > 0.0 { invested / quantity } else { 0.0 };

    let holding = Holding {
        asset: asset.to_string(),
        quantity,
        invested_amount: invested,
        average_price,
        sub_account: sub_account.map(str::to_string),
    };
    holding.check_invariants()?;
    Ok(holding)
}
