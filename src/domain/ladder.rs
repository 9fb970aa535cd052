//! Take-profit ladders: exit rules, derived steps, and trigger state.
//!
//! A ladder is built once against a holding snapshot. Derived sell
//! quantities are NOT recomputed as the holding later changes — the ladder
//! goes stale instead and must be rebuilt explicitly; [`Ladder::staleness`]
//! reports the drift as an advisory warning. The state machine is externally
//! driven: callers report observed prices and confirmed fills, the ladder
//! never polls prices or places orders.

use serde::{Deserialize, Serialize};

use crate::domain::error::CoinfolioError;
use crate::domain::holding::Holding;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetMode {
    ExactPrice,
    PercentOfAverage,
}

/// One exit rule, as configured by the caller. Order within the rule list is
/// preserved into the ladder and never re-sorted by price.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitRule {
    pub target_mode: TargetMode,
    /// A price for `EXACT_PRICE`, a percentage above average for
    /// `PERCENT_OF_AVERAGE`.
    pub target_input: f64,
    pub sell_percentage: f64,
    pub notes: Option<String>,
}

impl ExitRule {
    pub fn validate(&self) -> Result<(), CoinfolioError> {
        if !self.target_input.is_finite() || self.target_input < 0.0 {
            return Err(CoinfolioError::Validation {
                field: "target_input".to_string(),
                reason: format!(
                    "must be a finite non-negative number, got {}",
                    self.target_input
                ),
            });
        }
        if !self.sell_percentage.is_finite()
            || self.sell_percentage <= 0.0
            || self.sell_percentage > 100.0
        {
            return Err(CoinfolioError::Validation {
                field: "sell_percentage".to_string(),
                reason: format!("must be in (0, 100], got {}", self.sell_percentage),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for ExitRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.target_mode {
            TargetMode::ExactPrice => {
                write!(f, "sell {}% at {}", self.sell_percentage, self.target_input)
            }
            TargetMode::PercentOfAverage => write!(
                f,
                "sell {}% at average +{}%",
                self.sell_percentage, self.target_input
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepState {
    Pending,
    Triggered,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LadderStep {
    pub order: usize,
    pub target_mode: TargetMode,
    pub target_input: f64,
    pub sell_percentage: f64,
    pub target_price: f64,
    pub sell_quantity: f64,
    pub state: StepState,
}

impl LadderStep {
    /// PENDING → TRIGGERED once an observed price reaches the target.
    /// Returns whether this observation fired the step. A triggered step
    /// never reverts, whatever later prices do.
    pub fn observe_price(&mut self, price: f64) -> bool {
        if self.state == StepState::Pending && price >= self.target_price {
            self.state = StepState::Triggered;
            return true;
        }
        false
    }

    /// TRIGGERED → DONE on execution confirmation (manual or external order
    /// fill). Irreversible; confirming a pending or done step is a no-op.
    pub fn confirm_execution(&mut self) -> bool {
        if self.state == StepState::Triggered {
            self.state = StepState::Done;
            return true;
        }
        false
    }

    pub fn projected_proceeds(&self) -> f64 {
        self.sell_quantity * self.target_price
    }
}

/// The holding values a ladder was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoldingSnapshot {
    pub quantity: f64,
    pub invested_amount: f64,
    pub average_price: f64,
}

/// Advisory, non-fatal: the ladder was built against a holding that has
/// since changed. Derived numbers still answer queries but should be treated
/// as stale until the caller rebuilds.
#[derive(Debug, Clone, PartialEq)]
pub struct StaleLadderWarning {
    pub asset: String,
    pub snapshot_quantity: f64,
    pub current_quantity: f64,
    pub snapshot_average_price: f64,
    pub current_average_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ladder {
    pub asset: String,
    pub snapshot: HoldingSnapshot,
    pub steps: Vec<LadderStep>,
}

/// Derive concrete ladder steps from a holding and an ordered rule list.
///
/// All rules are validated before any step is derived, so a bad rule set is
/// rejected whole. Sell percentages summing past 100 are accepted; the
/// excess surfaces as [`Ladder::remaining_quantity`] flooring at zero.
pub fn build_ladder(holding: &Holding, rules: &[ExitRule]) -> Result<Ladder, CoinfolioError> {
    for rule in rules {
        rule.validate()?;
    }

    let steps = rules
        .iter()
        .enumerate()
        .map(|(order, rule)| {
            let target_price = match rule.target_mode {
                TargetMode::ExactPrice => rule.target_input,
                TargetMode::PercentOfAverage => {
                    holding.average_price * (1.0 + rule.target_input / 100.0)
                }
            };
            LadderStep {
                order,
                target_mode: rule.target_mode,
                target_input: rule.target_input,
                sell_percentage: rule.sell_percentage,
                target_price,
                sell_quantity: holding.quantity * rule.sell_percentage / 100.0,
                state: StepState::Pending,
            }
        })
        .collect();

    Ok(Ladder {
        asset: holding.asset.clone(),
        snapshot: HoldingSnapshot {
            quantity: holding.quantity,
            invested_amount: holding.invested_amount,
            average_price: holding.average_price,
        },
        steps,
    })
}

impl Ladder {
    /// Proceeds if every step executes at its target.
    pub fn projected_proceeds(&self) -> f64 {
        self.steps.iter().map(LadderStep::projected_proceeds).sum()
    }

    /// Quantity left after every step executes, floored at zero so rule sets
    /// allocating more than 100% are tolerated rather than rejected.
    pub fn remaining_quantity(&self) -> f64 {
        let allocated: f64 = self.steps.iter().map(|s| s.sell_quantity).sum();
        (self.snapshot.quantity - allocated).max(0.0)
    }

    /// Report one observed price to every step. Returns how many steps this
    /// observation newly triggered.
    pub fn observe_price(&mut self, price: f64) -> usize {
        self.steps
            .iter_mut()
            .map(|step| step.observe_price(price))
            .filter(|fired| *fired)
            .count()
    }

    /// Advisory staleness check against the live holding.
    pub fn staleness(&self, current: &Holding) -> Option<StaleLadderWarning> {
        let drifted = (self.snapshot.quantity - current.quantity).abs() > f64::EPSILON
            || (self.snapshot.average_price - current.average_price).abs() > f64::EPSILON;
        if !drifted {
            return None;
        }
        Some(StaleLadderWarning {
            asset: self.asset.clone(),
            snapshot_quantity: self.snapshot.quantity,
            current_quantity: current.quantity,
            snapshot_average_price: self.snapshot.average_price,
            current_average_price: current.average_price,
        })
    }
}
