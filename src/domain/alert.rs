//! Alert trigger binding for ladder steps.
//!
//! Binding is a pure mapping from a step and a policy to zero, one, or two
//! triggers. The on-reach trigger coincides with the step's own
//! PENDING→TRIGGERED transition but is reported independently, so a failed
//! notification delivery can never block the ladder's state machine.
//! Delivery itself belongs to an external dispatcher and is invisible here.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::error::CoinfolioError;
use crate::domain::ladder::LadderStep;

/// Inward distance from the target price for the before-target trigger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Margin {
    Percent(f64),
    Absolute(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertPolicy {
    pub before_target: Option<Margin>,
    pub on_reach: bool,
    pub channel_hints: Vec<String>,
}

impl AlertPolicy {
    pub fn validate(&self) -> Result<(), CoinfolioError> {
        match self.before_target {
            Some(Margin::Percent(pct)) if !(pct.is_finite() && pct > 0.0 && pct < 100.0) => {
                Err(CoinfolioError::Validation {
                    field: "before_target".to_string(),
                    reason: format!("percent margin must be in (0, 100), got {}", pct),
                })
            }
            Some(Margin::Absolute(abs)) if !(abs.is_finite() && abs > 0.0) => {
                Err(CoinfolioError::Validation {
                    field: "before_target".to_string(),
                    reason: format!("absolute margin must be positive, got {}", abs),
                })
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    BeforeTarget,
    OnReach,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertTrigger {
    pub step_order: usize,
    pub kind: AlertKind,
    pub threshold_price: f64,
    pub channel_hints: Vec<String>,
}

impl AlertTrigger {
    pub fn fires_at(&self, price: f64) -> bool {
        price >= self.threshold_price
    }

    /// Stamp the trigger into the outbound record handed to the dispatcher.
    pub fn fire(&self, at: NaiveDateTime) -> FiredAlert {
        FiredAlert {
            step_order: self.step_order,
            kind: self.kind,
            fired_at: at,
            channel_hints: self.channel_hints.clone(),
        }
    }
}

/// Outbound alert record consumed by the external delivery mechanism.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiredAlert {
    pub step_order: usize,
    pub kind: AlertKind,
    pub fired_at: NaiveDateTime,
    pub channel_hints: Vec<String>,
}

/// Map one ladder step to its notification triggers under a policy.
///
/// The before-target threshold is the step's target adjusted inward by the
/// margin; a margin that would push the threshold to zero or below is
/// rejected rather than silently clamped.
pub fn bind_alerts(
    step: &LadderStep,
    policy: &AlertPolicy,
) -> Result<Vec<AlertTrigger>, CoinfolioError> {
    policy.validate()?;

    let mut triggers = Vec::new();

    if let Some(margin) = policy.before_target {
        let threshold = match margin {
            Margin::Percent(pct) => step.target_price * (1.0 - pct / 100.0),
            Margin::Absolute(abs) => step.target_price - abs,
        };
        if threshold <= 0.0 {
            return Err(CoinfolioError::Validation {
                field: "before_target".to_string(),
                reason: format!(
                    "margin {:?} leaves no positive threshold below target {}",
                    margin, step.target_price
                ),
            });
        }
        triggers.push(AlertTrigger {
            step_order: step.order,
            kind: AlertKind::BeforeTarget,
            threshold_price: threshold,
            channel_hints: policy.channel_hints.clone(),
        });
    }

    if policy.on_reach {
        triggers.push(AlertTrigger {
            step_order: step.order,
            kind: AlertKind::OnReach,
            threshold_price: step.target_price,
            channel_hints: policy.channel_hints.clone(),
        });
    }

    Ok(triggers)
}
