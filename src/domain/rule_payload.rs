//! Schema validation for ladder rule payloads.
//!
//! Rule configuration arrives as a free-form JSON array. It is decoded and
//! checked against the tagged rule shapes here, at the boundary, before
//! anything is handed to [`build_ladder`](crate::domain::ladder::build_ladder).
//! Unknown modes and unknown fields are rejected rather than passed through,
//! and a malformed payload is rejected whole — never partially applied.
//!
//! Payload shape:
//!
//! ```json
//! [
//!   { "mode": "PERCENT_OF_AVERAGE", "percent_above_average": 50, "sell_percentage": 25 },
//!   { "mode": "EXACT_PRICE", "target_price": 45000, "sell_percentage": 50, "notes": "ath" }
//! ]
//! ```

use serde_json::Value;

use crate::domain::error::CoinfolioError;
use crate::domain::ladder::{ExitRule, TargetMode};

/// Decode and validate a rule payload. Rule order in the payload is the
/// ladder's step order.
pub fn parse_rules(payload: &str) -> Result<Vec<ExitRule>, CoinfolioError> {
    let root: Value = serde_json::from_str(payload).map_err(|e| CoinfolioError::Validation {
        field: "rules".to_string(),
        reason: e.to_string(),
    })?;

    let Value::Array(entries) = root else {
        return Err(CoinfolioError::Validation {
            field: "rules".to_string(),
            reason: "payload must be a JSON array of rules".to_string(),
        });
    };

    let mut rules = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let rule = parse_rule(index, entry)?;
        rule.validate().map_err(|err| match err {
            CoinfolioError::Validation { field, reason } => CoinfolioError::Validation {
                field: format!("rules[{}].{}", index, field),
                reason,
            },
            other => other,
        })?;
        rules.push(rule);
    }

    Ok(rules)
}

fn parse_rule(index: usize, entry: &Value) -> Result<ExitRule, CoinfolioError> {
    let field = |name: &str| format!("rules[{}].{}", index, name);

    let Value::Object(map) = entry else {
        return Err(CoinfolioError::Validation {
            field: format!("rules[{}]", index),
            reason: "rule must be a JSON object".to_string(),
        });
    };

    let mode = map
        .get("mode")
        .and_then(Value::as_str)
        .ok_or_else(|| CoinfolioError::Validation {
            field: field("mode"),
            reason: "missing or non-string mode tag".to_string(),
        })?;

    let (target_mode, target_key) = match mode {
        "EXACT_PRICE" => (TargetMode::ExactPrice, "target_price"),
        "PERCENT_OF_AVERAGE" => (TargetMode::PercentOfAverage, "percent_above_average"),
        other => {
            return Err(CoinfolioError::Validation {
                field: field("mode"),
                reason: format!("unknown rule mode '{}'", other),
            })
        }
    };

    for key in map.keys() {
        if key != "mode" && key != "sell_percentage" && key != "notes" && key != target_key {
            return Err(CoinfolioError::Validation {
                field: field(key),
                reason: format!("unknown field for mode {}", mode),
            });
        }
    }

    let number = |name: &str| -> Result<f64, CoinfolioError> {
        map.get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| CoinfolioError::Validation {
                field: field(name),
                reason: "missing or non-numeric value".to_string(),
            })
    };

    let notes = match map.get("notes") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            return Err(CoinfolioError::Validation {
                field: field("notes"),
                reason: "must be a string".to_string(),
            })
        }
    };

    Ok(ExitRule {
        target_mode,
        target_input: number(target_key)?,
        sell_percentage: number("sell_percentage")?,
        notes,
    })
}
