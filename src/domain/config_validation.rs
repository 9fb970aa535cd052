//! Configuration validation.
//!
//! Validates config fields before any command touches the ledger or the
//! projection store.

use crate::domain::error::CoinfolioError;
use crate::ports::config_port::ConfigPort;

pub fn validate_portfolio_config(config: &dyn ConfigPort) -> Result<(), CoinfolioError> {
    validate_portfolio_id(config)?;
    validate_owner(config)?;
    validate_assets(config)?;
    Ok(())
}

pub fn validate_alert_config(config: &dyn ConfigPort) -> Result<(), CoinfolioError> {
    let pct = config.get_string("alerts", "before_target_pct");
    let abs = config.get_string("alerts", "before_target_abs");

    if pct.is_some() && abs.is_some() {
        return Err(CoinfolioError::ConfigInvalid {
            section: "alerts".to_string(),
            key: "before_target_pct".to_string(),
            reason: "set either before_target_pct or before_target_abs, not both".to_string(),
        });
    }

    if pct.is_some() {
        let value = config.get_double("alerts", "before_target_pct", -1.0);
        if value <= 0.0 || value >= 100.0 {
            return Err(CoinfolioError::ConfigInvalid {
                section: "alerts".to_string(),
                key: "before_target_pct".to_string(),
                reason: "before_target_pct must be between 0 and 100 exclusive".to_string(),
            });
        }
    }

    if abs.is_some() {
        let value = config.get_double("alerts", "before_target_abs", -1.0);
        if value <= 0.0 {
            return Err(CoinfolioError::ConfigInvalid {
                section: "alerts".to_string(),
                key: "before_target_abs".to_string(),
                reason: "before_target_abs must be positive".to_string(),
            });
        }
    }

    Ok(())
}

fn validate_portfolio_id(config: &dyn ConfigPort) -> Result<(), CoinfolioError> {
    match config.get_string("portfolio", "id") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(CoinfolioError::ConfigMissing {
            section: "portfolio".to_string(),
            key: "id".to_string(),
        }),
    }
}

fn validate_owner(config: &dyn ConfigPort) -> Result<(), CoinfolioError> {
    match config.get_string("portfolio", "owner") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(CoinfolioError::ConfigMissing {
            section: "portfolio".to_string(),
            key: "owner".to_string(),
        }),
    }
}

fn validate_assets(config: &dyn ConfigPort) -> Result<(), CoinfolioError> {
    if config.get_list("portfolio", "assets").is_empty() {
        return Err(CoinfolioError::ConfigMissing {
            section: "portfolio".to_string(),
            key: "assets".to_string(),
        });
    }
    Ok(())
}
