//! Domain error types.

/// Top-level error type for coinfolio.
#[derive(Debug, thiserror::Error)]
pub enum CoinfolioError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("holding invariant violated for {asset}: {reason}")]
    InvariantViolation { asset: String, reason: String },

    #[error("conflicting write for {key}: re-read the ledger and recompute")]
    ConcurrencyConflict { key: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no transactions for {asset} owned by {owner}")]
    NoTransactions { owner: String, asset: String },

    #[error("no quote available for {asset}")]
    NoQuote { asset: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&CoinfolioError> for std::process::ExitCode {
    fn from(err: &CoinfolioError) -> Self {
        let code: u8 = match err {
            CoinfolioError::Io(_) => 1,
            CoinfolioError::ConfigParse { .. }
            | CoinfolioError::ConfigMissing { .. }
            | CoinfolioError::ConfigInvalid { .. } => 2,
            CoinfolioError::Database { .. }
            | CoinfolioError::DatabaseQuery { .. }
            | CoinfolioError::ConcurrencyConflict { .. } => 3,
            CoinfolioError::Validation { .. } => 4,
            CoinfolioError::NoTransactions { .. } | CoinfolioError::NoQuote { .. } => 5,
            CoinfolioError::InvariantViolation { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
