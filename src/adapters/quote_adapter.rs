//! Quote file adapter.
//!
//! Loads an `asset,price` CSV once at construction. When the file lists an
//! asset more than once the last row wins — the file is expected to be
//! regenerated whole by whatever supplies quotes.

use std::collections::HashMap;
use std::path::Path;

use crate::domain::error::CoinfolioError;
use crate::ports::quote_port::QuotePort;

#[derive(Debug)]
pub struct FileQuoteAdapter {
    prices: HashMap<String, f64>,
}

impl FileQuoteAdapter {
    pub fn from_file(path: &Path) -> Result<Self, CoinfolioError> {
        let content = std::fs::read_to_string(path).map_err(|e| CoinfolioError::Database {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(content.as_bytes());
        let mut prices = HashMap::new();

        for (index, result) in rdr.records().enumerate() {
            let row = index + 2;
            let record = result.map_err(|e| CoinfolioError::Validation {
                field: "row".to_string(),
                reason: format!("row {}: {}", row, e),
            })?;
            let asset = record
                .get(0)
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| CoinfolioError::Validation {
                    field: "asset".to_string(),
                    reason: format!("row {}: missing asset column", row),
                })?;
            let price: f64 = record
                .get(1)
                .ok_or_else(|| CoinfolioError::Validation {
                    field: "price".to_string(),
                    reason: format!("row {}: missing price column", row),
                })?
                .trim()
                .parse()
                .map_err(|e| CoinfolioError::Validation {
                    field: "price".to_string(),
                    reason: format!("row {}: {}", row, e),
                })?;
            if !price.is_finite() || price < 0.0 {
                return Err(CoinfolioError::Validation {
                    field: "price".to_string(),
                    reason: format!("row {}: must be a finite non-negative number, got {}", row, price),
                });
            }
            prices.insert(asset, price);
        }

        Ok(Self { prices })
    }

    pub fn from_pairs(pairs: &[(&str, f64)]) -> Self {
        Self {
            prices: pairs
                .iter()
                .map(|(asset, price)| (asset.to_uppercase(), *price))
                .collect(),
        }
    }
}

impl QuotePort for FileQuoteAdapter {
    fn latest_price(&self, asset: &str) -> Result<Option<f64>, CoinfolioError> {
        Ok(self.prices.get(&asset.to_uppercase()).copied())
    }
}
