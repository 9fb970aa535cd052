//! CSV ledger adapter.
//!
//! Read-only [`LedgerPort`] over one CSV file per owner (`<owner>.csv` under
//! a base directory). Columns, in order: asset, kind, quantity,
//! amount_invested, unit_price, occurred_at, sub_account (may be empty).
//! A file with any malformed row is rejected whole — a partially ingested
//! ledger would silently corrupt every holding derived from it.

use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

use crate::domain::error::CoinfolioError;
use crate::domain::transaction::{Transaction, TxKind, TIMESTAMP_FORMAT};
use crate::ports::ledger_port::{LedgerPort, SliceSummary};

pub struct CsvLedgerAdapter {
    base_path: PathBuf,
}

impl CsvLedgerAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn ledger_path(&self, owner: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", owner))
    }

    fn read_owner(&self, owner: &str) -> Result<Vec<Transaction>, CoinfolioError> {
        read_transaction_file(&self.ledger_path(owner), owner)
    }
}

/// Parse and validate a whole transaction file. Used both by this adapter
/// and by the import command before any record is appended to a store.
pub fn read_transaction_file(path: &Path, owner: &str) -> Result<Vec<Transaction>, CoinfolioError> {
    let content = std::fs::read_to_string(path).map_err(|e| CoinfolioError::Database {
        reason: format!("failed to read {}: {}", path.display(), e),
    })?;

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(content.as_bytes());
    let mut transactions = Vec::new();

    for (index, result) in rdr.records().enumerate() {
        let row = index + 2; // header is line 1
        let record = result.map_err(|e| CoinfolioError::Validation {
            field: "row".to_string(),
            reason: format!("row {}: {}", row, e),
        })?;

        let field = |column: usize, name: &str| -> Result<String, CoinfolioError> {
            record
                .get(column)
                .map(str::to_string)
                .ok_or_else(|| CoinfolioError::Validation {
                    field: name.to_string(),
                    reason: format!("row {}: missing {} column", row, name),
                })
        };
        let number = |column: usize, name: &str| -> Result<f64, CoinfolioError> {
            field(column, name)?
                .trim()
                .parse()
                .map_err(|e| CoinfolioError::Validation {
                    field: name.to_string(),
                    reason: format!("row {}: {}", row, e),
                })
        };

        let asset = field(0, "asset")?.trim().to_uppercase();
        let kind = TxKind::parse(field(1, "kind")?.trim()).map_err(|err| match err {
            CoinfolioError::Validation { field, reason } => CoinfolioError::Validation {
                field,
                reason: format!("row {}: {}", row, reason),
            },
            other => other,
        })?;
        let quantity = number(2, "quantity")?;
        let amount_invested = number(3, "amount_invested")?;
        let unit_price = number(4, "unit_price")?;
        let occurred_at = NaiveDateTime::parse_from_str(field(5, "occurred_at")?.trim(), TIMESTAMP_FORMAT)
            .map_err(|e| CoinfolioError::Validation {
                field: "occurred_at".to_string(),
                reason: format!("row {}: {}", row, e),
            })?;
        let sub_account = match record.get(6).map(str::trim) {
            Some("") | None => None,
            Some(s) => Some(s.to_string()),
        };

        let tx = Transaction {
            asset,
            kind,
            quantity,
            amount_invested,
            unit_price,
            occurred_at,
            owner: owner.to_string(),
            sub_account,
        };
        tx.validate().map_err(|err| match err {
            CoinfolioError::Validation { field, reason } => CoinfolioError::Validation {
                field,
                reason: format!("row {}: {}", row, reason),
            },
            other => other,
        })?;
        transactions.push(tx);
    }

    Ok(transactions)
}

impl LedgerPort for CsvLedgerAdapter {
    fn fetch_slice(
        &self,
        owner: &str,
        asset: &str,
        sub_account: Option<&str>,
    ) -> Result<Vec<Transaction>, CoinfolioError> {
        let mut slice: Vec<Transaction> = self
            .read_owner(owner)?
            .into_iter()
            .filter(|tx| tx.asset == asset && tx.sub_account.as_deref() == sub_account)
            .collect();
        // file order is insertion order; the stable sort keeps it for ties
        slice.sort_by_key(|tx| tx.occurred_at);
        Ok(slice)
    }

    fn append(&self, _tx: &Transaction) -> Result<(), CoinfolioError> {
        Err(CoinfolioError::Database {
            reason: "csv ledger is read-only; import into the sqlite store instead".to_string(),
        })
    }

    fn delete(&self, _tx_id: i64) -> Result<(), CoinfolioError> {
        Err(CoinfolioError::Database {
            reason: "csv ledger is read-only; import into the sqlite store instead".to_string(),
        })
    }

    fn list_assets(&self, owner: &str) -> Result<Vec<String>, CoinfolioError> {
        let mut assets: Vec<String> = self
            .read_owner(owner)?
            .into_iter()
            .map(|tx| tx.asset)
            .collect();
        assets.sort();
        assets.dedup();
        Ok(assets)
    }

    fn slice_summary(
        &self,
        owner: &str,
        asset: &str,
    ) -> Result<Option<SliceSummary>, CoinfolioError> {
        let slice: Vec<Transaction> = self
            .read_owner(owner)?
            .into_iter()
            .filter(|tx| tx.asset == asset)
            .collect();
        let (Some(first), Some(last)) = (
            slice.iter().map(|tx| tx.occurred_at).min(),
            slice.iter().map(|tx| tx.occurred_at).max(),
        ) else {
            return Ok(None);
        };
        Ok(Some(SliceSummary {
            asset: asset.to_string(),
            transactions: slice.len(),
            first,
            last,
        }))
    }
}
