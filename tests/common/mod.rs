#![allow(dead_code)]

use chrono::NaiveDateTime;
use coinfolio::domain::error::CoinfolioError;
use coinfolio::domain::ladder::{ExitRule, TargetMode};
use coinfolio::domain::transaction::{Transaction, TxKind, TIMESTAMP_FORMAT};
use coinfolio::ports::ledger_port::{LedgerPort, SliceSummary};
use coinfolio::ports::quote_port::QuotePort;
use std::collections::HashMap;

pub struct MockLedgerPort {
    pub data: HashMap<(String, String), Vec<Transaction>>,
    pub errors: HashMap<String, String>,
}

impl MockLedgerPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_slice(mut self, owner: &str, asset: &str, transactions: Vec<Transaction>) -> Self {
        self.data
            .insert((owner.to_string(), asset.to_string()), transactions);
        self
    }

    pub fn with_error(mut self, asset: &str, reason: &str) -> Self {
        self.errors.insert(asset.to_string(), reason.to_string());
        self
    }
}

impl LedgerPort for MockLedgerPort {
    fn fetch_slice(
        &self,
        owner: &str,
        asset: &str,
        sub_account: Option<&str>,
    ) -> Result<Vec<Transaction>, CoinfolioError> {
        if let Some(reason) = self.errors.get(asset) {
            return Err(CoinfolioError::Database {
                reason: reason.clone(),
            });
        }
        let mut slice: Vec<Transaction> = self
            .data
            .get(&(owner.to_string(), asset.to_string()))
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|tx| tx.sub_account.as_deref() == sub_account)
            .collect();
        slice.sort_by_key(|tx| tx.occurred_at);
        Ok(slice)
    }

    fn append(&self, _tx: &Transaction) -> Result<(), CoinfolioError> {
        Err(CoinfolioError::Database {
            reason: "mock ledger is read-only".to_string(),
        })
    }

    fn delete(&self, _tx_id: i64) -> Result<(), CoinfolioError> {
        Err(CoinfolioError::Database {
            reason: "mock ledger is read-only".to_string(),
        })
    }

    fn list_assets(&self, owner: &str) -> Result<Vec<String>, CoinfolioError> {
        let mut assets: Vec<String> = self
            .data
            .keys()
            .filter(|(o, _)| o == owner)
            .map(|(_, a)| a.clone())
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
        let Some(slice) = self.data.get(&(owner.to_string(), asset.to_string())) else {
            return Ok(None);
        };
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

pub struct MockQuotePort {
    pub prices: HashMap<String, f64>,
}

impl MockQuotePort {
    pub fn new() -> Self {
        Self {
            prices: HashMap::new(),
        }
    }

    pub fn with_price(mut self, asset: &str, price: f64) -> Self {
        self.prices.insert(asset.to_string(), price);
        self
    }
}

impl QuotePort for MockQuotePort {
    fn latest_price(&self, asset: &str) -> Result<Option<f64>, CoinfolioError> {
        Ok(self.prices.get(asset).copied())
    }
}

pub fn datetime(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).unwrap()
}

pub fn make_tx(
    owner: &str,
    asset: &str,
    kind: TxKind,
    quantity: f64,
    amount_invested: f64,
    unit_price: f64,
    occurred_at: &str,
) -> Transaction {
    Transaction {
        asset: asset.to_string(),
        kind,
        quantity,
        amount_invested,
        unit_price,
        occurred_at: datetime(occurred_at),
        owner: owner.to_string(),
        sub_account: None,
    }
}

pub fn acquire(asset: &str, quantity: f64, amount: f64, occurred_at: &str) -> Transaction {
    make_tx(
        "alice",
        asset,
        TxKind::Acquire,
        quantity,
        amount,
        if quantity > 0.0 { amount / quantity } else { 0.0 },
        occurred_at,
    )
}

pub fn dispose(
    asset: &str,
    quantity: f64,
    amount: f64,
    unit_price: f64,
    occurred_at: &str,
) -> Transaction {
    make_tx(
        "alice",
        asset,
        TxKind::Dispose,
        quantity,
        amount,
        unit_price,
        occurred_at,
    )
}

pub fn exact_rule(target_price: f64, sell_percentage: f64) -> ExitRule {
    ExitRule {
        target_mode: TargetMode::ExactPrice,
        target_input: target_price,
        sell_percentage,
        notes: None,
    }
}

pub fn percent_rule(percent_above_average: f64, sell_percentage: f64) -> ExitRule {
    ExitRule {
        target_mode: TargetMode::PercentOfAverage,
        target_input: percent_above_average,
        sell_percentage,
        notes: None,
    }
}
