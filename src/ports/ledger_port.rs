//! Ledger access port trait.
//!
//! The ledger is append-only per (owner, asset, sub-account); the core never
//! mutates records in place. Concurrent writes to the same slice key must be
//! serialized by the implementation, because holdings are re-derived by
//! replaying the whole slice.

use chrono::NaiveDateTime;

use crate::domain::error::CoinfolioError;
use crate::domain::transaction::Transaction;

#[derive(Debug, Clone, PartialEq)]
pub struct SliceSummary {
    pub asset: String,
    pub transactions: usize,
    pub first: NaiveDateTime,
    pub last: NaiveDateTime,
}

pub trait LedgerPort {
    /// Ordered slice for one holding: ascending `occurred_at`, ties in
    /// insertion order.
    fn fetch_slice(
        &self,
        owner: &str,
        asset: &str,
        sub_account: Option<&str>,
    ) -> Result<Vec<Transaction>, CoinfolioError>;

    fn append(&self, tx: &Transaction) -> Result<(), CoinfolioError>;

    /// Remove one record by storage id — the explicit user action that
    /// obligates the caller to recompute the owning holding.
    fn delete(&self, tx_id: i64) -> Result<(), CoinfolioError>;

    fn list_assets(&self, owner: &str) -> Result<Vec<String>, CoinfolioError>;

    fn slice_summary(
        &self,
        owner: &str,
        asset: &str,
    ) -> Result<Option<SliceSummary>, CoinfolioError>;
}
