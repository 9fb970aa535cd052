//! SQLite ledger and projection store adapter.
//!
//! Ledger slices are read back ordered by `occurred_at` with the rowid as
//! tie-break, so insertion order survives round-trips — the replay order is
//! load-bearing for average price. Holding writes are versioned: callers
//! pass the version they read, and a mismatch surfaces as a concurrency
//! conflict instead of a silent lost update.

use chrono::{NaiveDateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};

use crate::domain::error::CoinfolioError;
use crate::domain::forecast::Forecast;
use crate::domain::holding::Holding;
use crate::domain::transaction::{Transaction, TxKind, TIMESTAMP_FORMAT};
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::{LedgerPort, SliceSummary};
use crate::ports::projection_port::{ProjectionStorePort, StoredHolding};

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, CoinfolioError> {
        let db_path =
            config
                .get_string("ledger", "path")
                .ok_or_else(|| CoinfolioError::ConfigMissing {
                    section: "ledger".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("ledger", "pool_size", 4) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| CoinfolioError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, CoinfolioError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| CoinfolioError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(
        &self,
    ) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, CoinfolioError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| CoinfolioError::Database {
                reason: e.to_string(),
            })
    }

    pub fn initialize_schema(&self) -> Result<(), CoinfolioError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner TEXT NOT NULL,
                asset TEXT NOT NULL,
                sub_account TEXT,
                kind TEXT NOT NULL,
                quantity REAL NOT NULL,
                amount_invested REAL NOT NULL,
                unit_price REAL NOT NULL,
                occurred_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tx_slice
                ON transactions(owner, asset, sub_account, occurred_at);
            CREATE TABLE IF NOT EXISTS holdings (
                portfolio_id TEXT NOT NULL,
                asset TEXT NOT NULL,
                sub_account TEXT NOT NULL DEFAULT '',
                quantity REAL NOT NULL,
                invested_amount REAL NOT NULL,
                average_price REAL NOT NULL,
                version INTEGER NOT NULL,
                PRIMARY KEY (portfolio_id, asset, sub_account)
            );
            CREATE TABLE IF NOT EXISTS forecasts (
                name TEXT PRIMARY KEY,
                portfolio_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                payload TEXT NOT NULL
            );",
        )
        .map_err(|e: rusqlite::Error| CoinfolioError::DatabaseQuery {
            reason: e.to_string(),
        })?;

        Ok(())
    }
}

fn query_err(e: rusqlite::Error) -> CoinfolioError {
    CoinfolioError::DatabaseQuery {
        reason: e.to_string(),
    }
}

impl LedgerPort for SqliteAdapter {
    fn fetch_slice(
        &self,
        owner: &str,
        asset: &str,
        sub_account: Option<&str>,
    ) -> Result<Vec<Transaction>, CoinfolioError> {
        let conn = self.conn()?;

        let query = "SELECT asset, kind, quantity, amount_invested, unit_price, occurred_at, owner, sub_account
                     FROM transactions
                     WHERE owner = ?1 AND asset = ?2 AND sub_account IS ?3
                     ORDER BY occurred_at ASC, id ASC";

        let mut stmt = conn.prepare(query).map_err(query_err)?;
        let rows = stmt
            .query_map(params![owner, asset, sub_account], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, Option<String>>(7)?,
                ))
            })
            .map_err(query_err)?;

        let mut transactions = Vec::new();
        for row in rows {
            let (asset, kind, quantity, amount_invested, unit_price, occurred_at, owner, sub) =
                row.map_err(query_err)?;
            let occurred_at = NaiveDateTime::parse_from_str(&occurred_at, TIMESTAMP_FORMAT)
                .map_err(|e| CoinfolioError::DatabaseQuery {
                    reason: format!("bad occurred_at in store: {}", e),
                })?;
            transactions.push(Transaction {
                asset,
                kind: TxKind::parse(&kind)?,
                quantity,
                amount_invested,
                unit_price,
                occurred_at,
                owner,
                sub_account: sub,
            });
        }
        Ok(transactions)
    }

    fn append(&self, tx: &Transaction) -> Result<(), CoinfolioError> {
        tx.validate()?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO transactions (owner, asset, sub_account, kind, quantity, amount_invested, unit_price, occurred_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                tx.owner,
                tx.asset,
                tx.sub_account,
                tx.kind.as_str(),
                tx.quantity,
                tx.amount_invested,
                tx.unit_price,
                tx.occurred_at.format(TIMESTAMP_FORMAT).to_string(),
            ],
        )
        .map_err(query_err)?;
        Ok(())
    }

    fn delete(&self, tx_id: i64) -> Result<(), CoinfolioError> {
        let conn = self.conn()?;
        let deleted = conn
            .execute("DELETE FROM transactions WHERE id = ?1", params![tx_id])
            .map_err(query_err)?;
        if deleted == 0 {
            return Err(CoinfolioError::DatabaseQuery {
                reason: format!("no transaction with id {}", tx_id),
            });
        }
        Ok(())
    }

    fn list_assets(&self, owner: &str) -> Result<Vec<String>, CoinfolioError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT asset FROM transactions WHERE owner = ?1 ORDER BY asset ASC")
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![owner], |row| row.get::<_, String>(0))
            .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn slice_summary(
        &self,
        owner: &str,
        asset: &str,
    ) -> Result<Option<SliceSummary>, CoinfolioError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT COUNT(*), MIN(occurred_at), MAX(occurred_at)
                 FROM transactions WHERE owner = ?1 AND asset = ?2",
                params![owner, asset],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .map_err(query_err)?;

        let (count, first, last) = row;
        let (Some(first), Some(last)) = (first, last) else {
            return Ok(None);
        };
        let parse = |s: String| {
            NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).map_err(|e| {
                CoinfolioError::DatabaseQuery {
                    reason: format!("bad occurred_at in store: {}", e),
                }
            })
        };
        Ok(Some(SliceSummary {
            asset: asset.to_string(),
            transactions: count as usize,
            first: parse(first)?,
            last: parse(last)?,
        }))
    }
}

impl ProjectionStorePort for SqliteAdapter {
    fn fetch_holding(
        &self,
        portfolio_id: &str,
        asset: &str,
        sub_account: Option<&str>,
    ) -> Result<Option<StoredHolding>, CoinfolioError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT quantity, invested_amount, average_price, sub_account, version
             FROM holdings
             WHERE portfolio_id = ?1 AND asset = ?2 AND sub_account = ?3",
            params![portfolio_id, asset, sub_account.unwrap_or("")],
            |row| {
                let sub: String = row.get(3)?;
                Ok(StoredHolding {
                    holding: Holding {
                        asset: asset.to_string(),
                        quantity: row.get(0)?,
                        invested_amount: row.get(1)?,
                        average_price: row.get(2)?,
                        sub_account: if sub.is_empty() { None } else { Some(sub) },
                    },
                    version: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(query_err)
    }

    fn upsert_holding(
        &self,
        portfolio_id: &str,
        holding: &Holding,
        expected_version: i64,
    ) -> Result<(), CoinfolioError> {
        holding.check_invariants()?;

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        let sub = holding.sub_account.as_deref().unwrap_or("");
        let key = format!("{}/{}", portfolio_id, holding.asset);

        let current: Option<i64> = tx
            .query_row(
                "SELECT version FROM holdings
                 WHERE portfolio_id = ?1 AND asset = ?2 AND sub_account = ?3",
                params![portfolio_id, holding.asset, sub],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_err)?;

        match current {
            None if expected_version == 0 => {
                tx.execute(
                    "INSERT INTO holdings (portfolio_id, asset, sub_account, quantity, invested_amount, average_price, version)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
                    params![
                        portfolio_id,
                        holding.asset,
                        sub,
                        holding.quantity,
                        holding.invested_amount,
                        holding.average_price,
                    ],
                )
                .map_err(query_err)?;
            }
            Some(version) if version == expected_version => {
                tx.execute(
                    "UPDATE holdings
                     SET quantity = ?4, invested_amount = ?5, average_price = ?6, version = ?7
                     WHERE portfolio_id = ?1 AND asset = ?2 AND sub_account = ?3",
                    params![
                        portfolio_id,
                        holding.asset,
                        sub,
                        holding.quantity,
                        holding.invested_amount,
                        holding.average_price,
                        version + 1,
                    ],
                )
                .map_err(query_err)?;
            }
            _ => return Err(CoinfolioError::ConcurrencyConflict { key }),
        }

        tx.commit().map_err(query_err)
    }

    fn save_forecast(&self, name: &str, forecast: &Forecast) -> Result<(), CoinfolioError> {
        let payload =
            serde_json::to_string(forecast).map_err(|e| CoinfolioError::DatabaseQuery {
                reason: format!("failed to encode forecast: {}", e),
            })?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO forecasts (name, portfolio_id, created_at, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                name,
                forecast.portfolio_id,
                Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string(),
                payload,
            ],
        )
        .map_err(query_err)?;
        Ok(())
    }

    fn fetch_forecast(&self, name: &str) -> Result<Option<Forecast>, CoinfolioError> {
        let conn = self.conn()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM forecasts WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_err)?;

        match payload {
            None => Ok(None),
            Some(payload) => serde_json::from_str(&payload)
                .map(Some)
                .map_err(|e| CoinfolioError::DatabaseQuery {
                    reason: format!("corrupt forecast snapshot {}: {}", name, e),
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter
    }

    fn tx(kind: TxKind, quantity: f64, amount: f64, timestamp: &str) -> Transaction {
        Transaction {
            asset: "BTC".into(),
            kind,
            quantity,
            amount_invested: amount,
            unit_price: 0.0,
            occurred_at: NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).unwrap(),
            owner: "alice".into(),
            sub_account: None,
        }
    }

    fn holding(quantity: f64, invested: f64) -> Holding {
        Holding {
            asset: "BTC".into(),
            quantity,
            invested_amount: invested,
            average_price: if quantity > 0.0 { invested / quantity } else { 0.0 },
            sub_account: None,
        }
    }

    #[test]
    fn append_and_fetch_slice_round_trips() {
        let store = store();
        store
            .append(&tx(TxKind::Acquire, 1.0, 30_000.0, "2024-01-01 09:00:00"))
            .unwrap();
        store
            .append(&tx(TxKind::Acquire, 1.0, 10_000.0, "2024-02-01 09:00:00"))
            .unwrap();

        let slice = store.fetch_slice("alice", "BTC", None).unwrap();
        assert_eq!(slice.len(), 2);
        assert_eq!(slice[0].kind, TxKind::Acquire);
        assert!((slice[0].amount_invested - 30_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn equal_timestamps_come_back_in_insertion_order() {
        let store = store();
        store
            .append(&tx(TxKind::Dispose, 1.0, 30_000.0, "2024-01-01 09:00:00"))
            .unwrap();
        store
            .append(&tx(TxKind::Acquire, 1.0, 30_000.0, "2024-01-01 09:00:00"))
            .unwrap();

        let slice = store.fetch_slice("alice", "BTC", None).unwrap();
        assert_eq!(slice[0].kind, TxKind::Dispose);
        assert_eq!(slice[1].kind, TxKind::Acquire);
    }

    #[test]
    fn slices_are_scoped_by_sub_account() {
        let store = store();
        let mut cold = tx(TxKind::Acquire, 1.0, 30_000.0, "2024-01-01 09:00:00");
        cold.sub_account = Some("cold".into());
        store.append(&cold).unwrap();
        store
            .append(&tx(TxKind::Acquire, 2.0, 60_000.0, "2024-01-02 09:00:00"))
            .unwrap();

        let hot = store.fetch_slice("alice", "BTC", None).unwrap();
        assert_eq!(hot.len(), 1);
        assert!((hot[0].quantity - 2.0).abs() < f64::EPSILON);

        let cold = store.fetch_slice("alice", "BTC", Some("cold")).unwrap();
        assert_eq!(cold.len(), 1);
        assert!((cold[0].quantity - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_transaction_is_not_appended() {
        let store = store();
        let mut bad = tx(TxKind::Acquire, 1.0, 30_000.0, "2024-01-01 09:00:00");
        bad.quantity = -1.0;
        assert!(store.append(&bad).is_err());
        assert!(store.fetch_slice("alice", "BTC", None).unwrap().is_empty());
    }

    #[test]
    fn delete_missing_id_errors() {
        let store = store();
        assert!(store.delete(42).is_err());
    }

    #[test]
    fn list_assets_and_summary() {
        let store = store();
        store
            .append(&tx(TxKind::Acquire, 1.0, 30_000.0, "2024-01-01 09:00:00"))
            .unwrap();
        let mut eth = tx(TxKind::Acquire, 5.0, 10_000.0, "2024-02-01 09:00:00");
        eth.asset = "ETH".into();
        store.append(&eth).unwrap();

        assert_eq!(
            store.list_assets("alice").unwrap(),
            vec!["BTC".to_string(), "ETH".to_string()]
        );

        let summary = store.slice_summary("alice", "BTC").unwrap().unwrap();
        assert_eq!(summary.transactions, 1);
        assert!(store.slice_summary("bob", "BTC").unwrap().is_none());
    }

    #[test]
    fn holding_upsert_replaces_and_bumps_version() {
        let store = store();
        store.upsert_holding("main", &holding(2.0, 40_000.0), 0).unwrap();

        let stored = store.fetch_holding("main", "BTC", None).unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert!((stored.holding.quantity - 2.0).abs() < f64::EPSILON);

        store.upsert_holding("main", &holding(3.0, 70_000.0), 1).unwrap();
        let stored = store.fetch_holding("main", "BTC", None).unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert!((stored.holding.quantity - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn stale_version_surfaces_conflict() {
        let store = store();
        store.upsert_holding("main", &holding(2.0, 40_000.0), 0).unwrap();
        // another writer recomputed in between; our version 0 read is stale
        let err = store
            .upsert_holding("main", &holding(9.0, 1.0), 0)
            .unwrap_err();
        assert!(matches!(err, CoinfolioError::ConcurrencyConflict { key } if key == "main/BTC"));

        // the projection is untouched by the losing write
        let stored = store.fetch_holding("main", "BTC", None).unwrap().unwrap();
        assert!((stored.holding.quantity - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn corrupt_holding_is_rejected_before_write() {
        let store = store();
        let err = store
            .upsert_holding("main", &holding(-1.0, 0.0), 0)
            .unwrap_err();
        assert!(matches!(err, CoinfolioError::InvariantViolation { .. }));
    }

    #[test]
    fn forecast_snapshot_round_trips() {
        let store = store();
        let forecast = crate::domain::forecast::aggregate("main", &[]).unwrap();
        store.save_forecast("2024-06", &forecast).unwrap();

        let loaded = store.fetch_forecast("2024-06").unwrap().unwrap();
        assert_eq!(loaded, forecast);
        assert!(store.fetch_forecast("2024-07").unwrap().is_none());
    }
}
