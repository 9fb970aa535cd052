//! Integration tests.
//!
//! Tests cover:
//! - Full pipeline with mock ports: ledger slice -> holding -> ladder ->
//!   portfolio forecast, with known numbers
//! - Ladder lifecycle: price observations, confirmations, staleness after
//!   the ledger moves on
//! - Rule payload boundary: file-based payloads accepted/rejected whole
//! - Alert policy built from config and bound across a ladder
//! - SQLite store end-to-end: import, replay, versioned upsert conflicts,
//!   delete-and-recompute, forecast snapshots

mod common;

use common::*;
use coinfolio::cli::build_alert_policy;
use coinfolio::domain::alert::{bind_alerts, AlertKind};
use coinfolio::domain::cost_basis::compute_holding;
use coinfolio::domain::error::CoinfolioError;
use coinfolio::domain::forecast::{aggregate, Selection};
use coinfolio::domain::ladder::{build_ladder, StepState};
use coinfolio::domain::rule_payload::parse_rules;
use coinfolio::ports::ledger_port::LedgerPort;
use coinfolio::ports::quote_port::QuotePort;

mod full_pipeline {
    use super::*;

    #[test]
    fn ledger_to_forecast_with_mock_ports() {
        let ledger = MockLedgerPort::new()
            .with_slice(
                "alice",
                "BTC",
                vec![
                    acquire("BTC", 1.0, 30_000.0, "2024-01-01 09:00:00"),
                    acquire("BTC", 1.0, 10_000.0, "2024-02-01 09:00:00"),
                ],
            )
            .with_slice(
                "alice",
                "ETH",
                vec![acquire("ETH", 10.0, 20_000.0, "2024-01-15 12:00:00")],
            );
        let quotes = MockQuotePort::new()
            .with_price("BTC", 25_000.0)
            .with_price("ETH", 2_500.0);

        let mut selections = Vec::new();
        for (asset, rules) in [
            ("BTC", vec![percent_rule(50.0, 50.0)]),
            ("ETH", vec![exact_rule(4_000.0, 25.0)]),
        ] {
            let slice = ledger.fetch_slice("alice", asset, None).unwrap();
            let holding = compute_holding(asset, None, &slice).unwrap();
            let ladder = build_ladder(&holding, &rules).unwrap();
            let last_price = quotes.latest_price(asset).unwrap().unwrap();
            selections.push(Selection {
                holding,
                ladder,
                last_price,
            });
        }

        let forecast = aggregate("main", &selections).unwrap();

        // BTC: avg 20k, sell 1.0 at 30k, keep 1.0 at 25k -> 55k vs 40k invested
        let btc = &forecast.per_asset["BTC"];
        assert!((btc.projected_value - 55_000.0).abs() < 1e-9);
        assert!((btc.profit - 15_000.0).abs() < 1e-9);

        // ETH: sell 2.5 at 4k, keep 7.5 at 2.5k -> 28.75k vs 20k invested
        let eth = &forecast.per_asset["ETH"];
        assert!((eth.projected_value - 28_750.0).abs() < 1e-9);
        assert!((eth.profit - 8_750.0).abs() < 1e-9);

        assert!((forecast.total_invested - 60_000.0).abs() < 1e-9);
        assert!((forecast.total_projected_value - 83_750.0).abs() < 1e-9);
        assert!((forecast.total_profit - 23_750.0).abs() < 1e-9);
    }

    #[test]
    fn ledger_error_propagates() {
        let ledger = MockLedgerPort::new().with_error("BTC", "connection lost");
        let err = ledger.fetch_slice("alice", "BTC", None).unwrap_err();
        assert!(matches!(err, CoinfolioError::Database { reason } if reason == "connection lost"));
    }

    #[test]
    fn slice_summary_reports_coverage() {
        let ledger = MockLedgerPort::new().with_slice(
            "alice",
            "BTC",
            vec![
                acquire("BTC", 1.0, 30_000.0, "2024-01-01 09:00:00"),
                dispose("BTC", 0.5, 0.0, 40_000.0, "2024-03-01 09:00:00"),
            ],
        );
        let summary = ledger.slice_summary("alice", "BTC").unwrap().unwrap();
        assert_eq!(summary.transactions, 2);
        assert_eq!(summary.first, datetime("2024-01-01 09:00:00"));
        assert_eq!(summary.last, datetime("2024-03-01 09:00:00"));
        assert_eq!(ledger.list_assets("alice").unwrap(), vec!["BTC".to_string()]);
    }
}

mod ladder_lifecycle {
    use super::*;

    #[test]
    fn steps_trigger_independently_and_confirm() {
        let slice = vec![
            acquire("BTC", 1.0, 30_000.0, "2024-01-01 09:00:00"),
            acquire("BTC", 1.0, 10_000.0, "2024-02-01 09:00:00"),
        ];
        let holding = compute_holding("BTC", None, &slice).unwrap();
        // avg 20k: targets at 30k and 40k
        let rules = vec![percent_rule(50.0, 25.0), percent_rule(100.0, 25.0)];
        let mut ladder = build_ladder(&holding, &rules).unwrap();

        assert_eq!(ladder.observe_price(32_000.0), 1);
        assert_eq!(ladder.steps[0].state, StepState::Triggered);
        assert_eq!(ladder.steps[1].state, StepState::Pending);

        // price retreats: nothing un-triggers
        assert_eq!(ladder.observe_price(28_000.0), 0);
        assert_eq!(ladder.steps[0].state, StepState::Triggered);

        assert!(ladder.steps[0].confirm_execution());
        assert_eq!(ladder.steps[0].state, StepState::Done);

        assert_eq!(ladder.observe_price(41_000.0), 1);
        assert_eq!(ladder.steps[1].state, StepState::Triggered);
        assert_eq!(ladder.steps[0].state, StepState::Done);
    }

    #[test]
    fn ladder_goes_stale_when_ledger_moves_on() {
        let mut slice = vec![acquire("BTC", 2.0, 40_000.0, "2024-01-01 09:00:00")];
        let holding = compute_holding("BTC", None, &slice).unwrap();
        let ladder = build_ladder(&holding, &[percent_rule(50.0, 50.0)]).unwrap();
        assert!(ladder.staleness(&holding).is_none());

        // a later acquisition changes quantity and average
        slice.push(acquire("BTC", 1.0, 10_000.0, "2024-02-01 09:00:00"));
        let current = compute_holding("BTC", None, &slice).unwrap();

        let warning = ladder.staleness(&current).unwrap();
        assert_eq!(warning.asset, "BTC");
        assert!((warning.snapshot_quantity - 2.0).abs() < f64::EPSILON);
        assert!((warning.current_quantity - 3.0).abs() < f64::EPSILON);

        // stale ladder still answers with its original derived numbers
        assert!((ladder.steps[0].sell_quantity - 1.0).abs() < f64::EPSILON);
        assert!((ladder.steps[0].target_price - 30_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn over_allocated_ladder_is_accepted() {
        let slice = vec![acquire("BTC", 1.0, 20_000.0, "2024-01-01 09:00:00")];
        let holding = compute_holding("BTC", None, &slice).unwrap();
        let ladder = build_ladder(
            &holding,
            &[exact_rule(30_000.0, 70.0), exact_rule(40_000.0, 60.0)],
        )
        .unwrap();
        assert!((ladder.remaining_quantity() - 0.0).abs() < f64::EPSILON);
        // proceeds still count every step at its own quantity
        assert!((ladder.projected_proceeds() - (0.7 * 30_000.0 + 0.6 * 40_000.0)).abs() < 1e-9);
    }
}

mod rule_payload_boundary {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_payload_parses_into_ladder() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{ "mode": "PERCENT_OF_AVERAGE", "percent_above_average": 50, "sell_percentage": 25 }},
                {{ "mode": "EXACT_PRICE", "target_price": 45000, "sell_percentage": 50 }}
            ]"#
        )
        .unwrap();

        let payload = std::fs::read_to_string(file.path()).unwrap();
        let rules = parse_rules(&payload).unwrap();

        let slice = vec![acquire("BTC", 2.0, 40_000.0, "2024-01-01 09:00:00")];
        let holding = compute_holding("BTC", None, &slice).unwrap();
        let ladder = build_ladder(&holding, &rules).unwrap();

        assert_eq!(ladder.steps.len(), 2);
        assert!((ladder.steps[0].target_price - 30_000.0).abs() < f64::EPSILON);
        assert!((ladder.steps[1].target_price - 45_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn malformed_payload_is_rejected_whole() {
        let payload = r#"[
            { "mode": "EXACT_PRICE", "target_price": 45000, "sell_percentage": 50 },
            { "mode": "EXACT_PRICE", "target_price": 50000, "sell_percentage": 0 }
        ]"#;
        let err = parse_rules(payload).unwrap_err();
        assert!(
            matches!(err, CoinfolioError::Validation { field, .. } if field == "rules[1].sell_percentage")
        );
    }
}

mod alert_policy_config {
    use super::*;
    use coinfolio::adapters::file_config_adapter::FileConfigAdapter;
    use coinfolio::domain::alert::Margin;

    #[test]
    fn policy_from_config_binds_across_ladder() {
        let config = FileConfigAdapter::from_string(
            "[alerts]\nbefore_target_pct = 5\non_reach = true\nchannels = email, push\n",
        )
        .unwrap();
        let policy = build_alert_policy(&config).unwrap();
        assert_eq!(policy.before_target, Some(Margin::Percent(5.0)));
        assert!(policy.on_reach);

        let slice = vec![acquire("BTC", 2.0, 40_000.0, "2024-01-01 09:00:00")];
        let holding = compute_holding("BTC", None, &slice).unwrap();
        let ladder =
            build_ladder(&holding, &[percent_rule(50.0, 25.0), percent_rule(100.0, 25.0)]).unwrap();

        let triggers: Vec<_> = ladder
            .steps
            .iter()
            .flat_map(|step| bind_alerts(step, &policy).unwrap())
            .collect();
        assert_eq!(triggers.len(), 4);

        // first step targets 30k: warn at 28.5k, notify at 30k
        assert_eq!(triggers[0].kind, AlertKind::BeforeTarget);
        assert!((triggers[0].threshold_price - 28_500.0).abs() < 1e-9);
        assert_eq!(triggers[1].kind, AlertKind::OnReach);
        assert!((triggers[1].threshold_price - 30_000.0).abs() < 1e-9);
        assert_eq!(
            triggers[0].channel_hints,
            vec!["email".to_string(), "push".to_string()]
        );
    }

    #[test]
    fn absolute_margin_policy() {
        let config = FileConfigAdapter::from_string(
            "[alerts]\nbefore_target_abs = 1000\non_reach = false\n",
        )
        .unwrap();
        let policy = build_alert_policy(&config).unwrap();
        assert_eq!(policy.before_target, Some(Margin::Absolute(1000.0)));
        assert!(!policy.on_reach);
    }

    #[test]
    fn conflicting_margins_rejected() {
        let config = FileConfigAdapter::from_string(
            "[alerts]\nbefore_target_pct = 5\nbefore_target_abs = 1000\n",
        )
        .unwrap();
        assert!(build_alert_policy(&config).is_err());
    }
}

#[cfg(feature = "sqlite")]
mod sqlite_store {
    use super::*;
    use coinfolio::adapters::csv_ledger_adapter::read_transaction_file;
    use coinfolio::adapters::sqlite_adapter::SqliteAdapter;
    use coinfolio::ports::projection_port::ProjectionStorePort;
    use std::io::Write;

    fn store() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter
    }

    #[test]
    fn import_replay_upsert_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "asset,kind,quantity,amount_invested,unit_price,occurred_at,sub_account\n\
             BTC,ACQUIRE,1.0,30000,30000,2024-01-01 09:00:00,\n\
             BTC,ACQUIRE,1.0,10000,10000,2024-02-01 09:00:00,\n\
             BTC,DISPOSE,1.0,20000,35000,2024-03-01 09:00:00,\n"
        )
        .unwrap();

        let store = store();
        let imported = read_transaction_file(file.path(), "alice").unwrap();
        assert_eq!(imported.len(), 3);
        for tx in &imported {
            store.append(tx).unwrap();
        }

        let slice = store.fetch_slice("alice", "BTC", None).unwrap();
        let holding = compute_holding("BTC", None, &slice).unwrap();
        assert!((holding.quantity - 1.0).abs() < f64::EPSILON);
        assert!((holding.invested_amount - 20_000.0).abs() < f64::EPSILON);
        assert!((holding.average_price - 20_000.0).abs() < f64::EPSILON);

        store.upsert_holding("main", &holding, 0).unwrap();
        let stored = store.fetch_holding("main", "BTC", None).unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.holding, holding);
    }

    #[test]
    fn bad_import_file_appends_nothing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "asset,kind,quantity,amount_invested,unit_price,occurred_at,sub_account\n\
             BTC,ACQUIRE,1.0,30000,30000,2024-01-01 09:00:00,\n\
             BTC,AIRDROP,1.0,0,0,2024-02-01 09:00:00,\n"
        )
        .unwrap();

        // validation happens before any append reaches the store
        let err = read_transaction_file(file.path(), "alice").unwrap_err();
        assert!(matches!(err, CoinfolioError::Validation { field, .. } if field == "kind"));
    }

    #[test]
    fn delete_then_recompute_replaces_projection() {
        let store = store();
        store
            .append(&acquire("BTC", 1.0, 30_000.0, "2024-01-01 09:00:00"))
            .unwrap();
        store
            .append(&acquire("BTC", 1.0, 10_000.0, "2024-02-01 09:00:00"))
            .unwrap();

        let slice = store.fetch_slice("alice", "BTC", None).unwrap();
        let holding = compute_holding("BTC", None, &slice).unwrap();
        assert!((holding.average_price - 20_000.0).abs() < f64::EPSILON);
        store.upsert_holding("main", &holding, 0).unwrap();

        // the user deletes the cheap buy; the holding is re-derived whole
        store.delete(2).unwrap();
        let slice = store.fetch_slice("alice", "BTC", None).unwrap();
        assert_eq!(slice.len(), 1);
        let holding = compute_holding("BTC", None, &slice).unwrap();
        assert!((holding.quantity - 1.0).abs() < f64::EPSILON);
        assert!((holding.average_price - 30_000.0).abs() < f64::EPSILON);

        store.upsert_holding("main", &holding, 1).unwrap();
        let stored = store.fetch_holding("main", "BTC", None).unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert!((stored.holding.average_price - 30_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn concurrent_recomputation_is_detected() {
        let store = store();
        store
            .append(&acquire("BTC", 1.0, 30_000.0, "2024-01-01 09:00:00"))
            .unwrap();
        let slice = store.fetch_slice("alice", "BTC", None).unwrap();
        let holding = compute_holding("BTC", None, &slice).unwrap();

        // two writers both read "no projection yet" (version 0)
        store.upsert_holding("main", &holding, 0).unwrap();
        let err = store.upsert_holding("main", &holding, 0).unwrap_err();
        assert!(matches!(err, CoinfolioError::ConcurrencyConflict { .. }));

        // loser retries the discipline: re-read, recompute, re-upsert
        let version = store
            .fetch_holding("main", "BTC", None)
            .unwrap()
            .unwrap()
            .version;
        let slice = store.fetch_slice("alice", "BTC", None).unwrap();
        let holding = compute_holding("BTC", None, &slice).unwrap();
        store.upsert_holding("main", &holding, version).unwrap();
    }

    #[test]
    fn forecast_snapshot_survives_reload() {
        let store = store();
        store
            .append(&acquire("BTC", 2.0, 40_000.0, "2024-01-01 09:00:00"))
            .unwrap();
        let slice = store.fetch_slice("alice", "BTC", None).unwrap();
        let holding = compute_holding("BTC", None, &slice).unwrap();
        let ladder = build_ladder(&holding, &[percent_rule(50.0, 50.0)]).unwrap();

        let forecast = aggregate(
            "main",
            &[Selection {
                holding,
                ladder,
                last_price: 25_000.0,
            }],
        )
        .unwrap();
        store.save_forecast("june", &forecast).unwrap();

        let loaded = store.fetch_forecast("june").unwrap().unwrap();
        assert_eq!(loaded, forecast);
        assert!((loaded.total_profit - 15_000.0).abs() < 1e-9);

        // snapshots are point-in-time: the ledger moving on changes nothing
        store
            .append(&acquire("BTC", 1.0, 10_000.0, "2024-02-01 09:00:00"))
            .unwrap();
        let unchanged = store.fetch_forecast("june").unwrap().unwrap();
        assert_eq!(unchanged, forecast);
    }

    #[test]
    fn invalid_transactions_never_enter_the_store() {
        let store = store();
        let mut tx = acquire("BTC", 1.0, 30_000.0, "2024-01-01 09:00:00");
        tx.quantity = -1.0;
        assert!(store.append(&tx).is_err());
        assert!(store.fetch_slice("alice", "BTC", None).unwrap().is_empty());
    }
}
