//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::csv_ledger_adapter::{read_transaction_file, CsvLedgerAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::quote_adapter::FileQuoteAdapter;
use crate::domain::alert::{bind_alerts, AlertPolicy, Margin};
use crate::domain::config_validation::{validate_alert_config, validate_portfolio_config};
use crate::domain::cost_basis::compute_holding;
use crate::domain::error::CoinfolioError;
use crate::domain::forecast::{aggregate, Selection};
use crate::domain::holding::Holding;
use crate::domain::ladder::{build_ladder, ExitRule, Ladder};
use crate::domain::rule_payload::parse_rules;
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::LedgerPort;
use crate::ports::projection_port::ProjectionStorePort;
use crate::ports::quote_port::QuotePort;

#[derive(Parser, Debug)]
#[command(
    name = "coinfolio",
    about = "Crypto holdings tracker with take-profit planning"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import transactions from a CSV file into the ledger store
    Import {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Recompute holdings from the ledger and refresh projections
    Holdings {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        asset: Option<String>,
    },
    /// Build a take-profit ladder for one asset
    Ladder {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        asset: String,
        #[arg(short, long)]
        rules: PathBuf,
        /// Also report which steps this observed price triggers
        #[arg(long)]
        price: Option<f64>,
    },
    /// Aggregate configured ladders into a portfolio forecast
    Forecast {
        #[arg(short, long)]
        config: PathBuf,
        /// Persist the forecast as a named snapshot
        #[arg(long)]
        name: Option<String>,
    },
    /// Show alert triggers for one asset's ladder
    Alerts {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        asset: String,
        #[arg(short, long)]
        rules: PathBuf,
    },
    /// Validate a ladder rule payload
    Validate {
        #[arg(short, long)]
        rules: PathBuf,
    },
    /// Show per-asset ledger coverage
    Info {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Import { config, file } => run_import(&config, &file),
        Command::Holdings { config, asset } => run_holdings(&config, asset.as_deref()),
        Command::Ladder {
            config,
            asset,
            rules,
            price,
        } => run_ladder(&config, &asset, &rules, price),
        Command::Forecast { config, name } => run_forecast(&config, name.as_deref()),
        Command::Alerts {
            config,
            asset,
            rules,
        } => run_alerts(&config, &asset, &rules),
        Command::Validate { rules } => run_validate(&rules),
        Command::Info { config } => run_info(&config),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = CoinfolioError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// Alert policy from the `[alerts]` config section.
pub fn build_alert_policy(config: &dyn ConfigPort) -> Result<AlertPolicy, CoinfolioError> {
    validate_alert_config(config)?;

    let before_target = if config.get_string("alerts", "before_target_pct").is_some() {
        Some(Margin::Percent(config.get_double(
            "alerts",
            "before_target_pct",
            0.0,
        )))
    } else if config.get_string("alerts", "before_target_abs").is_some() {
        Some(Margin::Absolute(config.get_double(
            "alerts",
            "before_target_abs",
            0.0,
        )))
    } else {
        None
    };

    Ok(AlertPolicy {
        before_target,
        on_reach: config.get_bool("alerts", "on_reach", true),
        channel_hints: config.get_list("alerts", "channels"),
    })
}

fn owner(config: &dyn ConfigPort) -> Result<String, CoinfolioError> {
    config
        .get_string("portfolio", "owner")
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| CoinfolioError::ConfigMissing {
            section: "portfolio".into(),
            key: "owner".into(),
        })
}

fn portfolio_id(config: &dyn ConfigPort) -> Result<String, CoinfolioError> {
    config
        .get_string("portfolio", "id")
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| CoinfolioError::ConfigMissing {
            section: "portfolio".into(),
            key: "id".into(),
        })
}

fn open_ledger(config: &FileConfigAdapter) -> Result<Box<dyn LedgerPort>, CoinfolioError> {
    match config.get_string("ledger", "backend").as_deref() {
        Some("csv") => {
            let dir =
                config
                    .get_string("ledger", "path")
                    .ok_or_else(|| CoinfolioError::ConfigMissing {
                        section: "ledger".into(),
                        key: "path".into(),
                    })?;
            Ok(Box::new(CsvLedgerAdapter::new(PathBuf::from(dir))))
        }
        _ => open_sqlite_ledger(config),
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite_ledger(config: &FileConfigAdapter) -> Result<Box<dyn LedgerPort>, CoinfolioError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;

    let adapter = SqliteAdapter::from_config(config)?;
    adapter.initialize_schema()?;
    Ok(Box::new(adapter))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite_ledger(_config: &FileConfigAdapter) -> Result<Box<dyn LedgerPort>, CoinfolioError> {
    Err(CoinfolioError::Database {
        reason: "sqlite feature is required for the sqlite ledger backend".to_string(),
    })
}

/// Projection store, when one is configured. The csv backend carries no
/// store; holdings and forecasts are then computed but not persisted.
fn open_projection_store(
    config: &FileConfigAdapter,
) -> Result<Option<Box<dyn ProjectionStorePort>>, CoinfolioError> {
    if config.get_string("ledger", "backend").as_deref() == Some("csv") {
        return Ok(None);
    }

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;

        let adapter = SqliteAdapter::from_config(config)?;
        adapter.initialize_schema()?;
        Ok(Some(Box::new(adapter)))
    }

    #[cfg(not(feature = "sqlite"))]
    Ok(None)
}

fn holding_for(
    ledger: &dyn LedgerPort,
    owner: &str,
    asset: &str,
) -> Result<Holding, CoinfolioError> {
    let slice = ledger.fetch_slice(owner, asset, None)?;
    if slice.is_empty() {
        return Err(CoinfolioError::NoTransactions {
            owner: owner.to_string(),
            asset: asset.to_string(),
        });
    }
    compute_holding(asset, None, &slice)
}

fn load_rules(path: &PathBuf) -> Result<Vec<ExitRule>, CoinfolioError> {
    let payload = fs::read_to_string(path)?;
    parse_rules(&payload)
}

fn print_ladder(ladder: &Ladder) {
    for step in &ladder.steps {
        println!(
            "  {}. sell {:.8} {} at {:.2}  [{:?}]",
            step.order + 1,
            step.sell_quantity,
            ladder.asset,
            step.target_price,
            step.state,
        );
    }
    eprintln!(
        "Projected proceeds: {:.2}, remaining quantity: {:.8}",
        ladder.projected_proceeds(),
        ladder.remaining_quantity(),
    );
}

fn run_import(config_path: &PathBuf, file: &PathBuf) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let owner = match owner(&config) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!("Reading transactions from {}", file.display());
    let transactions = match read_transaction_file(file, &owner) {
        Ok(txs) => txs,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let ledger = match open_ledger(&config) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    for tx in &transactions {
        if let Err(e) = ledger.append(tx) {
            eprintln!("error: {e}");
            return (&e).into();
        }
    }

    eprintln!("Imported {} transactions for {}", transactions.len(), owner);
    ExitCode::SUCCESS
}

fn run_holdings(config_path: &PathBuf, asset_override: Option<&str>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    if let Err(e) = validate_portfolio_config(&config) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    let (owner, portfolio) = match (owner(&config), portfolio_id(&config)) {
        (Ok(owner), Ok(portfolio)) => (owner, portfolio),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let assets: Vec<String> = match asset_override {
        Some(a) => vec![a.to_uppercase()],
        None => config.get_list("portfolio", "assets"),
    };

    let ledger = match open_ledger(&config) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let store = match open_projection_store(&config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    for asset in &assets {
        let holding = match holding_for(ledger.as_ref(), &owner, asset) {
            Ok(h) => h,
            Err(e) => {
                eprintln!("warning: skipping {} ({})", asset, e);
                continue;
            }
        };

        if let Some(store) = &store {
            let version = match store.fetch_holding(&portfolio, asset, None) {
                Ok(stored) => stored.map(|s| s.version).unwrap_or(0),
                Err(e) => {
                    eprintln!("error: {e}");
                    return (&e).into();
                }
            };
            if let Err(e) = store.upsert_holding(&portfolio, &holding, version) {
                eprintln!("error: {e}");
                return (&e).into();
            }
        }

        println!(
            "{}: {:.8} @ avg {:.2} (invested {:.2})",
            holding.asset, holding.quantity, holding.average_price, holding.invested_amount,
        );
    }

    ExitCode::SUCCESS
}

fn run_ladder(
    config_path: &PathBuf,
    asset: &str,
    rules_path: &PathBuf,
    price: Option<f64>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let result = (|| -> Result<(), CoinfolioError> {
        let owner = owner(&config)?;
        let ledger = open_ledger(&config)?;
        let asset = asset.to_uppercase();

        let holding = holding_for(ledger.as_ref(), &owner, &asset)?;
        eprintln!(
            "Holding: {:.8} {} @ avg {:.2}",
            holding.quantity, holding.asset, holding.average_price,
        );

        let rules = load_rules(rules_path)?;
        let mut ladder = build_ladder(&holding, &rules)?;

        if let Some(observed) = price {
            let fired = ladder.observe_price(observed);
            eprintln!("Observed price {:.2}: {} step(s) triggered", observed, fired);
        }

        print_ladder(&ladder);
        Ok(())
    })();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn run_forecast(config_path: &PathBuf, snapshot_name: Option<&str>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    if let Err(e) = validate_portfolio_config(&config) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    let result = (|| -> Result<(), CoinfolioError> {
        let owner = owner(&config)?;
        let portfolio = portfolio_id(&config)?;
        let assets = config.get_list("portfolio", "assets");

        let ledger = open_ledger(&config)?;

        let quotes_path =
            config
                .get_string("quotes", "path")
                .ok_or_else(|| CoinfolioError::ConfigMissing {
                    section: "quotes".into(),
                    key: "path".into(),
                })?;
        let quotes = FileQuoteAdapter::from_file(&PathBuf::from(quotes_path))?;

        let mut selections = Vec::with_capacity(assets.len());
        for asset in &assets {
            let holding = holding_for(ledger.as_ref(), &owner, asset)?;

            let rules_path = config
                .get_string("rules", &asset.to_lowercase())
                .ok_or_else(|| CoinfolioError::ConfigMissing {
                    section: "rules".into(),
                    key: asset.to_lowercase(),
                })?;
            let rules = load_rules(&PathBuf::from(rules_path))?;
            let ladder = build_ladder(&holding, &rules)?;

            let last_price = quotes
                .latest_price(asset)?
                .ok_or_else(|| CoinfolioError::NoQuote {
                    asset: asset.clone(),
                })?;

            selections.push(Selection {
                holding,
                ladder,
                last_price,
            });
        }

        let forecast = aggregate(&portfolio, &selections)?;

        for projection in forecast.per_asset.values() {
            println!(
                "  {}: projected {:.2} (invested {:.2}, profit {:+.2})",
                projection.asset,
                projection.projected_value,
                projection.invested_amount,
                projection.profit,
            );
        }
        println!(
            "Total: projected {:.2}, invested {:.2}, profit {:+.2} ({:+.2}%)",
            forecast.total_projected_value,
            forecast.total_invested,
            forecast.total_profit,
            forecast.return_percent,
        );

        if let Some(name) = snapshot_name {
            let store =
                open_projection_store(&config)?.ok_or_else(|| CoinfolioError::Database {
                    reason: "no projection store configured; snapshots need the sqlite backend"
                        .to_string(),
                })?;
            store.save_forecast(name, &forecast)?;
            eprintln!("Forecast saved as snapshot '{name}'");
        }

        Ok(())
    })();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn run_alerts(config_path: &PathBuf, asset: &str, rules_path: &PathBuf) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let result = (|| -> Result<(), CoinfolioError> {
        let policy = build_alert_policy(&config)?;
        let owner = owner(&config)?;
        let ledger = open_ledger(&config)?;
        let asset = asset.to_uppercase();

        let holding = holding_for(ledger.as_ref(), &owner, &asset)?;
        let rules = load_rules(rules_path)?;
        let ladder = build_ladder(&holding, &rules)?;

        let mut bound = 0usize;
        for step in &ladder.steps {
            for trigger in bind_alerts(step, &policy)? {
                println!(
                    "  step {} {:?} at {:.2} -> {}",
                    trigger.step_order + 1,
                    trigger.kind,
                    trigger.threshold_price,
                    if trigger.channel_hints.is_empty() {
                        "default channel".to_string()
                    } else {
                        trigger.channel_hints.join(", ")
                    },
                );
                bound += 1;
            }
        }
        eprintln!("{} trigger(s) bound for {} step(s)", bound, ladder.steps.len());
        Ok(())
    })();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn run_validate(rules_path: &PathBuf) -> ExitCode {
    eprintln!("Validating rule payload: {}", rules_path.display());
    match load_rules(rules_path) {
        Ok(rules) => {
            for (index, rule) in rules.iter().enumerate() {
                println!("  {}. {}", index + 1, rule);
            }
            eprintln!("Rule payload is valid ({} rule(s)).", rules.len());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn run_info(config_path: &PathBuf) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let result = (|| -> Result<(), CoinfolioError> {
        let owner = owner(&config)?;
        let ledger = open_ledger(&config)?;

        let assets = ledger.list_assets(&owner)?;
        if assets.is_empty() {
            eprintln!("No transactions recorded for {}", owner);
            return Ok(());
        }

        for asset in &assets {
            match ledger.slice_summary(&owner, asset)? {
                Some(summary) => println!(
                    "{}: {} transactions, {} to {}",
                    summary.asset, summary.transactions, summary.first, summary.last,
                ),
                None => eprintln!("{}: no data found", asset),
            }
        }
        Ok(())
    })();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}
