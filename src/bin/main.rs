use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::sync::RwLock;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crypto_dashboard::config::ServerConfig;
use crypto_dashboard::ledger::Ledger;
use crypto_dashboard::portfolio::Portfolio;
use crypto_dashboard::server::{self, ServerState};
use crypto_dashboard::state::State;
use crypto_dashboard::*;

#[derive(Parser, Debug)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the dashboard API
    Start {
        #[command(flatten)]
        config: ServerConfig,
    },
    /// Print a stored portfolio snapshot
    Portfolio {
        #[arg(long, env = "PORTFOLIO_STORE")]
        store_path: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!(
                "crypto_dashboard=debug,{}=debug,tower_http=debug,reqwest=debug",
                env!("CARGO_CRATE_NAME")
            )
            .into()
        }))
        .with(fmt::layer())
        .init();

    let args = Args::parse();

    let res = match args.command {
        Commands::Start { config } => run_start(config).await,
        Commands::Portfolio { store_path } => run_portfolio(store_path).await,
    };

    if let Err(err) = res {
        error!("{:#}", err);
        std::process::exit(1);
    }
}

async fn run_portfolio(store_path: PathBuf) -> Result<()> {
    match store::load(&store_path).await? {
        Some(portfolio) => info!("{}", portfolio),
        None => info!("No portfolio stored at {}", store_path.display()),
    }
    Ok(())
}

async fn initial_portfolio(config: &ServerConfig) -> Result<Portfolio> {
    if let Some(store_path) = &config.store_path {
        let stored = store::load(store_path)
            .await
            .context("Could not restore portfolio")?;
        if let Some(portfolio) = stored {
            info!("Restored portfolio from {}", store_path.display());
            return Ok(portfolio);
        }
    }
    Ok(Portfolio::new(config.initial_cash))
}

async fn run_start(config: ServerConfig) -> Result<()> {
    let portfolio = initial_portfolio(&config).await?;
    let state = Arc::new(RwLock::new(State::new(Ledger::from_portfolio(portfolio))));

    let (tx_app, _) = tokio::sync::broadcast::channel::<AppEvent>(1000);

    if let Some(store_path) = config.store_path.clone() {
        let rx_store = tx_app.subscribe();
        tokio::task::spawn(store::run_writer(store_path, rx_store));
    }

    tokio::task::spawn({
        let state = state.clone();
        async move { print_overview(state).await }
    });

    let server_state = ServerState::new(
        state.clone(),
        tx_app.clone(),
        config.coinranking(),
        config.news(),
    );

    info!("{}", "STARTING DASHBOARD".green());

    server::start(config.server_address.clone(), server_state).await
}

async fn print_overview(state: Arc<RwLock<State>>) {
    loop {
        tokio::time::sleep(Duration::from_secs(60)).await;
        let state = state.read().await;
        info!("{}", state.portfolio());
        info!(
            "value ~{} after {} trades",
            state.valuation().value.round_dp(2),
            state.trades().len()
        );
    }
}
