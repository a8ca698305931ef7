use std::path::PathBuf;

use clap::Args;
use rust_decimal::Decimal;

use crate::{
    ledger::DEFAULT_INITIAL_CASH,
    market::{news, CoinRanking, NewsApi},
    utils::parse_decimal,
};

#[derive(Args, Debug, Clone)]
pub struct ServerConfig {
    #[arg(long, env = "SERVER_ADDRESS", default_value = "127.0.0.1:5000")]
    pub server_address: String,

    #[arg(long, env = "INITIAL_CASH", default_value_t = DEFAULT_INITIAL_CASH, value_parser = parse_cash)]
    pub initial_cash: Decimal,

    /// Portfolio snapshot file, restored at start and rewritten after each trade
    #[arg(long, env = "PORTFOLIO_STORE")]
    pub store_path: Option<PathBuf>,

    #[arg(long, env = "CRYPTO_API_HOST")]
    pub crypto_api_host: Option<String>,

    #[arg(long, env = "RAPIDAPI_KEY", hide_env_values = true)]
    pub rapidapi_key: Option<String>,

    #[arg(long, env = "NEWSAPI_KEY", hide_env_values = true)]
    pub newsapi_key: Option<String>,

    #[arg(long, env = "NEWS_ENDPOINT", default_value = news::ENDPOINT)]
    pub news_endpoint: String,
}

impl ServerConfig {
    pub fn coinranking(&self) -> CoinRanking {
        CoinRanking::new(self.crypto_api_host.clone(), self.rapidapi_key.clone())
    }

    pub fn news(&self) -> NewsApi {
        NewsApi::new(self.news_endpoint.clone(), self.newsapi_key.clone())
    }
}

fn parse_cash(value: &str) -> Result<Decimal, String> {
    let cash = parse_decimal(value).ok_or_else(|| format!("'{value}' is not a decimal amount"))?;
    if cash < Decimal::ZERO {
        return Err(format!("initial cash cannot be negative, got {cash}"));
    }
    Ok(cash)
}
