use anyhow::{anyhow, Context, Result};
use reqwest::{Client, RequestBuilder, Url};

use super::{forward, UpstreamResponse};

pub const DEFAULT_LIMIT: u32 = 50;
pub const DEFAULT_TIME_PERIOD: &str = "7d";

/// Coinranking API reached through RapidAPI.
#[derive(Debug, Clone)]
pub struct CoinRanking {
    client: Client,
    base_url: Option<String>,
    host: Option<String>,
    api_key: Option<String>,
}

impl CoinRanking {
    pub fn new(host: Option<String>, api_key: Option<String>) -> Self {
        let base_url = host.as_ref().map(|host| format!("https://{host}"));
        Self {
            client: Client::new(),
            base_url,
            host,
            api_key,
        }
    }

    /// Sends requests to `base_url` while still presenting the configured host header.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let base_url = self
            .base_url
            .as_deref()
            .context("CRYPTO_API_HOST is not configured")?;
        let mut url = Url::parse(base_url).with_context(|| format!("Invalid base url {base_url}"))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Base url {base_url} cannot hold a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn coins_url(&self, limit: u32) -> Result<Url> {
        let mut url = self.url(&["coins"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        Ok(url)
    }

    pub fn coin_url(&self, coin_id: &str) -> Result<Url> {
        self.url(&["coin", coin_id])
    }

    pub fn coin_history_url(&self, coin_id: &str, time_period: &str) -> Result<Url> {
        let mut url = self.url(&["coin", coin_id, "history"])?;
        url.query_pairs_mut().append_pair("timeperiod", time_period);
        Ok(url)
    }

    fn get(&self, url: Url) -> Result<RequestBuilder> {
        let api_key = self
            .api_key
            .as_deref()
            .context("RAPIDAPI_KEY is not configured")?;
        let host = self
            .host
            .as_deref()
            .context("CRYPTO_API_HOST is not configured")?;
        Ok(self
            .client
            .get(url)
            .header("x-rapidapi-key", api_key)
            .header("x-rapidapi-host", host))
    }

    pub async fn get_coins(&self, limit: u32) -> Result<UpstreamResponse> {
        let url = self.coins_url(limit)?;
        forward(self.get(url)?).await
    }

    pub async fn get_coin(&self, coin_id: &str) -> Result<UpstreamResponse> {
        let url = self.coin_url(coin_id)?;
        forward(self.get(url)?).await
    }

    pub async fn get_coin_history(
        &self,
        coin_id: &str,
        time_period: &str,
    ) -> Result<UpstreamResponse> {
        let url = self.coin_history_url(coin_id, time_period)?;
        forward(self.get(url)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{OriginalUri, Path},
        http::{HeaderMap, StatusCode},
        routing::get,
        Json, Router,
    };
    use serde_json::{json, Value};

    fn client() -> CoinRanking {
        CoinRanking::new(
            Some(String::from("coinranking1.p.rapidapi.com")),
            Some(String::from("secret")),
        )
    }

    #[test]
    fn test_urls() {
        let api = client();
        assert_eq!(
            api.coins_url(100).unwrap().as_str(),
            "https://coinranking1.p.rapidapi.com/coins?limit=100"
        );
        assert_eq!(
            api.coin_url("Qwsogvtv82FCd").unwrap().as_str(),
            "https://coinranking1.p.rapidapi.com/coin/Qwsogvtv82FCd"
        );
        assert_eq!(
            api.coin_history_url("razxDUgYGNAdQ", "24h").unwrap().as_str(),
            "https://coinranking1.p.rapidapi.com/coin/razxDUgYGNAdQ/history?timeperiod=24h"
        );
    }

    #[test]
    fn test_coin_id_is_escaped() {
        let url = client().coin_url("../admin").unwrap();
        assert_eq!(url.path(), "/coin/..%2Fadmin");
    }

    #[tokio::test]
    async fn test_missing_configuration() {
        let err = CoinRanking::new(None, Some(String::from("k")))
            .get_coins(10)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("CRYPTO_API_HOST"));

        let err = CoinRanking::new(Some(String::from("h")), None)
            .get_coin("btc")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("RAPIDAPI_KEY"));
    }

    async fn echo(OriginalUri(uri): OriginalUri, headers: HeaderMap) -> Json<Value> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_owned()
        };
        Json(json!({
            "uri": uri.to_string(),
            "key": header("x-rapidapi-key"),
            "host": header("x-rapidapi-host"),
        }))
    }

    async fn missing(Path(coin_id): Path<String>) -> (StatusCode, Json<Value>) {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"status": "fail", "message": format!("Coin {coin_id} not found")})),
        )
    }

    #[tokio::test]
    async fn test_forward_to_upstream() {
        let upstream = Router::new()
            .route("/coins", get(echo))
            .route("/coin/{coin_id}/history", get(echo))
            .route("/coin/{coin_id}", get(missing));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::task::spawn(async move { axum::serve(listener, upstream).await });

        let api = client().with_base_url(format!("http://{address}"));

        let res = api.get_coins(5).await.unwrap();
        assert_eq!(res.status, reqwest::StatusCode::OK);
        assert_eq!(
            res.body,
            json!({"uri": "/coins?limit=5", "key": "secret", "host": "coinranking1.p.rapidapi.com"})
        );

        let res = api.get_coin_history("btc", "30d").await.unwrap();
        assert_eq!(res.body["uri"], "/coin/btc/history?timeperiod=30d");

        let res = api.get_coin("nope").await.unwrap();
        assert_eq!(res.status, reqwest::StatusCode::NOT_FOUND);
        assert_eq!(res.body["message"], "Coin nope not found");
    }
}
