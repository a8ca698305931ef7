use anyhow::{Context, Result};
use reqwest::{Client, Url};

use super::{forward, UpstreamResponse};

pub const ENDPOINT: &str = "https://newsapi.org";
pub const DEFAULT_COUNT: u32 = 5;

#[derive(Debug, Clone)]
pub struct NewsApi {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl NewsApi {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }

    pub fn search_url(&self, query: &str, count: u32) -> Result<Url> {
        let api_key = self
            .api_key
            .as_deref()
            .context("NEWSAPI_KEY is not configured")?;
        let params = [
            ("q", query.to_owned()),
            ("pageSize", count.to_string()),
            ("apiKey", api_key.to_owned()),
        ];
        let url = Url::parse_with_params(
            format!("{}/v2/everything", self.endpoint.trim_end_matches('/')).as_str(),
            &params,
        )?;
        Ok(url)
    }

    /// Articles matching `query`, newest as ordered by the upstream.
    pub async fn search(&self, query: &str, count: u32) -> Result<UpstreamResponse> {
        let url = self.search_url(query, count)?;
        forward(self.client.get(url)).await
    }
}
