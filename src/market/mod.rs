use anyhow::{Context, Result};
use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::debug;

pub mod coinranking;
pub mod news;

pub use coinranking::CoinRanking;
pub use news::NewsApi;

/// Upstream answer forwarded as-is to the dashboard.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Value,
}

async fn forward(request: RequestBuilder) -> Result<UpstreamResponse> {
    let res = request.send().await.context("Upstream request failed")?;
    let status = res.status();
    let body = res.text().await.context("Failed reading upstream body")?;

    debug!("Upstream answered {} : {} bytes", status, body.len());

    let body = serde_json::de::from_str(&body)
        .with_context(|| format!("Upstream returned non JSON body (status {})", status))?;
    Ok(UpstreamResponse { status, body })
}
