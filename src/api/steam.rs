//! Implements the `Market` trait with `reqwest` against the Steam Community Market.

use crate::api::{Market, MarketResponse};
use crate::{Config, Result};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use std::collections::BTreeMap;
use tracing::trace;
use url::Url;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";

/// Requests market history pages using the session cookies from the config. Every request is
/// bounded by the configured timeout.
pub(crate) struct SteamMarket {
    client: reqwest::Client,
    base_url: Url,
}

impl SteamMarket {
    pub(crate) fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let cookie = HeaderValue::from_str(&cookie_header(config.cookies()))
            .context("The cookies in the config contain characters that cannot be sent")?;
        headers.insert(COOKIE, cookie);

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .context("Unable to create the HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url().clone(),
        })
    }
}

#[async_trait::async_trait]
impl Market for SteamMarket {
    async fn get(&mut self, start: u64, count: u64) -> Result<MarketResponse> {
        let url = page_url(&self.base_url, start, count);
        trace!("GET {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request for start={start} count={count} failed"))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .with_context(|| format!("Unable to read the response body for start={start}"))?;
        Ok(MarketResponse { status, body })
    }
}

/// Builds the request URL: `<base>?query=&start=<start>&count=<count>`.
fn page_url(base: &Url, start: u64, count: u64) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut()
        .append_pair("query", "")
        .append_pair("start", &start.to_string())
        .append_pair("count", &count.to_string());
    url
}

/// Joins cookies into a `Cookie` header value, skipping cookies with empty values.
fn cookie_header(cookies: &BTreeMap<String, String>) -> String {
    cookies
        .iter()
        .filter(|(_, v)| !v.trim().is_empty())
        .map(|(k, v)| format!("{}={}", k.trim(), v.trim()))
        .collect::<Vec<_>>()
        .join("; ")
}
