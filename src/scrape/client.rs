// src/scrape/client.rs
// Thin proxy client for the downstream scraping engine's REST surface.
//
// Only the request/response shape of `/v1/scrape`, `/v1/map`, `/v1/search`,
// `/v1/crawl`, `/v1/crawl/{id}`, `/v1/extract` matters — the engine's own
// internals (browser pool, queues, datastores) are out of scope.

use serde_json::Value;

use crate::config::{strip_local_proxy_param, UpstreamConfig};
use crate::error::{BridgeError, Result};

#[derive(Clone)]
pub struct ScrapeEngineClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ScrapeEngineClient {
    pub fn new(http: reqwest::Client, config: UpstreamConfig) -> Self {
        Self {
            http,
            base_url: strip_local_proxy_param(&config.scrape_api_url),
            api_key: config.scrape_api_key,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let mut req = self.http.post(format!("{}{path}", self.base_url)).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(BridgeError::Upstream(format!("{status}: {text}")));
        }
        Ok(resp.json().await?)
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let mut req = self.http.get(format!("{}{path}", self.base_url));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(BridgeError::Upstream(format!("{status}: {text}")));
        }
        Ok(resp.json().await?)
    }

    pub async fn scrape(&self, body: Value) -> Result<Value> {
        self.post("/v1/scrape", body).await
    }

    pub async fn map(&self, body: Value) -> Result<Value> {
        self.post("/v1/map", body).await
    }

    pub async fn search(&self, body: Value) -> Result<Value> {
        self.post("/v1/search", body).await
    }

    pub async fn crawl(&self, body: Value) -> Result<Value> {
        self.post("/v1/crawl", body).await
    }

    pub async fn check_crawl_status(&self, id: &str) -> Result<Value> {
        self.get(&format!("/v1/crawl/{id}")).await
    }

    pub async fn extract(&self, body: Value) -> Result<Value> {
        self.post("/v1/extract", body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client(url: &str) -> ScrapeEngineClient {
        ScrapeEngineClient::new(
            reqwest::Client::new(),
            UpstreamConfig {
                scrape_api_url: url.to_string(),
                scrape_api_key: None,
                llm_runtime_token: None,
                llm_runtime_cli_path: None,
            },
        )
    }

    #[test]
    fn strips_local_proxy_query_param_at_construction() {
        let client = test_client("http://example.com/api?localProxy=true");
        assert_eq!(client.base_url(), "http://example.com/api");
    }

    #[test]
    fn leaves_other_query_params_alone() {
        let client = test_client("http://example.com/api?foo=bar");
        assert_eq!(client.base_url(), "http://example.com/api?foo=bar");
    }
}
