// src/mcp/requests.rs
// Request structs for the ten MCP tools. Per-field types are declared where
// the dispatch layer actually interprets the value; everything else is
// accepted through `extra` and forwarded to the scraping engine verbatim —
// the contract is parameter-level, not field-level.

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ScrapeRequest {
    #[schemars(description = "URL to scrape")]
    pub url: String,
    #[schemars(description = "Requested output formats, e.g. markdown, html, rawHtml, links, json, screenshot")]
    #[serde(default)]
    pub formats: Vec<Value>,
    #[serde(rename = "onlyMainContent", default)]
    pub only_main_content: Option<bool>,
    #[serde(rename = "skipTlsVerification", default)]
    pub skip_tls_verification: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct MapRequest {
    #[schemars(description = "URL to map")]
    pub url: String,
    #[schemars(description = "Optional search term to filter discovered links")]
    pub search: Option<String>,
    #[schemars(description = "Sitemap handling: include, skip, or only")]
    pub sitemap: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchRequest {
    #[schemars(description = "Search query")]
    pub query: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CrawlRequest {
    #[schemars(description = "URL to crawl from")]
    pub url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CheckCrawlStatusRequest {
    #[schemars(description = "Crawl job id returned by scorch_crawl")]
    pub id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ExtractRequest {
    #[schemars(description = "URLs to extract structured data from")]
    pub urls: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AgentRequest {
    #[schemars(description = "Research prompt, at most 10000 characters")]
    pub prompt: String,
    #[schemars(description = "Focus URLs the agent should prioritize")]
    #[serde(default)]
    pub urls: Vec<String>,
    #[schemars(description = "JSON schema the agent's answer should conform to")]
    pub schema: Option<Value>,
    #[schemars(description = "Model override; must be in the allowed-models list")]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AgentStatusRequest {
    #[schemars(description = "Job id returned by scorch_agent")]
    pub id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AgentModelsRequest {}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AgentRateLimitStatusRequest {}
