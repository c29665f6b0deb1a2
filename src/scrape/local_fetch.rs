// src/scrape/local_fetch.rs
// One-shot in-process HTTP fetch, HTML reduction, and SPA-shell detection.
//
// Used when a client opts into local-proxy mode for formats the bridge can
// serve without the browser-backed engine.

use std::collections::HashMap;
use std::time::Duration;

use scraper::Html;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BridgeError, Result};
use crate::http::create_fetch_client;

use super::html::{self, ReducedContent};
use super::spa_detector;

const DEFAULT_TIMEOUT_S: u64 = 30;
const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default)]
pub struct LocalFetchOptions {
    pub formats: Vec<String>,
    pub only_main_content: bool,
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    pub timeout_s: Option<u64>,
    pub skip_tls_verification: bool,
    pub headers: HashMap<String, String>,
}

const LOCAL_CAPABLE_FORMATS: &[&str] = &["markdown", "html", "rawhtml", "links"];
const SERVER_ONLY_FORMATS: &[&str] = &["json", "screenshot", "branding", "summary"];

pub fn formats_are_local_capable(formats: &[String]) -> bool {
    if formats.is_empty() {
        return true;
    }
    formats
        .iter()
        .all(|f| LOCAL_CAPABLE_FORMATS.contains(&f.to_lowercase().as_str()))
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LocalFetchData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<String>>,
    pub final_url: String,
    pub status_code: u16,
}

#[derive(Debug, Clone)]
pub struct LocalFetchOutcome {
    pub success: bool,
    pub data: Option<LocalFetchData>,
    pub error: Option<String>,
}

impl LocalFetchOutcome {
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "success": self.success,
            "data": self.data,
            "error": self.error,
        })
    }
}

/// Performs the fetch-parse-reduce-detect pipeline for the local-proxy path.
pub async fn local_scrape(url: &str, options: LocalFetchOptions) -> Result<LocalFetchOutcome> {
    if options
        .formats
        .iter()
        .any(|f| SERVER_ONLY_FORMATS.contains(&f.to_lowercase().as_str()))
    {
        return Ok(LocalFetchOutcome {
            success: false,
            data: None,
            error: Some("FORMAT_NEEDS_SERVER".to_string()),
        });
    }

    let timeout = Duration::from_secs(options.timeout_s.unwrap_or(DEFAULT_TIMEOUT_S));
    let client = create_fetch_client(timeout, options.skip_tls_verification);

    let mut req = client
        .get(url)
        .header("User-Agent", DESKTOP_USER_AGENT)
        .header(
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        )
        .header("Accept-Language", "en-US,en;q=0.9")
        .header("Accept-Encoding", "gzip, deflate, br")
        .header("Cache-Control", "no-cache");
    for (name, value) in &options.headers {
        req = req.header(name.as_str(), value.as_str());
    }

    let resp = req
        .send()
        .await
        .map_err(|e| BridgeError::LocalFetchFailed(e.to_string()))?;

    let status_code = resp.status().as_u16();
    let final_url = resp.url().to_string();
    let body = resp
        .text()
        .await
        .map_err(|e| BridgeError::LocalFetchFailed(e.to_string()))?;

    let doc = Html::parse_document(&body);
    let page = html::parse_page(&doc);

    let formats_lower: Vec<String> = options.formats.iter().map(|f| f.to_lowercase()).collect();
    let want = |f: &str| formats_lower.is_empty() || formats_lower.iter().any(|x| x == f);

    let ReducedContent {
        markdown,
        html: target_html,
        links,
    } = html::reduce(
        &doc,
        &body,
        &final_url,
        options.only_main_content,
        &options.include_tags,
        &options.exclude_tags,
    );

    let data = LocalFetchData {
        title: page.title.clone(),
        description: page.description.clone(),
        language: page.language.clone(),
        markdown: want("markdown").then(|| markdown.clone()),
        html: want("html").then(|| target_html.clone()),
        raw_html: want("rawhtml").then(|| body.clone()),
        links: want("links").then(|| links.clone()),
        final_url: final_url.clone(),
        status_code,
    };

    if let Some(reason) = spa_detector::detect(&body, &page.visible_text, &doc) {
        return Ok(LocalFetchOutcome {
            success: false,
            data: Some(data),
            error: Some(format!("SPA_SKELETON_DETECTED: {reason}")),
        });
    }

    Ok(LocalFetchOutcome {
        success: true,
        data: Some(data),
        error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_only_formats_short_circuit_without_network() {
        let formats = vec!["json".to_string()];
        assert!(!formats_are_local_capable(&formats));
    }

    #[test]
    fn local_capable_formats_allow_local_path() {
        let formats = vec!["markdown".to_string(), "links".to_string()];
        assert!(formats_are_local_capable(&formats));
    }

    #[test]
    fn empty_formats_list_is_local_capable() {
        assert!(formats_are_local_capable(&[]));
    }

    #[tokio::test]
    async fn server_only_format_returns_format_needs_server_without_fetching() {
        let outcome = local_scrape(
            "http://127.0.0.1:1",
            LocalFetchOptions {
                formats: vec!["screenshot".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("FORMAT_NEEDS_SERVER"));
    }
}
