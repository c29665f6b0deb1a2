// src/agent/tools.rs
// Scraping tool callbacks exposed to the Copilot runtime during a session.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::scrape::ScrapeEngineClient;

pub const AGENT_TOOL_ORIGIN: &str = "scorchcrawl-bridge-agent";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolResultType {
    Success,
    Failure,
}

#[derive(Debug, Clone)]
pub struct ToolResult {
    pub text_for_llm: String,
    pub result_type: ToolResultType,
    pub error: Option<String>,
}

impl ToolResult {
    fn ok(text: String) -> Self {
        Self {
            text_for_llm: text,
            result_type: ToolResultType::Success,
            error: None,
        }
    }

    fn failure(message: String) -> Self {
        Self {
            text_for_llm: format!("Tool call failed: {message}"),
            result_type: ToolResultType::Failure,
            error: Some(message),
        }
    }
}

type CallbackFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;

/// A named callable handed to the runtime. `call` never panics and never
/// propagates an exception into the session loop — failures are converted
/// into a `Failure`-typed `ToolResult`.
pub struct ToolCallback {
    pub name: String,
    pub call: Arc<dyn Fn(Value) -> CallbackFuture + Send + Sync>,
}

/// Builds the four callables the agent session is allowed to invoke.
pub fn build_tool_callbacks(scrape_client: ScrapeEngineClient) -> Vec<ToolCallback> {
    vec![
        web_scrape_tool(scrape_client.clone()),
        web_search_tool(scrape_client.clone()),
        web_map_tool(scrape_client.clone()),
        web_extract_tool(scrape_client),
    ]
}

fn web_scrape_tool(client: ScrapeEngineClient) -> ToolCallback {
    ToolCallback {
        name: "web_scrape".to_string(),
        call: Arc::new(move |args: Value| {
            let client = client.clone();
            Box::pin(async move {
                let Some(url) = args.get("url").and_then(Value::as_str) else {
                    return ToolResult::failure("missing required field 'url'".to_string());
                };
                let formats = args
                    .get("formats")
                    .cloned()
                    .unwrap_or_else(|| json!(["markdown"]));
                let body = json!({
                    "url": url,
                    "formats": formats,
                    "onlyMainContent": args.get("onlyMainContent").cloned().unwrap_or(json!(true)),
                    "waitFor": args.get("waitFor"),
                    "origin": AGENT_TOOL_ORIGIN,
                });
                match client.scrape(body).await {
                    Ok(v) => ToolResult::ok(v.to_string()),
                    Err(e) => ToolResult::failure(e.to_user_string()),
                }
            })
        }),
    }
}

fn web_search_tool(client: ScrapeEngineClient) -> ToolCallback {
    ToolCallback {
        name: "web_search".to_string(),
        call: Arc::new(move |args: Value| {
            let client = client.clone();
            Box::pin(async move {
                let Some(query) = args.get("query").and_then(Value::as_str) else {
                    return ToolResult::failure("missing required field 'query'".to_string());
                };
                let body = json!({
                    "query": query,
                    "limit": args.get("limit"),
                    "origin": AGENT_TOOL_ORIGIN,
                });
                match client.search(body).await {
                    Ok(v) => ToolResult::ok(v.to_string()),
                    Err(e) => ToolResult::failure(e.to_user_string()),
                }
            })
        }),
    }
}

fn web_map_tool(client: ScrapeEngineClient) -> ToolCallback {
    ToolCallback {
        name: "web_map".to_string(),
        call: Arc::new(move |args: Value| {
            let client = client.clone();
            Box::pin(async move {
                let Some(url) = args.get("url").and_then(Value::as_str) else {
                    return ToolResult::failure("missing required field 'url'".to_string());
                };
                let body = json!({
                    "url": url,
                    "search": args.get("search"),
                    "limit": args.get("limit"),
                    "origin": AGENT_TOOL_ORIGIN,
                });
                match client.map(body).await {
                    Ok(v) => ToolResult::ok(v.to_string()),
                    Err(e) => ToolResult::failure(e.to_user_string()),
                }
            })
        }),
    }
}

fn web_extract_tool(client: ScrapeEngineClient) -> ToolCallback {
    ToolCallback {
        name: "web_extract".to_string(),
        call: Arc::new(move |args: Value| {
            let client = client.clone();
            Box::pin(async move {
                let Some(urls) = args.get("urls") else {
                    return ToolResult::failure("missing required field 'urls'".to_string());
                };
                let body = json!({
                    "urls": urls,
                    "prompt": args.get("prompt"),
                    "schema": args.get("schema"),
                    "origin": AGENT_TOOL_ORIGIN,
                });
                match client.extract(body).await {
                    Ok(v) => ToolResult::ok(v.to_string()),
                    Err(e) => ToolResult::failure(e.to_user_string()),
                }
            })
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;

    fn test_client() -> ScrapeEngineClient {
        ScrapeEngineClient::new(
            reqwest::Client::new(),
            UpstreamConfig {
                scrape_api_url: "http://127.0.0.1:1".to_string(),
                scrape_api_key: None,
                llm_runtime_token: None,
                llm_runtime_cli_path: None,
            },
        )
    }

    #[tokio::test]
    async fn missing_url_fails_without_network_call() {
        let tools = build_tool_callbacks(test_client());
        let scrape = tools.iter().find(|t| t.name == "web_scrape").unwrap();
        let result = (scrape.call)(json!({})).await;
        assert_eq!(result.result_type, ToolResultType::Failure);
        assert!(result.text_for_llm.contains("Tool call failed"));
    }

    #[tokio::test]
    async fn network_failure_is_captured_not_propagated() {
        let tools = build_tool_callbacks(test_client());
        let scrape = tools.iter().find(|t| t.name == "web_scrape").unwrap();
        let result = (scrape.call)(json!({"url": "https://example.com"})).await;
        assert_eq!(result.result_type, ToolResultType::Failure);
    }
}
