// src/mcp/dispatch.rs
// Per-tool dispatch logic shared by the tool-router methods in mod.rs.
// Knows how to reach the scraping engine, the agent engine, and the
// local-fetch fallback; the tool-router layer only unwraps/wraps CallToolResult.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::agent::{AgentJobEngine, AgentRequest as EngineAgentRequest, JobStatus};
use crate::config::ModesConfig;
use crate::error::Result;
use crate::scrape::{formats_are_local_capable, local_scrape, LocalFetchOptions, ScrapeEngineClient};

use super::requests::*;

pub const ORIGIN: &str = "scorchcrawl-mcp-bridge";

/// Recursively drops null, empty-string, empty-sequence, and empty-mapping
/// leaves. Idempotent: nothing an empty leaf could become survives the first
/// pass, so a second pass is a no-op.
pub fn truncate_empty_leaves(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                let v = truncate_empty_leaves(v);
                if !is_empty_leaf(&v) {
                    out.insert(k, v);
                }
            }
            Value::Object(out)
        }
        Value::Array(arr) => {
            let items: Vec<Value> = arr
                .into_iter()
                .map(truncate_empty_leaves)
                .filter(|v| !is_empty_leaf(v))
                .collect();
            Value::Array(items)
        }
        other => other,
    }
}

fn is_empty_leaf(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(m) => m.is_empty(),
        _ => false,
    }
}

fn format_strings(formats: &[Value]) -> Vec<String> {
    formats
        .iter()
        .map(|f| match f {
            Value::String(s) => s.to_lowercase(),
            Value::Object(o) => o
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_lowercase(),
            _ => String::new(),
        })
        .collect()
}

fn string_array(v: Option<&Value>) -> Vec<String> {
    match v {
        Some(Value::Array(arr)) => arr.iter().filter_map(|x| x.as_str().map(str::to_string)).collect(),
        _ => Vec::new(),
    }
}

pub async fn dispatch_scrape(
    scrape: &ScrapeEngineClient,
    modes: &ModesConfig,
    mut req: ScrapeRequest,
) -> Result<Value> {
    if modes.safe_mode {
        req.extra.remove("actions");
    }

    let format_list = format_strings(&req.formats);
    if modes.local_proxy && formats_are_local_capable(&format_list) {
        let options = LocalFetchOptions {
            formats: format_list,
            only_main_content: req.only_main_content.unwrap_or(false),
            include_tags: string_array(req.extra.get("includeTags")),
            exclude_tags: string_array(req.extra.get("excludeTags")),
            timeout_s: req.extra.get("timeout").and_then(Value::as_u64),
            skip_tls_verification: req.skip_tls_verification.unwrap_or(false),
            headers: HashMap::new(),
        };
        match local_scrape(&req.url, options).await {
            Ok(outcome) => {
                let falls_back_to_engine = outcome
                    .error
                    .as_deref()
                    .map(|e| e == "FORMAT_NEEDS_SERVER" || e.starts_with("SPA_SKELETON_DETECTED"))
                    .unwrap_or(false);
                if !falls_back_to_engine {
                    return Ok(outcome.to_json());
                }
            }
            Err(e) => return Err(e),
        }
    }

    let mut body = req.extra;
    body.insert("url".to_string(), Value::String(req.url));
    if !req.formats.is_empty() {
        body.insert("formats".to_string(), Value::Array(req.formats));
    }
    if let Some(v) = req.only_main_content {
        body.insert("onlyMainContent".to_string(), Value::Bool(v));
    }
    if let Some(v) = req.skip_tls_verification {
        body.insert("skipTlsVerification".to_string(), Value::Bool(v));
    }
    body.insert("origin".to_string(), Value::String(ORIGIN.to_string()));
    scrape.scrape(truncate_empty_leaves(Value::Object(body))).await
}

pub async fn dispatch_map(scrape: &ScrapeEngineClient, req: MapRequest) -> Result<Value> {
    let mut body = req.extra;
    body.insert("url".to_string(), Value::String(req.url));
    if let Some(search) = req.search {
        body.insert("search".to_string(), Value::String(search));
    }
    if let Some(sitemap) = req.sitemap {
        body.insert("sitemap".to_string(), Value::String(sitemap));
    }
    body.insert("origin".to_string(), Value::String(ORIGIN.to_string()));
    scrape.map(truncate_empty_leaves(Value::Object(body))).await
}

pub async fn dispatch_search(scrape: &ScrapeEngineClient, req: SearchRequest) -> Result<Value> {
    let mut body = req.extra;
    body.insert("query".to_string(), Value::String(req.query));
    body.insert("origin".to_string(), Value::String(ORIGIN.to_string()));
    scrape.search(truncate_empty_leaves(Value::Object(body))).await
}

pub async fn dispatch_crawl(
    scrape: &ScrapeEngineClient,
    modes: &ModesConfig,
    mut req: CrawlRequest,
) -> Result<Value> {
    if modes.safe_mode {
        req.extra.remove("webhook");
    }
    let mut body = req.extra;
    body.insert("url".to_string(), Value::String(req.url));
    body.insert("origin".to_string(), Value::String(ORIGIN.to_string()));
    scrape.crawl(truncate_empty_leaves(Value::Object(body))).await
}

pub async fn dispatch_check_crawl_status(
    scrape: &ScrapeEngineClient,
    req: CheckCrawlStatusRequest,
) -> Result<Value> {
    scrape.check_crawl_status(&req.id).await
}

pub async fn dispatch_extract(scrape: &ScrapeEngineClient, req: ExtractRequest) -> Result<Value> {
    let mut body = req.extra;
    body.insert(
        "urls".to_string(),
        Value::Array(req.urls.into_iter().map(Value::String).collect()),
    );
    body.insert("origin".to_string(), Value::String(ORIGIN.to_string()));
    scrape.extract(truncate_empty_leaves(Value::Object(body))).await
}

const MAX_AGENT_PROMPT_CHARS: usize = 10_000;

pub async fn dispatch_agent(
    engine: &AgentJobEngine,
    identity_token: Option<String>,
    req: AgentRequest,
) -> Value {
    let prompt: String = req.prompt.chars().take(MAX_AGENT_PROMPT_CHARS).collect();
    let outcome = engine
        .start(
            EngineAgentRequest {
                prompt,
                urls: req.urls,
                schema: req.schema,
                model: req.model,
            },
            identity_token,
        )
        .await;

    let mut body = json!({
        "id": outcome.id,
        "status": serde_json::to_value(outcome.status).unwrap_or_else(|_| json!("failed")),
    });
    if outcome.rate_limited {
        body["rate_limited"] = json!(true);
        body["retry_after_s"] = json!(outcome.retry_after_s);
    }
    if let Some(error) = outcome.error {
        body["error"] = json!(error);
    }
    body
}

pub fn dispatch_agent_status(engine: &AgentJobEngine, req: &AgentStatusRequest) -> Value {
    let Some(job) = engine.status(&req.id) else {
        return json!({ "success": false, "error": format!("job not found: {}", req.id) });
    };

    let mut body = json!({
        "success": !matches!(job.status, JobStatus::Failed),
        "status": serde_json::to_value(job.status).unwrap_or_else(|_| json!("failed")),
    });
    if let Some(progress) = job.progress {
        body["progress"] = json!(progress);
    }
    if let Some(result) = job.result {
        body["data"] = result;
    }
    if let Some(error) = job.error {
        body["error"] = json!(error);
    }
    if let Some(duration) = job.duration_s() {
        body["duration"] = json!(duration);
    }
    body
}

pub fn dispatch_agent_models(engine: &AgentJobEngine) -> Value {
    json!({
        "allowed_models": engine.allowed_models().allowed_models,
        "default_model": engine.allowed_models().default_model,
    })
}

pub fn dispatch_agent_rate_limit_status(engine: &AgentJobEngine) -> Value {
    let stats = engine.guard().stats();
    json!({
        "global_active": stats.concurrency.global_active,
        "per_identity": stats.concurrency.per_identity,
        "max_global_concurrency": stats.max_global_concurrency,
        "max_per_user_concurrency": stats.max_per_user_concurrency,
        "window_ms": stats.window_ms,
        "max_global_per_window": stats.max_global_per_window,
        "max_per_user_per_window": stats.max_per_user_per_window,
        "quota_reject_threshold_percent": stats.quota_reject_threshold_percent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_drops_null_and_empty_leaves() {
        let input = json!({
            "a": null,
            "b": "",
            "c": [],
            "d": {},
            "e": "keep",
            "f": {"g": null, "h": "keep"},
        });
        let out = truncate_empty_leaves(input);
        assert_eq!(out, json!({"e": "keep", "f": {"h": "keep"}}));
    }

    #[test]
    fn truncate_is_idempotent() {
        let input = json!({"a": null, "b": {"c": [], "d": "x"}, "e": [1, null, ""]});
        let once = truncate_empty_leaves(input);
        let twice = truncate_empty_leaves(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn truncate_leaves_non_empty_scalars_alone() {
        let input = json!({"a": 0, "b": false, "c": "x"});
        let out = truncate_empty_leaves(input.clone());
        assert_eq!(out, input);
    }
}
