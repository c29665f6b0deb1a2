// src/agent/runtime.rs
// Session-lifecycle contract with the downstream Copilot agent runtime.
//
// The runtime's own internals are out of scope; only its session lifecycle
// (create, register error hook, subscribe to usage events, send-and-wait,
// destroy) and tool-invocation callback shape matter here.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ByokConfig;
use crate::error::Result;

use super::error_hook::ErrorEvent;
use super::tools::ToolCallback;

/// A usage snapshot emitted asynchronously by the runtime, describing
/// remaining quota for the identity that owns the session.
#[derive(Debug, Clone, Default)]
pub struct UsageEvent {
    pub remaining_percent: Option<f64>,
    pub used_requests: Option<u64>,
    pub entitlement_requests: Option<i64>,
    pub is_unlimited: Option<bool>,
    pub reset_date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub model: String,
    pub system_prompt: String,
    pub byok: Option<ByokConfig>,
}

#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub content: Option<String>,
}

/// One open conversation with the runtime, scoped to a single job.
#[async_trait]
pub trait AgentSession: Send + Sync {
    async fn send_and_wait(&self, prompt: &str) -> Result<AgentResponse>;

    /// Destroy the session. Errors are logged, never propagated — callers
    /// always treat this as best-effort cleanup.
    async fn destroy(&self);
}

/// A handle capable of opening sessions for one identity. Cached in
/// `AgentSessionClientCache` and re-entrant across concurrent jobs for the
/// same identity.
#[async_trait]
pub trait AgentRuntimeClient: Send + Sync {
    async fn open_session(
        &self,
        options: SessionOptions,
        tools: Vec<ToolCallback>,
        on_error: Box<dyn Fn(ErrorEvent) + Send + Sync>,
        on_usage: Box<dyn Fn(UsageEvent) + Send + Sync>,
    ) -> Result<Box<dyn AgentSession>>;

    /// Best-effort shutdown, invoked when the client is evicted from the cache.
    async fn shutdown(&self);
}

/// HTTP-backed runtime client: sessions are modeled as a thin request/response
/// protocol against the runtime's HTTP endpoint (or CLI-bridged equivalent),
/// since the wire format itself is a contract-level detail of the runtime.
pub struct HttpAgentRuntimeClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpAgentRuntimeClient {
    pub fn new(http: reqwest::Client, base_url: String, token: String) -> Self {
        Self {
            http,
            base_url,
            token,
        }
    }
}

#[async_trait]
impl AgentRuntimeClient for HttpAgentRuntimeClient {
    async fn open_session(
        &self,
        options: SessionOptions,
        tools: Vec<ToolCallback>,
        on_error: Box<dyn Fn(ErrorEvent) + Send + Sync>,
        on_usage: Box<dyn Fn(UsageEvent) + Send + Sync>,
    ) -> Result<Box<dyn AgentSession>> {
        let resp = self
            .http
            .post(format!("{}/v1/sessions", self.base_url))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({
                "model": options.model,
                "system_prompt": options.system_prompt,
                "tool_names": tools.iter().map(|t| t.name.clone()).collect::<Vec<_>>(),
            }))
            .send()
            .await?
            .error_for_status()?;

        let body: Value = resp.json().await?;
        let session_id = body
            .get("session_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Box::new(HttpAgentSession {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token: self.token.clone(),
            session_id,
            tools,
            on_error,
            on_usage,
        }))
    }

    async fn shutdown(&self) {
        let _ = self
            .http
            .post(format!("{}/v1/shutdown", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await;
    }
}

struct HttpAgentSession {
    http: reqwest::Client,
    base_url: String,
    token: String,
    session_id: String,
    tools: Vec<ToolCallback>,
    on_error: Box<dyn Fn(ErrorEvent) + Send + Sync>,
    on_usage: Box<dyn Fn(UsageEvent) + Send + Sync>,
}

#[async_trait]
impl AgentSession for HttpAgentSession {
    async fn send_and_wait(&self, prompt: &str) -> Result<AgentResponse> {
        let resp = self
            .http
            .post(format!(
                "{}/v1/sessions/{}/messages",
                self.base_url, self.session_id
            ))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) => {
                (self.on_error)(ErrorEvent {
                    error_text: e.to_string(),
                    context: super::error_hook::ErrorContext::ModelCall,
                    recoverable: true,
                });
                return Err(e.into());
            }
        };

        let resp = match resp.error_for_status() {
            Ok(r) => r,
            Err(e) => {
                (self.on_error)(ErrorEvent {
                    error_text: e.to_string(),
                    context: super::error_hook::ErrorContext::ModelCall,
                    recoverable: false,
                });
                return Err(e.into());
            }
        };

        let body: Value = resp.json().await?;

        if let Some(usage) = body.get("usage") {
            (self.on_usage)(UsageEvent {
                remaining_percent: usage.get("remaining_percent").and_then(Value::as_f64),
                used_requests: usage.get("used_requests").and_then(Value::as_u64),
                entitlement_requests: usage.get("entitlement_requests").and_then(Value::as_i64),
                is_unlimited: usage.get("is_unlimited").and_then(Value::as_bool),
                reset_date: usage
                    .get("reset_date")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
        }

        // Run any tool calls the runtime asked for against our local callbacks.
        if let Some(calls) = body.get("tool_calls").and_then(Value::as_array) {
            for call in calls {
                let Some(name) = call.get("name").and_then(Value::as_str) else {
                    continue;
                };
                if let Some(tool) = self.tools.iter().find(|t| t.name == name) {
                    let args = call.get("arguments").cloned().unwrap_or(Value::Null);
                    let _ = (tool.call)(args).await;
                }
            }
        }

        Ok(AgentResponse {
            content: body
                .get("content")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    async fn destroy(&self) {
        let _ = self
            .http
            .delete(format!(
                "{}/v1/sessions/{}",
                self.base_url, self.session_id
            ))
            .bearer_auth(&self.token)
            .send()
            .await;
    }
}
