// src/agent/engine.rs
// AgentJobEngine: accepts a research request, runs it asynchronously, exposes status.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use crate::admission::RateLimitGuard;
use crate::config::{AgentModelsConfig, ByokConfig};
use crate::error::{BridgeError, Result};
use crate::identity::SERVER_IDENTITY;
use crate::scrape::ScrapeEngineClient;

use super::error_hook::{self, ErrorEvent};
use super::job::{AgentJob, AgentJobStore, JobStatus};
use super::reaper;
use super::runtime::{AgentRuntimeClient, HttpAgentRuntimeClient, SessionOptions, UsageEvent};
use super::session_cache::AgentSessionClientCache;
use super::tools::build_tool_callbacks;

const JOB_RETENTION_MS: u64 = 60 * 60 * 1000; // finished jobs are kept an hour for late status polls.

#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub prompt: String,
    pub urls: Vec<String>,
    pub schema: Option<Value>,
    pub model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub id: String,
    pub status: JobStatus,
    pub rate_limited: bool,
    pub retry_after_s: Option<u64>,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct AgentJobEngine {
    guard: RateLimitGuard,
    store: AgentJobStore,
    scrape_client: ScrapeEngineClient,
    http_client: reqwest::Client,
    config: Arc<AgentModelsConfig>,
    byok: Arc<ByokConfig>,
    session_cache: AgentSessionClientCache,
    runtime_base_url: Arc<String>,
    process_wide_token: Arc<Option<String>>,
}

impl AgentJobEngine {
    pub fn new(
        config: AgentModelsConfig,
        guard: RateLimitGuard,
        scrape_client: ScrapeEngineClient,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            guard,
            store: AgentJobStore::new(),
            scrape_client,
            http_client,
            config: Arc::new(config),
            byok: Arc::new(ByokConfig {
                provider: None,
                base_url: None,
                api_key: None,
            }),
            session_cache: AgentSessionClientCache::new(),
            runtime_base_url: Arc::new(
                std::env::var("SCORCHCRAWL_COPILOT_URL")
                    .unwrap_or_else(|_| "http://localhost:4000".to_string()),
            ),
            process_wide_token: Arc::new(std::env::var("COPILOT_TOKEN").ok()),
        }
    }

    pub fn with_byok(mut self, byok: ByokConfig) -> Self {
        self.byok = Arc::new(byok);
        self
    }

    pub fn allowed_models(&self) -> &AgentModelsConfig {
        &self.config
    }

    pub fn guard(&self) -> &RateLimitGuard {
        &self.guard
    }

    /// Spawns the stale-job reaper bound to this engine's store and guard.
    pub fn spawn_reaper(&self) {
        reaper::spawn(
            self.store.clone(),
            self.guard.clone(),
            self.guard.gc_interval_ms(),
            self.guard.stale_job_timeout_ms(),
        );
    }

    /// Stops the guard's GC task and asks every cached runtime client to
    /// shut down. Signal wiring to call this lives outside the engine.
    pub async fn shutdown(&self) {
        self.guard.shutdown();
        self.session_cache.shutdown_all().await;
    }

    pub fn status(&self, id: &str) -> Option<AgentJob> {
        let job = self.store.get(id);
        if job.is_none() {
            return None;
        }
        job
    }

    pub async fn start(
        &self,
        request: AgentRequest,
        identity_token: Option<String>,
    ) -> StartOutcome {
        let identity = identity_token
            .clone()
            .unwrap_or_else(|| SERVER_IDENTITY.to_string());
        let id = Uuid::new_v4().to_string();

        let decision = self.guard.check(&identity);
        if !decision.allowed {
            return StartOutcome {
                id,
                status: JobStatus::RateLimited,
                rate_limited: true,
                retry_after_s: decision.retry_after_s,
                error: decision.reason,
            };
        }

        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone());
        if !self.config.is_allowed(&model) {
            return StartOutcome {
                id,
                status: JobStatus::Failed,
                rate_limited: false,
                retry_after_s: None,
                error: Some(format!(
                    "Model \"{model}\" is not in the allowed list: {}",
                    self.config.allowed_models.join(", ")
                )),
            };
        }

        self.guard.acquire(&identity);

        let job = AgentJob::new(
            id.clone(),
            request.prompt.clone(),
            request.urls.clone(),
            request.schema.clone(),
            model.clone(),
            identity.clone(),
        );
        self.store.insert(job);

        let engine = self.clone();
        let job_id = id.clone();
        tokio::spawn(async move {
            engine
                .run_session(job_id, identity, identity_token, request, model)
                .await;
        });

        StartOutcome {
            id,
            status: JobStatus::Processing,
            rate_limited: false,
            retry_after_s: None,
            error: None,
        }
    }

    async fn run_session(
        &self,
        job_id: String,
        identity: String,
        identity_token: Option<String>,
        request: AgentRequest,
        model: String,
    ) {
        // Guaranteed exactly-once slot release regardless of exit path.
        let _release_guard = ReleaseOnDrop {
            guard: self.guard.clone(),
            identity: identity.clone(),
        };

        let result = self
            .run_session_inner(&job_id, &identity, identity_token, &request, &model)
            .await;
        match result {
            Ok(content) => {
                self.store.complete(
                    &job_id,
                    json!({
                        "success": true,
                        "data": content.unwrap_or_else(|| "No response generated".to_string()),
                        "model": model,
                    }),
                );
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "agent session failed");
                self.store.fail(&job_id, format!("Agent error: {e}"));
            }
        }
        self.store.evict_expired(JOB_RETENTION_MS);
    }

    async fn run_session_inner(
        &self,
        job_id: &str,
        identity: &str,
        identity_token: Option<String>,
        request: &AgentRequest,
        model: &str,
    ) -> Result<Option<String>> {
        // Client cache is keyed by identity, but the credential preference is
        // the per-request token, falling back to the process-wide one — the
        // `__server__` sentinel identity never doubles as a credential.
        let fallback_token = (*self.process_wide_token).clone();
        let http_client = self.http_client.clone();
        let base_url = (*self.runtime_base_url).clone();
        let client = self
            .session_cache
            .get_or_insert_with(identity, || {
                let token = identity_token.or(fallback_token).unwrap_or_default();
                Arc::new(HttpAgentRuntimeClient::new(http_client, base_url, token))
                    as Arc<dyn AgentRuntimeClient>
            })
            .await;

        let tools = build_tool_callbacks(self.scrape_client.clone());

        let system_prompt = build_system_prompt(request);

        let job_id_for_hook = job_id.to_string();
        let on_error = Box::new(move |event: ErrorEvent| {
            let _ = error_hook::decide(&job_id_for_hook, &event);
        });

        let guard = self.guard.clone();
        let identity_for_usage = identity.to_string();
        let on_usage = Box::new(move |event: UsageEvent| {
            guard.quota_update(
                &identity_for_usage,
                crate::admission::QuotaUpdate {
                    remaining_percent: event.remaining_percent,
                    used_requests: event.used_requests,
                    entitlement_requests: event.entitlement_requests,
                    is_unlimited: event.is_unlimited,
                    reset_date: event.reset_date,
                },
            );
        });

        let session = client
            .open_session(
                SessionOptions {
                    model: model.to_string(),
                    system_prompt,
                    byok: if self.byok.is_enabled() {
                        Some((*self.byok).clone())
                    } else {
                        None
                    },
                },
                tools,
                on_error,
                on_usage,
            )
            .await?;

        let user_prompt = build_user_prompt(request);
        let response = session.send_and_wait(&user_prompt).await;
        session.destroy().await;

        response.map(|r| r.content)
    }
}

struct ReleaseOnDrop {
    guard: RateLimitGuard,
    identity: String,
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.guard.release(&self.identity);
    }
}

fn build_system_prompt(request: &AgentRequest) -> String {
    let mut prompt = "You are a research agent with access to web scraping tools. Use them to \
                       gather evidence before answering."
        .to_string();
    if !request.urls.is_empty() {
        prompt.push_str(&format!(
            "\n\nPrioritize these focus URLs when gathering evidence:\n{}",
            request.urls.join("\n")
        ));
    }
    if request.schema.is_some() {
        prompt.push_str(
            "\n\nYour final answer must conform to the JSON schema provided in the user prompt.",
        );
    }
    prompt
}

fn build_user_prompt(request: &AgentRequest) -> String {
    let mut prompt = request.prompt.clone();
    if !request.urls.is_empty() {
        prompt.push_str("\n\nFocus URLs:\n");
        for url in &request.urls {
            prompt.push_str(&format!("- {url}\n"));
        }
    }
    if let Some(schema) = &request.schema {
        prompt.push_str(&format!(
            "\n\nRespond with structured output matching this JSON schema:\n{schema}"
        ));
    }
    prompt
}

impl From<BridgeError> for StartOutcome {
    fn from(err: BridgeError) -> Self {
        StartOutcome {
            id: String::new(),
            status: JobStatus::Failed,
            rate_limited: false,
            retry_after_s: None,
            error: Some(err.to_user_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::RateLimitGuard;
    use crate::config::{RateLimitConfig, UpstreamConfig};

    fn test_engine() -> AgentJobEngine {
        let guard = RateLimitGuard::new(RateLimitConfig {
            max_global_concurrency: 3,
            max_per_user_concurrency: 2,
            window_ms: 60_000,
            max_global_per_window: 1_000,
            max_per_user_per_window: 1_000,
            quota_reject_threshold_percent: 10.0,
            stale_job_timeout_ms: 300_000,
            gc_interval_ms: 30_000,
        });
        let scrape_client = ScrapeEngineClient::new(
            reqwest::Client::new(),
            UpstreamConfig {
                scrape_api_url: "http://127.0.0.1:1".to_string(),
                scrape_api_key: None,
                llm_runtime_token: None,
                llm_runtime_cli_path: None,
            },
        );
        AgentJobEngine::new(
            AgentModelsConfig {
                allowed_models: vec!["gpt-4.1".to_string()],
                default_model: "gpt-4.1".to_string(),
            },
            guard,
            scrape_client,
            reqwest::Client::new(),
        )
    }

    #[tokio::test]
    async fn scenario_4_model_not_allowed_holds_no_slot() {
        let engine = test_engine();
        let outcome = engine
            .start(
                AgentRequest {
                    prompt: "p".to_string(),
                    urls: vec![],
                    schema: None,
                    model: Some("nonexistent".to_string()),
                },
                None,
            )
            .await;
        assert_eq!(outcome.status, JobStatus::Failed);
        assert_eq!(
            outcome.error.unwrap(),
            "Model \"nonexistent\" is not in the allowed list: gpt-4.1"
        );
        assert_eq!(engine.guard().stats().concurrency.global_active, 0);
    }

    #[tokio::test]
    async fn rate_limited_request_creates_no_job_record() {
        let engine = test_engine();
        engine.guard().acquire("U");
        engine.guard().acquire("U");

        let outcome = engine
            .start(
                AgentRequest {
                    prompt: "p".to_string(),
                    urls: vec![],
                    schema: None,
                    model: None,
                },
                Some("U".to_string()),
            )
            .await;
        assert!(outcome.rate_limited);
        assert!(engine.status(&outcome.id).is_none());
    }

    #[tokio::test]
    async fn admitted_request_returns_processing_and_creates_job() {
        let engine = test_engine();
        let outcome = engine
            .start(
                AgentRequest {
                    prompt: "p".to_string(),
                    urls: vec![],
                    schema: None,
                    model: None,
                },
                Some("U".to_string()),
            )
            .await;
        assert_eq!(outcome.status, JobStatus::Processing);
        assert!(engine.status(&outcome.id).is_some());
    }

    #[test]
    fn user_prompt_includes_urls_and_schema() {
        let request = AgentRequest {
            prompt: "summarize".to_string(),
            urls: vec!["https://a.example".to_string()],
            schema: Some(json!({"type": "object"})),
            model: None,
        };
        let prompt = build_user_prompt(&request);
        assert!(prompt.contains("summarize"));
        assert!(prompt.contains("https://a.example"));
        assert!(prompt.contains("\"type\""));
    }
}
