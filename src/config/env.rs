// src/config/env.rs
// Environment-based configuration - single source of truth for all env vars

use tracing::{debug, warn};

fn parse_bool_env(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?.to_lowercase();
    match value.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_numeric_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(var = name, value = raw, "non-numeric value, using default");
            default
        }),
        Err(_) => default,
    }
}

fn parse_csv_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .ok()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Bind addresses for the MCP endpoint and the direct scraping-API passthrough.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub mcp_bind_host: String,
    pub mcp_bind_port: u16,
    pub passthrough_bind_host: String,
    pub passthrough_bind_port: u16,
}

impl NetworkConfig {
    fn from_env() -> Self {
        Self {
            mcp_bind_host: std::env::var("SCORCHCRAWL_MCP_HOST")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            mcp_bind_port: parse_numeric_env("SCORCHCRAWL_MCP_PORT", 8765u16),
            passthrough_bind_host: std::env::var("SCORCHCRAWL_PASSTHROUGH_HOST")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            passthrough_bind_port: parse_numeric_env("SCORCHCRAWL_PASSTHROUGH_PORT", 8766u16),
        }
    }
}

/// Upstream targets: the scraping engine and the Copilot agent runtime.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// `SCORCHCRAWL_API_URL`. May carry `?localProxy=true`; the dispatch layer
    /// strips that query parameter before forwarding requests.
    pub scrape_api_url: String,
    pub scrape_api_key: Option<String>,
    /// Fallback token used when a request carries no per-request identity header.
    pub llm_runtime_token: Option<String>,
    pub llm_runtime_cli_path: Option<String>,
}

impl UpstreamConfig {
    fn from_env() -> Self {
        let raw_url = std::env::var("SCORCHCRAWL_API_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "http://localhost:3002".to_string());

        Self {
            scrape_api_url: raw_url,
            scrape_api_key: read_nonempty("SCORCHCRAWL_API_KEY"),
            llm_runtime_token: read_nonempty("COPILOT_TOKEN"),
            llm_runtime_cli_path: read_nonempty("SCORCHCRAWL_COPILOT_CLI_PATH"),
        }
    }
}

fn read_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

/// Comma-separated allow-list for `scorch_agent`'s `model` parameter.
#[derive(Debug, Clone)]
pub struct AgentModelsConfig {
    pub allowed_models: Vec<String>,
    pub default_model: String,
}

impl AgentModelsConfig {
    fn from_env() -> Self {
        let mut allowed = parse_csv_list("SCORCHCRAWL_ALLOWED_MODELS");
        if allowed.is_empty() {
            allowed = vec!["gpt-4.1".to_string(), "gpt-4o".to_string()];
        }
        let default_model = std::env::var("SCORCHCRAWL_DEFAULT_MODEL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| allowed[0].clone());
        Self {
            allowed_models: allowed,
            default_model,
        }
    }

    pub fn is_allowed(&self, model: &str) -> bool {
        self.allowed_models.iter().any(|m| m == model)
    }
}

/// All numeric thresholds for the admission core.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_global_concurrency: u64,
    pub max_per_user_concurrency: u64,
    pub window_ms: u64,
    pub max_global_per_window: u64,
    pub max_per_user_per_window: u64,
    pub quota_reject_threshold_percent: f64,
    pub stale_job_timeout_ms: u64,
    pub gc_interval_ms: u64,
}

impl RateLimitConfig {
    fn from_env() -> Self {
        let window_ms = parse_numeric_env("SCORCHCRAWL_WINDOW_MS", 60_000u64).max(1);
        let max_global_per_window =
            parse_numeric_env("SCORCHCRAWL_MAX_GLOBAL_PER_WINDOW", 100u64).max(1);
        let max_per_user_per_window =
            parse_numeric_env("SCORCHCRAWL_MAX_PER_USER_PER_WINDOW", 20u64).max(1);

        Self {
            max_global_concurrency: parse_numeric_env("SCORCHCRAWL_MAX_GLOBAL_CONCURRENCY", 10u64)
                .max(1),
            max_per_user_concurrency: parse_numeric_env(
                "SCORCHCRAWL_MAX_PER_USER_CONCURRENCY",
                2u64,
            )
            .max(1),
            window_ms,
            max_global_per_window,
            max_per_user_per_window,
            quota_reject_threshold_percent: parse_numeric_env(
                "SCORCHCRAWL_QUOTA_THRESHOLD_PERCENT",
                10.0f64,
            ),
            stale_job_timeout_ms: parse_numeric_env(
                "SCORCHCRAWL_STALE_JOB_TIMEOUT_MS",
                300_000u64,
            ),
            gc_interval_ms: parse_numeric_env("SCORCHCRAWL_GC_INTERVAL_MS", 30_000u64).max(1000),
        }
    }
}

/// "Bring your own key" alternate LLM backend, enabled only when both
/// `provider` and `base_url` are set.
#[derive(Debug, Clone)]
pub struct ByokConfig {
    pub provider: Option<ByokProvider>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByokProvider {
    OpenAi,
    Azure,
    Anthropic,
}

impl ByokConfig {
    fn from_env() -> Self {
        let provider = std::env::var("SCORCHCRAWL_BYOK_PROVIDER")
            .ok()
            .and_then(|v| match v.to_lowercase().as_str() {
                "openai" => Some(ByokProvider::OpenAi),
                "azure" => Some(ByokProvider::Azure),
                "anthropic" => Some(ByokProvider::Anthropic),
                other => {
                    warn!(value = other, "unknown SCORCHCRAWL_BYOK_PROVIDER, ignoring");
                    None
                }
            });
        let base_url = read_nonempty("SCORCHCRAWL_BYOK_BASE_URL");

        Self {
            provider,
            base_url,
            api_key: read_nonempty("SCORCHCRAWL_BYOK_API_KEY"),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some() && self.base_url.is_some()
    }
}

/// Operating-mode toggles.
#[derive(Debug, Clone)]
pub struct ModesConfig {
    pub cloud_service: bool,
    pub local_proxy: bool,
    pub safe_mode: bool,
}

impl ModesConfig {
    fn from_env(scrape_api_url: &str) -> Self {
        let cloud_service = parse_bool_env("SCORCHCRAWL_CLOUD_SERVICE").unwrap_or(false);
        let url_opts_in_local_proxy = scrape_api_url
            .split_once('?')
            .map(|(_, q)| query_flag_set(q, "localProxy"))
            .unwrap_or(false);
        let local_proxy =
            parse_bool_env("SCORCHCRAWL_LOCAL_PROXY").unwrap_or(false) || url_opts_in_local_proxy;
        // cloud-service implies safe-mode.
        let safe_mode = cloud_service || parse_bool_env("SCORCHCRAWL_SAFE_MODE").unwrap_or(false);

        Self {
            cloud_service,
            local_proxy,
            safe_mode,
        }
    }
}

fn query_flag_set(query: &str, key: &str) -> bool {
    query.split('&').any(|pair| {
        let mut parts = pair.splitn(2, '=');
        let k = parts.next().unwrap_or("");
        let v = parts.next().unwrap_or("");
        k == key && matches!(v, "true" | "1")
    })
}

/// Strip the `localProxy` query parameter from a scraping-API URL before it is
/// handed to the scraping client; local-proxy mode is a bridge-local concern.
pub fn strip_local_proxy_param(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let remaining: Vec<&str> = query
        .split('&')
        .filter(|pair| {
            let key = pair.splitn(2, '=').next().unwrap_or("");
            key != "localProxy"
        })
        .collect();
    if remaining.is_empty() {
        base.to_string()
    } else {
        format!("{base}?{}", remaining.join("&"))
    }
}

#[derive(Debug, Default)]
pub struct ConfigValidation {
    pub warnings: Vec<String>,
}

/// Environment configuration - all env vars in one place.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub network: NetworkConfig,
    pub scrape: UpstreamConfig,
    pub agent: AgentModelsConfig,
    pub rate_limit: RateLimitConfig,
    pub byok: ByokConfig,
    pub modes: ModesConfig,
}

impl EnvConfig {
    /// Load all environment configuration (call once at startup).
    pub fn load() -> Self {
        debug!("loading environment configuration");
        let scrape = UpstreamConfig::from_env();
        let modes = ModesConfig::from_env(&scrape.scrape_api_url);

        Self {
            network: NetworkConfig::from_env(),
            agent: AgentModelsConfig::from_env(),
            rate_limit: RateLimitConfig::from_env(),
            byok: ByokConfig::from_env(),
            scrape,
            modes,
        }
    }

    pub fn validate(&self) -> ConfigValidation {
        let mut v = ConfigValidation::default();

        if self.scrape.scrape_api_key.is_none() && self.modes.cloud_service {
            v.warnings.push(
                "cloud-service mode is on but no SCORCHCRAWL_API_KEY is set".to_string(),
            );
        }
        if self.scrape.llm_runtime_token.is_none() {
            v.warnings.push(
                "no COPILOT_TOKEN set; per-request x-copilot-token/x-github-token headers are required"
                    .to_string(),
            );
        }
        if self.agent.allowed_models.is_empty() {
            v.warnings
                .push("no allowed agent models configured".to_string());
        }

        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_local_proxy_param() {
        assert_eq!(
            strip_local_proxy_param("http://x/api?localProxy=true&foo=bar"),
            "http://x/api?foo=bar"
        );
        assert_eq!(
            strip_local_proxy_param("http://x/api?localProxy=true"),
            "http://x/api"
        );
        assert_eq!(strip_local_proxy_param("http://x/api"), "http://x/api");
    }

    #[test]
    fn test_query_flag_set() {
        assert!(query_flag_set("localProxy=true", "localProxy"));
        assert!(query_flag_set("a=b&localProxy=1", "localProxy"));
        assert!(!query_flag_set("localProxy=false", "localProxy"));
    }

    #[test]
    fn test_agent_models_allowed() {
        let cfg = AgentModelsConfig {
            allowed_models: vec!["gpt-4.1".to_string()],
            default_model: "gpt-4.1".to_string(),
        };
        assert!(cfg.is_allowed("gpt-4.1"));
        assert!(!cfg.is_allowed("nonexistent"));
    }

    #[test]
    fn test_byok_requires_both_fields() {
        let mut cfg = ByokConfig {
            provider: Some(ByokProvider::OpenAi),
            base_url: None,
            api_key: None,
        };
        assert!(!cfg.is_enabled());
        cfg.base_url = Some("https://api.example.com".to_string());
        assert!(cfg.is_enabled());
    }
}
