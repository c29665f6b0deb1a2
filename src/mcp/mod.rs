// src/mcp/mod.rs
// MCP server implementation: tool router, protocol handler, HTTP transport.

mod dispatch;
mod requests;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolRequestParam, CallToolResult, ListToolsResult, PaginatedRequestParam,
        ServerCapabilities, ServerInfo,
    },
    schemars,
    service::{RequestContext, RoleServer},
    tool, tool_router, ErrorData, ServerHandler,
};
use serde_json::Value;
use tracing::info;

use crate::admission::RateLimitGuard;
use crate::agent::AgentJobEngine;
use crate::config::EnvConfig;
use crate::scrape::ScrapeEngineClient;

use requests::*;

tokio::task_local! {
    static IDENTITY_TOKEN: Option<String>;
}

fn extract_identity_token(context: &RequestContext<RoleServer>) -> Option<String> {
    let headers = context.extensions.get::<http::HeaderMap>()?;
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    header("x-copilot-token").or_else(|| header("x-github-token"))
}

fn value_result(value: Value) -> Result<CallToolResult, ErrorData> {
    let text = serde_json::to_string(&value)
        .unwrap_or_else(|e| format!("{{\"error\":\"failed to serialize result: {e}\"}}"));
    Ok(CallToolResult {
        content: vec![rmcp::model::Content::text(text)],
        structured_content: Some(value),
        is_error: Some(false),
        meta: None,
    })
}

fn error_result(err: crate::error::BridgeError) -> Result<CallToolResult, ErrorData> {
    Ok(CallToolResult::error(vec![rmcp::model::Content::text(
        err.to_user_string(),
    )]))
}

/// MCP server state: the admission gate, the research-agent engine, the
/// scraping-engine proxy client, and the resolved environment configuration.
#[derive(Clone)]
pub struct BridgeServer {
    guard: RateLimitGuard,
    engine: AgentJobEngine,
    scrape: ScrapeEngineClient,
    config: EnvConfig,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl BridgeServer {
    pub fn new(
        guard: RateLimitGuard,
        engine: AgentJobEngine,
        scrape: ScrapeEngineClient,
        config: EnvConfig,
    ) -> Self {
        Self {
            guard,
            engine,
            scrape,
            config,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Scrape a single URL and return it in the requested formats (markdown, html, rawHtml, links, json, screenshot).")]
    async fn scorch_scrape(
        &self,
        Parameters(req): Parameters<ScrapeRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        match dispatch::dispatch_scrape(&self.scrape, &self.config.modes, req).await {
            Ok(v) => value_result(v),
            Err(e) => error_result(e),
        }
    }

    #[tool(description = "Discover URLs reachable from a starting page, optionally filtered by a search term or sitemap policy.")]
    async fn scorch_map(
        &self,
        Parameters(req): Parameters<MapRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        match dispatch::dispatch_map(&self.scrape, req).await {
            Ok(v) => value_result(v),
            Err(e) => error_result(e),
        }
    }

    #[tool(description = "Run a web search and return the matching results.")]
    async fn scorch_search(
        &self,
        Parameters(req): Parameters<SearchRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        match dispatch::dispatch_search(&self.scrape, req).await {
            Ok(v) => value_result(v),
            Err(e) => error_result(e),
        }
    }

    #[tool(description = "Start a multi-page crawl from a starting URL. Returns a crawl id to poll with scorch_check_crawl_status.")]
    async fn scorch_crawl(
        &self,
        Parameters(req): Parameters<CrawlRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        match dispatch::dispatch_crawl(&self.scrape, &self.config.modes, req).await {
            Ok(v) => value_result(v),
            Err(e) => error_result(e),
        }
    }

    #[tool(description = "Check the status of a crawl job started by scorch_crawl.")]
    async fn scorch_check_crawl_status(
        &self,
        Parameters(req): Parameters<CheckCrawlStatusRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        match dispatch::dispatch_check_crawl_status(&self.scrape, req).await {
            Ok(v) => value_result(v),
            Err(e) => error_result(e),
        }
    }

    #[tool(description = "Extract structured data from one or more URLs, optionally conforming to a JSON schema.")]
    async fn scorch_extract(
        &self,
        Parameters(req): Parameters<ExtractRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        match dispatch::dispatch_extract(&self.scrape, req).await {
            Ok(v) => value_result(v),
            Err(e) => error_result(e),
        }
    }

    #[tool(description = "Start an asynchronous research agent run over a prompt, optionally scoped to focus URLs or a response schema. Returns a job id to poll with scorch_agent_status.")]
    async fn scorch_agent(
        &self,
        Parameters(req): Parameters<AgentRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let identity_token = IDENTITY_TOKEN.try_with(|t| t.clone()).unwrap_or(None);
        let value = dispatch::dispatch_agent(&self.engine, identity_token, req).await;
        value_result(value)
    }

    #[tool(description = "Poll the status of a research agent job started by scorch_agent.")]
    async fn scorch_agent_status(
        &self,
        Parameters(req): Parameters<AgentStatusRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        value_result(dispatch::dispatch_agent_status(&self.engine, &req))
    }

    #[tool(description = "List the models scorch_agent is allowed to run and the default model.")]
    async fn scorch_agent_models(
        &self,
        Parameters(_req): Parameters<AgentModelsRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        value_result(dispatch::dispatch_agent_models(&self.engine))
    }

    #[tool(description = "Report the caller's current concurrency and rate-limit standing against the admission gate.")]
    async fn scorch_agent_rate_limit_status(
        &self,
        Parameters(_req): Parameters<AgentRateLimitStatusRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        value_result(dispatch::dispatch_agent_rate_limit_status(&self.engine))
    }
}

impl ServerHandler for BridgeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: rmcp::model::Implementation {
                name: "scorchcrawl-bridge".into(),
                title: Some("ScorchCrawl Bridge".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Scrapes, crawls, maps, searches, and extracts from the web via the ScorchCrawl \
                 engine, and runs asynchronous research agent jobs via scorch_agent / \
                 scorch_agent_status."
                    .into(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: None,
        }))
    }

    #[allow(clippy::manual_async_fn)]
    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        async move {
            let identity_token = extract_identity_token(&context);
            let ctx = rmcp::handler::server::tool::ToolCallContext::new(self, request, context);
            IDENTITY_TOKEN.scope(identity_token, self.tool_router.call(ctx)).await
        }
    }
}

/// Serves the MCP endpoint over the Streamable HTTP transport at `/mcp` on `bind_addr`.
pub async fn serve_http(server: BridgeServer, bind_addr: &str) -> anyhow::Result<()> {
    use std::sync::Arc;

    use axum::Router;
    use rmcp::transport::streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
    };
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let service_factory = move || Ok(server.clone());
    let session_manager = Arc::new(LocalSessionManager::default());
    let config = StreamableHttpServerConfig {
        sse_keep_alive: Some(std::time::Duration::from_secs(15)),
        stateful_mode: true,
        cancellation_token: tokio_util::sync::CancellationToken::new(),
    };
    let mcp_service = StreamableHttpService::new(service_factory, session_manager, config);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .nest_service("/mcp", mcp_service)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("listening on {}", bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
