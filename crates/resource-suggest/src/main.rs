mod assessment;
mod catalog;
mod config;
mod error;
mod model;
mod provider;
mod scorer;
mod search;
mod server;
mod staleness;
mod suggest;
#[cfg(test)]
mod testing;
mod tokenize;
mod usage;

use std::sync::Arc;

use rmcp::{
    ServiceExt,
    transport::stdio,
    transport::streamable_http_server::{
        StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
    },
};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use welfare_common::backend::BackendClient;
use welfare_common::redis::RedisStore;

use catalog::CatalogService;
use config::{Config, Transport};
use provider::{AdvancedProvider, FallbackSuggester, KeywordOverlapProvider, SuggestionProvider};
use server::ResourceSuggestServer;
use suggest::SuggestionService;
use usage::{MemoryUsageStore, RedisUsageStore, UsageStore, UsageTracker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout is reserved for MCP JSON-RPC on the stdio transport
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting resource-suggest MCP server");

    let config = Config::from_env()?;
    info!(
        base_url = %config.backend.base_url,
        timeout_ms = config.backend.default_timeout.as_millis(),
        max_retries = config.backend.max_retries,
        app_id = %config.scope.app_id,
        user_id = %config.scope.user_id,
        redis = config.redis_url.is_some(),
        advanced = config.advanced_suggestions,
        "configuration loaded"
    );

    let backend = BackendClient::new(config.backend.clone())?;

    let redis = RedisStore::new(config.redis_url.as_deref());
    let redis_up = redis.is_available().await;
    if redis_up {
        info!("redis connected");
    } else {
        info!("redis unavailable, running without catalog cache");
    }

    let catalog = Arc::new(CatalogService::new(
        backend.clone(),
        redis.clone(),
        config.catalog_cache_ttl_secs,
    ));

    let store: Arc<dyn UsageStore> = if redis.is_configured() {
        if !redis_up {
            warn!("redis configured but not reachable; usage operations will fail until it is");
        }
        Arc::new(RedisUsageStore::new(redis, config.scope.clone()))
    } else {
        warn!("REDIS_URL not set; client resource usage is kept in memory and lost on exit");
        Arc::new(MemoryUsageStore::new(config.scope.clone()))
    };
    let usage = UsageTracker::new(store, config.scope.clone());

    let advanced: Option<Arc<dyn SuggestionProvider>> = if config.advanced_suggestions {
        let mut provider = AdvancedProvider::new(backend, config.advanced_use_llm_summary);
        if let Some(timeout) = config.advanced_timeout {
            provider = provider.with_timeout(timeout);
        }
        Some(Arc::new(provider))
    } else {
        info!("advanced suggestions disabled, using keyword matching only");
        None
    };
    let suggester = FallbackSuggester::new(
        advanced,
        Arc::new(KeywordOverlapProvider::new(Arc::clone(&catalog))),
    );
    let suggestions = Arc::new(SuggestionService::new(usage.clone(), suggester));

    let server = ResourceSuggestServer::new(catalog, usage, suggestions);

    match config.transport {
        Transport::Stdio => {
            info!("MCP server ready, serving on stdio");
            let service = server.serve(stdio()).await.inspect_err(|e| {
                tracing::error!(error = %e, "MCP server error");
            })?;
            service.waiting().await?;
        }
        Transport::Http(addr) => {
            let session_manager: Arc<LocalSessionManager> = Default::default();
            let service = StreamableHttpService::new(
                move || Ok(server.clone()),
                session_manager,
                StreamableHttpServerConfig::default(),
            );
            let router = axum::Router::new().nest_service("/mcp", service);
            let listener = TcpListener::bind(addr).await?;
            info!(%addr, "MCP server ready, serving streamable HTTP on /mcp");
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;
        }
    }

    info!("MCP server shut down");
    Ok(())
}
