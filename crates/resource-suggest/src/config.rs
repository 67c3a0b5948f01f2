use std::net::SocketAddr;
use std::time::Duration;

use welfare_common::backend::BackendClientConfig;

use crate::error::AppError;

/// Partition keys for per-tenant, per-user storage. Passed explicitly to the
/// stores that need them; never read from ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreScope {
    pub app_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Stdio,
    Http(SocketAddr),
}

/// Application configuration, loaded once from the environment in `main`.
#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendClientConfig,
    pub scope: StoreScope,
    /// `None` keeps usage records in memory and disables the catalog cache.
    pub redis_url: Option<String>,
    pub catalog_cache_ttl_secs: u64,
    pub advanced_suggestions: bool,
    pub advanced_use_llm_summary: bool,
    /// Overrides the backend timeout for the advanced suggestion call only.
    pub advanced_timeout: Option<Duration>,
    pub transport: Transport,
}

impl Config {
    /// Optional:
    /// - `RESOURCE_API_*`: see `BackendClientConfig::from_env`
    /// - `APP_ID` (default: "default-app-id"), `USER_ID` (default: "test-user")
    /// - `REDIS_URL`
    /// - `CATALOG_CACHE_TTL_SECS` (default: 300)
    /// - `ADVANCED_SUGGESTIONS` (default: true)
    /// - `ADVANCED_USE_LLM_SUMMARY` (default: true)
    /// - `ADVANCED_TIMEOUT_SECS` (default: backend timeout)
    /// - `MCP_TRANSPORT` ("stdio" | "http", default: "stdio")
    /// - `MCP_HTTP_BIND` (default: "127.0.0.1:8090")
    pub fn from_env() -> Result<Self, AppError> {
        let scope = StoreScope {
            app_id: non_empty_var("APP_ID").unwrap_or_else(|| "default-app-id".to_string()),
            user_id: non_empty_var("USER_ID").unwrap_or_else(|| "test-user".to_string()),
        };

        let catalog_cache_ttl_secs = match non_empty_var("CATALOG_CACHE_TTL_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                AppError::Config(format!("CATALOG_CACHE_TTL_SECS must be an integer, got '{raw}'"))
            })?,
            None => 300,
        };

        let advanced_timeout = match non_empty_var("ADVANCED_TIMEOUT_SECS") {
            Some(raw) => Some(Duration::from_secs(raw.parse::<u64>().map_err(|_| {
                AppError::Config(format!("ADVANCED_TIMEOUT_SECS must be an integer, got '{raw}'"))
            })?)),
            None => None,
        };

        let transport = parse_transport(
            non_empty_var("MCP_TRANSPORT").as_deref(),
            non_empty_var("MCP_HTTP_BIND").as_deref(),
        )?;

        Ok(Self {
            backend: BackendClientConfig::from_env(),
            scope,
            redis_url: non_empty_var("REDIS_URL"),
            catalog_cache_ttl_secs,
            advanced_suggestions: parse_flag("ADVANCED_SUGGESTIONS", non_empty_var("ADVANCED_SUGGESTIONS"))?,
            advanced_use_llm_summary: parse_flag(
                "ADVANCED_USE_LLM_SUMMARY",
                non_empty_var("ADVANCED_USE_LLM_SUMMARY"),
            )?,
            advanced_timeout,
            transport,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Absent means enabled.
fn parse_flag(key: &str, raw: Option<String>) -> Result<bool, AppError> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(true),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(AppError::Config(format!("{key} must be true or false, got '{other}'"))),
    }
}

fn parse_transport(kind: Option<&str>, bind: Option<&str>) -> Result<Transport, AppError> {
    match kind.map(str::to_ascii_lowercase).as_deref() {
        None | Some("stdio") => Ok(Transport::Stdio),
        Some("http") => {
            let bind = bind.unwrap_or("127.0.0.1:8090");
            let addr = bind.parse::<SocketAddr>().map_err(|e| {
                AppError::Config(format!("MCP_HTTP_BIND '{bind}' is not a socket address: {e}"))
            })?;
            Ok(Transport::Http(addr))
        }
        Some(other) => Err(AppError::Config(format!(
            "MCP_TRANSPORT must be 'stdio' or 'http', got '{other}'"
        ))),
    }
}
