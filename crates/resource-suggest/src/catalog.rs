/// Resource catalog access: fetches the full list from the backend and keeps a
/// snapshot in Redis when available.
///
/// Key schema:
/// - `rsg:v1:catalog`: JSON-serialized Vec<ResourceRecord> (TTL: configurable)
use std::sync::Arc;

use tracing::{info, warn};

use welfare_common::backend::BackendClient;
use welfare_common::redis::RedisStore;

use crate::error::AppError;
use crate::model::ResourceRecord;
use crate::search::search_catalog;

const CATALOG_KEY: &str = "rsg:v1:catalog";
const RESOURCES_PATH: &str = "resources/";

pub struct CatalogService {
    backend: BackendClient,
    redis: RedisStore,
    ttl_secs: u64,
}

impl CatalogService {
    pub fn new(backend: BackendClient, redis: RedisStore, ttl_secs: u64) -> Self {
        Self {
            backend,
            redis,
            ttl_secs,
        }
    }

    /// The full catalog, from cache when possible.
    pub async fn resources(&self) -> Result<Arc<Vec<ResourceRecord>>, AppError> {
        if let Some(cached) = self.cached().await {
            return Ok(Arc::new(cached));
        }
        self.fetch().await
    }

    /// Drop the cached snapshot and fetch a fresh one. Returns the resource count.
    pub async fn refresh(&self) -> Result<usize, AppError> {
        self.redis.delete(CATALOG_KEY).await;
        Ok(self.fetch().await?.len())
    }

    /// One resource by ID, straight from the backend.
    pub async fn resource(&self, resource_id: &str) -> Result<ResourceRecord, AppError> {
        let id = resource_id.trim();
        if id.is_empty() || id.contains(['/', '?', '#']) {
            return Err(AppError::ResourceNotFound(resource_id.to_string()));
        }
        self.backend
            .get_json::<ResourceRecord>(&format!("{RESOURCES_PATH}{id}"))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    AppError::ResourceNotFound(id.to_string())
                } else {
                    e.into()
                }
            })
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<ResourceRecord>, AppError> {
        let catalog = self.resources().await?;
        Ok(search_catalog(&catalog, query, limit)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn cached(&self) -> Option<Vec<ResourceRecord>> {
        let json = self.redis.get(CATALOG_KEY).await?;
        serde_json::from_str(&json)
            .inspect_err(|e| warn!(error = %e, key = CATALOG_KEY, "cache deserialization failed"))
            .ok()
    }

    async fn fetch(&self) -> Result<Arc<Vec<ResourceRecord>>, AppError> {
        let resources: Vec<ResourceRecord> = self.backend.get_json(RESOURCES_PATH).await?;
        info!(count = resources.len(), "resource catalog fetched");
        if let Ok(json) = serde_json::to_string(&resources) {
            self.redis.set_with_ttl(CATALOG_KEY, &json, self.ttl_secs).await;
        }
        Ok(Arc::new(resources))
    }
}
