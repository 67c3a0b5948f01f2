/// Per-client resource usage records ("which programs is this client in").
///
/// Key schema (Redis hash per client, field = usage ID, value = JSON document):
/// - `rsg:v1:{app_id}:{user_id}:client_resources:{client_name}`
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use welfare_common::error::CommonError;
use welfare_common::mcp_api::UsageStatus;
use welfare_common::redis::RedisStore;

use crate::config::StoreScope;
use crate::error::AppError;
use crate::model::{ResourceRecord, UsageRecord};

static USAGE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Document storage for usage records, partitioned by client.
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn load(&self, client_name: &str) -> Result<Vec<UsageRecord>, AppError>;
    async fn get(&self, client_name: &str, usage_id: &str) -> Result<Option<UsageRecord>, AppError>;
    async fn save(&self, record: &UsageRecord) -> Result<(), AppError>;
    /// Returns `true` if the record existed.
    async fn delete(&self, client_name: &str, usage_id: &str) -> Result<bool, AppError>;
}

fn usage_key(scope: &StoreScope, client_name: &str) -> String {
    format!(
        "rsg:v1:{}:{}:client_resources:{client_name}",
        scope.app_id, scope.user_id
    )
}

pub struct RedisUsageStore {
    redis: RedisStore,
    scope: StoreScope,
}

impl RedisUsageStore {
    pub fn new(redis: RedisStore, scope: StoreScope) -> Self {
        Self { redis, scope }
    }
}

#[async_trait]
impl UsageStore for RedisUsageStore {
    async fn load(&self, client_name: &str) -> Result<Vec<UsageRecord>, AppError> {
        let key = usage_key(&self.scope, client_name);
        let entries = self.redis.hash_get_all(&key).await?;
        let mut skipped_invalid = 0usize;
        let records: Vec<UsageRecord> = entries
            .into_values()
            .filter_map(|raw| {
                serde_json::from_str::<UsageRecord>(&raw)
                    .inspect_err(|_| skipped_invalid += 1)
                    .ok()
            })
            .collect();
        if skipped_invalid > 0 {
            warn!(key, skipped_invalid, "skipped unreadable usage documents");
        }
        Ok(records)
    }

    async fn get(&self, client_name: &str, usage_id: &str) -> Result<Option<UsageRecord>, AppError> {
        let key = usage_key(&self.scope, client_name);
        let Some(raw) = self.redis.hash_get(&key, usage_id).await? else {
            return Ok(None);
        };
        let record = serde_json::from_str(&raw).map_err(CommonError::from)?;
        Ok(Some(record))
    }

    async fn save(&self, record: &UsageRecord) -> Result<(), AppError> {
        let key = usage_key(&self.scope, &record.client_name);
        let raw = serde_json::to_string(record).map_err(CommonError::from)?;
        self.redis.hash_set(&key, &record.id, &raw).await?;
        Ok(())
    }

    async fn delete(&self, client_name: &str, usage_id: &str) -> Result<bool, AppError> {
        let key = usage_key(&self.scope, client_name);
        Ok(self.redis.hash_delete(&key, usage_id).await?)
    }
}

/// Process-local store for running without Redis, and for tests.
pub struct MemoryUsageStore {
    scope: StoreScope,
    docs: RwLock<HashMap<String, BTreeMap<String, UsageRecord>>>,
}

impl MemoryUsageStore {
    pub fn new(scope: StoreScope) -> Self {
        Self {
            scope,
            docs: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn load(&self, client_name: &str) -> Result<Vec<UsageRecord>, AppError> {
        let docs = self.docs.read().await;
        Ok(docs
            .get(&usage_key(&self.scope, client_name))
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, client_name: &str, usage_id: &str) -> Result<Option<UsageRecord>, AppError> {
        let docs = self.docs.read().await;
        Ok(docs
            .get(&usage_key(&self.scope, client_name))
            .and_then(|m| m.get(usage_id))
            .cloned())
    }

    async fn save(&self, record: &UsageRecord) -> Result<(), AppError> {
        let mut docs = self.docs.write().await;
        docs.entry(usage_key(&self.scope, &record.client_name))
            .or_default()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, client_name: &str, usage_id: &str) -> Result<bool, AppError> {
        let mut docs = self.docs.write().await;
        Ok(docs
            .get_mut(&usage_key(&self.scope, client_name))
            .is_some_and(|m| m.remove(usage_id).is_some()))
    }
}

/// Usage operations on top of a `UsageStore`.
#[derive(Clone)]
pub struct UsageTracker {
    store: Arc<dyn UsageStore>,
    scope: StoreScope,
    /// Held across the duplicate check and the write in `add`; shared by clones.
    adds: Arc<Mutex<()>>,
}

impl UsageTracker {
    pub fn new(store: Arc<dyn UsageStore>, scope: StoreScope) -> Self {
        Self {
            store,
            scope,
            adds: Arc::new(Mutex::new(())),
        }
    }

    /// Usages of `client_name`, active first, then most recently added first.
    pub async fn list(&self, client_name: &str) -> Result<Vec<UsageRecord>, AppError> {
        let mut records = self.store.load(client_name).await?;
        records.sort_by(|a, b| {
            let rank = |r: &UsageRecord| u8::from(r.status != UsageStatus::Active);
            rank(a)
                .cmp(&rank(b))
                .then_with(|| b.added_at.unwrap_or(0).cmp(&a.added_at.unwrap_or(0)))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    /// Mark `resource` as in use by `client_name`. A resource the client
    /// already has a record for (in any status) is rejected.
    pub async fn add(&self, client_name: &str, resource: &ResourceRecord) -> Result<UsageRecord, AppError> {
        let resource_id = resource
            .resource_id()
            .ok_or_else(|| AppError::ResourceNotFound(resource.service_name.clone()))?;

        let _guard = self.adds.lock().await;
        let existing = self.store.load(client_name).await?;
        if existing.iter().any(|u| u.resource_id == resource_id) {
            return Err(AppError::AlreadyInUse {
                client_name: client_name.to_string(),
                resource_id: resource_id.to_string(),
            });
        }

        let record = UsageRecord {
            id: new_usage_id(),
            client_name: client_name.to_string(),
            resource_id: resource_id.to_string(),
            service_name: resource.service_name.clone(),
            status: UsageStatus::Active,
            added_at: Some(now_secs()),
            added_by: Some(self.scope.user_id.clone()),
            notes: None,
        };
        self.store.save(&record).await?;
        info!(client_name, resource_id, usage_id = %record.id, "resource usage added");
        Ok(record)
    }

    pub async fn set_status(
        &self,
        client_name: &str,
        usage_id: &str,
        status: UsageStatus,
    ) -> Result<UsageRecord, AppError> {
        let mut record = self
            .store
            .get(client_name, usage_id)
            .await?
            .ok_or_else(|| AppError::UsageNotFound(usage_id.to_string()))?;
        record.status = status;
        self.store.save(&record).await?;
        info!(client_name, usage_id, ?status, "resource usage status changed");
        Ok(record)
    }

    pub async fn remove(&self, client_name: &str, usage_id: &str) -> Result<(), AppError> {
        if !self.store.delete(client_name, usage_id).await? {
            return Err(AppError::UsageNotFound(usage_id.to_string()));
        }
        info!(client_name, usage_id, "resource usage removed");
        Ok(())
    }
}

/// Resource IDs that must not be suggested again. Ended usages are excluded
/// too.
pub fn excluded_ids(usages: &[UsageRecord]) -> HashSet<String> {
    usages.iter().map(|u| u.resource_id.clone()).collect()
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}

fn new_usage_id() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0));
    let counter = USAGE_COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut h = Sha256::new();
    h.update(now.as_nanos().to_le_bytes());
    h.update(std::process::id().to_le_bytes());
    h.update(counter.to_le_bytes());
    let digest = h.finalize();
    digest[..16].iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::resource;

    fn scope(user: &str) -> StoreScope {
        StoreScope {
            app_id: "app".to_string(),
            user_id: user.to_string(),
        }
    }

    fn tracker() -> UsageTracker {
        UsageTracker::new(Arc::new(MemoryUsageStore::new(scope("worker-1"))), scope("worker-1"))
    }

    #[test]
    fn usage_ids_are_unique_hex() {
        let a = new_usage_id();
        let b = new_usage_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn key_is_partitioned_by_scope() {
        assert_eq!(
            usage_key(&scope("u1"), "山田"),
            "rsg:v1:app:u1:client_resources:山田"
        );
    }

    #[tokio::test]
    async fn add_then_list_records_user_and_status() {
        let tracker = tracker();
        let record = tracker
            .add("山田", &resource("r1", "就労支援センター", &[], None))
            .await
            .expect("add");
        assert_eq!(record.status, UsageStatus::Active);
        assert_eq!(record.added_by.as_deref(), Some("worker-1"));

        let listed = tracker.list("山田").await.expect("list");
        assert_eq!(listed, vec![record]);
        assert!(tracker.list("佐藤").await.expect("other client").is_empty());
    }

    #[tokio::test]
    async fn adding_same_resource_twice_is_rejected() {
        let tracker = tracker();
        let r = resource("r1", "x", &[], None);
        tracker.add("山田", &r).await.expect("first add");
        let err = tracker.add("山田", &r).await.expect_err("duplicate");
        assert!(matches!(err, AppError::AlreadyInUse { .. }));
    }

    /// Yields after every load so concurrent adds interleave between the
    /// duplicate check and the write.
    struct YieldingStore(MemoryUsageStore);

    #[async_trait]
    impl UsageStore for YieldingStore {
        async fn load(&self, client_name: &str) -> Result<Vec<UsageRecord>, AppError> {
            let records = self.0.load(client_name).await?;
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
            Ok(records)
        }
        async fn get(&self, client_name: &str, usage_id: &str) -> Result<Option<UsageRecord>, AppError> {
            self.0.get(client_name, usage_id).await
        }
        async fn save(&self, record: &UsageRecord) -> Result<(), AppError> {
            self.0.save(record).await
        }
        async fn delete(&self, client_name: &str, usage_id: &str) -> Result<bool, AppError> {
            self.0.delete(client_name, usage_id).await
        }
    }

    #[tokio::test]
    async fn concurrent_adds_of_same_resource_store_one_record() {
        let tracker = UsageTracker::new(
            Arc::new(YieldingStore(MemoryUsageStore::new(scope("u")))),
            scope("u"),
        );
        let other = tracker.clone();
        let r = resource("r1", "x", &[], None);

        let (first, second) = tokio::join!(tracker.add("c", &r), other.add("c", &r));
        assert_eq!(
            [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(),
            1
        );
        assert!(matches!(
            first.err().or(second.err()),
            Some(AppError::AlreadyInUse { .. })
        ));
        let records = tracker.list("c").await.expect("list");
        assert_eq!(records.iter().filter(|u| u.resource_id == "r1").count(), 1);
    }

    #[tokio::test]
    async fn resource_without_id_cannot_be_added() {
        let mut r = resource("", "x", &[], None);
        r.id = None;
        let err = tracker().add("山田", &r).await.expect_err("no id");
        assert!(matches!(err, AppError::ResourceNotFound(_)));
    }

    #[tokio::test]
    async fn list_puts_active_first_then_newest() {
        let store = Arc::new(MemoryUsageStore::new(scope("u")));
        let mk = |id: &str, status, added_at| UsageRecord {
            id: id.to_string(),
            client_name: "c".to_string(),
            resource_id: format!("res-{id}"),
            service_name: "s".to_string(),
            status,
            added_at,
            added_by: None,
            notes: None,
        };
        for record in [
            mk("ended-new", UsageStatus::Ended, Some(300)),
            mk("active-old", UsageStatus::Active, Some(100)),
            mk("active-new", UsageStatus::Active, Some(200)),
            mk("active-unknown", UsageStatus::Active, None),
        ] {
            store.save(&record).await.expect("save");
        }
        let tracker = UsageTracker::new(store, scope("u"));
        let ids: Vec<String> = tracker
            .list("c")
            .await
            .expect("list")
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(ids, vec!["active-new", "active-old", "active-unknown", "ended-new"]);
    }

    #[tokio::test]
    async fn status_change_and_removal() {
        let tracker = tracker();
        let record = tracker
            .add("山田", &resource("r1", "x", &[], None))
            .await
            .expect("add");

        let ended = tracker
            .set_status("山田", &record.id, UsageStatus::Ended)
            .await
            .expect("end");
        assert_eq!(ended.status, UsageStatus::Ended);

        let usages = tracker.list("山田").await.expect("list");
        assert!(excluded_ids(&usages).contains("r1"), "ended usage still excluded");

        tracker.remove("山田", &record.id).await.expect("remove");
        assert!(matches!(
            tracker.remove("山田", &record.id).await,
            Err(AppError::UsageNotFound(_))
        ));
        assert!(matches!(
            tracker.set_status("山田", "nope", UsageStatus::Active).await,
            Err(AppError::UsageNotFound(_))
        ));
    }

    #[tokio::test]
    async fn redis_store_without_redis_reports_unavailable() {
        let store = RedisUsageStore::new(RedisStore::new(None), scope("u"));
        let err = store.load("c").await.expect_err("no redis");
        assert!(matches!(err, AppError::Common(CommonError::RedisUnavailable)));
    }
}
