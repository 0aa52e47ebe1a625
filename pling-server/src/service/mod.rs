use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::QueryCache;
use crate::config::ServerConfig;
use crate::core::{NewNotification, Notification, PlingError, Result, UserIdentity};
use crate::monitoring::HealthSnapshot;
use crate::resilience::{BreakerError, CircuitBreaker, FallbackStore, retry_with_backoff};
use crate::store::{NOTIFICATIONS_TABLE, SortOrder, StoreError, StoreGateway, USERS_TABLE};

/// Identity lookups retry briefly before the failure reaches the breaker
const IDENTITY_RETRY_ATTEMPTS: u32 = 3;
const IDENTITY_RETRY_BASE_DELAY: Duration = Duration::from_millis(50);

/// Orchestrates the cache, circuit breaker and fallback store around the
/// persistent-store gateway.
///
/// Reads are cache-aside: cache, then the breaker-gated gateway, then the
/// fallback store, with the result cached under the per-operation TTL
/// regardless of origin. Writes go through the breaker and fall back to the
/// in-process store on failure; both paths invalidate the owner's cached
/// list/count entries.
pub struct NotificationService<G: StoreGateway> {
    gateway: G,
    cache: QueryCache,
    breaker: CircuitBreaker,
    fallback: FallbackStore,
    store_ready: AtomicBool,
    sweep_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
    config: ServerConfig,
}

fn list_key(owner_id: &str, limit: usize, unread_only: bool) -> String {
    format!("list:{}:{}:{}", owner_id, limit, unread_only)
}

fn count_key(owner_id: &str) -> String {
    format!("count:{}", owner_id)
}

fn user_key(user_id: &str) -> String {
    format!("user:{}", user_id)
}

impl<G: StoreGateway> NotificationService<G> {
    pub fn new(gateway: G, config: ServerConfig) -> Self {
        info!("Initializing notification service");
        Self {
            gateway,
            cache: QueryCache::new(config.cache.clone()),
            breaker: CircuitBreaker::new(config.breaker.clone()),
            fallback: FallbackStore::new(config.fallback.clone()),
            store_ready: AtomicBool::new(false),
            sweep_handle: Mutex::new(None),
            config,
        }
    }

    /// Start background tasks (cache expiry sweep)
    pub fn start(&self) {
        let mut handle = self.sweep_handle.lock();
        if handle.is_none() {
            *handle = Some(self.cache.start_sweep());
        }
    }

    /// Cancel background tasks; the service stays usable afterwards
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweep_handle.lock().take() {
            handle.abort();
            info!("Cache sweep task cancelled");
        }
    }

    /// Probe the persistent store once and record readiness.
    ///
    /// A `NotFound` (table absent, e.g. migrations not yet run) or any other
    /// failure leaves the store marked unready; reads then skip the gateway.
    pub async fn probe_store(&self) -> bool {
        let ready = match self
            .gateway
            .select(NOTIFICATIONS_TABLE, &json!({}), Some(1), None)
            .await
        {
            Ok(_) => true,
            Err(StoreError::NotFound) => {
                warn!("Store probe: notifications table absent, running degraded");
                false
            }
            Err(e) => {
                warn!("Store probe failed: {}", e);
                false
            }
        };
        self.store_ready.store(ready, Ordering::SeqCst);
        info!("Persistent store ready: {}", ready);
        ready
    }

    pub fn store_ready(&self) -> bool {
        self.store_ready.load(Ordering::SeqCst)
    }

    /// List an owner's notifications, newest first
    pub async fn list_notifications(
        &self,
        owner_id: &str,
        limit: usize,
        unread_only: bool,
    ) -> Result<Vec<Notification>> {
        let key = list_key(owner_id, limit, unread_only);
        if let Some(cached) = self.cache.get::<Vec<Notification>>(&key) {
            return Ok(cached);
        }

        let from_store = self
            .store_list(owner_id, limit, unread_only)
            .await
            .unwrap_or_else(|e| {
                warn!("List read for {} falling back: {}", owner_id, e);
                None
            });

        let list = match from_store {
            Some(list) => list,
            None => self.fallback.list(owner_id, limit, unread_only),
        };

        self.cache.set(&key, &list, self.config.ttl.list());
        Ok(list)
    }

    /// Gateway read half of the list path; `Ok(None)` means store not ready
    async fn store_list(
        &self,
        owner_id: &str,
        limit: usize,
        unread_only: bool,
    ) -> std::result::Result<Option<Vec<Notification>>, BreakerError<StoreError>> {
        if !self.store_ready() {
            return Ok(None);
        }

        let mut filter = json!({ "owner_id": owner_id });
        if unread_only {
            filter["read"] = json!(false);
        }

        let rows = self
            .breaker
            .execute(self.gateway.select(
                NOTIFICATIONS_TABLE,
                &filter,
                Some(limit),
                Some(("created_at", SortOrder::Descending)),
            ))
            .await?;

        let list = rows
            .into_iter()
            .filter_map(row_to_notification)
            .filter(|n| !n.is_expired())
            .collect();
        Ok(Some(list))
    }

    /// Count of unread notifications for an owner
    pub async fn unread_count(&self, owner_id: &str) -> Result<u64> {
        let key = count_key(owner_id);
        if let Some(cached) = self.cache.get::<u64>(&key) {
            return Ok(cached);
        }

        let count = if self.store_ready() {
            let filter = json!({ "owner_id": owner_id, "read": false });
            match self
                .breaker
                .execute(self.gateway.count(NOTIFICATIONS_TABLE, &filter))
                .await
            {
                Ok(count) => count,
                Err(e) => {
                    warn!("Unread count for {} falling back: {}", owner_id, e);
                    self.fallback.unread_count(owner_id) as u64
                }
            }
        } else {
            self.fallback.unread_count(owner_id) as u64
        };

        self.cache.set(&key, &count, self.config.ttl.count());
        Ok(count)
    }

    /// Resolve a user identity, cached for the identity TTL.
    ///
    /// The gateway lookup retries briefly with backoff inside a single
    /// breaker-recorded call; there is no fallback copy of identities, so an
    /// unresolvable identity is a propagated failure.
    pub async fn resolve_identity(&self, user_id: &str) -> Result<UserIdentity> {
        let key = user_key(user_id);
        if let Some(cached) = self.cache.get::<UserIdentity>(&key) {
            return Ok(cached);
        }

        if !self.store_ready() {
            return Err(PlingError::IdentityUnresolved(user_id.to_string()));
        }

        let filter = json!({ "id": user_id });
        let rows = self
            .breaker
            .execute(retry_with_backoff(
                IDENTITY_RETRY_ATTEMPTS,
                IDENTITY_RETRY_BASE_DELAY,
                || self.gateway.select(USERS_TABLE, &filter, Some(1), None),
            ))
            .await
            .map_err(|e| {
                warn!("Identity lookup for {} failed: {}", user_id, e);
                PlingError::IdentityUnresolved(user_id.to_string())
            })?;

        let identity: UserIdentity = rows
            .into_iter()
            .next()
            .and_then(|row| serde_json::from_value(row).ok())
            .ok_or_else(|| PlingError::IdentityUnresolved(user_id.to_string()))?;

        self.cache.set(&key, &identity, self.config.ttl.identity());
        Ok(identity)
    }

    /// Create a notification, preferring the persistent store.
    ///
    /// On store failure the fallback store takes the write and the returned
    /// representation keeps the service-generated id.
    pub async fn create_notification(&self, input: NewNotification) -> Result<Notification> {
        if input.owner_id.is_empty() {
            return Err(PlingError::InvalidRequest("owner_id is required".to_string()));
        }

        let notification = Notification::new(input);
        let owner_id = notification.owner_id.clone();
        let row = serde_json::to_value(&notification)?;

        let stored = if self.store_ready() {
            match self
                .breaker
                .execute(self.gateway.insert(NOTIFICATIONS_TABLE, row))
                .await
            {
                Ok(row) => row_to_notification(row),
                Err(e) => {
                    warn!("Create for {} falling back: {}", owner_id, e);
                    None
                }
            }
        } else {
            None
        };

        let result = match stored {
            Some(canonical) => canonical,
            None => {
                self.fallback.append(notification.clone());
                notification
            }
        };

        self.invalidate_owner(&owner_id);
        debug!("Created notification {} for {}", result.id, owner_id);
        Ok(result)
    }

    /// Flip a notification's `read` flag, best effort
    pub async fn mark_read(&self, owner_id: &str, notification_id: &str) -> Result<bool> {
        let found = if self.store_ready() {
            let filter = json!({ "id": notification_id, "owner_id": owner_id });
            match self
                .breaker
                .execute(self.gateway.update(NOTIFICATIONS_TABLE, &filter, &json!({"read": true})))
                .await
            {
                Ok(_) => true,
                Err(e) => {
                    warn!("Mark-read for {} falling back: {}", owner_id, e);
                    self.fallback.mark_read(owner_id, notification_id)
                }
            }
        } else {
            self.fallback.mark_read(owner_id, notification_id)
        };

        self.invalidate_owner(owner_id);
        Ok(found)
    }

    /// Update one profile field.
    ///
    /// Profiles have no in-process fallback, so this is the one write whose
    /// store failure surfaces to the caller.
    pub async fn update_profile_field(
        &self,
        user_id: &str,
        field: &str,
        value: Value,
    ) -> Result<UserIdentity> {
        if field.is_empty() || field == "id" {
            return Err(PlingError::InvalidRequest(format!(
                "cannot update field '{}'",
                field
            )));
        }
        if !self.store_ready() {
            return Err(PlingError::StoreUnavailable);
        }

        let filter = json!({ "id": user_id });
        let mut patch = serde_json::Map::new();
        patch.insert(field.to_string(), value);
        let patch = Value::Object(patch);
        let row = self
            .breaker
            .execute(self.gateway.update(USERS_TABLE, &filter, &patch))
            .await
            .map_err(|e| match e {
                BreakerError::Inner(StoreError::NotFound) => {
                    PlingError::IdentityUnresolved(user_id.to_string())
                }
                _ => PlingError::StoreUnavailable,
            })?;

        self.cache.invalidate(|key| key == user_key(user_id));

        serde_json::from_value(row).map_err(Into::into)
    }

    /// Drop the owner's cached list/count entries; other namespaces
    /// (resolved identities included) and other owners stay cached, even
    /// when one owner id is a prefix of another
    fn invalidate_owner(&self, owner_id: &str) {
        let list_prefix = format!("list:{}:", owner_id);
        let count = count_key(owner_id);
        let removed = self
            .cache
            .invalidate(|key| key.starts_with(&list_prefix) || key == count);
        if removed > 0 {
            debug!("Invalidated {} cache entries for {}", removed, owner_id);
        }
    }

    /// Read-only health snapshot; queries mutate nothing
    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            cache: self.cache.stats(),
            hit_ratio: self.cache.hit_ratio(),
            breaker_state: self.breaker.state(),
            breaker_failures: self.breaker.failure_count(),
            store_ready: self.store_ready(),
            fallback_owners: self.fallback.owner_count(),
        }
    }
}

fn row_to_notification(row: Value) -> Option<Notification> {
    match serde_json::from_value(row) {
        Ok(n) => Some(n),
        Err(e) => {
            warn!("Dropping malformed notification row: {}", e);
            None
        }
    }
}
