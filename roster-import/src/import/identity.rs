//! Identity cache and per-key lock manager
//!
//! Memoizes identity-key -> remote-id mappings (email addresses, sorted
//! parent-id sets, group names) and hands out one lock per key so that only
//! a single worker runs the "check cache, call remote, create, cache"
//! sequence for a given identity. Double-checked locking: the outer cache
//! mutex is held only to read the cache and fetch-or-create the per-key
//! lock, never across a remote call.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::api::ApiError;

#[derive(Default)]
struct CacheInner {
    /// Write-once per key for the lifetime of the import context
    resolved: HashMap<String, String>,
    /// Lazily created, one lock per identity key
    locks: HashMap<String, Arc<Mutex<()>>>,
}

/// Identity-key -> remote-id cache with per-key creation locks
///
/// Scoped to one `ImportContext`; a fresh cache per job bounds the lock map
/// and keeps runs independent.
#[derive(Default)]
pub struct IdentityCache {
    inner: Mutex<CacheInner>,
}

/// Result of `resolve_for_create`
pub enum CreateSlot {
    /// The identity already resolves; no creation should happen
    Existing { uuid: String },
    /// The identity is unknown; the caller holds the creation lock and must
    /// either `insert` the new id or drop the guard on failure
    Vacant { guard: OwnedMutexGuard<()> },
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached id for `key`, if any
    pub async fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().await.resolved.get(key).cloned()
    }

    /// Record the resolved id for `key`
    ///
    /// Called while the caller still holds the per-key creation lock, so
    /// racing workers observe the id as soon as they acquire the lock.
    pub async fn insert(&self, key: &str, uuid: &str) {
        self.inner
            .lock()
            .await
            .resolved
            .entry(key.to_string())
            .or_insert_with(|| uuid.to_string());
    }

    /// The per-key lock, created lazily under the cache mutex
    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut inner = self.inner.lock().await;
        inner
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the raw per-key lock without a lookup
    ///
    /// Used for identities that have no remote lookup, like the sorted
    /// parent-id key guarding child creation.
    pub async fn lock_key(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = self.key_lock(key).await;
        lock.lock_owned().await
    }

    /// Resolve `key`, holding the creation lock if it is still vacant
    ///
    /// Fast path: cached id, returned under the outer mutex alone. Slow
    /// path: acquire the per-key lock, re-check the cache (another worker
    /// may have finished first), then run `lookup` against the remote
    /// service. A successful lookup populates the cache and releases the
    /// lock; a miss hands the held lock to the caller for the create call.
    /// An ambiguous lookup fails with `DuplicateIdentity` and the key is
    /// never resolved.
    pub async fn resolve_for_create<F, Fut>(
        &self,
        key: &str,
        lookup: F,
    ) -> Result<CreateSlot, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<String>, ApiError>>,
    {
        let lock = {
            let mut inner = self.inner.lock().await;
            if let Some(uuid) = inner.resolved.get(key) {
                return Ok(CreateSlot::Existing { uuid: uuid.clone() });
            }
            inner
                .locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let guard = lock.lock_owned().await;

        // Re-check: a racing worker may have resolved it while we waited.
        if let Some(uuid) = self.get(key).await {
            return Ok(CreateSlot::Existing { uuid });
        }

        match lookup().await? {
            Some(uuid) => {
                self.insert(key, &uuid).await;
                Ok(CreateSlot::Existing { uuid })
            }
            None => Ok(CreateSlot::Vacant { guard }),
        }
    }

    /// Resolve `key` without retaining the creation lock
    pub async fn resolve<F, Fut>(&self, key: &str, lookup: F) -> Result<Option<String>, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<String>, ApiError>>,
    {
        match self.resolve_for_create(key, lookup).await? {
            CreateSlot::Existing { uuid } => Ok(Some(uuid)),
            CreateSlot::Vacant { .. } => Ok(None),
        }
    }
}

/// Identity key for a child with no email: the sorted parent ids joined
pub fn parents_key(parent_uuids: &[&str]) -> String {
    let mut ids: Vec<&str> = parent_uuids.to_vec();
    ids.sort_unstable();
    ids.join("_")
}
