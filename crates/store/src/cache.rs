//! Per-node permissions cache.
//!
//! Entries are keyed by `(grantee, resource)` and hold the grantee's
//! effective permissions at insertion time. An entry is served while its TTL
//! (`permissions_validity_in_ms`) has not elapsed AND the node's apply index
//! has not moved since insertion. Invalidation is implicit: entries carry
//! the apply index they were computed at, so once any command applies
//! locally every resident entry stops matching and lookups fall through to
//! the tables. TTL 0 disables caching entirely. The cache is strictly per
//! node; cross-node staleness is bounded only by the read barrier.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use ferrodb_auth_types::{PermissionSet, ResourceId, RoleName};

type CacheKey = (RoleName, ResourceId);

struct CacheEntry {
    permissions: PermissionSet,
    inserted_at: Instant,
    /// Apply index at insertion; a later index invalidates the entry.
    applied_at: u64,
}

/// TTL'd effective-permissions cache for one node.
pub struct PermissionsCache {
    /// `None` disables caching: lookups always miss, inserts are dropped.
    validity: Option<Duration>,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl PermissionsCache {
    /// Creates a cache; `validity = None` disables it.
    #[must_use]
    pub fn new(validity: Option<Duration>) -> Self {
        Self { validity, entries: Mutex::new(HashMap::new()) }
    }

    /// Whether caching is enabled.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.validity.is_some()
    }

    /// Returns the cached permissions if the entry is fresh: TTL unexpired
    /// and no command applied locally since insertion.
    #[must_use]
    pub fn get(&self, key: &CacheKey, applied_index: u64) -> Option<PermissionSet> {
        let validity = self.validity?;
        let entries = self.entries.lock();
        let entry = entries.get(key)?;
        if entry.applied_at != applied_index || entry.inserted_at.elapsed() >= validity {
            return None;
        }
        Some(entry.permissions.clone())
    }

    /// Stores freshly computed permissions. No-op when caching is disabled.
    pub fn insert(&self, key: CacheKey, permissions: PermissionSet, applied_index: u64) {
        if self.validity.is_none() {
            return;
        }
        self.entries.lock().insert(
            key,
            CacheEntry { permissions, inserted_at: Instant::now(), applied_at: applied_index },
        );
    }

    /// Recomputes every resident entry through `lookup`, stamping them with
    /// the current apply index. Called by the background refresh task.
    pub fn refresh_all(
        &self,
        applied_index: u64,
        lookup: impl Fn(&RoleName, &ResourceId) -> PermissionSet,
    ) {
        if self.validity.is_none() {
            return;
        }
        let mut entries = self.entries.lock();
        let now = Instant::now();
        for ((grantee, resource), entry) in entries.iter_mut() {
            entry.permissions = lookup(grantee, resource);
            entry.inserted_at = now;
            entry.applied_at = applied_index;
        }
        debug!(entries = entries.len(), applied_index, "Permissions cache refreshed");
    }

    /// Number of resident entries, fresh or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
