//! Non-blocking named and per-entity locks.
//!
//! A lock is a row with an optional unique `name` and an optional unique
//! `entity_id`. Acquiring inserts the row; a uniqueness conflict means the lock is
//! held and the caller must skip, not wait.

use crate::core::models::EntityId;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Name of the lock that serializes whole reprobe runs.
pub const REPROBE_GLOBAL_LOCK: &str = "reprobe_global";

/// One held lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub id: u64,
    pub name: Option<String>,
    pub entity_id: Option<EntityId>,
    pub owner: String,
    pub locked_at: DateTime<Utc>,
}

/// Storage for lock rows with unique `name` and unique `entity_id`.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Inserts a lock row. Returns false if `name` or `entity_id` is already held,
    /// or if neither is given.
    async fn acquire(&self, name: Option<&str>, entity_id: Option<&EntityId>, owner: &str) -> bool;

    /// Deletes every row whose name equals `name` or whose entity equals `entity_id`.
    /// Synchronous so that [`LockGuard`] can release from `Drop`.
    fn release(&self, name: Option<&str>, entity_id: Option<&EntityId>);

    /// Rows currently held, ordered by id.
    async fn held(&self) -> Vec<LockRecord>;
}

#[derive(Debug, Default)]
struct LockTable {
    next_id: u64,
    rows: HashMap<u64, LockRecord>,
    by_name: HashMap<String, u64>,
    by_entity: HashMap<EntityId, u64>,
}

impl LockTable {
    fn remove(&mut self, id: u64) {
        if let Some(row) = self.rows.remove(&id) {
            if let Some(name) = row.name {
                self.by_name.remove(&name);
            }
            if let Some(entity_id) = row.entity_id {
                self.by_entity.remove(&entity_id);
            }
        }
    }
}

/// Process-local [`LockStore`]. Each operation runs under a single mutex, so the
/// check for conflicts and the insert are one atomic step.
#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    table: Mutex<LockTable>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn acquire(&self, name: Option<&str>, entity_id: Option<&EntityId>, owner: &str) -> bool {
        if name.is_none() && entity_id.is_none() {
            tracing::warn!(target: "lock_task", "Lock requested by {} with neither name nor entity", owner);
            return false;
        }

        let mut table = self.table.lock();
        let name_taken = name.is_some_and(|n| table.by_name.contains_key(n));
        let entity_taken = entity_id.is_some_and(|e| table.by_entity.contains_key(e));
        if name_taken || entity_taken {
            tracing::debug!(target: "lock_task",
                "Lock busy (name={:?}, entity={:?}); {} skips", name, entity_id, owner);
            return false;
        }

        table.next_id += 1;
        let id = table.next_id;
        if let Some(n) = name {
            table.by_name.insert(n.to_string(), id);
        }
        if let Some(e) = entity_id {
            table.by_entity.insert(e.clone(), id);
        }
        table.rows.insert(
            id,
            LockRecord {
                id,
                name: name.map(str::to_string),
                entity_id: entity_id.cloned(),
                owner: owner.to_string(),
                locked_at: Utc::now(),
            },
        );
        tracing::debug!(target: "lock_task",
            "Lock {} acquired by {} (name={:?}, entity={:?})", id, owner, name, entity_id);
        true
    }

    fn release(&self, name: Option<&str>, entity_id: Option<&EntityId>) {
        let mut table = self.table.lock();
        let mut ids: Vec<u64> = Vec::new();
        if let Some(id) = name.and_then(|n| table.by_name.get(n)) {
            ids.push(*id);
        }
        if let Some(id) = entity_id.and_then(|e| table.by_entity.get(e)) {
            ids.push(*id);
        }
        for id in ids {
            table.remove(id);
        }
        tracing::debug!(target: "lock_task", "Released locks (name={:?}, entity={:?})", name, entity_id);
    }

    async fn held(&self) -> Vec<LockRecord> {
        let table = self.table.lock();
        let mut rows: Vec<LockRecord> = table.rows.values().cloned().collect();
        rows.sort_by_key(|r| r.id);
        rows
    }
}

/// A held lock, released when dropped.
///
/// Dropping covers early returns and cancelled futures alike, so a caller that
/// wraps verification in a timeout never leaves a stale row behind.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard {
    store: Arc<dyn LockStore>,
    name: Option<String>,
    entity_id: Option<EntityId>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.store.release(self.name.as_deref(), self.entity_id.as_ref());
    }
}

/// Typed front for a [`LockStore`] with one method per lock flavor.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn LockStore>,
}

impl LockManager {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    pub async fn acquire_named(&self, name: &str, owner: &str) -> bool {
        self.store.acquire(Some(name), None, owner).await
    }

    pub fn release_named(&self, name: &str) {
        self.store.release(Some(name), None)
    }

    /// Acquires a named lock held until the returned guard is dropped.
    pub async fn lock_named(&self, name: &str, owner: &str) -> Option<LockGuard> {
        self.acquire_named(name, owner).await.then(|| LockGuard {
            store: Arc::clone(&self.store),
            name: Some(name.to_string()),
            entity_id: None,
        })
    }

    pub async fn acquire_entity(&self, entity_id: &EntityId, owner: &str) -> bool {
        self.store.acquire(None, Some(entity_id), owner).await
    }

    pub fn release_entity(&self, entity_id: &EntityId) {
        self.store.release(None, Some(entity_id))
    }

    /// Acquires an entity lock held until the returned guard is dropped.
    pub async fn lock_entity(&self, entity_id: &EntityId, owner: &str) -> Option<LockGuard> {
        self.acquire_entity(entity_id, owner).await.then(|| LockGuard {
            store: Arc::clone(&self.store),
            name: None,
            entity_id: Some(entity_id.clone()),
        })
    }

    pub async fn held(&self) -> Vec<LockRecord> {
        self.store.held().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_named_lock_is_exclusive_until_released() {
        let locks = LockManager::new(Arc::new(InMemoryLockStore::new()));
        assert!(locks.acquire_named(REPROBE_GLOBAL_LOCK, "worker-a").await);
        assert!(!locks.acquire_named(REPROBE_GLOBAL_LOCK, "worker-b").await);
        locks.release_named(REPROBE_GLOBAL_LOCK);
        assert!(locks.acquire_named(REPROBE_GLOBAL_LOCK, "worker-b").await);

        let held = locks.held().await;
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].owner, "worker-b");
    }

    #[tokio::test]
    async fn test_named_and_entity_locks_are_independent() {
        let locks = LockManager::new(Arc::new(InMemoryLockStore::new()));
        let entity = EntityId::from(7_i64);
        assert!(locks.acquire_named("7", "a").await);
        assert!(locks.acquire_entity(&entity, "a").await);
        assert!(!locks.acquire_entity(&entity, "b").await);
        locks.release_entity(&entity);
        assert!(locks.acquire_entity(&entity, "b").await);
        assert_eq!(locks.held().await.len(), 2);
    }

    #[tokio::test]
    async fn test_combined_row_conflicts_on_either_key() {
        let store = InMemoryLockStore::new();
        let entity = EntityId::from("acme-1");
        assert!(store.acquire(Some("batch"), Some(&entity), "a").await);
        assert!(!store.acquire(Some("batch"), None, "b").await);
        assert!(!store.acquire(None, Some(&entity), "b").await);
        assert!(!store.acquire(None, None, "b").await);

        store.release(None, Some(&entity));
        assert!(store.held().await.is_empty());
        assert!(store.acquire(Some("batch"), None, "b").await);
    }

    #[tokio::test]
    async fn test_guard_releases_on_drop() {
        let locks = LockManager::new(Arc::new(InMemoryLockStore::new()));
        let entity = EntityId::from("acme-1");

        let guard = locks.lock_entity(&entity, "worker-a").await.unwrap();
        assert!(locks.lock_entity(&entity, "worker-b").await.is_none());
        let global = locks.lock_named(REPROBE_GLOBAL_LOCK, "worker-a").await.unwrap();
        assert_eq!(locks.held().await.len(), 2);

        drop(guard);
        assert_eq!(locks.held().await.len(), 1);
        drop(global);
        assert!(locks.held().await.is_empty());
        assert!(locks.lock_entity(&entity, "worker-b").await.is_some());
    }

    #[tokio::test]
    async fn test_guard_released_when_future_is_cancelled() {
        let locks = LockManager::new(Arc::new(InMemoryLockStore::new()));
        let entity = EntityId::from(5_i64);

        let held = {
            let locks = locks.clone();
            let entity = entity.clone();
            async move {
                let _guard = locks.lock_entity(&entity, "worker-a").await;
                std::future::pending::<()>().await;
            }
        };
        let outcome = tokio::time::timeout(std::time::Duration::from_millis(20), held).await;
        assert!(outcome.is_err());
        assert!(locks.held().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_entity_acquire_has_one_winner() {
        let locks = LockManager::new(Arc::new(InMemoryLockStore::new()));
        let entity = EntityId::from(42_i64);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let locks = locks.clone();
                let entity = entity.clone();
                tokio::spawn(async move { locks.acquire_entity(&entity, &format!("worker-{}", i)).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
