//! The authoritative table of room mappings.
//!
//! This module provides the [`MappingStore`], shared by the XMPP and Matrix
//! event loops. Reads go through a read-write lock; creations are serialized
//! per mapping key so that a burst of events about an unmapped contact
//! provisions a single room while unrelated contacts proceed in parallel.

use std::{collections::HashMap, future::Future, sync::Arc};

use log::{debug, info, warn};
use tokio::sync::{Mutex, RwLock};

use crate::{
    error::BridgeError,
    mapping::{ContactMapping, MappingKey, RoomTopicIndex},
};

/// Mappings and their reverse index, always updated together.
#[derive(Default)]
struct StoreState {
    /// Mappings by key
    mappings: HashMap<MappingKey, ContactMapping>,
    /// Reverse lookups derived from `mappings`
    index: RoomTopicIndex,
}

impl StoreState {
    /// Inserts a mapping unless its key, topic or room is already claimed.
    fn insert(&mut self, mapping: ContactMapping) -> bool {
        if self.mappings.contains_key(&mapping.key)
            || self.index.by_topic(&mapping.topic).is_some()
            || self.index.by_room(&mapping.matrix_room_id).is_some()
        {
            return false;
        }

        self.index.insert(&mapping);
        self.mappings.insert(mapping.key.clone(), mapping);
        true
    }

    fn lookup(&self, key: Option<&MappingKey>) -> Option<ContactMapping> {
        key.and_then(|key| self.mappings.get(key)).cloned()
    }
}

/// Thread-safe store of every managed room.
///
/// # Examples
///
/// ```ignore
/// let store = MappingStore::new();
/// let mapping = store
///     .resolve_or_create(&key, || provisioner.create_mapping(&key, "Alice"))
///     .await?;
/// assert_eq!(store.resolve_by_room(&mapping.matrix_room_id).await, Some(mapping));
/// ```
#[derive(Default)]
pub struct MappingStore {
    /// Mappings and reverse index
    state: RwLock<StoreState>,
    /// One creation lock per key
    creation_locks: Mutex<HashMap<MappingKey, Arc<Mutex<()>>>>,
}

impl MappingStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        MappingStore::default()
    }

    /// Returns the mapping of a key.
    pub async fn resolve(&self, key: &MappingKey) -> Option<ContactMapping> {
        self.state.read().await.lookup(Some(key))
    }

    /// Returns the mapping of a Matrix room.
    pub async fn resolve_by_room(&self, room_id: &str) -> Option<ContactMapping> {
        let state = self.state.read().await;
        state.lookup(state.index.by_room(room_id))
    }

    /// Returns the mapping anchored by a room topic.
    pub async fn resolve_by_topic(&self, topic: &str) -> Option<ContactMapping> {
        let state = self.state.read().await;
        state.lookup(state.index.by_topic(topic))
    }

    /// Returns the mapping of a key, creating it if it does not exist yet.
    ///
    /// At most one creation is in flight per key: concurrent callers wait for
    /// the first one and reuse its mapping. If the creation fails, the next
    /// waiting caller attempts its own.
    ///
    /// # Errors
    ///
    /// Propagates the error of `create`. Returns
    /// [`BridgeError::ProvisioningFailed`] when the created room or its topic
    /// is already mapped to another key.
    pub async fn resolve_or_create<F, Fut>(
        &self,
        key: &MappingKey,
        create: F,
    ) -> Result<ContactMapping, BridgeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ContactMapping, BridgeError>>,
    {
        if let Some(mapping) = self.resolve(key).await {
            return Ok(mapping);
        }

        let creation_lock = {
            let mut creation_locks = self.creation_locks.lock().await;
            Arc::clone(creation_locks.entry(key.clone()).or_default())
        };
        let result = {
            let _guard = creation_lock.lock().await;
            self.create_locked(key, create).await
        };

        drop(creation_lock);
        self.release_creation_lock(key).await;
        result
    }

    /// Runs a creation while holding the creation lock of `key`.
    async fn create_locked<F, Fut>(
        &self,
        key: &MappingKey,
        create: F,
    ) -> Result<ContactMapping, BridgeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ContactMapping, BridgeError>>,
    {
        // Another caller may have finished the creation while we were waiting
        if let Some(mapping) = self.resolve(key).await {
            debug!("reusing mapping created concurrently for {}", key);
            return Ok(mapping);
        }

        let mapping = create().await?;

        let mut state = self.state.write().await;
        // Discovery may have adopted a room meanwhile
        if let Some(existing) = state.mappings.get(key) {
            warn!(
                "room {} for {} lost to room {}",
                mapping.matrix_room_id, key, existing.matrix_room_id
            );
            return Ok(existing.clone());
        }
        if !state.insert(mapping.clone()) {
            warn!(
                "room {} for {} conflicts with an existing mapping",
                mapping.matrix_room_id, key
            );
            return Err(BridgeError::ProvisioningFailed {
                topic: mapping.topic,
                attempts: 1,
                reason: format!("room {} is already mapped", mapping.matrix_room_id),
            });
        }
        info!(
            "mapped {} to room {} (topic `{}`)",
            key, mapping.matrix_room_id, mapping.topic
        );

        Ok(mapping)
    }

    /// Drops the creation lock of `key` once nobody waits on it anymore.
    async fn release_creation_lock(&self, key: &MappingKey) {
        let mut creation_locks = self.creation_locks.lock().await;
        if creation_locks
            .get(key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            creation_locks.remove(key);
        }
    }

    /// Adds a mapping discovered by scanning the joined rooms.
    ///
    /// Returns `false` when the key, topic or room is already mapped, in
    /// which case the first room found keeps the mapping.
    pub async fn adopt(&self, mapping: ContactMapping) -> bool {
        let key = mapping.key.clone();
        let room_id = mapping.matrix_room_id.clone();

        if self.state.write().await.insert(mapping) {
            debug!("adopted room {} for {}", room_id, key);
            true
        } else {
            warn!("room {} duplicates the mapping of {}, ignoring it", room_id, key);
            false
        }
    }

    /// Removes the mapping of a room the bridge left.
    pub async fn forget(&self, room_id: &str) -> Option<ContactMapping> {
        let mut state = self.state.write().await;
        let key = state.index.by_room(room_id)?.clone();
        let mapping = state.mappings.remove(&key)?;
        state.index.remove(&mapping);

        info!("forgot mapping of {} (room {})", key, room_id);
        Some(mapping)
    }

    /// Records the new name of a mapped room.
    pub async fn rename(&self, key: &MappingKey, name: &str) {
        if let Some(mapping) = self.state.write().await.mappings.get_mut(key) {
            mapping.name = Some(name.to_owned());
        }
    }

    /// Returns a snapshot of every mapping.
    pub async fn mappings(&self) -> Vec<ContactMapping> {
        self.state.read().await.mappings.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::join_all;
    use tokio::time::{Duration, sleep};

    use super::*;
    use crate::{identity::jid::normalize, mapping::MappingKind};

    fn create_mapping(jid: &str, room_id: &str) -> ContactMapping {
        ContactMapping {
            key: MappingKey::Jid(normalize(jid).unwrap()),
            matrix_room_id: room_id.to_string(),
            kind: MappingKind::DirectContact,
            topic: jid.to_string(),
            nick: None,
            name: None,
        }
    }

    fn key(jid: &str) -> MappingKey {
        MappingKey::Jid(normalize(jid).unwrap())
    }

    #[tokio::test]
    async fn test_resolve_or_create_creates_once() {
        let store = MappingStore::new();
        let created = AtomicUsize::new(0);

        for _ in 0..3 {
            let mapping = store
                .resolve_or_create(&key("alice@example.com"), || async {
                    created.fetch_add(1, Ordering::SeqCst);
                    Ok(create_mapping("alice@example.com", "!a:matrix.org"))
                })
                .await
                .unwrap();
            assert_eq!(mapping.matrix_room_id, "!a:matrix.org");
        }

        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolve_or_create_provisions_one_room() {
        let store = Arc::new(MappingStore::new());
        let created = Arc::new(AtomicUsize::new(0));

        let tasks = (0..16).map(|i| {
            let store = Arc::clone(&store);
            let created = Arc::clone(&created);
            tokio::spawn(async move {
                store
                    .resolve_or_create(&key("alice@example.com"), || async move {
                        let n = created.fetch_add(1, Ordering::SeqCst);
                        // Leave time for the other callers to pile up
                        sleep(Duration::from_millis(20)).await;
                        Ok(create_mapping(
                            "alice@example.com",
                            &format!("!room{}-{}:matrix.org", n, i),
                        ))
                    })
                    .await
                    .unwrap()
            })
        });

        let mappings: Vec<ContactMapping> = join_all(tasks)
            .await
            .into_iter()
            .map(|result| result.unwrap())
            .collect();

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(mappings.iter().all(|m| m == &mappings[0]));
        assert_eq!(store.mappings().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unrelated_keys_do_not_share_a_lock() {
        let store = Arc::new(MappingStore::new());
        let alice_key = key("alice@example.com");

        // Hold alice's creation lock while bob is being created
        let alice_lock = {
            let mut locks = store.creation_locks.lock().await;
            Arc::clone(locks.entry(alice_key).or_default())
        };
        let _alice_guard = alice_lock.lock().await;

        let bob = tokio::time::timeout(
            Duration::from_secs(1),
            store.resolve_or_create(&key("bob@example.com"), || async {
                Ok(create_mapping("bob@example.com", "!b:matrix.org"))
            }),
        )
        .await
        .expect("bob must not wait for alice")
        .unwrap();

        assert_eq!(bob.matrix_room_id, "!b:matrix.org");
    }

    #[tokio::test]
    async fn test_failed_creation_is_retried_by_next_caller() {
        let store = MappingStore::new();

        let result = store
            .resolve_or_create(&key("alice@example.com"), || async {
                Err(BridgeError::Matrix("boom".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert!(store.resolve(&key("alice@example.com")).await.is_none());

        let mapping = store
            .resolve_or_create(&key("alice@example.com"), || async {
                Ok(create_mapping("alice@example.com", "!a:matrix.org"))
            })
            .await
            .unwrap();
        assert_eq!(mapping.matrix_room_id, "!a:matrix.org");
    }

    #[tokio::test]
    async fn test_creation_conflicting_with_another_room_fails() {
        let store = MappingStore::new();
        assert!(
            store
                .adopt(create_mapping("bob@example.com", "!a:matrix.org"))
                .await
        );

        let result = store
            .resolve_or_create(&key("alice@example.com"), || async {
                Ok(create_mapping("alice@example.com", "!a:matrix.org"))
            })
            .await;

        assert!(matches!(
            result,
            Err(BridgeError::ProvisioningFailed { .. })
        ));
        assert!(store.resolve(&key("alice@example.com")).await.is_none());
    }

    #[tokio::test]
    async fn test_creation_racing_discovery_returns_adopted_room() {
        let store = MappingStore::new();

        let mapping = store
            .resolve_or_create(&key("alice@example.com"), || async {
                store
                    .adopt(create_mapping("alice@example.com", "!found:matrix.org"))
                    .await;
                Ok(create_mapping("alice@example.com", "!new:matrix.org"))
            })
            .await
            .unwrap();

        assert_eq!(mapping.matrix_room_id, "!found:matrix.org");
        assert_eq!(
            store.resolve(&key("alice@example.com")).await,
            Some(mapping)
        );
    }

    #[tokio::test]
    async fn test_creation_locks_are_released() {
        let store = MappingStore::new();

        store
            .resolve_or_create(&key("alice@example.com"), || async {
                Ok(create_mapping("alice@example.com", "!a:matrix.org"))
            })
            .await
            .unwrap();
        let _ = store
            .resolve_or_create(&key("bob@example.com"), || async {
                Err(BridgeError::Matrix("boom".to_string()))
            })
            .await;

        assert!(store.creation_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_lookups() {
        let store = MappingStore::new();
        let mapping = create_mapping("alice@example.com", "!a:matrix.org");
        assert!(store.adopt(mapping.clone()).await);

        assert_eq!(
            store.resolve(&key("alice@example.com")).await,
            Some(mapping.clone())
        );
        assert_eq!(
            store.resolve_by_room("!a:matrix.org").await,
            Some(mapping.clone())
        );
        assert_eq!(
            store.resolve_by_topic("alice@example.com").await,
            Some(mapping)
        );
        assert_eq!(store.resolve_by_room("!unknown:matrix.org").await, None);
    }

    #[tokio::test]
    async fn test_adopt_rejects_duplicates() {
        let store = MappingStore::new();
        assert!(
            store
                .adopt(create_mapping("alice@example.com", "!a:matrix.org"))
                .await
        );
        // Same topic in another room
        assert!(
            !store
                .adopt(create_mapping("alice@example.com", "!a2:matrix.org"))
                .await
        );
        assert_eq!(
            store
                .resolve(&key("alice@example.com"))
                .await
                .unwrap()
                .matrix_room_id,
            "!a:matrix.org"
        );
    }

    #[tokio::test]
    async fn test_forget() {
        let store = MappingStore::new();
        store
            .adopt(create_mapping("alice@example.com", "!a:matrix.org"))
            .await;

        let forgotten = store.forget("!a:matrix.org").await.unwrap();
        assert_eq!(forgotten.topic, "alice@example.com");
        assert!(store.resolve_by_topic("alice@example.com").await.is_none());
        assert!(store.forget("!a:matrix.org").await.is_none());
    }

    #[tokio::test]
    async fn test_rename() {
        let store = MappingStore::new();
        store
            .adopt(create_mapping("alice@example.com", "!a:matrix.org"))
            .await;

        store.rename(&key("alice@example.com"), "Alice").await;

        let mapping = store.resolve(&key("alice@example.com")).await.unwrap();
        assert_eq!(mapping.name.as_deref(), Some("Alice"));
    }
}
