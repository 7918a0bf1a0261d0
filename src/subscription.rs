// Live snapshot subscriptions over store collections
//
// Every publication carries the full current document set of one collection.
// A `Subscription` is released exactly once: by `unsubscribe`, or on drop.

use crate::record::RawDocument;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::debug;

/// Full document set of a collection at one point in time
pub type Snapshot = Vec<RawDocument>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Entry {
    collection: String,
    sender: Sender<Snapshot>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: HashMap<SubscriptionId, Entry>,
}

type SharedRegistry = Arc<Mutex<Registry>>;

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of live subscriptions, owned by a store
#[derive(Default)]
pub struct SubscriptionManager {
    registry: SharedRegistry,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for `collection`
    pub fn subscribe(&self, collection: &str) -> Subscription {
        self.register(collection, None)
    }

    /// Register a subscriber whose first pending snapshot is `initial`.
    /// Other subscribers of the collection are not notified.
    pub fn subscribe_with(&self, collection: &str, initial: Snapshot) -> Subscription {
        self.register(collection, Some(initial))
    }

    fn register(&self, collection: &str, initial: Option<Snapshot>) -> Subscription {
        let (sender, receiver) = mpsc::channel();
        if let Some(snapshot) = initial {
            // Receiver is alive, cannot fail
            let _ = sender.send(snapshot);
        }

        let mut registry = lock(&self.registry);
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry.entries.insert(
            id,
            Entry {
                collection: collection.to_string(),
                sender,
            },
        );
        debug!(%id, collection, "Subscription registered");

        Subscription {
            id,
            collection: collection.to_string(),
            receiver,
            registry: Arc::downgrade(&self.registry),
            released: false,
        }
    }

    /// Deliver `snapshot` to every subscriber of `collection`.
    /// Returns the number of subscribers reached.
    pub fn publish(&self, collection: &str, snapshot: &Snapshot) -> usize {
        let mut registry = lock(&self.registry);
        let mut delivered = 0;
        let mut dead = Vec::new();

        for (id, entry) in registry.entries.iter().filter(|(_, e)| e.collection == collection) {
            match entry.sender.send(snapshot.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => dead.push(*id),
            }
        }

        for id in dead {
            registry.entries.remove(&id);
        }

        debug!(collection, delivered, documents = snapshot.len(), "Published snapshot");
        delivered
    }

    /// Number of live subscriptions across all collections
    pub fn active_count(&self) -> usize {
        lock(&self.registry).entries.len()
    }

    /// Check whether any subscriber is listening to `collection`
    pub fn has_subscribers(&self, collection: &str) -> bool {
        lock(&self.registry).entries.values().any(|e| e.collection == collection)
    }
}

/// Handle to a cancellable stream of snapshots.
///
/// Consumers pull snapshots synchronously; nothing is delivered after release.
pub struct Subscription {
    id: SubscriptionId,
    collection: String,
    receiver: Receiver<Snapshot>,
    registry: Weak<Mutex<Registry>>,
    released: bool,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Next pending snapshot, if one has been published
    pub fn try_next(&self) -> Option<Snapshot> {
        match self.receiver.try_recv() {
            Ok(snapshot) => Some(snapshot),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// All pending snapshots, oldest first
    pub fn drain(&self) -> Vec<Snapshot> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    /// Release the subscription
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).entries.remove(&self.id);
        }
        debug!(id = %self.id, collection = %self.collection, "Subscription released");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("collection", &self.collection)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn snapshot(ids: &[&str]) -> Snapshot {
        ids.iter().map(|id| RawDocument::new(*id, Map::new())).collect()
    }

    #[test]
    fn test_publish_reaches_collection_subscribers_only() {
        let manager = SubscriptionManager::new();
        let users = manager.subscribe("users");
        let other = manager.subscribe("other");

        assert_eq!(manager.publish("users", &snapshot(&["a"])), 1);

        assert_eq!(users.try_next().unwrap().len(), 1);
        assert!(users.try_next().is_none());
        assert!(other.try_next().is_none());
    }

    #[test]
    fn test_subscribe_with_initial_snapshot() {
        let manager = SubscriptionManager::new();
        let existing = manager.subscribe("users");
        let fresh = manager.subscribe_with("users", snapshot(&["a", "b"]));

        assert_eq!(fresh.try_next().unwrap().len(), 2);
        assert!(existing.try_next().is_none());
    }

    #[test]
    fn test_drain_returns_snapshots_in_order() {
        let manager = SubscriptionManager::new();
        let sub = manager.subscribe("users");

        manager.publish("users", &snapshot(&["a"]));
        manager.publish("users", &snapshot(&["a", "b"]));

        let pending = sub.drain();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].len(), 1);
        assert_eq!(pending[1].len(), 2);
    }

    #[test]
    fn test_unsubscribe_removes_registration() {
        let manager = SubscriptionManager::new();
        let sub = manager.subscribe("users");
        assert_eq!(manager.active_count(), 1);
        assert!(manager.has_subscribers("users"));

        sub.unsubscribe();
        assert_eq!(manager.active_count(), 0);
        assert_eq!(manager.publish("users", &snapshot(&["a"])), 0);
    }

    #[test]
    fn test_drop_releases_subscription() {
        let manager = SubscriptionManager::new();
        {
            let _sub = manager.subscribe("users");
            assert_eq!(manager.active_count(), 1);
        }
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_release_after_manager_dropped() {
        let manager = SubscriptionManager::new();
        let sub = manager.subscribe("users");
        drop(manager);

        assert!(sub.try_next().is_none());
        sub.unsubscribe();
    }

    #[test]
    fn test_ids_are_unique() {
        let manager = SubscriptionManager::new();
        let a = manager.subscribe("users");
        let b = manager.subscribe("users");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.collection(), "users");
    }
}
