//! Singleflight implementation for deduplicating concurrent identity
//! refreshes: a hot key produces one endpoint call and every waiter shares
//! the result.

use dashmap::DashMap;
use tokio::sync::broadcast;

/// Result of trying to acquire a singleflight slot.
pub enum SingleflightSlot<V> {
    /// We won the race and should execute the operation.
    /// Contains the sender to broadcast results.
    Leader(broadcast::Sender<V>),
    /// Another task is executing; wait for its result.
    Follower(broadcast::Receiver<V>),
}

/// Deduplicates concurrent operations by key.
///
/// Uses DashMap's entry API for atomic check-and-insert, preventing race
/// conditions between checking for an in-flight request and registering a
/// new one.
pub struct Singleflight<K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    in_flight: DashMap<K, broadcast::Sender<V>>,
}

impl<K, V> Singleflight<K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            in_flight: DashMap::new(),
        }
    }

    /// Atomically try to acquire a slot for this operation.
    pub fn acquire(&self, key: K) -> SingleflightSlot<V> {
        use dashmap::mapref::entry::Entry;

        match self.in_flight.entry(key) {
            Entry::Occupied(entry) => SingleflightSlot::Follower(entry.get().subscribe()),
            Entry::Vacant(entry) => {
                let (tx, _rx) = broadcast::channel(1);
                entry.insert(tx.clone());
                SingleflightSlot::Leader(tx)
            }
        }
    }

    /// Remove a completed in-flight request.
    pub fn complete(&self, key: &K) {
        self.in_flight.remove(key);
    }
}

impl<K, V> Default for Singleflight<K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that ensures singleflight cleanup on drop, so a panicking
/// leader does not leave followers subscribed forever.
pub struct SingleflightGuard<'a, K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    singleflight: &'a Singleflight<K, V>,
    key: K,
    completed: bool,
}

impl<'a, K, V> SingleflightGuard<'a, K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(singleflight: &'a Singleflight<K, V>, key: K) -> Self {
        Self {
            singleflight,
            key,
            completed: false,
        }
    }

    /// Mark as completed (normal path, not panic).
    pub fn complete(mut self) {
        self.singleflight.complete(&self.key);
        self.completed = true;
    }
}

impl<K, V> Drop for SingleflightGuard<'_, K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    fn drop(&mut self) {
        if !self.completed {
            self.singleflight.complete(&self.key);
        }
    }
}
