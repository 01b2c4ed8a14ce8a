//! Concurrent home for all live slots
//!
//! The store is the only shared mutable state in the service. It is built
//! once at startup and handed to the protocol handler and the sweeper.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::slot::{Slot, SlotId, SlotPhase};

/// Default slot time-to-live
pub const DEFAULT_SLOT_TTL: Duration = Duration::from_secs(10 * 60);

/// Internally synchronized mapping from identifier to slot
#[derive(Debug)]
pub struct SlotStore {
    slots: RwLock<HashMap<SlotId, Arc<Slot>>>,
    ttl: Duration,
}

impl SlotStore {
    /// Create an empty store whose slots live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Time-to-live applied to new slots
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Register a fresh slot expiring one TTL from now
    pub fn create(&self) -> Arc<Slot> {
        let now = Instant::now();
        let mut slots = self.slots.write();

        // A v4 collision is astronomically unlikely, but an identifier must
        // never name two slots.
        let mut id = SlotId::generate();
        while slots.contains_key(&id) {
            id = SlotId::generate();
        }

        let slot = Arc::new(Slot::new(id, now, self.ttl));
        slots.insert(id, slot.clone());
        drop(slots);

        info!("Created slot {}", id);
        slot
    }

    /// Find a live slot
    pub fn lookup(&self, id: &SlotId) -> Option<Arc<Slot>> {
        let slot = self.slots.read().get(id).cloned();
        debug!("Lookup slot {}: {}", id, if slot.is_some() { "hit" } else { "miss" });
        slot
    }

    /// Remove a slot and close its handoff
    ///
    /// Returns the removed slot to the first caller only; every later or
    /// concurrent call for the same identifier is a no-op returning `None`.
    /// `reason` is recorded as the slot's terminal phase unless a terminal
    /// phase was already reached.
    pub fn destroy(&self, id: &SlotId, reason: SlotPhase) -> Option<Arc<Slot>> {
        let slot = self.slots.write().remove(id)?;
        slot.transition(reason);
        slot.handoff().close();

        info!("Destroyed slot {} ({})", id, slot.phase());
        Some(slot)
    }

    /// Snapshot of every live slot
    pub fn snapshot(&self) -> Vec<Arc<Slot>> {
        self.slots.read().values().cloned().collect()
    }

    /// Number of live slots
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Whether no slot is live
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

impl Default for SlotStore {
    fn default() -> Self {
        Self::new(DEFAULT_SLOT_TTL)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test(start_paused = true)]
    async fn test_create_then_lookup() {
        let store = SlotStore::default();
        let slot = store.create();

        let found = store.lookup(&slot.id()).unwrap();
        assert!(Arc::ptr_eq(&slot, &found));
        assert_eq!(found.phase(), SlotPhase::Created);
        assert_eq!(found.expires_at(), found.created_at() + DEFAULT_SLOT_TTL);
    }

    #[test]
    fn test_lookup_unknown_is_none() {
        let store = SlotStore::default();
        assert!(store.lookup(&SlotId::generate()).is_none());
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let store = SlotStore::default();
        let slot = store.create();
        let id = slot.id();

        assert!(store.destroy(&id, SlotPhase::Expired).is_some());
        assert!(store.destroy(&id, SlotPhase::Abandoned).is_none());

        assert!(store.lookup(&id).is_none());
        assert!(slot.handoff().is_closed());
        assert_eq!(slot.phase(), SlotPhase::Expired);
    }

    #[tokio::test]
    async fn test_destroy_keeps_earlier_terminal_phase() {
        let store = SlotStore::default();
        let slot = store.create();
        slot.transition(SlotPhase::Delivered);

        store.destroy(&slot.id(), SlotPhase::Abandoned);
        assert_eq!(slot.phase(), SlotPhase::Delivered);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_destroy_has_single_winner() {
        let store = Arc::new(SlotStore::default());
        let id = store.create().id();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.destroy(&id, SlotPhase::Expired).is_some() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_yield_distinct_ids() {
        let store = Arc::new(SlotStore::default());

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.create().id() })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }
        assert_eq!(ids.len(), 64);
        assert_eq!(store.len(), 64);
    }
}
