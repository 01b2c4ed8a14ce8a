//! Periodic eviction of slots past their time-to-live

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::slot::SlotPhase;
use crate::store::SlotStore;

/// Default sweep period
pub const DEFAULT_SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// Background task bounding slot lifetime
#[derive(Debug, Clone)]
pub struct Sweeper {
    store: Arc<SlotStore>,
    period: Duration,
    grace: Duration,
}

impl Sweeper {
    /// Create a sweeper ticking every `period` and evicting slots `grace`
    /// after their expiry
    pub fn new(store: Arc<SlotStore>, period: Duration, grace: Duration) -> Self {
        Self {
            store,
            period,
            grace,
        }
    }

    /// Run a single pass as of `now`, returning how many slots were evicted
    ///
    /// Evicts every slot with `now >= expires_at + grace`.
    ///
    /// A slot destroyed concurrently by a delivery is simply not counted.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let expired: Vec<_> = self
            .store
            .snapshot()
            .into_iter()
            .filter(|slot| now >= slot.expires_at() + self.grace)
            .map(|slot| slot.id())
            .collect();

        let mut evicted = 0;
        for id in expired {
            if self.store.destroy(&id, SlotPhase::Expired).is_some() {
                info!("Slot is expired: {}", id);
                evicted += 1;
            }
        }
        evicted
    }

    /// Tick forever; the first pass happens one period after start
    pub async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let now = ticker.tick().await;
            let evicted = self.sweep_at(now);
            debug!(
                "Sweep evicted {} slot(s), {} live",
                evicted,
                self.store.len()
            );
        }
    }

    /// Spawn [`Sweeper::run`] on the current runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(600);

    fn sweeper(store: &Arc<SlotStore>) -> Sweeper {
        Sweeper::new(store.clone(), DEFAULT_SWEEP_PERIOD, DEFAULT_SWEEP_PERIOD)
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_respects_grace_window() {
        let store = Arc::new(SlotStore::new(TTL));
        let slot = store.create();
        let sweeper = sweeper(&store);

        // Past TTL but inside the grace window
        assert_eq!(sweeper.sweep_at(slot.expires_at() + Duration::from_secs(30)), 0);
        assert!(store.lookup(&slot.id()).is_some());

        assert_eq!(sweeper.sweep_at(slot.expires_at() + Duration::from_secs(60)), 1);
        assert!(store.lookup(&slot.id()).is_none());
        assert_eq!(slot.phase(), SlotPhase::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_ignores_slots_destroyed_elsewhere() {
        let store = Arc::new(SlotStore::new(TTL));
        let slot = store.create();
        let sweeper = sweeper(&store);

        store.destroy(&slot.id(), SlotPhase::Delivered);
        assert_eq!(sweeper.sweep_at(slot.expires_at() + TTL), 0);
        assert_eq!(slot.phase(), SlotPhase::Delivered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_evicts_within_bound() {
        let store = Arc::new(SlotStore::new(TTL));
        let id = store.create().id();
        let handle = sweeper(&store).spawn();

        tokio::time::sleep(TTL).await;
        assert!(store.lookup(&id).is_some());

        // Created at T: the tick at T+11m is the first to reach TTL + grace
        tokio::time::sleep(DEFAULT_SWEEP_PERIOD + Duration::from_millis(1)).await;
        assert!(store.lookup(&id).is_none());

        handle.abort();
    }
}
