//! Rendezvous protocol: create, listen and deliver
//!
//! Per-slot state machine:
//!
//! ```text
//! CREATED -> WAITING -> { DELIVERED | ABANDONED | EXPIRED }
//! ```
//!
//! The sweeper may move any non-terminal slot to `EXPIRED`. Whichever of
//! delivery, expiry or listener completion happens first destroys the slot.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::{RendezvousError, RendezvousResult};
use crate::handoff::{Delivery, HandoffError, HandoffReceiver};
use crate::slot::{Slot, SlotId, SlotPhase};
use crate::store::{SlotStore, DEFAULT_SLOT_TTL};
use crate::sweeper::{Sweeper, DEFAULT_SWEEP_PERIOD};

// =============================================================================
// Configuration
// =============================================================================

/// Timing configuration for the rendezvous service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendezvousConfig {
    /// How long a slot stays deliverable after creation
    pub slot_ttl: Duration,
    /// Interval between sweeper passes
    pub sweep_period: Duration,
    /// Extra time past expiry before the sweeper evicts a slot
    pub sweep_grace: Duration,
    /// Upper bound on a blocked delivery waiting for its listener
    pub deliver_timeout: Duration,
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            slot_ttl: DEFAULT_SLOT_TTL,
            sweep_period: DEFAULT_SWEEP_PERIOD,
            sweep_grace: DEFAULT_SWEEP_PERIOD,
            deliver_timeout: Duration::from_secs(60),
        }
    }
}

impl RendezvousConfig {
    /// Reject durations that would make the service unusable
    pub fn validate(&self) -> RendezvousResult<()> {
        if self.slot_ttl.is_zero() {
            return Err(RendezvousError::invalid("slot_ttl must be greater than zero"));
        }
        if self.sweep_period.is_zero() {
            return Err(RendezvousError::invalid(
                "sweep_period must be greater than zero",
            ));
        }
        if self.deliver_timeout.is_zero() {
            return Err(RendezvousError::invalid(
                "deliver_timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Wait side
// =============================================================================

/// How a wait ended
#[derive(Debug)]
pub enum WaitOutcome {
    /// A payload arrived; hand it to the client, then [`Listener::complete`] it
    Delivered(Delivery),
    /// The slot closed without a payload; carries the slot's final phase
    Closed(SlotPhase),
}

/// The single listener attached to a slot
///
/// Dropping a listener destroys its slot, so a client that disconnects
/// while waiting frees the slot immediately instead of at the next sweep.
#[derive(Debug)]
pub struct Listener {
    slot: Arc<Slot>,
    store: Arc<SlotStore>,
    receiver: HandoffReceiver,
}

impl Listener {
    /// Identifier of the slot being waited on
    pub fn id(&self) -> SlotId {
        self.slot.id()
    }

    /// Block until a payload arrives or the slot is destroyed
    ///
    /// Cancel-safe, so it can be raced against the client connection.
    pub async fn recv(&mut self) -> WaitOutcome {
        match self.receiver.recv().await {
            Some(delivery) => WaitOutcome::Delivered(delivery),
            None => WaitOutcome::Closed(self.slot.phase()),
        }
    }

    /// Acknowledge a delivery once it reached the client, destroying the slot
    pub fn complete(self, delivery: Delivery) -> String {
        self.slot.transition(SlotPhase::Delivered);
        let url = delivery.complete();
        info!("Sent url to client for slot {}", self.slot.id());
        url
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.store.destroy(&self.slot.id(), SlotPhase::Abandoned);
    }
}

// =============================================================================
// Rendezvous Service
// =============================================================================

/// Process-wide rendezvous service
///
/// Cheap to clone; all clones share one [`SlotStore`].
#[derive(Debug, Clone)]
pub struct Rendezvous {
    store: Arc<SlotStore>,
    config: RendezvousConfig,
}

impl Rendezvous {
    /// Create a service with its own empty store
    pub fn new(config: RendezvousConfig) -> Self {
        let store = Arc::new(SlotStore::new(config.slot_ttl));
        Self { store, config }
    }

    /// Create a service over an existing store
    pub fn with_store(store: Arc<SlotStore>, config: RendezvousConfig) -> Self {
        Self { store, config }
    }

    /// The backing store
    pub fn store(&self) -> &Arc<SlotStore> {
        &self.store
    }

    /// Service configuration
    pub fn config(&self) -> &RendezvousConfig {
        &self.config
    }

    /// Number of live slots
    pub fn live_slots(&self) -> usize {
        self.store.len()
    }

    /// Parse a client-supplied identifier
    ///
    /// Text that is not a slot identifier cannot name a live slot, so it
    /// is reported as not found rather than malformed.
    pub fn parse_id(raw: &str) -> RendezvousResult<SlotId> {
        raw.trim()
            .parse()
            .map_err(|_| RendezvousError::not_found(raw))
    }

    /// Open a new slot and return its identifier
    pub fn create(&self) -> SlotId {
        self.store.create().id()
    }

    /// Attach the listener for `id`
    ///
    /// Fails with `NotFound` for unknown slots, `Expired` for slots past
    /// their TTL (which are destroyed on the spot) and `AlreadyWaiting`
    /// when another listener holds the slot.
    pub fn listen(&self, id: &SlotId) -> RendezvousResult<Listener> {
        let slot = self.live_slot(id)?;

        let receiver = match slot.handoff().take_receiver() {
            Some(receiver) => receiver,
            // Destroyed between lookup and claim
            None if slot.handoff().is_closed() => {
                return Err(RendezvousError::not_found(id.to_string()));
            }
            None => {
                warn!("Rejected second listener for slot {}", id);
                return Err(RendezvousError::AlreadyWaiting { id: *id });
            }
        };

        slot.transition(SlotPhase::Waiting);
        info!("Started connection {}", id);

        Ok(Listener {
            slot,
            store: self.store.clone(),
            receiver,
        })
    }

    /// Hand `url` to the listener of `id`
    ///
    /// Blocks until the listener acknowledges the payload or the slot is
    /// destroyed. The delivery timeout only bounds the wait for a listener
    /// to take the payload; once taken, the outcome is whatever the listener
    /// reports. Dropping the returned future before the payload is taken
    /// withdraws it and leaves the slot deliverable.
    pub async fn deliver(&self, id: &SlotId, url: impl Into<String>) -> RendezvousResult<()> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(RendezvousError::malformed("url must not be empty"));
        }

        let slot = self.live_slot(id)?;
        let timeout = self.config.deliver_timeout;

        let mut push = match slot.handoff().offer(url) {
            Ok(push) => push,
            // Another sender got there first; from here the slot is consumed.
            Err(HandoffError::AlreadyPushed) => {
                debug!("Slot {} already received a payload", id);
                return Err(RendezvousError::not_found(id.to_string()));
            }
            Err(HandoffError::Closed) => return Err(self.abandon(&slot)),
        };

        match tokio::time::timeout(timeout, push.claimed()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(self.abandon(&slot)),
            Err(_) => {
                if push.withdraw() {
                    warn!("Delivery to slot {} timed out", id);
                    self.store.destroy(id, SlotPhase::Abandoned);
                    return Err(RendezvousError::DeliverTimeout {
                        id: *id,
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    });
                }
                debug!("Slot {} took its payload as the delivery timed out", id);
            }
        }

        match push.acknowledged().await {
            Ok(()) => {
                self.store.destroy(id, SlotPhase::Delivered);
                Ok(())
            }
            Err(_) => Err(self.abandon(&slot)),
        }
    }

    /// Sweeper bound to this service's store and timings
    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(
            self.store.clone(),
            self.config.sweep_period,
            self.config.sweep_grace,
        )
    }

    /// Start the sweeper on the current runtime
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        self.sweeper().spawn()
    }

    fn live_slot(&self, id: &SlotId) -> RendezvousResult<Arc<Slot>> {
        let slot = self
            .store
            .lookup(id)
            .ok_or_else(|| RendezvousError::not_found(id.to_string()))?;

        if slot.is_expired(Instant::now()) {
            self.store.destroy(id, SlotPhase::Expired);
            return Err(RendezvousError::Expired { id: *id });
        }
        Ok(slot)
    }

    /// Destroy a slot whose payload never reached a client
    fn abandon(&self, slot: &Slot) -> RendezvousError {
        let id = slot.id();
        self.store.destroy(&id, SlotPhase::Abandoned);
        match slot.phase() {
            SlotPhase::Expired => RendezvousError::Expired { id },
            _ => RendezvousError::Abandoned { id },
        }
    }
}

impl Default for Rendezvous {
    fn default() -> Self {
        Self::new(RendezvousConfig::default())
    }
}
