//! Slot identity, lifecycle phase and per-slot state

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::handoff::Handoff;

/// Opaque slot identifier
///
/// Backed by a random v4 UUID, which carries 122 bits of entropy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(Uuid);

impl SlotId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for SlotId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Where a slot is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotPhase {
    /// Registered, no listener yet
    Created,
    /// A listener is parked on the handoff
    Waiting,
    /// The payload reached the listener
    Delivered,
    /// Closed without a payload (listener left, duplicate wait, failed push)
    Abandoned,
    /// Evicted because its time-to-live elapsed
    Expired,
}

impl SlotPhase {
    /// Terminal phases admit no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Abandoned | Self::Expired)
    }
}

impl fmt::Display for SlotPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Waiting => "waiting",
            Self::Delivered => "delivered",
            Self::Abandoned => "abandoned",
            Self::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// Server-held state for one pairing attempt
#[derive(Debug)]
pub struct Slot {
    id: SlotId,
    created_at: Instant,
    expires_at: Instant,
    handoff: Arc<Handoff>,
    phase: Mutex<SlotPhase>,
}

impl Slot {
    /// Create a slot that expires `ttl` after `now`
    pub fn new(id: SlotId, now: Instant, ttl: Duration) -> Self {
        Self {
            id,
            created_at: now,
            expires_at: now + ttl,
            handoff: Arc::new(Handoff::new()),
            phase: Mutex::new(SlotPhase::Created),
        }
    }

    /// Slot identifier
    pub fn id(&self) -> SlotId {
        self.id
    }

    /// When the slot was created
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Absolute expiry; fixed at creation
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Whether `now` is strictly past the expiry
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }

    /// The slot's handoff channel
    pub fn handoff(&self) -> &Arc<Handoff> {
        &self.handoff
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> SlotPhase {
        *self.phase.lock()
    }

    /// Move to `next` unless the slot already reached a terminal phase.
    /// Returns whether the transition happened.
    pub fn transition(&self, next: SlotPhase) -> bool {
        let mut phase = self.phase.lock();
        if phase.is_terminal() {
            return false;
        }
        *phase = next;
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_id_round_trips_through_display() {
        let id = SlotId::generate();
        let parsed: SlotId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(id.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn test_slot_id_rejects_garbage() {
        assert!("does-not-exist".parse::<SlotId>().is_err());
    }

    #[test]
    fn test_slot_id_serializes_as_string() {
        let id = SlotId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_is_strict() {
        let now = Instant::now();
        let slot = Slot::new(SlotId::generate(), now, Duration::from_secs(600));

        assert_eq!(slot.expires_at(), now + Duration::from_secs(600));
        assert!(!slot.is_expired(now + Duration::from_secs(600)));
        assert!(slot.is_expired(now + Duration::from_secs(601)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_phase_is_sticky() {
        let slot = Slot::new(SlotId::generate(), Instant::now(), Duration::from_secs(1));

        assert!(slot.transition(SlotPhase::Waiting));
        assert!(slot.transition(SlotPhase::Delivered));
        assert!(!slot.transition(SlotPhase::Expired));
        assert_eq!(slot.phase(), SlotPhase::Delivered);
    }
}
