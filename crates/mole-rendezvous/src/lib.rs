//! # Mole Rendezvous
//!
//! One-shot pairing of two otherwise unrelated clients through a
//! short-lived, server-held slot. A listener creates a slot and waits on
//! it; a sender pushes a URL addressed to the slot's identifier; the
//! listener receives it exactly once and the slot is discarded.
//!
//! ## Modules
//!
//! - [`slot`]: Slot identifiers, lifecycle phases and per-slot state
//! - [`handoff`]: Single-value transfer between sender and listener
//! - [`store`]: Concurrent registry of live slots
//! - [`sweeper`]: Periodic eviction of expired slots
//! - [`protocol`]: The create / listen / deliver service
//! - [`errors`]: Error taxonomy shared by all operations
//!
//! This crate is transport-agnostic; `mole-server` binds it to HTTP and
//! WebSocket.

#![forbid(unsafe_code)]

// =============================================================================
// MODULES
// =============================================================================

pub mod errors;
pub mod handoff;
pub mod protocol;
pub mod slot;
pub mod store;
pub mod sweeper;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use errors::{RendezvousError, RendezvousResult};
pub use handoff::{Delivery, Handoff, HandoffError, HandoffReceiver, PendingPush};
pub use protocol::{Listener, Rendezvous, RendezvousConfig, WaitOutcome};
pub use slot::{Slot, SlotId, SlotPhase};
pub use store::{SlotStore, DEFAULT_SLOT_TTL};
pub use sweeper::{Sweeper, DEFAULT_SWEEP_PERIOD};
