//! Error taxonomy for rendezvous operations
//!
//! Every variant is recovered at the request boundary and turned into a
//! response; none of them is fatal to the process.

use crate::slot::SlotId;

/// Result alias for rendezvous operations
pub type RendezvousResult<T> = Result<T, RendezvousError>;

/// Unified error type for slot creation, waiting and delivery
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RendezvousError {
    /// Unknown, already consumed or already evicted identifier
    #[error("Slot not found: {id}")]
    NotFound {
        /// Identifier as presented by the caller
        id: String,
    },

    /// Slot is still registered but its time-to-live has elapsed
    #[error("Slot expired: {id}")]
    Expired {
        /// Identifier of the expired slot
        id: SlotId,
    },

    /// Request envelope could not be parsed
    #[error("Malformed request: {reason}")]
    Malformed {
        /// What was wrong with the request
        reason: String,
    },

    /// A listener is already attached to this slot
    #[error("Slot already has a listener: {id}")]
    AlreadyWaiting {
        /// Identifier of the contested slot
        id: SlotId,
    },

    /// The slot was closed before the payload reached a listener
    #[error("Slot abandoned before delivery: {id}")]
    Abandoned {
        /// Identifier of the abandoned slot
        id: SlotId,
    },

    /// No listener consumed the payload within the delivery timeout
    #[error("Delivery to {id} timed out after {timeout_ms}ms")]
    DeliverTimeout {
        /// Identifier of the slot the payload was pushed to
        id: SlotId,
        /// Timeout that elapsed
        timeout_ms: u64,
    },

    /// Invalid configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// What is wrong with the configuration
        message: String,
    },

    /// Transport-level failure (upgrade, read or write)
    #[error("Upstream I/O error: {reason}")]
    Upstream {
        /// Description of the transport failure
        reason: String,
    },
}

impl RendezvousError {
    /// Create a not found error for a raw identifier
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a malformed request error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create an upstream I/O error
    pub fn upstream(reason: impl Into<String>) -> Self {
        Self::Upstream {
            reason: reason.into(),
        }
    }

    /// HTTP status code this error is reported with
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Malformed { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::AlreadyWaiting { .. } => 409,
            Self::Expired { .. } | Self::Abandoned { .. } => 410,
            Self::Invalid { .. } => 500,
            Self::Upstream { .. } => 502,
            Self::DeliverTimeout { .. } => 504,
        }
    }
}
