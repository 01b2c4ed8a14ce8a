//! Single-value handoff between a sender request and a waiting listener
//!
//! Each slot owns one [`Handoff`]. A sender offers one payload, the first
//! listener takes it. An offer resolves only once the listener acknowledges
//! the [`Delivery`], so the sender learns whether its payload actually
//! reached someone. Until a listener takes the payload the offer can be
//! withdrawn, which happens automatically when the [`PendingPush`] is dropped.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{oneshot, Notify};
use tracing::debug;

/// Why a push did not reach a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HandoffError {
    /// A payload was already pushed into this handoff
    #[error("payload already pushed")]
    AlreadyPushed,
    /// The handoff was closed, or the listener went away before acknowledging
    #[error("handoff closed")]
    Closed,
}

/// A payload in flight from sender to listener
///
/// Dropping a delivery without calling [`Delivery::complete`] tells the
/// sender that the payload was abandoned.
#[derive(Debug)]
pub struct Delivery {
    url: String,
    claim: Option<oneshot::Sender<()>>,
    ack: oneshot::Sender<()>,
}

impl Delivery {
    /// Payload carried by this delivery
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Acknowledge receipt to the sender and take the payload
    pub fn complete(self) -> String {
        // The sender may have given up already; the payload is still ours.
        let _ = self.ack.send(());
        self.url
    }
}

#[derive(Debug, Default)]
struct HandoffState {
    /// Offered payload not yet taken by the listener
    pending: Option<Delivery>,
    /// Set while an offer is pending or once one was taken
    pushed: bool,
    receiver_taken: bool,
    closed: bool,
}

/// One-shot transfer primitive owned by a slot
#[derive(Debug, Default)]
pub struct Handoff {
    state: Mutex<HandoffState>,
    notify: Notify,
}

impl Handoff {
    /// Create an open handoff with no payload and no listener
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a payload without waiting for it to be taken
    ///
    /// Fails fast on a second offer or a closed handoff.
    pub fn offer(&self, url: String) -> Result<PendingPush<'_>, HandoffError> {
        let (claim_tx, claim_rx) = oneshot::channel();
        let (ack_tx, ack_rx) = oneshot::channel();
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(HandoffError::Closed);
            }
            if state.pushed {
                return Err(HandoffError::AlreadyPushed);
            }
            state.pushed = true;
            state.pending = Some(Delivery {
                url,
                claim: Some(claim_tx),
                ack: ack_tx,
            });
        }
        self.notify.notify_one();

        Ok(PendingPush {
            handoff: self,
            claimed: Some(claim_rx),
            ack: Some(ack_rx),
        })
    }

    /// Push a payload and wait until a listener acknowledges it
    pub async fn push(&self, url: String) -> Result<(), HandoffError> {
        self.offer(url)?.acknowledged().await
    }

    /// Claim the consumer half; only the first caller gets it
    pub fn take_receiver(self: &Arc<Self>) -> Option<HandoffReceiver> {
        let mut state = self.state.lock();
        if state.closed || state.receiver_taken {
            return None;
        }
        state.receiver_taken = true;
        Some(HandoffReceiver {
            handoff: Arc::clone(self),
            done: false,
        })
    }

    /// Close the handoff
    ///
    /// A pending receiver observes "no payload"; a payload that was offered
    /// but not yet taken is dropped and its sender observes abandonment.
    /// Closing twice is a no-op.
    pub fn close(&self) {
        let pending = {
            let mut state = self.state.lock();
            state.closed = true;
            state.pending.take()
        };
        drop(pending);
        self.notify.notify_one();
    }

    /// Whether the handoff has been closed
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Take back an untaken payload so the handoff accepts a new offer
    fn withdraw(&self) -> bool {
        let mut state = self.state.lock();
        match state.pending.take() {
            Some(_) => {
                state.pushed = false;
                true
            }
            None => false,
        }
    }
}

/// A payload offered into a [`Handoff`]
///
/// Dropping it before a listener took the payload withdraws the offer, so
/// a sender that goes away never leaves a stale payload in the slot.
#[derive(Debug)]
#[must_use = "dropping a pending push withdraws the payload"]
pub struct PendingPush<'a> {
    handoff: &'a Handoff,
    claimed: Option<oneshot::Receiver<()>>,
    ack: Option<oneshot::Receiver<()>>,
}

impl PendingPush<'_> {
    /// Wait until a listener takes the payload
    ///
    /// Cancel-safe. Fails once the handoff closes with the payload untaken.
    pub async fn claimed(&mut self) -> Result<(), HandoffError> {
        let Some(claimed) = self.claimed.as_mut() else {
            return Ok(());
        };
        let result = claimed.await;
        self.claimed = None;
        result.map_err(|_| HandoffError::Closed)
    }

    /// Withdraw the payload if no listener has taken it yet
    ///
    /// Returns whether the payload was withdrawn. Once a listener holds it
    /// the offer can only end by acknowledgement or abandonment.
    pub fn withdraw(&mut self) -> bool {
        if self.claimed.take().is_none() {
            return false;
        }
        self.handoff.withdraw()
    }

    /// Wait for the listener to take and acknowledge the payload
    pub async fn acknowledged(mut self) -> Result<(), HandoffError> {
        self.claimed().await?;
        let ack = self.ack.take().ok_or(HandoffError::Closed)?;
        ack.await.map_err(|_| HandoffError::Closed)
    }
}

impl Drop for PendingPush<'_> {
    fn drop(&mut self) {
        if self.withdraw() {
            debug!("Withdrew payload nobody took");
        }
    }
}

/// Consumer half of a [`Handoff`]
#[derive(Debug)]
pub struct HandoffReceiver {
    handoff: Arc<Handoff>,
    done: bool,
}

impl HandoffReceiver {
    /// Wait for the payload
    ///
    /// Returns `None` once the handoff is closed without a payload, and on
    /// every call after the first completed one. Cancel-safe: dropping the
    /// returned future keeps the receiver usable.
    pub async fn recv(&mut self) -> Option<Delivery> {
        loop {
            if self.done {
                return None;
            }
            {
                let mut state = self.handoff.state.lock();
                if let Some(mut delivery) = state.pending.take() {
                    self.done = true;
                    if let Some(claim) = delivery.claim.take() {
                        let _ = claim.send(());
                    }
                    return Some(delivery);
                }
                if state.closed {
                    self.done = true;
                    return None;
                }
            }
            self.handoff.notify.notified().await;
        }
    }
}
