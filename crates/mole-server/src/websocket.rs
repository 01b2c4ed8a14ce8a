//! Listener WebSocket handling
//!
//! The client opens `/listen`, sends `{"id": "..."}` as its first text
//! frame and then waits. The server answers with `{"url": "..."}` once a
//! sender delivers, or closes without a payload if the slot is unknown,
//! expired or abandoned.

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use mole_rendezvous::{
    Rendezvous, RendezvousError, RendezvousResult, SlotId, SlotPhase, WaitOutcome,
};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tracing::{debug, info, warn};

/// First frame sent by a listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenMessage {
    /// Slot to wait on
    pub id: String,
}

/// The single frame sent to a listener on delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlMessage {
    /// Delivered payload
    pub url: String,
}

/// WebSocket connection handler for one listener
pub struct ListenHandler {
    rendezvous: Rendezvous,
}

impl ListenHandler {
    /// Create a handler over the shared rendezvous service
    pub fn new(rendezvous: Rendezvous) -> Self {
        Self { rendezvous }
    }

    /// Drive one listener connection to completion
    pub async fn handle_connection(&self, mut socket: WebSocket) -> RendezvousResult<()> {
        let result = self.serve(&mut socket).await;

        let frame = match &result {
            Ok(reason) => CloseFrame {
                code: close_code::NORMAL,
                reason: Cow::Borrowed(*reason),
            },
            Err(e) => CloseFrame {
                code: close_code::POLICY,
                reason: Cow::Borrowed(close_reason(e)),
            },
        };
        // The peer may already be gone; nothing left to report in that case.
        let _ = socket.send(Message::Close(Some(frame))).await;

        result.map(|_| ())
    }

    /// Returns the close reason for a normally finished exchange
    async fn serve(&self, socket: &mut WebSocket) -> RendezvousResult<&'static str> {
        // A client that never names its slot is held no longer than a slot lives
        let limit = self.rendezvous.config().slot_ttl;
        let id = tokio::time::timeout(limit, read_listen_message(socket))
            .await
            .map_err(|_| {
                warn!("No listen message within {:?}", limit);
                RendezvousError::upstream("timed out waiting for listen message")
            })??;
        let mut listener = self.rendezvous.listen(&id)?;

        loop {
            tokio::select! {
                outcome = listener.recv() => match outcome {
                    WaitOutcome::Delivered(delivery) => {
                        let message = UrlMessage {
                            url: delivery.url().to_string(),
                        };
                        send_json(socket, &message).await?;
                        listener.complete(delivery);
                        return Ok("delivered");
                    }
                    WaitOutcome::Closed(phase) => {
                        debug!("Slot {} closed without payload ({})", id, phase);
                        return Ok(phase_reason(phase));
                    }
                },
                frame = socket.recv() => match frame {
                    Some(Ok(Message::Close(frame))) => {
                        info!("Listener for {} closed connection: {:?}", id, frame);
                        return Ok("closed");
                    }
                    Some(Ok(_)) => {
                        debug!("Ignoring frame from listener {}", id);
                    }
                    Some(Err(e)) => {
                        return Err(RendezvousError::upstream(e.to_string()));
                    }
                    None => {
                        info!("Listener for {} disconnected", id);
                        return Ok("disconnected");
                    }
                },
            }
        }
    }
}

/// Wait for the listener's `{"id"}` frame
async fn read_listen_message(socket: &mut WebSocket) -> RendezvousResult<SlotId> {
    while let Some(frame) = socket.recv().await {
        match frame {
            Ok(Message::Text(text)) => {
                let message: ListenMessage = serde_json::from_str(&text).map_err(|e| {
                    warn!("Failed to parse listen message: {}", e);
                    RendezvousError::malformed(format!("invalid listen message: {e}"))
                })?;
                return Rendezvous::parse_id(&message.id);
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("Couldn't read listen message from client: {}", e);
                return Err(RendezvousError::upstream(e.to_string()));
            }
        }
    }
    Err(RendezvousError::upstream("connection closed before listen message"))
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, message: &T) -> RendezvousResult<()> {
    let json = serde_json::to_string(message)
        .map_err(|e| RendezvousError::malformed(e.to_string()))?;
    socket
        .send(Message::Text(json))
        .await
        .map_err(|e| RendezvousError::upstream(format!("Failed to send message: {e}")))
}

fn phase_reason(phase: SlotPhase) -> &'static str {
    match phase {
        SlotPhase::Expired => "expired",
        SlotPhase::Delivered => "delivered",
        SlotPhase::Created | SlotPhase::Waiting | SlotPhase::Abandoned => "abandoned",
    }
}

/// Short close reason; close frames cap the reason at 123 bytes
fn close_reason(error: &RendezvousError) -> &'static str {
    match error {
        RendezvousError::NotFound { .. } => "not found",
        RendezvousError::Expired { .. } => "expired",
        RendezvousError::Malformed { .. } => "malformed",
        RendezvousError::AlreadyWaiting { .. } => "already waiting",
        RendezvousError::Abandoned { .. } => "abandoned",
        RendezvousError::DeliverTimeout { .. } => "timeout",
        RendezvousError::Invalid { .. } | RendezvousError::Upstream { .. } => "error",
    }
}
