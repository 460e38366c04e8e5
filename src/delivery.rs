//! Broadcast and private delivery
//!
//! Recipients are snapshotted from the registry and the lock is released
//! before anything is queued. Each recipient has its own bounded outbound
//! queue and writer task, so a slow client only ever hurts itself.

use tracing::{debug, warn};

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::registry::Registry;
use crate::types::ConnectionId;
use crate::user::Outbox;

/// Fan-out engine on top of the registry
#[derive(Debug, Clone)]
pub struct Delivery {
    registry: Registry,
    max_dropped: u64,
}

impl Delivery {
    /// `max_dropped` is how many full-queue drops a recipient may accumulate
    /// before it is disconnected.
    pub fn new(registry: Registry, max_dropped: u64) -> Self {
        Self {
            registry,
            max_dropped,
        }
    }

    /// Send to everyone except `sender`; returns how many accepted it
    pub async fn broadcast(&self, sender: ConnectionId, msg: ServerMessage) -> usize {
        let recipients = self.registry.recipients(Some(sender)).await;
        self.fan_out(recipients, msg)
    }

    /// Send to one connection; false if it is not registered or refused
    pub async fn deliver_to(&self, id: ConnectionId, msg: ServerMessage) -> bool {
        match self.registry.outbox(id).await {
            Some(outbox) => self.send(&outbox, msg),
            None => {
                debug!("Delivery to unregistered connection {} skipped", id);
                false
            }
        }
    }

    /// Resolve `target` by name and deliver `[Private] from: body`
    ///
    /// An unknown target gets exactly one not-found notice back to the
    /// sender. Returns whether the target was found.
    pub async fn deliver_private(
        &self,
        from_id: ConnectionId,
        from_name: &str,
        target: &str,
        body: &str,
    ) -> bool {
        match self.registry.find_by_name(target).await {
            Some(outbox) => {
                self.send(
                    &outbox,
                    ServerMessage::Private {
                        from: from_name.to_string(),
                        body: body.to_string(),
                    },
                );
                true
            }
            None => {
                self.deliver_to(
                    from_id,
                    ServerMessage::UserNotFound {
                        name: target.to_string(),
                    },
                )
                .await;
                false
            }
        }
    }

    fn fan_out(&self, recipients: Vec<Outbox>, msg: ServerMessage) -> usize {
        let mut delivered = 0;
        for outbox in &recipients {
            if self.send(outbox, msg.clone()) {
                delivered += 1;
            }
        }
        debug!(
            "Broadcast delivered to {}/{} recipients",
            delivered,
            recipients.len()
        );
        delivered
    }

    /// Queue one message, applying the failure policy
    ///
    /// Closed queue: the recipient is gone, cancel its session.
    /// Full queue: drop this message; past the drop budget, disconnect.
    fn send(&self, outbox: &Outbox, msg: ServerMessage) -> bool {
        match outbox.deliver(msg) {
            Ok(()) => true,
            Err(SendError::ChannelClosed) => {
                warn!("Connection {} outbound queue closed, removing", outbox.id());
                outbox.disconnect();
                false
            }
            Err(SendError::QueueFull) => {
                let drops = outbox.dropped();
                if drops >= self.max_dropped {
                    warn!(
                        "Connection {} dropped {} messages, disconnecting slow client",
                        outbox.id(),
                        drops
                    );
                    outbox.disconnect();
                } else {
                    warn!(
                        "Connection {} outbound queue full, message dropped ({} total)",
                        outbox.id(),
                        drops
                    );
                }
                false
            }
        }
    }
}
