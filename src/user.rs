//! User and outbox definitions
//!
//! A `User` is the registry's record of one connection. Its `Outbox` is
//! the only way other tasks reach that connection: a bounded queue read by
//! the connection's writer task plus the session's cancellation token.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::session::IdleTimer;
use crate::types::ConnectionId;

/// Handle for queueing messages to one connection
///
/// Cheap to clone; the registry hands out clones as delivery snapshots.
#[derive(Debug, Clone)]
pub struct Outbox {
    id: ConnectionId,
    sender: mpsc::Sender<ServerMessage>,
    session: CancellationToken,
    dropped: Arc<AtomicU64>,
}

impl Outbox {
    pub fn new(
        id: ConnectionId,
        sender: mpsc::Sender<ServerMessage>,
        session: CancellationToken,
    ) -> Self {
        Self {
            id,
            sender,
            session,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a message without waiting
    ///
    /// A full queue drops the message and bumps the drop counter.
    pub fn deliver(&self, msg: ServerMessage) -> Result<(), SendError> {
        match self.sender.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(SendError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::ChannelClosed),
        }
    }

    /// Messages dropped so far because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Ask the connection's worker to tear the session down
    pub fn disconnect(&self) {
        self.session.cancel();
    }

    pub fn is_disconnected(&self) -> bool {
        self.session.is_cancelled()
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.session.cancelled()
    }
}

/// Connected user
///
/// Holds the display name, the immutable peer address, the outbox and the
/// inactivity timer. Owned by the registry once added.
#[derive(Debug)]
pub struct User {
    /// Registry key
    pub id: ConnectionId,
    name: String,
    address: SocketAddr,
    outbox: Outbox,
    idle: IdleTimer,
}

impl User {
    /// Create a user whose display name starts as the peer address
    pub fn new(address: SocketAddr, outbox: Outbox, idle: IdleTimer) -> Self {
        Self {
            id: outbox.id(),
            name: address.to_string(),
            address,
            outbox,
            idle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the display name, returning the previous one
    pub fn set_name(&mut self, name: String) -> String {
        std::mem::replace(&mut self.name, name)
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn idle(&self) -> &IdleTimer {
        &self.idle
    }
}
