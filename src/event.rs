//! User events
//!
//! Registry mutations and a few handler actions emit a `UserEvent` for the
//! log. Emission never waits: the queue is bounded and a full queue drops
//! the event with a warning. Nothing makes decisions based on these.

use std::fmt;
use std::net::SocketAddr;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::types::ConnectionId;

/// Event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserEventKind {
    Join,
    Leave,
    Message,
    List,
    Rename,
}

impl fmt::Display for UserEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UserEventKind::Join => "join",
            UserEventKind::Leave => "leave",
            UserEventKind::Message => "message",
            UserEventKind::List => "users",
            UserEventKind::Rename => "rename",
        };
        f.write_str(text)
    }
}

/// Snapshot of the user an event is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEvent {
    pub kind: UserEventKind,
    pub id: ConnectionId,
    pub name: String,
    pub address: SocketAddr,
}

/// Fire-and-forget sending side of the event queue
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<UserEvent>,
}

impl EventSender {
    /// Create a sender and the receiver that should be passed to
    /// [`spawn_event_logger`]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<UserEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue an event; never waits
    pub fn emit(&self, event: UserEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    "Event queue full, dropping {} event for {}",
                    event.kind, event.name
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Event logger stopped, event discarded");
            }
        }
    }
}

/// Log every event until all senders are dropped
pub fn spawn_event_logger(mut rx: mpsc::Receiver<UserEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event.kind {
                UserEventKind::Join => {
                    info!("{} joined the chat from {}", event.name, event.address)
                }
                UserEventKind::Leave => info!("{} left the chat", event.name),
                UserEventKind::Message => debug!("{} sent a message", event.name),
                UserEventKind::List => debug!("{} requested the list of users", event.name),
                UserEventKind::Rename => info!("{} renamed ({})", event.name, event.id),
            }
        }
        debug!("Event logger stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: UserEventKind, name: &str) -> UserEvent {
        UserEvent {
            kind,
            id: ConnectionId::new(),
            name: name.to_string(),
            address: "127.0.0.1:4000".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_emit_delivers_in_order() {
        let (events, mut rx) = EventSender::channel(4);
        events.emit(event(UserEventKind::Join, "a"));
        events.emit(event(UserEventKind::Leave, "a"));

        assert_eq!(rx.recv().await.unwrap().kind, UserEventKind::Join);
        assert_eq!(rx.recv().await.unwrap().kind, UserEventKind::Leave);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (events, mut rx) = EventSender::channel(1);
        events.emit(event(UserEventKind::Join, "a"));
        events.emit(event(UserEventKind::Rename, "b"));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.name, "a");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_queue_is_ignored() {
        let (events, rx) = EventSender::channel(1);
        drop(rx);
        events.emit(event(UserEventKind::Message, "a"));
    }

    #[tokio::test]
    async fn test_logger_ends_with_senders() {
        let (events, rx) = EventSender::channel(4);
        let logger = spawn_event_logger(rx);
        events.emit(event(UserEventKind::List, "a"));
        drop(events);
        logger.await.unwrap();
    }
}
