//! Session lifecycle and inactivity timer

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::message::ServerMessage;
use crate::types::ConnectionId;
use crate::user::Outbox;

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

impl SessionState {
    /// Whether `next` is a legal successor of `self`
    ///
    /// `Connecting → Closing` covers shutdown before registration.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Active) | (Connecting, Closing) | (Active, Closing) | (Closing, Closed)
        )
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Exit,
    EndOfStream,
    ReadError,
    IdleTimeout,
    /// Disconnected by the delivery engine (queue closed or too many drops)
    Dropped,
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CloseReason::Exit => "client exit",
            CloseReason::EndOfStream => "end of stream",
            CloseReason::ReadError => "read error",
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::Dropped => "dropped by server",
            CloseReason::Shutdown => "server shutdown",
        };
        f.write_str(text)
    }
}

/// Tracks one connection's state and rejects illegal transitions
#[derive(Debug)]
pub struct Lifecycle {
    id: ConnectionId,
    state: SessionState,
}

impl Lifecycle {
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            state: SessionState::Connecting,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `next`; returns false (and stays put) if illegal
    pub fn advance(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!(
                "Session {}: illegal transition {:?} -> {:?}",
                self.id, self.state, next
            );
            return false;
        }
        debug!("Session {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
        true
    }
}

/// Per-user inactivity timer
///
/// A background task sleeps until the deadline held in a watch cell.
/// `touch` moves the deadline; the task only fires if, on waking, the
/// current deadline has really passed, so a touch racing with expiry
/// always wins. Firing queues an inactivity notice and cancels the session.
#[derive(Debug, Clone)]
pub struct IdleTimer {
    deadline: Arc<watch::Sender<Instant>>,
    window: Duration,
    task: AbortHandle,
    expired: Arc<AtomicBool>,
}

impl IdleTimer {
    /// Start a timer for the session behind `outbox`
    pub fn start(window: Duration, outbox: Outbox) -> Self {
        let (tx, rx) = watch::channel(Instant::now() + window);
        let expired = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_idle_timer(rx, window, outbox, Arc::clone(&expired)));
        Self {
            deadline: Arc::new(tx),
            window,
            task: task.abort_handle(),
            expired,
        }
    }

    /// Reset the idle window from now
    pub fn touch(&self) {
        self.deadline.send_replace(Instant::now() + self.window);
    }

    /// Stop the timer for good
    pub fn stop(&self) {
        self.task.abort();
    }

    /// Whether the timer fired
    pub fn expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }
}

async fn run_idle_timer(
    mut deadline: watch::Receiver<Instant>,
    window: Duration,
    outbox: Outbox,
    expired: Arc<AtomicBool>,
) {
    loop {
        let at = *deadline.borrow_and_update();
        tokio::select! {
            _ = outbox.cancelled() => return,
            changed = deadline.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            _ = time::sleep_until(at) => {
                if *deadline.borrow() > Instant::now() {
                    continue;
                }
                expired.store(true, Ordering::SeqCst);
                debug!("Connection {} idle for {:?}", outbox.id(), window);
                if let Err(e) = outbox.deliver(ServerMessage::Inactive { window }) {
                    debug!("Inactivity notice for {} not queued: {}", outbox.id(), e);
                }
                outbox.disconnect();
                return;
            }
        }
    }
}
