//! Server → client messages
//!
//! Every outbound line the server writes is one of these. The wire form is
//! the `Display` output followed by a newline (added by the line codec).

use std::fmt;
use std::time::Duration;

use crate::command::CommandError;

/// Server → Client message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Greeting for a freshly registered connection
    Welcome,
    /// Another user connected
    Joined { name: String },
    /// Another user disconnected
    Left { name: String },
    /// Public chat relay
    Chat { from: String, body: String },
    /// Private message relay
    Private { from: String, body: String },
    /// Reply to `/users`
    UserList(Vec<String>),
    /// Confirmation of the sender's own rename
    RenameConfirmed { name: String },
    /// Another user changed their name
    Renamed { old: String, new: String },
    /// Private message target does not exist
    UserNotFound { name: String },
    /// Malformed command input
    Usage(CommandError),
    /// Inbound line exceeded the configured limit
    LineTooLong { max: usize },
    /// Idle timeout fired for this session
    Inactive { window: Duration },
    /// Reply to `/exit`
    Goodbye,
    /// Server is stopping
    Shutdown,
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Welcome => write!(f, "Welcome to the chat!"),
            ServerMessage::Joined { name } => write!(f, "{name} has joined the chat"),
            ServerMessage::Left { name } => write!(f, "{name} has left the chat"),
            ServerMessage::Chat { from, body } => write!(f, "{from}: {body}"),
            ServerMessage::Private { from, body } => write!(f, "[Private] {from}: {body}"),
            ServerMessage::UserList(names) => write!(f, "Online users: {}", names.join(", ")),
            ServerMessage::RenameConfirmed { name } => write!(f, "You are now known as {name}"),
            ServerMessage::Renamed { old, new } => {
                write!(f, "{old} has changed their name to {new}")
            }
            ServerMessage::UserNotFound { name } => write!(f, "User {name} not found"),
            ServerMessage::Usage(err) => write!(f, "{err}"),
            ServerMessage::LineTooLong { max } => write!(f, "Line too long (max {max} bytes)"),
            ServerMessage::Inactive { window } => write!(
                f,
                "You have been disconnected for inactivity ({} idle)",
                HumanDuration(*window)
            ),
            ServerMessage::Goodbye => write!(f, "Goodbye!"),
            ServerMessage::Shutdown => write!(f, "Server is shutting down"),
        }
    }
}

/// Convert a usage error to a message for the offending client
impl From<CommandError> for ServerMessage {
    fn from(err: CommandError) -> Self {
        ServerMessage::Usage(err)
    }
}

/// Coarse duration formatting for notices
struct HumanDuration(Duration);

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        match secs {
            0 => write!(f, "{} ms", self.0.as_millis()),
            s if s % 60 == 0 && s / 60 == 1 => write!(f, "1 minute"),
            s if s % 60 == 0 => write!(f, "{} minutes", s / 60),
            1 => write!(f, "1 second"),
            s => write!(f, "{s} seconds"),
        }
    }
}
