//! Error types for the chat server
//!
//! Defines application-level errors and outbound delivery errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Application-level errors
///
/// Everything here is fatal for whoever sees it: startup errors end the
/// process, connection errors end that one session.
#[derive(Debug, Error)]
pub enum AppError {
    /// Could not bind the listening socket (fatal at startup)
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be read or parsed
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error (invalid UTF-8 or IO underneath the codec)
    #[error("line codec error: {0}")]
    Lines(#[from] LinesCodecError),
}

/// Outbound delivery errors
///
/// Occurs when a message cannot be queued for a connection's writer task.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The writer task is gone (connection closed)
    #[error("Channel closed")]
    ChannelClosed,

    /// The outbound queue is full (slow reader)
    #[error("Outbound queue full")]
    QueueFull,
}
