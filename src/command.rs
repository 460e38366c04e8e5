//! Command interpreter
//!
//! Classifies one inbound line. Pure: no I/O and no shared state.

use thiserror::Error;

/// A classified inbound line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/exit`: leave the chat
    Exit,
    /// `/users`: list who is online
    ListUsers,
    /// `/rename <name>`
    Rename { name: String },
    /// `/private <user> <text>`
    PrivateMessage { target: String, body: String },
    /// Anything else, broadcast as-is
    PlainMessage(String),
}

/// Malformed command input, reported back to the sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Invalid name: name must not be empty")]
    InvalidName,

    #[error("Usage: /private <user> <message>")]
    PrivateUsage,
}

const EXIT: &str = "/exit";
const USERS: &str = "/users";
const RENAME: &str = "/rename ";
const PRIVATE: &str = "/private ";

impl Command {
    /// Classify a line with its terminator already stripped.
    ///
    /// Matching is literal and case-sensitive, checked in order:
    /// `/exit`, `/users`, `/rename `, `/private `, then plain text.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        if line == EXIT {
            return Ok(Command::Exit);
        }
        if line == USERS {
            return Ok(Command::ListUsers);
        }
        if let Some(rest) = line.strip_prefix(RENAME) {
            let name = rest.trim();
            if name.is_empty() {
                return Err(CommandError::InvalidName);
            }
            return Ok(Command::Rename {
                name: name.to_string(),
            });
        }
        if let Some(rest) = line.strip_prefix(PRIVATE) {
            let (target, body) = rest
                .trim_start()
                .split_once(char::is_whitespace)
                .ok_or(CommandError::PrivateUsage)?;
            let body = body.trim_start();
            if body.is_empty() {
                return Err(CommandError::PrivateUsage);
            }
            return Ok(Command::PrivateMessage {
                target: target.to_string(),
                body: body.to_string(),
            });
        }
        Ok(Command::PlainMessage(line.to_string()))
    }
}
