//! Line-based multi-user TCP chat server
//!
//! Clients connect over TCP and exchange newline-terminated UTF-8 lines.
//! Plain lines are broadcast to everyone else; a handful of slash commands
//! list users, rename, send private messages and leave.
//!
//! # Architecture
//! - `ChatServer` owns the listener and spawns one task per connection
//! - `Registry` is the shared connection → user map behind one `RwLock`
//! - `Delivery` snapshots recipients and queues messages into each
//!   connection's bounded outbox; a writer task per connection drains it
//! - `IdleTimer` disconnects sessions that stay silent too long
//! - Registry changes are logged through a bounded, non-blocking event queue
//!
//! # Example
//! ```ignore
//! use line_chat::{ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), line_chat::AppError> {
//!     let server = ChatServer::bind(ServerConfig::default()).await?;
//!     let shutdown = server.shutdown_token();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.cancel();
//!     });
//!     server.run().await
//! }
//! ```

pub mod client;
pub mod command;
pub mod config;
pub mod delivery;
pub mod error;
pub mod event;
pub mod handler;
pub mod input;
pub mod message;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;
pub mod user;

// Re-export main types for convenience
pub use client::ChatClient;
pub use command::{Command, CommandError};
pub use config::ServerConfig;
pub use delivery::Delivery;
pub use error::{AppError, SendError};
pub use event::{EventSender, UserEvent, UserEventKind};
pub use handler::handle_connection;
pub use input::LineInput;
pub use message::ServerMessage;
pub use registry::Registry;
pub use server::{ChatServer, ServerContext};
pub use session::{CloseReason, IdleTimer, SessionState};
pub use types::ConnectionId;
pub use user::{Outbox, User};
