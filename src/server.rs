//! Chat server: listener, accept loop and shutdown
//!
//! Owns the listening socket and the shared state every connection task
//! gets a clone of. Each accepted connection runs in its own task; the
//! accept loop itself never dies on a per-connection error.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::delivery::Delivery;
use crate::error::AppError;
use crate::event::{spawn_event_logger, EventSender};
use crate::handler::handle_connection;
use crate::registry::Registry;

/// Pause after a failed accept so a persistent error cannot spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// How long shutdown waits for the event logger to flush
const EVENT_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// State shared by every connection task
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub config: Arc<ServerConfig>,
    pub registry: Registry,
    pub delivery: Delivery,
}

/// The chat server
///
/// `bind` reserves the address, `run` accepts until the shutdown token is
/// cancelled and then waits for every session to close.
pub struct ChatServer {
    listener: TcpListener,
    ctx: ServerContext,
    shutdown: CancellationToken,
    event_logger: JoinHandle<()>,
}

impl ChatServer {
    /// Bind the listening socket; failure here is fatal
    pub async fn bind(config: ServerConfig) -> Result<Self, AppError> {
        config.validate()?;
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| AppError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!("Chat server listening on {}", listener.local_addr()?);

        let (events, events_rx) = EventSender::channel(config.event_buffer);
        let event_logger = spawn_event_logger(events_rx);
        let registry = Registry::new(events);
        let delivery = Delivery::new(registry.clone(), config.max_dropped_messages);

        Ok(Self {
            listener,
            ctx: ServerContext {
                config: Arc::new(config),
                registry,
                delivery,
            },
            shutdown: CancellationToken::new(),
            event_logger,
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Token that stops the server when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept connections until shutdown, then wait for all sessions
    pub async fn run(self) -> Result<(), AppError> {
        let ChatServer {
            listener,
            ctx,
            shutdown,
            mut event_logger,
        } = self;
        let mut workers = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("New TCP connection from {}", peer);
                        let ctx = ctx.clone();
                        let shutdown = shutdown.clone();
                        workers.spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, ctx, shutdown).await {
                                error!("Connection handler error for {}: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = joined {
                        error!("Connection task failed: {}", e);
                    }
                }
            }
        }

        drop(listener);
        info!("Shutting down, closing {} sessions", workers.len());
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("Connection task failed: {}", e);
            }
        }
        debug!("Users still registered: {}", ctx.registry.len().await);

        // The logger ends once the last registry clone is gone
        drop(ctx);
        if tokio::time::timeout(EVENT_FLUSH_TIMEOUT, &mut event_logger)
            .await
            .is_err()
        {
            event_logger.abort();
        }
        info!("Chat server stopped");
        Ok(())
    }
}
