//! TCP connection handler
//!
//! One task per connection: registers the user, reads lines one at a time,
//! dispatches commands, and tears the session down. Outbound traffic goes
//! through a separate writer task fed by the user's outbox.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::error::AppError;
use crate::event::UserEventKind;
use crate::message::ServerMessage;
use crate::server::ServerContext;
use crate::session::{CloseReason, IdleTimer, Lifecycle, SessionState};
use crate::types::ConnectionId;
use crate::user::{Outbox, User};

/// How long teardown waits for queued lines to reach the socket
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

enum Flow {
    Continue,
    Exit,
}

/// Handle a new TCP connection
///
/// Runs the whole session and returns why it ended. Errors here are
/// local to this connection.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: ServerContext,
    shutdown: CancellationToken,
) -> Result<CloseReason, AppError> {
    stream.set_nodelay(true)?;
    let (reader, writer) = stream.into_split();
    let mut lines = FramedRead::new(
        reader,
        LinesCodec::new_with_max_length(ctx.config.max_line_length),
    );
    let sink = FramedWrite::new(writer, LinesCodec::new());

    let id = ConnectionId::new();
    let mut lifecycle = Lifecycle::new(id);
    let session = shutdown.child_token();

    // Channel for server -> client messages
    let (msg_tx, msg_rx) = mpsc::channel::<ServerMessage>(ctx.config.outbound_buffer);
    let outbox = Outbox::new(id, msg_tx, session.clone());
    let idle = IdleTimer::start(ctx.config.idle_timeout(), outbox.clone());
    let mut write_task = tokio::spawn(write_loop(id, sink, msg_rx, session.clone()));

    ctx.registry
        .add(User::new(peer, outbox.clone(), idle.clone()))
        .await;
    lifecycle.advance(SessionState::Active);
    info!("Client {} connected from {}", id, peer);

    // Notify others first: once the welcome arrives, every join notice is queued
    let mut name = peer.to_string();
    ctx.delivery
        .broadcast(id, ServerMessage::Joined { name: name.clone() })
        .await;
    if let Err(e) = outbox.deliver(ServerMessage::Welcome) {
        debug!("Welcome for {} not queued: {}", id, e);
    }

    let reason = read_loop(&ctx, id, &mut name, &mut lines, &idle, &session, &shutdown).await;

    lifecycle.advance(SessionState::Closing);
    let farewell = match reason {
        CloseReason::Exit => Some(ServerMessage::Goodbye),
        CloseReason::Shutdown => Some(ServerMessage::Shutdown),
        _ => None,
    };
    if let Some(msg) = farewell {
        if let Err(e) = outbox.deliver(msg) {
            debug!("Farewell for {} not queued: {}", id, e);
        }
    }
    session.cancel();

    if let Some(user) = ctx.registry.remove(id).await {
        name = user.name().to_string();
    }
    if reason != CloseReason::Shutdown {
        ctx.delivery
            .broadcast(id, ServerMessage::Left { name: name.clone() })
            .await;
    }

    // The writer stops once every outbox clone is gone
    drop(outbox);
    drop(idle);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut write_task)
        .await
        .is_err()
    {
        warn!("Writer for {} did not drain in time, aborting", id);
        write_task.abort();
    }
    drop(lines);

    lifecycle.advance(SessionState::Closed);
    info!("Client {} ({}) disconnected: {}", id, name, reason);
    Ok(reason)
}

/// Read and dispatch lines until the session ends
async fn read_loop(
    ctx: &ServerContext,
    id: ConnectionId,
    name: &mut String,
    lines: &mut FramedRead<OwnedReadHalf, LinesCodec>,
    idle: &IdleTimer,
    session: &CancellationToken,
    shutdown: &CancellationToken,
) -> CloseReason {
    loop {
        let next = tokio::select! {
            _ = session.cancelled() => {
                return if shutdown.is_cancelled() {
                    CloseReason::Shutdown
                } else if idle.expired() {
                    CloseReason::IdleTimeout
                } else {
                    CloseReason::Dropped
                };
            }
            next = lines.next() => next,
        };

        match next {
            None => return CloseReason::EndOfStream,
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                warn!("Client {} sent an over-long line", id);
                ctx.delivery
                    .deliver_to(
                        id,
                        ServerMessage::LineTooLong {
                            max: ctx.config.max_line_length,
                        },
                    )
                    .await;
                return CloseReason::ReadError;
            }
            Some(Err(e)) => {
                warn!("Read error for {}: {}", id, e);
                return CloseReason::ReadError;
            }
            Some(Ok(line)) => {
                // Any line counts as activity, blank ones included
                idle.touch();
                if line.trim().is_empty() {
                    continue;
                }
                if let Flow::Exit = handle_line(ctx, id, name, &line).await {
                    return CloseReason::Exit;
                }
            }
        }
    }
}

/// Interpret one non-empty line
async fn handle_line(ctx: &ServerContext, id: ConnectionId, name: &mut String, line: &str) -> Flow {
    let command = match Command::parse(line) {
        Ok(command) => command,
        Err(e) => {
            debug!("Usage error from {}: {}", id, e);
            ctx.delivery.deliver_to(id, e.into()).await;
            return Flow::Continue;
        }
    };

    match command {
        Command::Exit => return Flow::Exit,
        Command::ListUsers => {
            ctx.registry.note(id, UserEventKind::List).await;
            let names = ctx.registry.list().await;
            ctx.delivery
                .deliver_to(id, ServerMessage::UserList(names))
                .await;
        }
        Command::Rename { name: new } => {
            if let Some(old) = ctx.registry.rename(id, &new).await {
                *name = new.clone();
                ctx.delivery
                    .broadcast(
                        id,
                        ServerMessage::Renamed {
                            old,
                            new: new.clone(),
                        },
                    )
                    .await;
                ctx.delivery
                    .deliver_to(id, ServerMessage::RenameConfirmed { name: new })
                    .await;
            }
        }
        Command::PrivateMessage { target, body } => {
            ctx.delivery
                .deliver_private(id, name.as_str(), &target, &body)
                .await;
        }
        Command::PlainMessage(body) => {
            ctx.registry.note(id, UserEventKind::Message).await;
            ctx.delivery
                .broadcast(
                    id,
                    ServerMessage::Chat {
                        from: name.clone(),
                        body,
                    },
                )
                .await;
        }
    }
    Flow::Continue
}

/// Drain the outbox into the socket until every sender is dropped
async fn write_loop(
    id: ConnectionId,
    mut sink: FramedWrite<OwnedWriteHalf, LinesCodec>,
    mut msg_rx: mpsc::Receiver<ServerMessage>,
    session: CancellationToken,
) {
    while let Some(msg) = msg_rx.recv().await {
        if let Err(e) = sink.send(msg.to_string()).await {
            debug!("Write to {} failed: {}", id, e);
            session.cancel();
            break;
        }
    }
    let _ = SinkExt::<String>::close(&mut sink).await;
    debug!("Write task ended for {}", id);
}
