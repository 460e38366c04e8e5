//! Interactive chat client
//!
//! Forwards input lines to the server and copies every server line to an
//! output sink until the user sends `/exit` or the server hangs up.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::input::LineInput;

/// Server address used when none is given
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:30001";

/// How long to keep printing after `/exit` while the server says goodbye
const CLOSE_WAIT: Duration = Duration::from_secs(2);

/// A connected client
pub struct ChatClient {
    stream: TcpStream,
}

impl ChatClient {
    pub async fn connect(addr: &str) -> Result<Self, AppError> {
        let stream = TcpStream::connect(addr).await?;
        debug!("Connected to {}", addr);
        Ok(Self { stream })
    }

    /// Run the session
    ///
    /// If `name` is given, `/rename <name>` is sent first. Returns when the
    /// user sends `/exit`, input ends, or the server closes the connection.
    pub async fn run<R, W>(
        self,
        input: &mut LineInput<R>,
        output: W,
        name: Option<&str>,
    ) -> Result<(), AppError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (reader, writer) = self.stream.into_split();
        let mut incoming = FramedRead::new(reader, LinesCodec::new());
        let mut outgoing = FramedWrite::new(writer, LinesCodec::new());

        if let Some(name) = name {
            outgoing.send(format!("/rename {name}")).await?;
        }

        let mut receive = tokio::spawn(async move {
            let mut output = output;
            while let Some(line) = incoming.next().await {
                let line = line?;
                output.write_all(line.as_bytes()).await?;
                output.write_all(b"\n").await?;
                output.flush().await?;
            }
            Ok::<(), AppError>(())
        });

        loop {
            tokio::select! {
                received = &mut receive => {
                    debug!("Server closed the connection");
                    return received.map_err(|e| AppError::Io(std::io::Error::other(e)))?;
                }
                line = input.read_trimmed() => {
                    let Some(line) = line? else {
                        break;
                    };
                    if line.is_empty() {
                        continue;
                    }
                    outgoing.send(line.as_str()).await?;
                    if line == "/exit" {
                        break;
                    }
                }
            }
        }

        // Half-close so the server sees end of stream, then print what is left
        let _ = SinkExt::<String>::close(&mut outgoing).await;
        match tokio::time::timeout(CLOSE_WAIT, &mut receive).await {
            Ok(received) => received.map_err(|e| AppError::Io(std::io::Error::other(e)))?,
            Err(_) => {
                warn!("Server did not close the connection, giving up");
                receive.abort();
                Ok(())
            }
        }
    }
}
