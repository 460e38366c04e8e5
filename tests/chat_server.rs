//! End-to-end tests over loopback TCP

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;

use line_chat::{AppError, ChatClient, ChatServer, LineInput, ServerConfig};

const RECV_TIMEOUT: Duration = Duration::from_secs(3);

struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<Result<(), AppError>>,
}

async fn start_server(idle_timeout_ms: u64) -> TestServer {
    start_with(ServerConfig {
        port: 0,
        idle_timeout_ms,
        ..ServerConfig::default()
    })
    .await
}

async fn start_with(config: ServerConfig) -> TestServer {
    let server = ChatServer::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = server.shutdown_token();
    let handle = tokio::spawn(server.run());
    TestServer {
        addr,
        shutdown,
        handle,
    }
}

struct TestClient {
    lines: FramedRead<OwnedReadHalf, LinesCodec>,
    sink: FramedWrite<OwnedWriteHalf, LinesCodec>,
}

impl TestClient {
    /// Connect and consume the welcome line
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        let mut client = Self {
            lines: FramedRead::new(reader, LinesCodec::new()),
            sink: FramedWrite::new(writer, LinesCodec::new()),
        };
        assert_eq!(client.recv().await.as_deref(), Some("Welcome to the chat!"));
        client
    }

    async fn named(addr: SocketAddr, name: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.send(&format!("/rename {name}")).await;
        client
            .wait_for(&format!("You are now known as {name}"))
            .await;
        client
    }

    async fn send(&mut self, line: &str) {
        self.sink.send(line).await.unwrap();
    }

    /// Next line, `None` at end of stream
    async fn recv(&mut self) -> Option<String> {
        match tokio::time::timeout(RECV_TIMEOUT, self.lines.next()).await {
            Ok(Some(Ok(line))) => Some(line),
            Ok(Some(Err(_))) | Ok(None) => None,
            Err(_) => panic!("timed out waiting for a line"),
        }
    }

    /// Read until `expected` arrives; returns the lines skipped on the way
    async fn wait_for(&mut self, expected: &str) -> Vec<String> {
        let mut skipped = Vec::new();
        loop {
            match self.recv().await {
                Some(line) if line == expected => return skipped,
                Some(line) => skipped.push(line),
                None => panic!("connection closed before {expected:?}; got {skipped:?}"),
            }
        }
    }

    /// Round-trip `/users`; returns everything queued before the reply and
    /// the reply itself
    async fn drain(&mut self) -> (Vec<String>, String) {
        self.send("/users").await;
        let mut before = Vec::new();
        loop {
            match self.recv().await {
                Some(line) if line.starts_with("Online users: ") => return (before, line),
                Some(line) => before.push(line),
                None => panic!("connection closed during drain; got {before:?}"),
            }
        }
    }
}

#[tokio::test]
async fn test_broadcast_excludes_sender() {
    let server = start_server(60_000).await;
    let mut a = TestClient::named(server.addr, "A").await;
    let mut b = TestClient::named(server.addr, "B").await;
    let mut c = TestClient::named(server.addr, "C").await;
    a.drain().await;
    b.drain().await;
    c.drain().await;

    a.send("hi").await;

    assert_eq!(b.recv().await.as_deref(), Some("A: hi"));
    assert_eq!(c.recv().await.as_deref(), Some("A: hi"));
    assert!(a.drain().await.0.is_empty());
    assert!(b.drain().await.0.is_empty());
    assert!(c.drain().await.0.is_empty());
}

#[tokio::test]
async fn test_rename_then_chat() {
    let server = start_server(60_000).await;
    let mut b = TestClient::connect(server.addr).await;
    let mut alice = TestClient::connect(server.addr).await;

    alice.send("/rename Alice").await;
    alice.send("hello").await;

    let skipped = b.wait_for("Alice: hello").await;
    assert!(skipped.iter().any(|l| l.ends_with("has changed their name to Alice")));
    assert_eq!(
        alice.recv().await.as_deref(),
        Some("You are now known as Alice")
    );
}

#[tokio::test]
async fn test_private_message() {
    let server = start_server(60_000).await;
    let mut alice = TestClient::named(server.addr, "Alice").await;
    let mut bob = TestClient::named(server.addr, "Bob").await;
    let mut carol = TestClient::named(server.addr, "Carol").await;
    alice.drain().await;
    bob.drain().await;
    carol.drain().await;

    alice.send("/private Bob secret").await;

    assert_eq!(bob.recv().await.as_deref(), Some("[Private] Alice: secret"));
    assert!(alice.drain().await.0.is_empty());
    assert!(bob.drain().await.0.is_empty());
    assert!(carol.drain().await.0.is_empty());
}

#[tokio::test]
async fn test_private_to_unknown_user() {
    let server = start_server(60_000).await;
    let mut alice = TestClient::named(server.addr, "Alice").await;
    let mut bob = TestClient::named(server.addr, "Bob").await;
    let (_, before) = alice.drain().await;
    bob.drain().await;

    alice.send("/private Zed hello").await;

    let (notices, after) = alice.drain().await;
    assert_eq!(notices, vec!["User Zed not found".to_string()]);
    assert_eq!(before, after);
    assert_eq!(after, "Online users: Alice, Bob");
    assert!(bob.drain().await.0.is_empty());
}

#[tokio::test]
async fn test_usage_errors_keep_session() {
    let server = start_server(60_000).await;
    let mut alice = TestClient::named(server.addr, "Alice").await;

    alice.send("/rename ").await;
    assert_eq!(
        alice.recv().await.as_deref(),
        Some("Invalid name: name must not be empty")
    );

    alice.send("/private Bob").await;
    assert_eq!(
        alice.recv().await.as_deref(),
        Some("Usage: /private <user> <message>")
    );

    let (before, users) = alice.drain().await;
    assert!(before.is_empty());
    assert_eq!(users, "Online users: Alice");
}

#[tokio::test]
async fn test_blank_lines_ignored() {
    let server = start_server(60_000).await;
    let mut alice = TestClient::named(server.addr, "Alice").await;
    let mut bob = TestClient::named(server.addr, "Bob").await;
    alice.drain().await;

    bob.send("").await;
    bob.send("   ").await;
    bob.drain().await;

    assert!(alice.drain().await.0.is_empty());
}

#[tokio::test]
async fn test_exit_notifies_others() {
    let server = start_server(60_000).await;
    let mut alice = TestClient::named(server.addr, "Alice").await;
    let mut bob = TestClient::named(server.addr, "Bob").await;
    alice.drain().await;

    bob.send("/exit").await;
    assert_eq!(bob.recv().await.as_deref(), Some("Goodbye!"));
    assert_eq!(bob.recv().await, None);

    alice.wait_for("Bob has left the chat").await;
    let (_, users) = alice.drain().await;
    assert_eq!(users, "Online users: Alice");
}

#[tokio::test]
async fn test_disconnect_without_exit() {
    let server = start_server(60_000).await;
    let mut alice = TestClient::named(server.addr, "Alice").await;
    let bob = TestClient::named(server.addr, "Bob").await;
    alice.drain().await;

    drop(bob);

    alice.wait_for("Bob has left the chat").await;
    let (_, users) = alice.drain().await;
    assert_eq!(users, "Online users: Alice");
}

#[tokio::test]
async fn test_idle_session_removed_alone() {
    let server = start_server(400).await;
    let mut idle = TestClient::named(server.addr, "Idle").await;
    let mut busy = TestClient::named(server.addr, "Busy").await;

    // Keep one session active well past the idle window
    for _ in 0..10 {
        busy.drain().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    idle.wait_for("You have been disconnected for inactivity (400 ms idle)")
        .await;
    assert_eq!(idle.recv().await, None);

    let (before, users) = busy.drain().await;
    assert_eq!(users, "Online users: Busy");
    assert!(!before
        .iter()
        .any(|l| l.starts_with("You have been disconnected")));
}

#[tokio::test]
async fn test_blank_lines_keep_session_alive() {
    let server = start_server(400).await;
    let mut keeper = TestClient::named(server.addr, "Keeper").await;
    let mut watcher = TestClient::named(server.addr, "Watcher").await;

    for _ in 0..10 {
        keeper.send("").await;
        watcher.send("").await;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let (before, users) = keeper.drain().await;
    assert!(!before
        .iter()
        .any(|l| l.starts_with("You have been disconnected")));
    assert_eq!(users, "Online users: Keeper, Watcher");
}

#[tokio::test]
async fn test_over_long_line_closes_session() {
    let server = start_with(ServerConfig {
        port: 0,
        max_line_length: 16,
        ..ServerConfig::default()
    })
    .await;
    let mut alice = TestClient::named(server.addr, "Alice").await;
    let mut bob = TestClient::named(server.addr, "Bob").await;
    alice.drain().await;

    bob.send(&"x".repeat(40)).await;
    assert_eq!(
        bob.recv().await.as_deref(),
        Some("Line too long (max 16 bytes)")
    );
    assert_eq!(bob.recv().await, None);

    let skipped = alice.wait_for("Bob has left the chat").await;
    assert!(!skipped.iter().any(|l| l.contains("xxxx")));
    let (_, users) = alice.drain().await;
    assert_eq!(users, "Online users: Alice");
}

#[tokio::test]
async fn test_invalid_utf8_closes_only_that_session() {
    let server = start_server(60_000).await;
    let mut alice = TestClient::named(server.addr, "Alice").await;
    let mut bob = TestClient::named(server.addr, "Bob").await;
    alice.drain().await;

    bob.sink.get_mut().write_all(b"\xff\xfe bad\n").await.unwrap();
    assert_eq!(bob.recv().await, None);

    alice.wait_for("Bob has left the chat").await;
    let (_, users) = alice.drain().await;
    assert_eq!(users, "Online users: Alice");

    let mut carol = TestClient::named(server.addr, "Carol").await;
    carol.send("still here").await;
    alice.wait_for("Carol: still here").await;
}

#[tokio::test]
async fn test_shutdown_closes_sessions() {
    let server = start_server(60_000).await;
    let mut alice = TestClient::named(server.addr, "Alice").await;
    let mut bob = TestClient::named(server.addr, "Bob").await;

    server.shutdown.cancel();

    alice.wait_for("Server is shutting down").await;
    assert_eq!(alice.recv().await, None);
    bob.wait_for("Server is shutting down").await;
    assert_eq!(bob.recv().await, None);

    let result = tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("server did not stop")
        .unwrap();
    assert!(result.is_ok());
    assert!(TcpStream::connect(server.addr).await.is_err());
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let server = start_server(60_000).await;
    let config = ServerConfig {
        host: server.addr.ip().to_string(),
        port: server.addr.port(),
        ..ServerConfig::default()
    };
    match ChatServer::bind(config).await {
        Err(AppError::Bind { addr, .. }) => assert_eq!(addr, server.addr.to_string()),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("second bind succeeded"),
    }
}

#[tokio::test]
async fn test_interactive_client_session() {
    let server = start_server(60_000).await;
    let mut observer = TestClient::named(server.addr, "Observer").await;

    let (output, mut printed) = tokio::io::duplex(64 * 1024);
    let mut input = LineInput::new(&b"hello\n\n/exit\n"[..]);
    let client = ChatClient::connect(&server.addr.to_string()).await.unwrap();
    client.run(&mut input, output, Some("Alice")).await.unwrap();

    let mut text = String::new();
    printed.read_to_string(&mut text).await.unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.first(), Some(&"Welcome to the chat!"));
    assert!(lines.contains(&"You are now known as Alice"));
    assert_eq!(lines.last(), Some(&"Goodbye!"));

    observer.wait_for("Alice: hello").await;
    observer.wait_for("Alice has left the chat").await;
}
