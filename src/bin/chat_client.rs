//! Interactive client for the line chat server
//!
//! Usage: chat_client [host:port]

use std::env;

use tracing_subscriber::EnvFilter;

use line_chat::client::DEFAULT_SERVER_ADDR;
use line_chat::{ChatClient, LineInput};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Quiet by default so log lines do not mix with chat output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("line_chat=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string());

    let mut input = LineInput::stdin();
    let mut stdout = tokio::io::stdout();
    let name = input
        .prompt(&mut stdout, "Enter your name: ")
        .await?
        .filter(|name| !name.is_empty());

    let client = ChatClient::connect(&addr).await?;
    println!("Connected to {addr}. Type /users, /rename <name>, /private <user> <text> or /exit.");

    client.run(&mut input, stdout, name.as_deref()).await?;
    Ok(())
}
