//! Line chat server - Entry Point
//!
//! Loads configuration, binds the listener and runs until Ctrl-C.

use std::env;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use line_chat::config::CONFIG_ENV;
use line_chat::{ChatServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=line_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("line_chat=info")),
        )
        .init();

    // Config file from LINE_CHAT_CONFIG, otherwise defaults
    let mut config = match env::var(CONFIG_ENV) {
        Ok(path) => {
            info!("Loading configuration from {}", path);
            ServerConfig::load(&path)?
        }
        Err(_) => ServerConfig::default(),
    };

    // Bind address from command line overrides the file
    if let Some(addr) = env::args().nth(1) {
        config.set_bind_addr(&addr)?;
    }

    let server = ChatServer::bind(config).await?;

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await?;
    Ok(())
}
