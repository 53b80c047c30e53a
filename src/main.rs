//! Room chat server - Entry Point
//!
//! Parses flags, starts the ChatServer actor and the TCP accept loop.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use roomchat::{serve, ChatServer, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=roomchat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("roomchat=info")),
        )
        .init();

    let config = Config::parse();

    // Failing to bind is the only fatal error
    let listener = TcpListener::bind(&config.addr).await?;
    info!("Chat server listening on {}", config.addr);

    let server = ChatServer::spawn(config.limits());
    info!("ChatServer actor started");

    serve(listener, server, Arc::new(config)).await;
    Ok(())
}
