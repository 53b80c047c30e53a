//! Multi-room TCP Chat Server Library
//!
//! A line-based chat server built on tokio using the Actor pattern for all
//! shared state.
//!
//! # Features
//! - Account registration and password login over a text handshake
//! - Globally unique nicknames with `NICK`
//! - Named rooms created on first `JOIN`
//! - Room broadcast and direct messages (`PRIVMSG USER` / `PRIVMSG CHAN`)
//! - Best-effort fan-out: a stalled client only loses its own messages
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` owns the account directory and the room table
//! - Each `Room` is its own actor owning its member list
//! - Each connection runs a `Session` that only submits requests and drains
//!   its own mailbox
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use roomchat::{serve, ChatServer, Config};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::default();
//!     let listener = TcpListener::bind(&config.addr).await.unwrap();
//!     let server = ChatServer::spawn(config.limits());
//!     serve(listener, server, Arc::new(config)).await;
//! }
//! ```

pub mod account;
pub mod config;
pub mod directory;
pub mod error;
pub mod handler;
pub mod handshake;
pub mod listener;
pub mod message;
pub mod protocol;
pub mod room;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use account::{Account, AccountView, Mailbox, Member, MemberView};
pub use config::{Config, Limits};
pub use directory::Directory;
pub use error::{AppError, DeliveryError};
pub use handler::handle_connection;
pub use listener::serve;
pub use message::{ChatMessage, Command};
pub use room::{Room, RoomHandle};
pub use server::{ChatServer, ServerHandle};
pub use types::{ConnectionId, RoomName, LOBBY, SYSTEM_SENDER};
