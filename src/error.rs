//! Error types for the chat server
//!
//! Defines application-level errors and mailbox delivery errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Application-level errors
///
/// Covers both fatal errors (session termination) and
/// recoverable errors (reported to the client as a `SYSTEM` notice).
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error, including over-long lines (fatal)
    #[error("Line codec error: {0}")]
    Lines(#[from] LinesCodecError),

    /// The server actor is gone (fatal - internal channel broken)
    #[error("Server actor closed")]
    ServerClosed,

    /// The client hung up
    #[error("Connection closed")]
    ConnectionClosed,

    /// A handshake prompt went unanswered for too long
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// Username already registered
    #[error("Username taken: {0}")]
    UsernameTaken(String),

    /// Nickname already in use
    #[error("Nickname taken: {0}")]
    NicknameTaken(String),

    /// Password did not match the stored credential
    #[error("Wrong password")]
    WrongPassword,

    /// Another connection is already draining this account's mailbox
    #[error("Account already connected: {0}")]
    AlreadyConnected(String),

    /// Operation needs an attached mailbox but the account has none
    #[error("Account not connected: {0}")]
    NotConnected(String),

    /// No account with the given username
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Account exists but has no active connection
    #[error("User offline: {0}")]
    UserOffline(String),

    /// No room with the given name
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Unknown PRIVMSG target kind
    #[error("Invalid option")]
    InvalidOption,
}

impl AppError {
    /// Whether the session survives this error
    ///
    /// Recoverable errors are rendered back to the requester and the
    /// operation is simply not applied.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::NicknameTaken(_)
                | AppError::UserNotFound(_)
                | AppError::UserOffline(_)
                | AppError::RoomNotFound(_)
                | AppError::InvalidOption
        )
    }
}

/// Mailbox delivery errors
///
/// Fan-out never waits on a mailbox, so both cases mean the message was dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The mailbox is at capacity (slow or stalled reader)
    #[error("Mailbox full")]
    MailboxFull,

    /// The receiving end of the mailbox has been closed
    #[error("Mailbox closed")]
    MailboxClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(AppError::NicknameTaken("bob".into()).is_recoverable());
        assert!(AppError::RoomNotFound("x".into()).is_recoverable());
        assert!(AppError::InvalidOption.is_recoverable());
        assert!(!AppError::ServerClosed.is_recoverable());
        assert!(!AppError::ConnectionClosed.is_recoverable());
    }
}
