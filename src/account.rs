//! Account records and delivery endpoints
//!
//! An [`Account`] lives in the server actor's directory for the whole life of
//! the process. While a connection is attached it owns a [`Mailbox`]; rooms
//! and direct messages reach it through cloned [`Member`] endpoints.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::{AppError, DeliveryError};
use crate::message::ChatMessage;
use crate::types::{ConnectionId, RoomName};

/// Opaque password credential
///
/// Only ever compared, never shown.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.0 == candidate
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Inbound message queue of one attached connection
///
/// The session keeps `sender` for its own notices and drains `receiver`.
/// `connection` identifies the attachment for detach and leave.
#[derive(Debug)]
pub struct Mailbox {
    pub connection: ConnectionId,
    pub sender: mpsc::Sender<ChatMessage>,
    pub receiver: mpsc::Receiver<ChatMessage>,
}

impl Mailbox {
    pub fn new(connection: ConnectionId, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            connection,
            sender,
            receiver,
        }
    }
}

/// The connection currently draining an account
#[derive(Debug)]
struct Attachment {
    connection: ConnectionId,
    sender: mpsc::Sender<ChatMessage>,
}

/// Registered account
///
/// `username` is the immutable primary key. `nickname` and `current_room`
/// are only mutated by the server actor.
#[derive(Debug)]
pub struct Account {
    pub username: String,
    pub nickname: String,
    credential: Credential,
    attachment: Option<Attachment>,
    pub current_room: Option<RoomName>,
}

impl Account {
    pub fn new(
        username: impl Into<String>,
        nickname: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            nickname: nickname.into(),
            credential: Credential::new(password),
            attachment: None,
            current_room: None,
        }
    }

    pub fn check_password(&self, candidate: &str) -> bool {
        self.credential.matches(candidate)
    }

    /// Whether a live connection is draining this account's mailbox
    pub fn is_connected(&self) -> bool {
        self.attachment
            .as_ref()
            .is_some_and(|a| !a.sender.is_closed())
    }

    /// Whether `connection` is the current attachment
    pub fn is_attached_to(&self, connection: ConnectionId) -> bool {
        self.attachment
            .as_ref()
            .is_some_and(|a| a.connection == connection)
    }

    /// Attach a fresh mailbox for a new connection
    ///
    /// Fails with `AlreadyConnected` if another connection still holds one.
    pub fn attach(
        &mut self,
        connection: ConnectionId,
        capacity: usize,
    ) -> Result<Mailbox, AppError> {
        if self.is_connected() {
            return Err(AppError::AlreadyConnected(self.username.clone()));
        }
        let mailbox = Mailbox::new(connection, capacity);
        self.attachment = Some(Attachment {
            connection,
            sender: mailbox.sender.clone(),
        });
        Ok(mailbox)
    }

    /// Drop the mailbox and forget the current room
    ///
    /// Ignored unless `connection` is still the current attachment, so a
    /// late cleanup never detaches a newer connection.
    pub fn detach(&mut self, connection: ConnectionId) -> bool {
        if !self.is_attached_to(connection) {
            return false;
        }
        self.attachment = None;
        self.current_room = None;
        true
    }

    /// Delivery endpoint for rooms and direct messages
    pub fn member(&self) -> Result<Member, AppError> {
        match &self.attachment {
            Some(attachment) => Ok(Member::new(
                self.username.clone(),
                self.nickname.clone(),
                attachment.connection,
                attachment.sender.clone(),
            )),
            None => Err(AppError::NotConnected(self.username.clone())),
        }
    }

    pub fn view(&self) -> AccountView {
        AccountView {
            username: self.username.clone(),
            nickname: self.nickname.clone(),
            current_room: self.current_room.clone(),
        }
    }
}

/// Read-only snapshot of an account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountView {
    pub username: String,
    pub nickname: String,
    pub current_room: Option<RoomName>,
}

/// Room member / direct-message target
///
/// Holds a clone of the account's mailbox sender and the connection it
/// belongs to.
#[derive(Debug, Clone)]
pub struct Member {
    pub username: String,
    pub nickname: String,
    pub connection: ConnectionId,
    mailbox: mpsc::Sender<ChatMessage>,
}

impl Member {
    pub fn new(
        username: impl Into<String>,
        nickname: impl Into<String>,
        connection: ConnectionId,
        mailbox: mpsc::Sender<ChatMessage>,
    ) -> Self {
        Self {
            username: username.into(),
            nickname: nickname.into(),
            connection,
            mailbox,
        }
    }

    /// Best-effort delivery
    ///
    /// Never waits: a full mailbox drops the message for this member only.
    pub fn deliver(&self, msg: ChatMessage) -> Result<(), DeliveryError> {
        self.mailbox.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::MailboxFull,
            TrySendError::Closed(_) => DeliveryError::MailboxClosed,
        })
    }

    pub fn view(&self) -> MemberView {
        MemberView {
            username: self.username.clone(),
            nickname: self.nickname.clone(),
        }
    }
}

/// Roster entry as reported by a room
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MemberView {
    pub username: String,
    pub nickname: String,
}
