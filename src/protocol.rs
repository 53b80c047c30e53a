//! Actor message protocol
//!
//! Typed requests flowing from sessions to the server actor, and events
//! flowing from the server actor (or sessions) to room actors. Each kind of
//! request travels on its own queue; requests that need an answer carry a
//! oneshot `respond_to` channel.

use tokio::sync::oneshot;

use crate::account::{Account, AccountView, Mailbox, Member, MemberView};
use crate::error::AppError;
use crate::room::RoomHandle;
use crate::types::{ConnectionId, RoomName};

// ============================================================================
// Server actor requests
// ============================================================================

/// Account registration and connection attach/detach
#[derive(Debug)]
pub enum AccountRequest {
    /// Register a new account and attach a mailbox to it
    Register {
        account: Account,
        connection: ConnectionId,
        respond_to: oneshot::Sender<Result<Mailbox, AppError>>,
    },
    /// Check the password of an existing account and attach a mailbox
    Login {
        username: String,
        password: String,
        connection: ConnectionId,
        respond_to: oneshot::Sender<Result<Mailbox, AppError>>,
    },
    /// Detach the account's mailbox if `connection` still holds it
    Logout {
        username: String,
        connection: ConnectionId,
        respond_to: oneshot::Sender<()>,
    },
}

/// Nickname change for one account
#[derive(Debug)]
pub struct NicknameRequest {
    pub username: String,
    pub nickname: String,
    pub respond_to: oneshot::Sender<Result<(), AppError>>,
}

/// Join a room, creating it if needed
#[derive(Debug)]
pub struct JoinRequest {
    pub username: String,
    pub room: RoomName,
    pub respond_to: oneshot::Sender<Result<Joined, AppError>>,
}

/// Leave a room on behalf of one connection
///
/// Answered with the room's acknowledgement, or `None` when the room does
/// not exist.
#[derive(Debug)]
pub struct LeaveRequest {
    pub username: String,
    pub connection: ConnectionId,
    pub room: RoomName,
    pub respond_to: oneshot::Sender<Option<oneshot::Receiver<()>>>,
}

/// Read-only lookups against the directory and room table
#[derive(Debug)]
pub enum DirectoryQuery {
    AccountExists {
        username: String,
        respond_to: oneshot::Sender<bool>,
    },
    NicknameAvailable {
        nickname: String,
        respond_to: oneshot::Sender<bool>,
    },
    WhoAmI {
        username: String,
        respond_to: oneshot::Sender<Option<AccountView>>,
    },
    Usernames {
        respond_to: oneshot::Sender<Vec<String>>,
    },
    RoomNames {
        respond_to: oneshot::Sender<Vec<RoomName>>,
    },
    FindRoom {
        room: RoomName,
        respond_to: oneshot::Sender<Option<RoomHandle>>,
    },
    /// Delivery endpoint of a connected account
    FindMember {
        username: String,
        respond_to: oneshot::Sender<Result<Member, AppError>>,
    },
}

/// Successful join
///
/// `done` fires once the room itself has processed the join.
#[derive(Debug)]
pub struct Joined {
    pub room: RoomHandle,
    pub done: oneshot::Receiver<()>,
}

// ============================================================================
// Room actor events
// ============================================================================

#[derive(Debug)]
pub struct JoinEvent {
    pub member: Member,
    pub done: oneshot::Sender<()>,
}

/// Ignored unless the member was joined by `connection`
#[derive(Debug)]
pub struct LeaveEvent {
    pub username: String,
    pub connection: ConnectionId,
    pub done: oneshot::Sender<()>,
}

#[derive(Debug)]
pub enum RoomQuery {
    /// Current members, sorted by username
    Roster {
        respond_to: oneshot::Sender<Vec<MemberView>>,
    },
    /// Refresh a member's nickname after a rename
    Rename { username: String, nickname: String },
}
