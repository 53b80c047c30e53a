//! ChatServer Actor implementation
//!
//! The central actor that owns the account directory and the room table.
//! Sessions talk to it through a cloneable [`ServerHandle`]; each kind of
//! request has its own queue and the actor handles one request at a time,
//! which is what keeps the directory and room table race-free without locks.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::account::{Account, AccountView, Mailbox, Member};
use crate::config::Limits;
use crate::directory::Directory;
use crate::error::AppError;
use crate::protocol::{
    AccountRequest, DirectoryQuery, JoinRequest, Joined, LeaveRequest, NicknameRequest,
};
use crate::room::{Room, RoomHandle};
use crate::types::{ConnectionId, RoomName};

// ============================================================================
// Server Handle
// ============================================================================

/// Handle for interacting with the server actor
///
/// Cheap to clone; every connection holds one. All methods fail with
/// `AppError::ServerClosed` once the actor is gone.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    accounts: mpsc::Sender<AccountRequest>,
    nicknames: mpsc::Sender<NicknameRequest>,
    joins: mpsc::Sender<JoinRequest>,
    leaves: mpsc::Sender<LeaveRequest>,
    queries: mpsc::Sender<DirectoryQuery>,
}

/// Send a request carrying a oneshot and wait for the answer
async fn request<M, R>(
    queue: &mpsc::Sender<M>,
    make: impl FnOnce(oneshot::Sender<R>) -> M,
) -> Result<R, AppError> {
    let (tx, rx) = oneshot::channel();
    queue
        .send(make(tx))
        .await
        .map_err(|_| AppError::ServerClosed)?;
    rx.await.map_err(|_| AppError::ServerClosed)
}

impl ServerHandle {
    pub async fn account_exists(&self, username: &str) -> Result<bool, AppError> {
        request(&self.queries, |respond_to| DirectoryQuery::AccountExists {
            username: username.to_string(),
            respond_to,
        })
        .await
    }

    pub async fn nickname_available(&self, nickname: &str) -> Result<bool, AppError> {
        request(&self.queries, |respond_to| DirectoryQuery::NicknameAvailable {
            nickname: nickname.to_string(),
            respond_to,
        })
        .await
    }

    /// Register a new account and attach a mailbox for `connection`
    ///
    /// # Errors
    ///
    /// - `UsernameTaken` / `NicknameTaken` if either was claimed meanwhile
    pub async fn register(
        &self,
        connection: ConnectionId,
        username: &str,
        nickname: &str,
        password: &str,
    ) -> Result<Mailbox, AppError> {
        let account = Account::new(username, nickname, password);
        request(&self.accounts, |respond_to| AccountRequest::Register {
            account,
            connection,
            respond_to,
        })
        .await?
    }

    /// Authenticate and attach a mailbox for `connection`
    ///
    /// # Errors
    ///
    /// - `UserNotFound` if no such account exists
    /// - `WrongPassword` if the password does not match
    /// - `AlreadyConnected` if another connection holds the account
    pub async fn login(
        &self,
        connection: ConnectionId,
        username: &str,
        password: &str,
    ) -> Result<Mailbox, AppError> {
        request(&self.accounts, |respond_to| AccountRequest::Login {
            username: username.to_string(),
            password: password.to_string(),
            connection,
            respond_to,
        })
        .await?
    }

    /// Detach the account's mailbox
    ///
    /// Does nothing if the account has since been attached by another
    /// connection. Returns once the detach has been processed.
    pub async fn logout(&self, username: &str, connection: ConnectionId) -> Result<(), AppError> {
        request(&self.accounts, |respond_to| AccountRequest::Logout {
            username: username.to_string(),
            connection,
            respond_to,
        })
        .await
    }

    /// Change an account's nickname
    ///
    /// # Errors
    ///
    /// - `NicknameTaken` if another account uses it
    pub async fn rename(&self, username: &str, nickname: &str) -> Result<(), AppError> {
        request(&self.nicknames, |respond_to| NicknameRequest {
            username: username.to_string(),
            nickname: nickname.to_string(),
            respond_to,
        })
        .await?
    }

    /// Join a room, creating it on first use
    ///
    /// Returns once the room has processed the join.
    pub async fn join(&self, username: &str, room: RoomName) -> Result<RoomHandle, AppError> {
        let joined = request(&self.joins, |respond_to| JoinRequest {
            username: username.to_string(),
            room,
            respond_to,
        })
        .await??;

        let _ = joined.done.await;
        Ok(joined.room)
    }

    /// Leave a room; silently does nothing if it does not exist
    ///
    /// Only the membership created by `connection` is removed. Returns once
    /// the room has processed the leave.
    pub async fn leave(
        &self,
        username: &str,
        connection: ConnectionId,
        room: RoomName,
    ) -> Result<(), AppError> {
        let done = request(&self.leaves, |respond_to| LeaveRequest {
            username: username.to_string(),
            connection,
            room,
            respond_to,
        })
        .await?;

        if let Some(done) = done {
            let _ = done.await;
        }
        Ok(())
    }

    pub async fn whoami(&self, username: &str) -> Result<Option<AccountView>, AppError> {
        request(&self.queries, |respond_to| DirectoryQuery::WhoAmI {
            username: username.to_string(),
            respond_to,
        })
        .await
    }

    /// All registered usernames, sorted
    pub async fn usernames(&self) -> Result<Vec<String>, AppError> {
        request(&self.queries, |respond_to| DirectoryQuery::Usernames {
            respond_to,
        })
        .await
    }

    /// All room names, sorted
    pub async fn room_names(&self) -> Result<Vec<RoomName>, AppError> {
        request(&self.queries, |respond_to| DirectoryQuery::RoomNames {
            respond_to,
        })
        .await
    }

    pub async fn find_room(&self, room: RoomName) -> Result<Option<RoomHandle>, AppError> {
        request(&self.queries, |respond_to| DirectoryQuery::FindRoom {
            room,
            respond_to,
        })
        .await
    }

    /// Delivery endpoint of a connected account
    ///
    /// # Errors
    ///
    /// - `UserNotFound` if no such account exists
    /// - `UserOffline` if it has no active connection
    pub async fn find_member(&self, username: &str) -> Result<Member, AppError> {
        request(&self.queries, |respond_to| DirectoryQuery::FindMember {
            username: username.to_string(),
            respond_to,
        })
        .await?
    }
}

// ============================================================================
// Server Actor
// ============================================================================

/// Inbound queues of the server actor
struct ServerInbox {
    accounts: mpsc::Receiver<AccountRequest>,
    nicknames: mpsc::Receiver<NicknameRequest>,
    joins: mpsc::Receiver<JoinRequest>,
    leaves: mpsc::Receiver<LeaveRequest>,
    queries: mpsc::Receiver<DirectoryQuery>,
}

/// The main ChatServer actor
///
/// Exclusively owns the directory and the room table.
pub struct ChatServer {
    directory: Directory,
    /// All rooms ever joined: name -> running room
    rooms: HashMap<RoomName, RoomHandle>,
    limits: Limits,
}

impl ChatServer {
    pub fn new(limits: Limits) -> Self {
        Self {
            directory: Directory::new(),
            rooms: HashMap::new(),
            limits,
        }
    }

    /// Start the server actor and return a handle to it
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(limits: Limits) -> ServerHandle {
        let capacity = limits.queue_capacity;
        let (accounts, accounts_rx) = mpsc::channel(capacity);
        let (nicknames, nicknames_rx) = mpsc::channel(capacity);
        let (joins, joins_rx) = mpsc::channel(capacity);
        let (leaves, leaves_rx) = mpsc::channel(capacity);
        let (queries, queries_rx) = mpsc::channel(capacity);

        let inbox = ServerInbox {
            accounts: accounts_rx,
            nicknames: nicknames_rx,
            joins: joins_rx,
            leaves: leaves_rx,
            queries: queries_rx,
        };
        tokio::spawn(ChatServer::new(limits).run(inbox));

        ServerHandle {
            accounts,
            nicknames,
            joins,
            leaves,
            queries,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes requests until all handles are dropped.
    async fn run(mut self, mut inbox: ServerInbox) {
        info!("ChatServer started");

        loop {
            tokio::select! {
                Some(req) = inbox.accounts.recv() => self.handle_account(req),
                Some(req) = inbox.nicknames.recv() => self.handle_rename(req).await,
                Some(req) = inbox.joins.recv() => self.handle_join(req).await,
                Some(req) = inbox.leaves.recv() => self.handle_leave(req).await,
                Some(query) = inbox.queries.recv() => self.handle_query(query),
                else => break,
            }
        }

        info!("ChatServer shutting down");
    }

    fn handle_account(&mut self, req: AccountRequest) {
        let mailbox_capacity = self.limits.mailbox_capacity;

        match req {
            AccountRequest::Register {
                account,
                connection,
                respond_to,
            } => {
                let username = account.username.clone();
                let result = self
                    .directory
                    .register(account)
                    .and_then(|account| account.attach(connection, mailbox_capacity));
                if result.is_ok() {
                    info!("Account {} registered", username);
                    debug!("Total accounts: {}", self.directory.len());
                }
                let _ = respond_to.send(result);
            }
            AccountRequest::Login {
                username,
                password,
                connection,
                respond_to,
            } => {
                let result = match self.directory.get_mut(&username) {
                    None => Err(AppError::UserNotFound(username.clone())),
                    Some(account) if !account.check_password(&password) => {
                        Err(AppError::WrongPassword)
                    }
                    Some(account) => account.attach(connection, mailbox_capacity),
                };
                if result.is_ok() {
                    info!("Account {} logged in", username);
                }
                let _ = respond_to.send(result);
            }
            AccountRequest::Logout {
                username,
                connection,
                respond_to,
            } => {
                match self.directory.get_mut(&username).map(|account| account.detach(connection)) {
                    Some(true) => {
                        info!("Account {} logged out", username);
                    }
                    Some(false) => debug!("Stale logout for {} ignored", username),
                    None => {}
                }
                let _ = respond_to.send(());
            }
        }
    }

    async fn handle_rename(&mut self, req: NicknameRequest) {
        let NicknameRequest {
            username,
            nickname,
            respond_to,
        } = req;

        let result = self.directory.rename(&username, &nickname);
        if let Ok(old) = &result {
            if *old != nickname {
                info!("Account {} renamed {} -> {}", username, old, nickname);
                self.sync_room_nickname(&username, &nickname).await;
            }
        }
        let _ = respond_to.send(result.map(|_| ()));
    }

    /// Push a new nickname to the account's current room roster
    async fn sync_room_nickname(&self, username: &str, nickname: &str) {
        let room = self
            .directory
            .get(username)
            .and_then(|account| account.current_room.as_ref())
            .and_then(|name| self.rooms.get(name));

        if let Some(room) = room {
            let _ = room
                .rename(username.to_string(), nickname.to_string())
                .await;
        }
    }

    async fn handle_join(&mut self, req: JoinRequest) {
        let JoinRequest {
            username,
            room,
            respond_to,
        } = req;

        let member = match self.directory.get(&username) {
            Some(account) => account.member(),
            None => Err(AppError::UserNotFound(username.clone())),
        };
        let member = match member {
            Ok(member) => member,
            Err(e) => {
                let _ = respond_to.send(Err(e));
                return;
            }
        };

        // The room is registered and running before the join reaches it
        let handle = self.room_or_create(&room);
        let result = match handle.join(member).await {
            Ok(done) => {
                if let Some(account) = self.directory.get_mut(&username) {
                    account.current_room = Some(room.clone());
                }
                debug!("{} joining {}", username, room);
                Ok(Joined { room: handle, done })
            }
            Err(e) => Err(e),
        };
        let _ = respond_to.send(result);
    }

    async fn handle_leave(&mut self, req: LeaveRequest) {
        let LeaveRequest {
            username,
            connection,
            room,
            respond_to,
        } = req;

        let done = match self.rooms.get(&room) {
            Some(handle) => handle.leave(username.clone(), connection).await.ok(),
            None => None,
        };

        if let Some(account) = self.directory.get_mut(&username) {
            let current = account.current_room.as_ref() == Some(&room);
            if current && account.is_attached_to(connection) {
                account.current_room = None;
            }
        }
        debug!("{} leaving {}", username, room);

        let _ = respond_to.send(done);
    }

    fn handle_query(&self, query: DirectoryQuery) {
        match query {
            DirectoryQuery::AccountExists {
                username,
                respond_to,
            } => {
                let _ = respond_to.send(self.directory.contains(&username));
            }
            DirectoryQuery::NicknameAvailable {
                nickname,
                respond_to,
            } => {
                let _ = respond_to.send(!self.directory.nickname_taken(&nickname));
            }
            DirectoryQuery::WhoAmI {
                username,
                respond_to,
            } => {
                let _ = respond_to.send(self.directory.get(&username).map(Account::view));
            }
            DirectoryQuery::Usernames { respond_to } => {
                let _ = respond_to.send(self.directory.usernames());
            }
            DirectoryQuery::RoomNames { respond_to } => {
                let mut names: Vec<RoomName> = self.rooms.keys().cloned().collect();
                names.sort();
                let _ = respond_to.send(names);
            }
            DirectoryQuery::FindRoom { room, respond_to } => {
                let _ = respond_to.send(self.rooms.get(&room).cloned());
            }
            DirectoryQuery::FindMember {
                username,
                respond_to,
            } => {
                let result = match self.directory.get(&username) {
                    Some(account) => account
                        .member()
                        .map_err(|_| AppError::UserOffline(username.clone())),
                    None => Err(AppError::UserNotFound(username.clone())),
                };
                let _ = respond_to.send(result);
            }
        }
    }

    /// Look up a room, starting it first if it does not exist yet
    fn room_or_create(&mut self, name: &RoomName) -> RoomHandle {
        if let Some(handle) = self.rooms.get(name) {
            return handle.clone();
        }

        let handle = Room::spawn(name.clone(), self.limits.queue_capacity);
        self.rooms.insert(name.clone(), handle.clone());
        info!("Room {} created", name);
        debug!("Total rooms: {}", self.rooms.len());
        handle
    }
}
