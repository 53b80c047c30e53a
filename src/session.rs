//! Per-connection session
//!
//! A [`Session`] is the membership cursor of one authenticated connection:
//! it knows the account, the room it is currently in, and where to put
//! notices for its own client. It translates parsed commands into actor
//! requests; it never touches shared state directly.

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::AppError;
use crate::message::{ChatMessage, Command};
use crate::room::RoomHandle;
use crate::server::ServerHandle;
use crate::types::{ConnectionId, RoomName};

pub struct Session {
    username: String,
    /// Attachment this session was started for
    connection: ConnectionId,
    server: ServerHandle,
    room: RoomHandle,
    /// Sender side of this connection's own mailbox
    notices: mpsc::Sender<ChatMessage>,
    closed: bool,
}

impl Session {
    /// Join the first room and start the session
    pub async fn start(
        username: String,
        connection: ConnectionId,
        server: ServerHandle,
        notices: mpsc::Sender<ChatMessage>,
        room: RoomName,
    ) -> Result<Self, AppError> {
        let room = server.join(&username, room).await?;
        Ok(Self {
            username,
            connection,
            server,
            room,
            notices,
            closed: false,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn room(&self) -> &RoomHandle {
        &self.room
    }

    /// Handle one line of client input
    ///
    /// Recoverable errors are reported back as `SYSTEM` notices; only fatal
    /// errors are returned.
    pub async fn handle_line(&mut self, line: &str) -> Result<(), AppError> {
        let Some(command) = Command::parse(line) else {
            return Ok(());
        };

        match self.execute(command).await {
            Err(e) if e.is_recoverable() => {
                debug!("{}: {}", self.username, e);
                self.notify(e.into()).await
            }
            other => other,
        }
    }

    async fn execute(&mut self, command: Command) -> Result<(), AppError> {
        match command {
            Command::WhoAmI => self.whoami().await,
            Command::Nick(nickname) => self.server.rename(&self.username, &nickname).await,
            Command::Names => {
                let names = self.server.usernames().await?;
                self.notify_each(names).await
            }
            Command::Roommates => {
                let roster = self.room.roster().await?;
                self.notify_each(roster.into_iter().map(|m| m.nickname))
                    .await
            }
            Command::DirectUser { username, text } => {
                let member = self.server.find_member(&username).await?;
                if let Err(e) = member.deliver(self.message(text)) {
                    debug!("Direct message to {} dropped: {}", username, e);
                }
                Ok(())
            }
            Command::DirectRoom { room, text } => {
                let target = match RoomName::parse(&room) {
                    Some(name) => self.server.find_room(name).await?,
                    None => None,
                };
                match target {
                    Some(target) => target.send(self.message(text)).await,
                    None => Err(AppError::RoomNotFound(room)),
                }
            }
            Command::InvalidTarget => Err(AppError::InvalidOption),
            Command::List => {
                let rooms = self.server.room_names().await?;
                self.notify_each(rooms.into_iter().map(|r| r.to_string()))
                    .await
            }
            Command::Join(room) => match RoomName::parse(&room) {
                Some(target) => self.switch_room(target).await,
                None => Ok(()),
            },
            Command::Part => self.switch_room(RoomName::lobby()).await,
            Command::Say(text) => self.room.send(self.message(text)).await,
        }
    }

    async fn whoami(&self) -> Result<(), AppError> {
        let view = self
            .server
            .whoami(&self.username)
            .await?
            .ok_or_else(|| AppError::UserNotFound(self.username.clone()))?;
        let room = view
            .current_room
            .map(|r| r.to_string())
            .unwrap_or_default();

        self.notify_each([
            format!("username: {}", view.username),
            format!("nickname: {}", view.nickname),
            format!("current room: {}", room),
        ])
        .await
    }

    /// Leave the current room, then join `target`
    ///
    /// The leave is fully processed before the join is submitted.
    async fn switch_room(&mut self, target: RoomName) -> Result<(), AppError> {
        self.server
            .leave(&self.username, self.connection, self.room.name().clone())
            .await?;
        self.room = self.server.join(&self.username, target).await?;
        Ok(())
    }

    fn message(&self, text: String) -> ChatMessage {
        ChatMessage::new(self.username.clone(), text)
    }

    async fn notify(&self, msg: ChatMessage) -> Result<(), AppError> {
        self.notices
            .send(msg)
            .await
            .map_err(|_| AppError::ConnectionClosed)
    }

    async fn notify_each<I, S>(&self, lines: I) -> Result<(), AppError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for line in lines {
            self.notify(ChatMessage::system(line)).await?;
        }
        Ok(())
    }

    /// Detach the account and leave the current room
    pub async fn close(mut self) {
        self.closed = true;
        release(
            &self.server,
            &self.username,
            self.connection,
            self.room.name().clone(),
        )
        .await;
    }
}

impl Drop for Session {
    /// Sessions dropped without `close` (cancelled tasks) still release
    /// their room and account.
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let server = self.server.clone();
            let username = self.username.clone();
            let connection = self.connection;
            let room = self.room.name().clone();
            runtime.spawn(async move {
                release(&server, &username, connection, room).await;
            });
        }
    }
}

/// Both steps are scoped to `connection`, so a release that runs after the
/// account was attached again leaves the newer connection alone. The account
/// is free to log in again by the time the leave is announced.
async fn release(
    server: &ServerHandle,
    username: &str,
    connection: ConnectionId,
    room: RoomName,
) {
    if let Err(e) = server.logout(username, connection).await {
        debug!("Logout on close failed for {}: {}", username, e);
    }
    if let Err(e) = server.leave(username, connection, room).await {
        debug!("Leave on close failed for {}: {}", username, e);
    }
}
