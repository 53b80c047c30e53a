//! Login handshake
//!
//! Small request/response state machine driven one client line at a time:
//!
//! ```text
//! Username ──known──▶ Password ──ok──────────────────────▶ Room ──▶ Ready
//!    │                   └─wrong─▶ Password                  ▲
//!    └──new──▶ Nickname ──free──▶ NewPassword ──registered───┘
//!                 └─taken─▶ Nickname
//! ```
//!
//! The caller owns the I/O, so a timeout can wrap each answer without the
//! state machine knowing about it.

use tracing::info;

use crate::account::Mailbox;
use crate::error::AppError;
use crate::server::ServerHandle;
use crate::types::{ConnectionId, RoomName};

pub const USERNAME_PROMPT: &str = "Enter a username:";
pub const USERNAME_TAKEN_PROMPT: &str = "Username already taken. Enter a username:";
pub const ALREADY_CONNECTED_PROMPT: &str = "Account already connected. Enter a username:";
pub const PASSWORD_PROMPT: &str = "Enter your password:";
pub const WRONG_PASSWORD_PROMPT: &str = "Wrong password. Try again:";
pub const NICKNAME_PROMPT: &str = "Enter a nickname:";
pub const NICKNAME_TAKEN_PROMPT: &str = "Nickname already taken. Try again:";
pub const NEW_PASSWORD_PROMPT: &str = "Create a password for your account:";
pub const ROOM_PROMPT: &str = "Join a chat room:";

#[derive(Debug)]
enum Stage {
    Username,
    Password { username: String },
    Nickname { username: String },
    NewPassword { username: String, nickname: String },
    /// Authenticated; the mailbox is already attached
    Room { username: String, mailbox: Mailbox },
}

/// Authenticated connection ready to enter command mode
#[derive(Debug)]
pub struct Login {
    pub username: String,
    pub mailbox: Mailbox,
    pub room: RoomName,
}

/// Outcome of one answered prompt
#[derive(Debug)]
pub enum Step {
    /// Send this prompt and wait for the next line
    Prompt(&'static str),
    Ready(Login),
}

#[derive(Debug)]
pub struct Handshake {
    /// Connection the mailbox gets attached for
    connection: ConnectionId,
    stage: Stage,
}

impl Handshake {
    pub fn new(connection: ConnectionId) -> Self {
        Self {
            connection,
            stage: Stage::Username,
        }
    }

    /// Prompt to send before the first line
    pub fn first_prompt(&self) -> &'static str {
        USERNAME_PROMPT
    }

    /// Feed the client's answer to the current prompt
    ///
    /// Only fatal errors are returned; every rejected answer becomes a
    /// re-prompt.
    pub async fn advance(&mut self, line: &str, server: &ServerHandle) -> Result<Step, AppError> {
        let input = line.trim();
        let stage = std::mem::replace(&mut self.stage, Stage::Username);

        let (next, step) = match stage {
            Stage::Username if input.is_empty() => (Stage::Username, Step::Prompt(USERNAME_PROMPT)),
            Stage::Username => {
                let username = input.to_string();
                if server.account_exists(&username).await? {
                    (Stage::Password { username }, Step::Prompt(PASSWORD_PROMPT))
                } else {
                    (Stage::Nickname { username }, Step::Prompt(NICKNAME_PROMPT))
                }
            }
            Stage::Password { username } => {
                match server.login(self.connection, &username, line).await {
                    Ok(mailbox) => {
                        info!("{} authenticated", username);
                        (Stage::Room { username, mailbox }, Step::Prompt(ROOM_PROMPT))
                    }
                    Err(AppError::WrongPassword) => (
                        Stage::Password { username },
                        Step::Prompt(WRONG_PASSWORD_PROMPT),
                    ),
                    Err(AppError::AlreadyConnected(_)) => {
                        (Stage::Username, Step::Prompt(ALREADY_CONNECTED_PROMPT))
                    }
                    Err(AppError::UserNotFound(_)) => {
                        (Stage::Username, Step::Prompt(USERNAME_PROMPT))
                    }
                    Err(e) => return Err(e),
                }
            }
            Stage::Nickname { username } if input.is_empty() => {
                (Stage::Nickname { username }, Step::Prompt(NICKNAME_PROMPT))
            }
            Stage::Nickname { username } => {
                let nickname = input.to_string();
                if server.nickname_available(&nickname).await? {
                    (
                        Stage::NewPassword { username, nickname },
                        Step::Prompt(NEW_PASSWORD_PROMPT),
                    )
                } else {
                    (
                        Stage::Nickname { username },
                        Step::Prompt(NICKNAME_TAKEN_PROMPT),
                    )
                }
            }
            Stage::NewPassword { username, nickname } => {
                match server
                    .register(self.connection, &username, &nickname, line)
                    .await
                {
                    Ok(mailbox) => (Stage::Room { username, mailbox }, Step::Prompt(ROOM_PROMPT)),
                    Err(AppError::NicknameTaken(_)) => (
                        Stage::Nickname { username },
                        Step::Prompt(NICKNAME_TAKEN_PROMPT),
                    ),
                    Err(AppError::UsernameTaken(_)) => {
                        (Stage::Username, Step::Prompt(USERNAME_TAKEN_PROMPT))
                    }
                    Err(e) => return Err(e),
                }
            }
            Stage::Room { username, mailbox } => {
                let room = RoomName::parse(input).unwrap_or_else(RoomName::lobby);
                (
                    Stage::Username,
                    Step::Ready(Login {
                        username,
                        mailbox,
                        room,
                    }),
                )
            }
        };

        self.stage = next;
        Ok(step)
    }

    /// Undo an attach when the connection drops before the room prompt is answered
    pub async fn abandon(self, server: &ServerHandle) {
        if let Stage::Room { username, mailbox } = self.stage {
            let _ = server.logout(&username, mailbox.connection).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use crate::server::ChatServer;

    async fn prompt(handshake: &mut Handshake, line: &str, server: &ServerHandle) -> &'static str {
        match handshake.advance(line, server).await.unwrap() {
            Step::Prompt(p) => p,
            Step::Ready(login) => panic!("unexpected login {:?}", login.username),
        }
    }

    async fn ready(handshake: &mut Handshake, line: &str, server: &ServerHandle) -> Login {
        match handshake.advance(line, server).await.unwrap() {
            Step::Ready(login) => login,
            Step::Prompt(p) => panic!("unexpected prompt {:?}", p),
        }
    }

    #[tokio::test]
    async fn test_new_account() {
        let server = ChatServer::spawn(Limits::default());
        let mut handshake = Handshake::new(ConnectionId::new());
        assert_eq!(handshake.first_prompt(), USERNAME_PROMPT);

        assert_eq!(prompt(&mut handshake, "", &server).await, USERNAME_PROMPT);
        assert_eq!(prompt(&mut handshake, "alice", &server).await, NICKNAME_PROMPT);
        assert_eq!(prompt(&mut handshake, "ally", &server).await, NEW_PASSWORD_PROMPT);
        assert_eq!(prompt(&mut handshake, "pw", &server).await, ROOM_PROMPT);

        let login = ready(&mut handshake, "general", &server).await;
        assert_eq!(login.username, "alice");
        assert_eq!(login.room.as_str(), "general");
        assert!(server.account_exists("alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_nickname_retry() {
        let server = ChatServer::spawn(Limits::default());
        let _bob = server
            .register(ConnectionId::new(), "bob", "bobby", "pw")
            .await
            .unwrap();
        let mut handshake = Handshake::new(ConnectionId::new());

        prompt(&mut handshake, "alice", &server).await;
        assert_eq!(
            prompt(&mut handshake, "bobby", &server).await,
            NICKNAME_TAKEN_PROMPT
        );
        assert_eq!(prompt(&mut handshake, "ally", &server).await, NEW_PASSWORD_PROMPT);
    }

    #[tokio::test]
    async fn test_nickname_claimed_before_registration() {
        let server = ChatServer::spawn(Limits::default());
        let mut handshake = Handshake::new(ConnectionId::new());

        prompt(&mut handshake, "alice", &server).await;
        prompt(&mut handshake, "ally", &server).await;
        let _carol = server
            .register(ConnectionId::new(), "carol", "ally", "pw")
            .await
            .unwrap();

        assert_eq!(prompt(&mut handshake, "pw", &server).await, NICKNAME_TAKEN_PROMPT);
        assert!(!server.account_exists("alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_existing_account_password_retry() {
        let server = ChatServer::spawn(Limits::default());
        let mailbox = server
            .register(ConnectionId::new(), "alice", "ally", "secret")
            .await
            .unwrap();
        server.logout("alice", mailbox.connection).await.unwrap();

        let mut handshake = Handshake::new(ConnectionId::new());
        assert_eq!(prompt(&mut handshake, "alice", &server).await, PASSWORD_PROMPT);
        assert_eq!(
            prompt(&mut handshake, "guess", &server).await,
            WRONG_PASSWORD_PROMPT
        );
        assert_eq!(
            prompt(&mut handshake, "guess2", &server).await,
            WRONG_PASSWORD_PROMPT
        );
        assert_eq!(prompt(&mut handshake, "secret", &server).await, ROOM_PROMPT);

        // Blank room name falls back to the lobby
        let login = ready(&mut handshake, "  ", &server).await;
        assert_eq!(login.room, RoomName::lobby());
    }

    #[tokio::test]
    async fn test_second_connection_rejected() {
        let server = ChatServer::spawn(Limits::default());
        let _alice = server
            .register(ConnectionId::new(), "alice", "ally", "pw")
            .await
            .unwrap();

        let mut handshake = Handshake::new(ConnectionId::new());
        prompt(&mut handshake, "alice", &server).await;
        assert_eq!(
            prompt(&mut handshake, "pw", &server).await,
            ALREADY_CONNECTED_PROMPT
        );
        assert_eq!(prompt(&mut handshake, "bob", &server).await, NICKNAME_PROMPT);
    }

    #[tokio::test]
    async fn test_abandon_detaches() {
        let server = ChatServer::spawn(Limits::default());
        let mut handshake = Handshake::new(ConnectionId::new());

        prompt(&mut handshake, "alice", &server).await;
        prompt(&mut handshake, "ally", &server).await;
        prompt(&mut handshake, "pw", &server).await;
        handshake.abandon(&server).await;

        assert!(server
            .login(ConnectionId::new(), "alice", "pw")
            .await
            .is_ok());
    }
}
