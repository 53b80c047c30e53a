//! Message protocol definitions
//!
//! Line-based protocol: every client line is parsed into a [`Command`],
//! every delivered [`ChatMessage`] is rendered as `<sender>: <text>`.

use crate::error::AppError;
use crate::types::SYSTEM_SENDER;

/// Delivered chat message
///
/// Immutable value: `sender` is an account username or [`SYSTEM_SENDER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: String,
    pub text: String,
}

impl ChatMessage {
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
        }
    }

    /// Server-generated notice
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(SYSTEM_SENDER, text)
    }

    /// Whether this message was sent by `username`
    ///
    /// Such messages are never written back to that account's connection.
    pub fn is_from(&self, username: &str) -> bool {
        self.sender == username
    }

    /// Outbound line (the framing adds the trailing newline)
    pub fn render(&self) -> String {
        format!("{}: {}", self.sender, self.text)
    }
}

/// Client → Server command
///
/// Parsed from one line of input in command mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show own username, nickname and current room
    WhoAmI,
    /// Change nickname
    Nick(String),
    /// List every registered username
    Names,
    /// List nicknames in the current room
    Roommates,
    /// Direct message to one account
    DirectUser { username: String, text: String },
    /// Message to a named room
    DirectRoom { room: String, text: String },
    /// PRIVMSG with an unknown target kind
    InvalidTarget,
    /// List every room
    List,
    /// Leave the current room and join another
    Join(String),
    /// Leave the current room and return to the lobby
    Part,
    /// Chat message to the current room
    Say(String),
}

impl Command {
    /// Parse a line of input
    ///
    /// Returns `None` for blank lines. Anything that is not a recognised
    /// command (including commands missing their arguments) is chat.
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let command = match trimmed {
            "WHOAMI" => Command::WhoAmI,
            "NAMES" => Command::Names,
            "ROOMMATES" => Command::Roommates,
            "LIST" => Command::List,
            "PART" => Command::Part,
            _ => Self::parse_with_args(trimmed).unwrap_or_else(|| Command::Say(line.to_string())),
        };
        Some(command)
    }

    fn parse_with_args(line: &str) -> Option<Self> {
        let (verb, rest) = split_word(line)?;
        match verb {
            "NICK" => {
                let (nickname, _) = split_word(rest)?;
                Some(Command::Nick(nickname.to_string()))
            }
            "JOIN" => {
                let (room, _) = split_word(rest)?;
                Some(Command::Join(room.to_string()))
            }
            "PRIVMSG" => {
                let (kind, rest) = split_word(rest)?;
                let (target, text) = split_word(rest)?;
                let target = target.to_string();
                let text = text.to_string();
                Some(match kind {
                    "USER" => Command::DirectUser {
                        username: target,
                        text,
                    },
                    "CHAN" => Command::DirectRoom { room: target, text },
                    _ => Command::InvalidTarget,
                })
            }
            _ => None,
        }
    }
}

/// Split off the first whitespace-delimited word
fn split_word(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    if input.is_empty() {
        return None;
    }
    match input.find(char::is_whitespace) {
        Some(end) => Some((&input[..end], input[end..].trim_start())),
        None => Some((input, "")),
    }
}

/// Convert a recoverable AppError into a `SYSTEM` notice for the requester
impl From<AppError> for ChatMessage {
    fn from(err: AppError) -> Self {
        let text = match &err {
            AppError::NicknameTaken(nickname) => format!("nickname \"{}\" taken", nickname),
            AppError::UserNotFound(_) => "User not found".to_string(),
            AppError::UserOffline(username) => format!("User {} is not connected", username),
            AppError::RoomNotFound(_) => "Room not found".to_string(),
            AppError::InvalidOption => "Invalid option".to_string(),
            // Fatal errors are not typically converted (session ends)
            _ => "Internal error".to_string(),
        };
        ChatMessage::system(text)
    }
}
