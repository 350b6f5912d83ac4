//! Conversation target parsing.
//!
//! This module turns the id given on the command line into a
//! [`ConversationTarget`] and maps it to the peer id the messages API expects.

use std::fmt;
use std::str::FromStr;

/// Start of the peer-id range VK reserves for group chats.
///
/// Messages methods address a group chat as `CHAT_PEER_OFFSET + chat_id`,
/// while direct dialogs use the user id unchanged.
pub const CHAT_PEER_OFFSET: u64 = 2_000_000_000;

/// Prefix that marks a group chat id on the command line
pub const CHAT_MARKER: char = 'c';

/// Error type for target parsing
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("Empty conversation id provided")]
    Empty,
    #[error("Invalid conversation id '{0}': expected digits, optionally prefixed with 'c'")]
    InvalidId(String),
    #[error("Conversation id must be greater than zero")]
    Zero,
    #[error("Chat id {0} is outside the chat peer range")]
    ChatOutOfRange(u64),
}

/// The conversation whose photos are backed up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationTarget {
    /// Direct dialog with a user
    User(u64),
    /// Group chat, by its local chat id
    Chat(u64),
}

impl ConversationTarget {
    /// Returns the peer id used by `messages.*` methods
    pub fn peer_id(&self) -> u64 {
        match self {
            ConversationTarget::User(id) => *id,
            ConversationTarget::Chat(id) => CHAT_PEER_OFFSET + id,
        }
    }

    pub fn is_chat(&self) -> bool {
        matches!(self, ConversationTarget::Chat(_))
    }
}

impl fmt::Display for ConversationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationTarget::User(id) => write!(f, "user {}", id),
            ConversationTarget::Chat(id) => write!(f, "chat {}", id),
        }
    }
}

fn parse_id(raw: &str, original: &str) -> Result<u64, TargetError> {
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(TargetError::InvalidId(original.to_string()));
    }
    let id = raw
        .parse::<u64>()
        .map_err(|_| TargetError::InvalidId(original.to_string()))?;
    if id == 0 {
        return Err(TargetError::Zero);
    }
    Ok(id)
}

impl FromStr for ConversationTarget {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(TargetError::Empty);
        }

        match trimmed.strip_prefix(CHAT_MARKER) {
            Some(rest) => {
                let id = parse_id(rest, trimmed)?;
                if id >= CHAT_PEER_OFFSET {
                    return Err(TargetError::ChatOutOfRange(id));
                }
                Ok(ConversationTarget::Chat(id))
            }
            None => Ok(ConversationTarget::User(parse_id(trimmed, trimmed)?)),
        }
    }
}
