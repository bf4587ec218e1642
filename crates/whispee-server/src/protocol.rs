//! Wire format.
//!
//! Every frame in both directions is `<name>|||<payload>`, where the payload
//! is a JSON value or empty. The name ends at the first `|||`; later
//! occurrences belong to the payload.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use whispee_core::{Chat, ChatId, Message, MessageId, SessionId, User};

use crate::sessions::Session;

pub const DELIMITER: &str = "|||";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame has no `|||` delimiter")]
    MissingDelimiter,

    #[error("invalid `{name}` payload: {source}")]
    BadPayload {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown event `{0}`")]
    UnknownEvent(String),

    #[error("frame is not valid UTF-8")]
    NotUtf8,
}

/// Split a raw frame into its name and payload.
pub fn split_frame(raw: &str) -> Result<(&str, &str), ProtocolError> {
    raw.split_once(DELIMITER).ok_or(ProtocolError::MissingDelimiter)
}

fn join_frame(name: &str, payload: &str) -> String {
    let mut frame = String::with_capacity(name.len() + DELIMITER.len() + payload.len());
    frame.push_str(name);
    frame.push_str(DELIMITER);
    frame.push_str(payload);
    frame
}

fn parse_payload<T: for<'de> Deserialize<'de>>(name: &str, payload: &str) -> Result<T, ProtocolError> {
    serde_json::from_str(payload).map_err(|source| ProtocolError::BadPayload {
        name: name.to_string(),
        source,
    })
}

// ── Requests ──

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSessionParams {
    /// `None` when the client sent something other than a string; such an
    /// id can never name a live session.
    #[serde(deserialize_with = "lenient_session_id")]
    pub session_id: Option<SessionId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckIdentifierParams {
    pub identifier: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginParams {
    pub identifier: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterParams {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageParams {
    #[serde(deserialize_with = "lenient_chat_id")]
    pub chat_id: ChatId,
    #[serde(deserialize_with = "lenient_content")]
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMessageParams {
    #[serde(deserialize_with = "lenient_message_id")]
    pub message_id: MessageId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadChatParams {
    #[serde(deserialize_with = "lenient_chat_id")]
    pub chat_id: ChatId,
}

/// A decoded client command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    CheckSession(CheckSessionParams),
    CheckIdentifier(CheckIdentifierParams),
    LoginUser(LoginParams),
    RegisterUser(RegisterParams),
    SendChatMessage(SendMessageParams),
    DeleteChatMessage(DeleteMessageParams),
    LoadChat(LoadChatParams),
    LoadChats,
    /// A command name this server does not handle. Not an error.
    Unknown(String),
}

impl Request {
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let (name, payload) = split_frame(raw)?;
        let request = match name {
            "check_session" => Self::CheckSession(parse_payload(name, payload)?),
            "check_identifier" => Self::CheckIdentifier(parse_payload(name, payload)?),
            "login_user" => Self::LoginUser(parse_payload(name, payload)?),
            "register_user" => Self::RegisterUser(parse_payload(name, payload)?),
            "send_chat_message" => Self::SendChatMessage(parse_payload(name, payload)?),
            "delete_chat_message" => Self::DeleteChatMessage(parse_payload(name, payload)?),
            "load_chat" => Self::LoadChat(parse_payload(name, payload)?),
            // Payload is ignored.
            "load_chats" => Self::LoadChats,
            other => Self::Unknown(other.to_string()),
        };
        Ok(request)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::CheckSession(_) => "check_session",
            Self::CheckIdentifier(_) => "check_identifier",
            Self::LoginUser(_) => "login_user",
            Self::RegisterUser(_) => "register_user",
            Self::SendChatMessage(_) => "send_chat_message",
            Self::DeleteChatMessage(_) => "delete_chat_message",
            Self::LoadChat(_) => "load_chat",
            Self::LoadChats => "load_chats",
            Self::Unknown(name) => name,
        }
    }

    /// Encode as a client would send it.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let payload = match self {
            Self::CheckSession(p) => serde_json::to_string(p)?,
            Self::CheckIdentifier(p) => serde_json::to_string(p)?,
            Self::LoginUser(p) => serde_json::to_string(p)?,
            Self::RegisterUser(p) => serde_json::to_string(p)?,
            Self::SendChatMessage(p) => serde_json::to_string(p)?,
            Self::DeleteChatMessage(p) => serde_json::to_string(p)?,
            Self::LoadChat(p) => serde_json::to_string(p)?,
            Self::LoadChats | Self::Unknown(_) => String::new(),
        };
        Ok(join_frame(self.name(), &payload))
    }
}

/// Accepts `5`, `5.0` or `"5"`.
fn lenient_chat_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ChatId, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(id) => Ok(ChatId(id)),
        Raw::Float(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Ok(ChatId(f as i64))
        }
        Raw::Float(f) => Err(de::Error::custom(format!("chat_id `{f}` is not an integer"))),
        Raw::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(ChatId)
            .map_err(|_| de::Error::custom(format!("chat_id `{s}` is not an integer"))),
    }
}

/// Accepts a string or a number.
fn lenient_message_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<MessageId, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => MessageId::from_raw(s),
        Raw::Int(n) => MessageId::from_raw(n.to_string()),
    })
}

/// Accepts a string or a number; numbers keep their JSON spelling.
fn lenient_content<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Num(n) => n.to_string(),
    })
}

fn lenient_session_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<SessionId>, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Some(SessionId::from_raw(s)),
        _ => None,
    })
}

// ── Events ──

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionGranted {
    pub session_id: SessionId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDeleted {
    pub message_id: MessageId,
}

/// A server-to-client frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    ActiveSession(Session),
    SessionInactive,
    IdentifierFound(User),
    NoIdentifierFound,
    LoginSucceeded(SessionGranted),
    LoginFailed,
    RegisterSucceeded(SessionGranted),
    RegisterFailed,
    ChatMessageSended(Message),
    ChatMessageDeleted(MessageDeleted),
    ChatLoaded(Chat),
    ChatMessagesLoaded(Vec<Message>),
    ChatsLoaded(Vec<Chat>),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ActiveSession(_) => "active_session",
            Self::SessionInactive => "session_inactive",
            Self::IdentifierFound(_) => "identifier_found",
            Self::NoIdentifierFound => "no_identifier_found",
            Self::LoginSucceeded(_) => "login_succeeded",
            Self::LoginFailed => "login_failed",
            Self::RegisterSucceeded(_) => "register_succeeded",
            Self::RegisterFailed => "register_failed",
            Self::ChatMessageSended(_) => "chat_message_sended",
            Self::ChatMessageDeleted(_) => "chat_message_deleted",
            Self::ChatLoaded(_) => "chat_loaded",
            Self::ChatMessagesLoaded(_) => "chat_messages_loaded",
            Self::ChatsLoaded(_) => "chats_loaded",
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let payload = match self {
            Self::ActiveSession(session) => serde_json::to_string(session)?,
            Self::IdentifierFound(user) => serde_json::to_string(user)?,
            Self::LoginSucceeded(granted) | Self::RegisterSucceeded(granted) => {
                serde_json::to_string(granted)?
            }
            Self::ChatMessageSended(message) => serde_json::to_string(message)?,
            Self::ChatMessageDeleted(deleted) => serde_json::to_string(deleted)?,
            Self::ChatLoaded(chat) => serde_json::to_string(chat)?,
            Self::ChatMessagesLoaded(messages) => serde_json::to_string(messages)?,
            Self::ChatsLoaded(chats) => serde_json::to_string(chats)?,
            Self::SessionInactive
            | Self::NoIdentifierFound
            | Self::LoginFailed
            | Self::RegisterFailed => String::new(),
        };
        Ok(join_frame(self.name(), &payload))
    }

    /// Decode a server frame, as a client would.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let (name, payload) = split_frame(raw)?;
        let event = match name {
            "active_session" => Self::ActiveSession(parse_payload(name, payload)?),
            "session_inactive" => Self::SessionInactive,
            "identifier_found" => Self::IdentifierFound(parse_payload(name, payload)?),
            "no_identifier_found" => Self::NoIdentifierFound,
            "login_succeeded" => Self::LoginSucceeded(parse_payload(name, payload)?),
            "login_failed" => Self::LoginFailed,
            "register_succeeded" => Self::RegisterSucceeded(parse_payload(name, payload)?),
            "register_failed" => Self::RegisterFailed,
            "chat_message_sended" => Self::ChatMessageSended(parse_payload(name, payload)?),
            "chat_message_deleted" => Self::ChatMessageDeleted(parse_payload(name, payload)?),
            "chat_loaded" => Self::ChatLoaded(parse_payload(name, payload)?),
            "chat_messages_loaded" => Self::ChatMessagesLoaded(parse_payload(name, payload)?),
            "chats_loaded" => Self::ChatsLoaded(parse_payload(name, payload)?),
            other => return Err(ProtocolError::UnknownEvent(other.to_string())),
        };
        Ok(event)
    }
}
