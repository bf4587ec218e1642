//! Domain records shared by the store and the realtime server.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, UserId};

/// Numeric chat identifier, as clients address chats on the wire.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl ChatId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Public projection of a user account. Never carries password material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub author_user_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A login identifier: anything containing `@` is treated as an email.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Identifier<'a> {
    Email(&'a str),
    Username(&'a str),
}

impl<'a> Identifier<'a> {
    pub fn parse(raw: &'a str) -> Self {
        if raw.contains('@') {
            Self::Email(raw)
        } else {
            Self::Username(raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_with_at_is_email() {
        assert_eq!(Identifier::parse("ada@example.com"), Identifier::Email("ada@example.com"));
        assert_eq!(Identifier::parse("@ada"), Identifier::Email("@ada"));
    }

    #[test]
    fn identifier_without_at_is_username() {
        assert_eq!(Identifier::parse("ada"), Identifier::Username("ada"));
        assert_eq!(Identifier::parse(""), Identifier::Username(""));
    }

    #[test]
    fn chat_id_is_a_bare_number_on_the_wire() {
        assert_eq!(serde_json::to_string(&ChatId(5)).unwrap(), "5");
        let id: ChatId = serde_json::from_str("7").unwrap();
        assert_eq!(id, ChatId(7));
    }

    #[test]
    fn message_serializes_expected_fields() {
        let msg = Message {
            id: MessageId::from_raw("msg_1"),
            chat_id: ChatId(5),
            author_user_id: UserId::from_raw("user_1"),
            content: "hi".into(),
            created_at: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["id"], "msg_1");
        assert_eq!(json["chat_id"], 5);
        assert_eq!(json["author_user_id"], "user_1");
        assert_eq!(json["content"], "hi");
        assert!(json["created_at"].is_string());
    }

    #[test]
    fn user_has_no_password_field() {
        let user = User {
            id: UserId::from_raw("user_1"),
            username: "ada".into(),
            email: "ada@example.com".into(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 3);
        assert!(json.get("password").is_none());
    }
}
