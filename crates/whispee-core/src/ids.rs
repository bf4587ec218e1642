use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! branded_id {
    ($name:ident, $prefix:expr, $gen:expr) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, $gen))
            }

            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// Session ids are bearer credentials, so they carry no timestamp.
branded_id!(SessionId, "sess", Uuid::new_v4());
branded_id!(ConnectionId, "conn", Uuid::now_v7());
branded_id!(UserId, "user", Uuid::now_v7());
branded_id!(MessageId, "msg", Uuid::now_v7());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_has_prefix() {
        let id = SessionId::new();
        assert!(id.as_str().starts_with("sess_"), "got: {id}");
    }

    #[test]
    fn connection_id_has_prefix() {
        let id = ConnectionId::new();
        assert!(id.as_str().starts_with("conn_"), "got: {id}");
    }

    #[test]
    fn user_and_message_ids_have_prefix() {
        assert!(UserId::new().as_str().starts_with("user_"));
        assert!(MessageId::new().as_str().starts_with("msg_"));
    }

    #[test]
    fn session_ids_are_unique() {
        let ids: std::collections::HashSet<SessionId> =
            (0..1_000).map(|_| SessionId::new()).collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn message_ids_are_monotonic() {
        let ids: Vec<MessageId> = (0..100).map(|_| MessageId::new()).collect();
        for w in ids.windows(2) {
            assert!(w[0].as_str() < w[1].as_str(), "not monotonic: {} >= {}", w[0], w[1]);
        }
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = SessionId::from_raw("sess_abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"sess_abc\"");
        let back: SessionId = serde_json::from_str("\"sess_abc\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn from_raw_preserves_value() {
        let id = MessageId::from_raw("65a1f0c2e4b0");
        assert_eq!(id.as_str(), "65a1f0c2e4b0");
        assert_eq!(id.to_string(), "65a1f0c2e4b0");
    }
}
