//! In-memory session store.
//!
//! Sessions are created by login or registration and live for the lifetime
//! of the process. Nothing removes or expires them.

use std::collections::HashSet;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use whispee_core::{ChatId, SessionId, User};

/// Session state. Serializes as the `active_session` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub user: User,
    pub opened_chat_id: Option<ChatId>,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<SessionId, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session for `user` under a fresh, never-issued id.
    pub fn create(&self, user: User) -> Session {
        loop {
            let id = SessionId::new();
            if let Entry::Vacant(slot) = self.sessions.entry(id.clone()) {
                let session = Session {
                    session_id: id,
                    user,
                    opened_chat_id: None,
                };
                slot.insert(session.clone());
                return session;
            }
        }
    }

    pub fn lookup(&self, session_id: &SessionId) -> Option<Session> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }

    /// Record which chat the session is viewing. Returns `false` for unknown ids.
    pub fn set_opened_chat(&self, session_id: &SessionId, chat_id: ChatId) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(mut session) => {
                session.opened_chat_id = Some(chat_id);
                true
            }
            None => false,
        }
    }

    /// Sessions currently viewing `chat_id`.
    pub fn viewers_of(&self, chat_id: ChatId) -> HashSet<SessionId> {
        self.sessions
            .iter()
            .filter(|entry| entry.opened_chat_id == Some(chat_id))
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
