use std::sync::Arc;

use tracing::{debug, instrument};
use whispee_core::ChatId;

use crate::connection::Connection;
use crate::protocol::Event;
use crate::registry::ConnectionRegistry;
use crate::sessions::SessionStore;

/// Pushes events to connections, either directly or to every viewer of a chat.
pub struct PresenceRouter {
    registry: Arc<ConnectionRegistry>,
    sessions: Arc<SessionStore>,
}

impl PresenceRouter {
    pub fn new(registry: Arc<ConnectionRegistry>, sessions: Arc<SessionStore>) -> Self {
        Self { registry, sessions }
    }

    /// Deliver `event` to every connection whose session is viewing `chat_id`.
    ///
    /// Works from a registry snapshot; a full or closed queue on one
    /// connection does not affect the others. Returns the number of
    /// connections the frame was queued for.
    #[instrument(skip_all, fields(chat_id = %chat_id, event = event.name()))]
    pub fn broadcast_to_viewers(&self, chat_id: ChatId, event: &Event) -> Result<usize, serde_json::Error> {
        let frame = event.encode()?;
        let viewers = self.sessions.viewers_of(chat_id);
        if viewers.is_empty() {
            return Ok(0);
        }

        let mut delivered = 0;
        for conn in self.registry.snapshot() {
            let Some(session_id) = conn.session_id() else {
                continue;
            };
            if !viewers.contains(&session_id) {
                continue;
            }
            debug!(connection_id = %conn.id, ">> {frame}");
            if conn.send(frame.clone()) {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    /// Reply to one connection, waiting for queue space.
    pub async fn send_to(&self, conn: &Connection, event: &Event) -> Result<bool, serde_json::Error> {
        let frame = event.encode()?;
        debug!(connection_id = %conn.id, ">> {frame}");
        Ok(conn.send_wait(frame).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use whispee_core::{User, UserId};

    use crate::protocol::MessageDeleted;

    struct Fixture {
        registry: Arc<ConnectionRegistry>,
        sessions: Arc<SessionStore>,
        router: PresenceRouter,
    }

    fn fixture(queue: usize) -> Fixture {
        let registry = Arc::new(ConnectionRegistry::new(queue));
        let sessions = Arc::new(SessionStore::new());
        let router = PresenceRouter::new(Arc::clone(&registry), Arc::clone(&sessions));
        Fixture {
            registry,
            sessions,
            router,
        }
    }

    impl Fixture {
        /// Register a connection bound to a new session viewing `chat`.
        fn viewer(&self, chat: Option<ChatId>) -> (Arc<Connection>, mpsc::Receiver<String>) {
            let (conn, rx) = self.registry.register();
            let session = self.sessions.create(User {
                id: UserId::new(),
                username: "u".into(),
                email: "u@example.com".into(),
            });
            if let Some(chat) = chat {
                self.sessions.set_opened_chat(&session.session_id, chat);
            }
            conn.bind_session(session.session_id);
            (conn, rx)
        }
    }

    fn event() -> Event {
        Event::ChatMessageDeleted(MessageDeleted {
            message_id: whispee_core::MessageId::from_raw("msg_1"),
        })
    }

    #[test]
    fn broadcast_reaches_only_viewers() {
        let f = fixture(8);
        let (_a, mut rx_a) = f.viewer(Some(ChatId(5)));
        let (_b, mut rx_b) = f.viewer(Some(ChatId(5)));
        let (_c, mut rx_c) = f.viewer(Some(ChatId(7)));
        let (_d, mut rx_d) = f.viewer(None);
        let (_unbound, mut rx_unbound) = f.registry.register();

        let delivered = f.router.broadcast_to_viewers(ChatId(5), &event()).unwrap();
        assert_eq!(delivered, 2);

        let expected = event().encode().unwrap();
        assert_eq!(rx_a.try_recv().unwrap(), expected);
        assert_eq!(rx_b.try_recv().unwrap(), expected);
        assert!(rx_c.try_recv().is_err());
        assert!(rx_d.try_recv().is_err());
        assert!(rx_unbound.try_recv().is_err());
    }

    #[test]
    fn broadcast_with_no_viewers_delivers_nothing() {
        let f = fixture(8);
        let (_a, mut rx_a) = f.viewer(Some(ChatId(1)));
        assert_eq!(f.router.broadcast_to_viewers(ChatId(2), &event()).unwrap(), 0);
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn one_failed_delivery_does_not_stop_others() {
        let f = fixture(1);
        let (a, _rx_a) = f.viewer(Some(ChatId(5)));
        let (_b, rx_b) = f.viewer(Some(ChatId(5)));
        let (_c, mut rx_c) = f.viewer(Some(ChatId(5)));

        // a: queue already full; b: writer gone.
        assert!(a.send("filler".into()));
        drop(rx_b);

        let delivered = f.router.broadcast_to_viewers(ChatId(5), &event()).unwrap();
        assert_eq!(delivered, 1);
        assert!(rx_c.try_recv().is_ok());
    }

    #[test]
    fn deregistered_connection_is_skipped() {
        let f = fixture(8);
        let (a, mut rx_a) = f.viewer(Some(ChatId(5)));
        f.registry.deregister(&a.id);
        assert_eq!(f.router.broadcast_to_viewers(ChatId(5), &event()).unwrap(), 0);
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn two_connections_sharing_a_session_both_receive() {
        let f = fixture(8);
        let (a, mut rx_a) = f.viewer(Some(ChatId(5)));
        let (b, mut rx_b) = f.registry.register();
        b.bind_session(a.session_id().unwrap());

        assert_eq!(f.router.broadcast_to_viewers(ChatId(5), &event()).unwrap(), 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn send_to_targets_one_connection() {
        let f = fixture(8);
        let (a, mut rx_a) = f.viewer(Some(ChatId(5)));
        let (_b, mut rx_b) = f.viewer(Some(ChatId(5)));

        assert!(f.router.send_to(&a, &Event::LoginFailed).await.unwrap());
        assert_eq!(rx_a.recv().await.unwrap(), "login_failed|||");
        assert!(rx_b.try_recv().is_err());
    }
}
