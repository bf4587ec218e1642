//! Routes decoded client commands to their handlers.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn, Span};
use whispee_core::{Identifier, User};
use whispee_store::StorageGateway;

use crate::connection::Connection;
use crate::error::DispatchError;
use crate::presence::PresenceRouter;
use crate::protocol::{
    CheckIdentifierParams, CheckSessionParams, DeleteMessageParams, Event, LoadChatParams,
    LoginParams, MessageDeleted, RegisterParams, Request, SendMessageParams, SessionGranted,
};
use crate::sessions::{Session, SessionStore};

pub struct Dispatcher {
    gateway: Arc<dyn StorageGateway>,
    sessions: Arc<SessionStore>,
    presence: Arc<PresenceRouter>,
}

impl Dispatcher {
    pub fn new(
        gateway: Arc<dyn StorageGateway>,
        sessions: Arc<SessionStore>,
        presence: Arc<PresenceRouter>,
    ) -> Self {
        Self {
            gateway,
            sessions,
            presence,
        }
    }

    /// Handle one raw inbound frame from `conn`.
    ///
    /// An `Err` means the connection should be closed.
    #[instrument(skip_all, fields(connection_id = %conn.id, command = tracing::field::Empty))]
    pub async fn dispatch(&self, conn: &Connection, raw: &str) -> Result<(), DispatchError> {
        let request = Request::decode(raw)?;
        Span::current().record("command", request.name());

        match request {
            Request::CheckSession(params) => self.check_session(conn, params).await,
            Request::CheckIdentifier(params) => self.check_identifier(conn, params).await,
            Request::LoginUser(params) => self.login_user(conn, params).await,
            Request::RegisterUser(params) => self.register_user(conn, params).await,
            Request::SendChatMessage(params) => self.send_chat_message(conn, params).await,
            Request::DeleteChatMessage(params) => self.delete_chat_message(conn, params).await,
            Request::LoadChat(params) => self.load_chat(conn, params).await,
            Request::LoadChats => self.load_chats(conn).await,
            Request::Unknown(name) => {
                warn!(command = %name, "unknown socket command");
                Ok(())
            }
        }
    }

    async fn reply(&self, conn: &Connection, event: Event) -> Result<(), DispatchError> {
        if !self.presence.send_to(conn, &event).await? {
            debug!(connection_id = %conn.id, event = event.name(), "reply dropped, writer gone");
        }
        Ok(())
    }

    fn bound_session(&self, conn: &Connection, command: &'static str) -> Result<Session, DispatchError> {
        conn.session_id()
            .and_then(|id| self.sessions.lookup(&id))
            .ok_or(DispatchError::NoSession { command })
    }

    fn open_session(&self, conn: &Connection, user: User) -> SessionGranted {
        let session = self.sessions.create(user);
        conn.bind_session(session.session_id.clone());
        info!(
            connection_id = %conn.id,
            session_id = %session.session_id,
            user_id = %session.user.id,
            "session opened"
        );
        SessionGranted {
            session_id: session.session_id,
        }
    }

    // ── Handlers ──

    async fn check_session(
        &self,
        conn: &Connection,
        params: CheckSessionParams,
    ) -> Result<(), DispatchError> {
        let session = params
            .session_id
            .and_then(|session_id| self.sessions.lookup(&session_id));
        match session {
            Some(session) => {
                conn.bind_session(session.session_id.clone());
                self.reply(conn, Event::ActiveSession(session)).await
            }
            None => self.reply(conn, Event::SessionInactive).await,
        }
    }

    async fn check_identifier(
        &self,
        conn: &Connection,
        params: CheckIdentifierParams,
    ) -> Result<(), DispatchError> {
        let user = match Identifier::parse(&params.identifier) {
            Identifier::Email(email) => self.gateway.find_user_by_email(email).await?,
            Identifier::Username(username) => self.gateway.find_user_by_username(username).await?,
        };
        let event = match user {
            Some(user) => Event::IdentifierFound(user),
            None => Event::NoIdentifierFound,
        };
        self.reply(conn, event).await
    }

    async fn login_user(&self, conn: &Connection, params: LoginParams) -> Result<(), DispatchError> {
        if params.identifier.is_empty() || params.password.is_empty() {
            debug!("login with empty field ignored");
            return Ok(());
        }

        match self
            .gateway
            .authenticate(&params.identifier, &params.password)
            .await?
        {
            Some(user) => {
                let granted = self.open_session(conn, user);
                self.reply(conn, Event::LoginSucceeded(granted)).await
            }
            None => self.reply(conn, Event::LoginFailed).await,
        }
    }

    async fn register_user(
        &self,
        conn: &Connection,
        params: RegisterParams,
    ) -> Result<(), DispatchError> {
        if params.username.is_empty() || params.email.is_empty() || params.password.is_empty() {
            debug!("registration with empty field ignored");
            return Ok(());
        }

        let created = self
            .gateway
            .create_user(&params.username, &params.email, &params.password)
            .await?;
        let Some(user_id) = created else {
            return self.reply(conn, Event::RegisterFailed).await;
        };

        let user = User {
            id: user_id,
            username: params.username,
            email: params.email,
        };
        let granted = self.open_session(conn, user);
        self.reply(conn, Event::RegisterSucceeded(granted)).await
    }

    /// Persists the message, then fans it out to the viewers of the
    /// sender's opened chat, which is not necessarily `params.chat_id`.
    async fn send_chat_message(
        &self,
        conn: &Connection,
        params: SendMessageParams,
    ) -> Result<(), DispatchError> {
        let session = self.bound_session(conn, "send_chat_message")?;

        if self.gateway.get_chat(params.chat_id).await?.is_none() {
            warn!(chat_id = %params.chat_id, "message for unknown chat ignored");
            return Ok(());
        }

        let message = self
            .gateway
            .add_message(params.chat_id, &session.user.id, &params.content, Utc::now())
            .await?;

        // Re-read: another connection sharing this session may have moved it.
        let target = self
            .sessions
            .lookup(&session.session_id)
            .and_then(|s| s.opened_chat_id);
        let Some(target) = target else {
            debug!(message_id = %message.id, "sender has no opened chat, nothing to deliver");
            return Ok(());
        };

        let delivered = self
            .presence
            .broadcast_to_viewers(target, &Event::ChatMessageSended(message))?;
        debug!(chat_id = %target, delivered, "chat message fanned out");
        Ok(())
    }

    async fn delete_chat_message(
        &self,
        conn: &Connection,
        params: DeleteMessageParams,
    ) -> Result<(), DispatchError> {
        self.gateway.delete_message(&params.message_id).await?;
        let event = Event::ChatMessageDeleted(MessageDeleted {
            message_id: params.message_id,
        });
        self.reply(conn, event).await
    }

    async fn load_chat(&self, conn: &Connection, params: LoadChatParams) -> Result<(), DispatchError> {
        let session = self.bound_session(conn, "load_chat")?;
        // Viewing state changes even when the chat turns out not to exist.
        self.sessions.set_opened_chat(&session.session_id, params.chat_id);

        let Some(chat) = self.gateway.get_chat(params.chat_id).await? else {
            debug!(chat_id = %params.chat_id, "no chat found");
            return Ok(());
        };

        let chat_id = chat.id;
        self.reply(conn, Event::ChatLoaded(chat)).await?;
        let messages = self.gateway.list_messages(chat_id).await?;
        self.reply(conn, Event::ChatMessagesLoaded(messages)).await
    }

    async fn load_chats(&self, conn: &Connection) -> Result<(), DispatchError> {
        let chats = self.gateway.list_all_chats().await?;
        self.reply(conn, Event::ChatsLoaded(chats)).await
    }
}
