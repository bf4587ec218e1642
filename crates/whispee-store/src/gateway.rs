//! The persistence boundary consumed by the realtime server.
//!
//! `StorageGateway` is the contract; `SqliteGateway` is the production
//! implementation on top of the rusqlite repos. Every call runs on the
//! blocking pool since both SQLite and password hashing are synchronous.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use whispee_core::{Chat, ChatId, Message, MessageId, User, UserId};

use crate::chats::ChatRepo;
use crate::database::Database;
use crate::error::StoreError;
use crate::messages::MessageRepo;
use crate::users::UserRepo;

#[async_trait]
pub trait StorageGateway: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Verify credentials; `identifier` is an email when it contains `@`.
    async fn authenticate(&self, identifier: &str, password: &str)
        -> Result<Option<User>, StoreError>;

    /// Returns `None` on conflict (username or email already taken).
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Option<UserId>, StoreError>;

    async fn get_chat(&self, chat_id: ChatId) -> Result<Option<Chat>, StoreError>;

    async fn list_all_chats(&self) -> Result<Vec<Chat>, StoreError>;

    /// Messages ordered by `created_at` ascending.
    async fn list_messages(&self, chat_id: ChatId) -> Result<Vec<Message>, StoreError>;

    async fn add_message(
        &self,
        chat_id: ChatId,
        user_id: &UserId,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Message, StoreError>;

    async fn delete_message(&self, message_id: &MessageId) -> Result<(), StoreError>;
}

/// `StorageGateway` backed by a SQLite [`Database`].
#[derive(Clone)]
pub struct SqliteGateway {
    db: Database,
}

impl SqliteGateway {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(db))
            .await
            .map_err(|e| StoreError::Io(format!("blocking task failed: {e}")))?
    }
}

#[async_trait]
impl StorageGateway for SqliteGateway {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = email.to_string();
        self.blocking(move |db| UserRepo::new(db).find_by_email(&email)).await
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let username = username.to_string();
        self.blocking(move |db| UserRepo::new(db).find_by_username(&username)).await
    }

    async fn authenticate(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<Option<User>, StoreError> {
        let identifier = identifier.to_string();
        let password = password.to_string();
        self.blocking(move |db| UserRepo::new(db).authenticate(&identifier, &password))
            .await
    }

    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Option<UserId>, StoreError> {
        let username = username.to_string();
        let email = email.to_string();
        let password = password.to_string();
        let created = self
            .blocking(move |db| UserRepo::new(db).create(&username, &email, &password))
            .await?;
        Ok(created.map(|user| user.id))
    }

    async fn get_chat(&self, chat_id: ChatId) -> Result<Option<Chat>, StoreError> {
        self.blocking(move |db| ChatRepo::new(db).get(chat_id)).await
    }

    async fn list_all_chats(&self) -> Result<Vec<Chat>, StoreError> {
        self.blocking(|db| ChatRepo::new(db).list()).await
    }

    async fn list_messages(&self, chat_id: ChatId) -> Result<Vec<Message>, StoreError> {
        self.blocking(move |db| MessageRepo::new(db).list_for_chat(chat_id)).await
    }

    async fn add_message(
        &self,
        chat_id: ChatId,
        user_id: &UserId,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Message, StoreError> {
        let user_id = user_id.clone();
        let content = content.to_string();
        self.blocking(move |db| MessageRepo::new(db).add(chat_id, &user_id, &content, timestamp))
            .await
    }

    async fn delete_message(&self, message_id: &MessageId) -> Result<(), StoreError> {
        let id = message_id.clone();
        let removed = self.blocking(move |db| MessageRepo::new(db).delete(&id)).await?;
        if !removed {
            debug!(message_id = %message_id, "delete of unknown message");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> SqliteGateway {
        SqliteGateway::new(Database::in_memory().unwrap())
    }

    #[tokio::test]
    async fn create_user_then_find_both_ways() {
        let gw = gateway();
        let id = gw.create_user("ada", "ada@example.com", "pw").await.unwrap().unwrap();

        let by_email = gw.find_user_by_email("ada@example.com").await.unwrap().unwrap();
        let by_name = gw.find_user_by_username("ada").await.unwrap().unwrap();
        assert_eq!(by_email.id, id);
        assert_eq!(by_name.id, id);
    }

    #[tokio::test]
    async fn create_user_conflict_is_none() {
        let gw = gateway();
        gw.create_user("ada", "ada@example.com", "pw").await.unwrap().unwrap();
        assert!(gw.create_user("ada", "x@example.com", "pw").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn authenticate_roundtrip() {
        let gw = gateway();
        let id = gw.create_user("ada", "ada@example.com", "pw").await.unwrap().unwrap();
        let user = gw.authenticate("ada@example.com", "pw").await.unwrap().unwrap();
        assert_eq!(user.id, id);
        assert!(gw.authenticate("ada", "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn message_lifecycle() {
        let gw = gateway();
        let chat = ChatRepo::new(gw.database().clone()).get_or_create("general").unwrap();
        let user = gw.create_user("ada", "ada@example.com", "pw").await.unwrap().unwrap();

        let msg = gw.add_message(chat.id, &user, "hi", Utc::now()).await.unwrap();
        assert_eq!(gw.list_messages(chat.id).await.unwrap(), vec![msg.clone()]);

        gw.delete_message(&msg.id).await.unwrap();
        assert!(gw.list_messages(chat.id).await.unwrap().is_empty());

        // Deleting again is not an error.
        gw.delete_message(&msg.id).await.unwrap();
    }

    #[tokio::test]
    async fn chats_are_listed_and_fetched() {
        let gw = gateway();
        let repo = ChatRepo::new(gw.database().clone());
        let a = repo.get_or_create("a").unwrap();
        repo.get_or_create("b").unwrap();

        assert_eq!(gw.list_all_chats().await.unwrap().len(), 2);
        assert_eq!(gw.get_chat(a.id).await.unwrap().unwrap().name, "a");
        assert!(gw.get_chat(ChatId(42)).await.unwrap().is_none());
    }
}
