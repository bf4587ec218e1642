use chrono::{DateTime, Utc};
use tracing::instrument;

use whispee_core::{ChatId, Message, MessageId, UserId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

pub struct MessageRepo {
    db: Database,
}

impl MessageRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a message. The timestamp is stored with millisecond precision and
    /// the returned record reflects the stored value.
    #[instrument(skip(self, content), fields(chat_id = %chat_id, user_id = %user_id))]
    pub fn add(
        &self,
        chat_id: ChatId,
        user_id: &UserId,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Message, StoreError> {
        let id = MessageId::new();
        let created_at_ms = timestamp.timestamp_millis();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, chat_id, author_user_id, content, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id.as_str(), chat_id.get(), user_id.as_str(), content, created_at_ms],
            )?;
            Ok(())
        })?;

        Ok(Message {
            id,
            chat_id,
            author_user_id: user_id.clone(),
            content: content.to_string(),
            created_at: row_helpers::from_millis(created_at_ms, "messages", "created_at_ms")?,
        })
    }

    /// Messages of a chat, oldest first. Ties keep insertion order.
    #[instrument(skip(self), fields(chat_id = %chat_id))]
    pub fn list_for_chat(&self, chat_id: ChatId) -> Result<Vec<Message>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, author_user_id, content, created_at_ms
                 FROM messages WHERE chat_id = ?1
                 ORDER BY created_at_ms ASC, rowid ASC",
            )?;
            let mut rows = stmt.query([chat_id.get()])?;
            let mut messages = Vec::new();
            while let Some(row) = rows.next()? {
                messages.push(row_to_message(row)?);
            }
            Ok(messages)
        })
    }

    /// Delete a message. Returns whether a row was removed.
    #[instrument(skip(self), fields(message_id = %id))]
    pub fn delete(&self, id: &MessageId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM messages WHERE id = ?1", [id.as_str()])?;
            Ok(changed > 0)
        })
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<Message, StoreError> {
    let id: String = row_helpers::get(row, 0, "messages", "id")?;
    let author: String = row_helpers::get(row, 2, "messages", "author_user_id")?;
    let created_at_ms: i64 = row_helpers::get(row, 4, "messages", "created_at_ms")?;
    Ok(Message {
        id: MessageId::from_raw(id),
        chat_id: ChatId(row_helpers::get(row, 1, "messages", "chat_id")?),
        author_user_id: UserId::from_raw(author),
        content: row_helpers::get(row, 3, "messages", "content")?,
        created_at: row_helpers::from_millis(created_at_ms, "messages", "created_at_ms")?,
    })
}
