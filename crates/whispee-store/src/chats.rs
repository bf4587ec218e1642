use chrono::Utc;
use tracing::instrument;

use whispee_core::{Chat, ChatId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

pub struct ChatRepo {
    db: Database,
}

impl ChatRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Get or create a chat with the given name.
    /// If a chat already exists with this name, returns it.
    #[instrument(skip(self))]
    pub fn get_or_create(&self, name: &str) -> Result<Chat, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, created_at FROM chats WHERE name = ?1")?;
            let mut rows = stmt.query([name])?;
            if let Some(row) = rows.next()? {
                return row_to_chat(row);
            }

            let now = Utc::now();
            conn.execute(
                "INSERT INTO chats (name, created_at) VALUES (?1, ?2)",
                rusqlite::params![name, now.to_rfc3339()],
            )?;

            Ok(Chat {
                id: ChatId(conn.last_insert_rowid()),
                name: name.to_string(),
                created_at: now,
            })
        })
    }

    #[instrument(skip(self), fields(chat_id = %id))]
    pub fn get(&self, id: ChatId) -> Result<Option<Chat>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, created_at FROM chats WHERE id = ?1")?;
            let mut rows = stmt.query([id.get()])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_chat(row)?)),
                None => Ok(None),
            }
        })
    }

    /// List all chats in creation order.
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<Chat>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name, created_at FROM chats ORDER BY id ASC")?;
            let mut rows = stmt.query([])?;
            let mut chats = Vec::new();
            while let Some(row) = rows.next()? {
                chats.push(row_to_chat(row)?);
            }
            Ok(chats)
        })
    }
}

fn row_to_chat(row: &rusqlite::Row<'_>) -> Result<Chat, StoreError> {
    let created_at: String = row_helpers::get(row, 2, "chats", "created_at")?;
    Ok(Chat {
        id: ChatId(row_helpers::get(row, 0, "chats", "id")?),
        name: row_helpers::get(row, 1, "chats", "name")?,
        created_at: row_helpers::parse_timestamp(&created_at, "chats", "created_at")?,
    })
}
