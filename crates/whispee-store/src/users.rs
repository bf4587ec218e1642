use chrono::Utc;
use tracing::{debug, instrument};

use whispee_core::{Identifier, User, UserId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const USER_COLUMNS: &str = "id, username, email, password_hash";

pub struct UserRepo {
    db: Database,
}

impl UserRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a user. Returns `None` when the username or email is already taken.
    #[instrument(skip(self, password))]
    pub fn create(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, StoreError> {
        let id = UserId::new();
        let hash = password_auth::generate_hash(password);
        let now = Utc::now().to_rfc3339();

        let inserted = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id.as_str(), username, email, hash, now],
            )
            .map_err(StoreError::from)
        });

        match inserted {
            Ok(_) => Ok(Some(User {
                id,
                username: username.to_string(),
                email: email.to_string(),
            })),
            Err(e) if e.is_constraint_violation() => {
                debug!(error = %e, "user already exists");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    pub fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.find_with_hash("email", email)?.map(|(user, _)| user))
    }

    #[instrument(skip(self))]
    pub fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.find_with_hash("username", username)?.map(|(user, _)| user))
    }

    /// Verify credentials. Unknown identifiers and wrong passwords both yield `None`.
    #[instrument(skip(self, password))]
    pub fn authenticate(&self, identifier: &str, password: &str) -> Result<Option<User>, StoreError> {
        let found = match Identifier::parse(identifier) {
            Identifier::Email(email) => self.find_with_hash("email", email)?,
            Identifier::Username(username) => self.find_with_hash("username", username)?,
        };

        let Some((user, hash)) = found else {
            return Ok(None);
        };

        match password_auth::verify_password(password, &hash) {
            Ok(()) => Ok(Some(user)),
            Err(_) => {
                debug!(user_id = %user.id, "password mismatch");
                Ok(None)
            }
        }
    }

    fn find_with_hash(
        &self,
        column: &'static str,
        value: &str,
    ) -> Result<Option<(User, String)>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([value])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_user(row)?)),
                None => Ok(None),
            }
        })
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> Result<(User, String), StoreError> {
    let id: String = row_helpers::get(row, 0, "users", "id")?;
    let user = User {
        id: UserId::from_raw(id),
        username: row_helpers::get(row, 1, "users", "username")?,
        email: row_helpers::get(row, 2, "users", "email")?,
    };
    let hash: String = row_helpers::get(row, 3, "users", "password_hash")?;
    Ok((user, hash))
}
