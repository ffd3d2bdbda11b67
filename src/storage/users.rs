//! User roster: every identity that has contacted the bot.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Database, DbError, OptionalExt, from_unix, to_unix};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    pub full_name: String,
    pub joined_at: DateTime<Utc>,
}

impl Database {
    /// Registers a user on first contact.
    ///
    /// Returns `true` when the user was created; existing users are left
    /// untouched.
    pub fn add_user(
        &self,
        id: i64,
        username: Option<&str>,
        full_name: &str,
    ) -> Result<bool, DbError> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO users (id, username, full_name, joined_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, username, full_name, to_unix(Utc::now())],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>, DbError> {
        let row = self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, username, full_name, joined_at FROM users WHERE id = ?1",
                    [id],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, i64>(3)?,
                        ))
                    },
                )
                .optional()?;
            Ok(row)
        })?;

        row.map(|(id, username, full_name, joined)| {
            Ok(User {
                id,
                username,
                full_name,
                joined_at: from_unix(joined)?,
            })
        })
        .transpose()
    }

    /// Ids of every known user, the fan-out recipient list.
    pub fn all_user_ids(&self) -> Result<Vec<i64>, DbError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM users ORDER BY id")?;
            let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
        })
    }

    pub fn count_users(&self) -> Result<u64, DbError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
            Ok(u64::try_from(count).unwrap_or_default())
        })
    }
}
