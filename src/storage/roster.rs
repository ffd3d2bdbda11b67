//! Persisted admin set and gate-channel set.
//!
//! These are raw set operations. The main-admin rule and handle
//! normalization live in [`crate::access::AccessRoster`].

use super::{Database, DbError};

impl Database {
    pub fn get_admins(&self) -> Result<Vec<i64>, DbError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT user_id FROM admins ORDER BY user_id")?;
            let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
        })
    }

    pub fn is_admin_row(&self, user_id: i64) -> Result<bool, DbError> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM admins WHERE user_id = ?1)",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    /// Returns `true` if the admin was newly inserted.
    pub fn add_admin(&self, user_id: i64) -> Result<bool, DbError> {
        self.with_conn(|conn| {
            let inserted =
                conn.execute("INSERT OR IGNORE INTO admins (user_id) VALUES (?1)", [user_id])?;
            Ok(inserted > 0)
        })
    }

    /// Returns `true` if a row was removed.
    pub fn remove_admin(&self, user_id: i64) -> Result<bool, DbError> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM admins WHERE user_id = ?1", [user_id])?;
            Ok(removed > 0)
        })
    }

    pub fn get_channels(&self) -> Result<Vec<String>, DbError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT username FROM channels ORDER BY username")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
        })
    }

    pub fn add_channel(&self, username: &str) -> Result<bool, DbError> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO channels (username) VALUES (?1)",
                [username],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn remove_channel(&self, username: &str) -> Result<bool, DbError> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM channels WHERE username = ?1", [username])?;
            Ok(removed > 0)
        })
    }
}
