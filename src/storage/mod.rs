//! SQLite persistence for the catalog, rosters, settings and scheduled ads.
//!
//! A single connection is shared behind a mutex. Every multi-statement
//! mutation runs inside one transaction while the lock is held, so
//! concurrent handlers never interleave a read-then-write sequence.

mod ads;
mod movies;
mod roster;
mod schema;
mod settings;
mod users;

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

pub use ads::{NewAd, ScheduledAd};
pub use movies::{CatalogStats, Movie, NewMovie};
pub use settings::{
    DEFAULT_SETTINGS, FORCE_SUBSCRIBE, NOTIFY_NEW_USER, is_flag_key, is_truthy, parse_flag,
};
pub use users::User;

/// Thread-safe database handle wrapping a single SQLite connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens or creates the database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Creates an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, DbError> {
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.configure()?;
        db.with_conn(|conn| schema::run_migrations(conn))?;
        Ok(db)
    }

    /// Accesses the underlying connection with a closure.
    pub fn with_conn<F, R>(&self, f: F) -> Result<R, DbError>
    where
        F: FnOnce(&Connection) -> Result<R, DbError>,
    {
        let conn = self.conn.lock().map_err(|_| DbError::LockPoisoned)?;
        f(&conn)
    }

    /// Accesses the underlying connection mutably (for transactions).
    pub fn with_conn_mut<F, R>(&self, f: F) -> Result<R, DbError>
    where
        F: FnOnce(&mut Connection) -> Result<R, DbError>,
    {
        let mut conn = self.conn.lock().map_err(|_| DbError::LockPoisoned)?;
        f(&mut conn)
    }

    fn configure(&self) -> Result<(), DbError> {
        self.with_conn(|conn| {
            // journal_mode answers with a row
            conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
            conn.execute_batch("PRAGMA busy_timeout=5000;")?;
            Ok(())
        })
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

/// Database error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn to_unix(time: DateTime<Utc>) -> i64 {
    time.timestamp()
}

fn from_unix(secs: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| DbError::InvalidData(format!("timestamp out of range: {secs}")))
}
