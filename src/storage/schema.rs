//! Database schema definitions.

use rusqlite::Connection;

use super::DbError;

pub fn run_migrations(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT,
    full_name TEXT NOT NULL DEFAULT '',
    joined_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS movies (
    code INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    format TEXT NOT NULL,
    language TEXT NOT NULL,
    file_id TEXT NOT NULL,
    views INTEGER NOT NULL DEFAULT 0,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS admins (
    user_id INTEGER PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS channels (
    username TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    image_file_id TEXT,
    text TEXT NOT NULL,
    button_text TEXT NOT NULL,
    button_url TEXT NOT NULL,
    schedule_time INTEGER NOT NULL,
    repeat_count INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ads_pending ON ads(repeat_count, schedule_time);
";
