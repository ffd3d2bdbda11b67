//! Movie catalog: code assignment, lookup, search, soft delete and views.

use chrono::Utc;
use rusqlite::{Row, TransactionBehavior};
use serde::Serialize;

use super::{Database, DbError, OptionalExt, to_unix};

/// A catalog entry addressed by its numeric code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Movie {
    pub code: i64,
    pub title: String,
    pub format: String,
    pub language: String,
    /// Opaque content reference understood by the transport.
    pub file_id: String,
    pub views: i64,
    pub is_deleted: bool,
}

/// Fields supplied by an admin when adding a movie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovie {
    pub title: String,
    pub format: String,
    pub language: String,
    pub file_id: String,
}

/// Aggregate counters shown on the admin panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub users: u64,
    /// Movies that are not soft-deleted.
    pub movies: u64,
    /// Views summed over every movie, deleted ones included.
    pub total_views: i64,
}

const MOVIE_COLUMNS: &str = "code, title, format, language, file_id, views, is_deleted";

fn movie_from_row(row: &Row<'_>) -> rusqlite::Result<Movie> {
    Ok(Movie {
        code: row.get(0)?,
        title: row.get(1)?,
        format: row.get(2)?,
        language: row.get(3)?,
        file_id: row.get(4)?,
        views: row.get(5)?,
        is_deleted: row.get(6)?,
    })
}

impl Database {
    /// Adds a movie and returns its code, one above the highest code ever
    /// issued (soft-deleted rows included, so codes are never reused).
    pub fn add_movie(&self, movie: &NewMovie) -> Result<i64, DbError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let code: i64 =
                tx.query_row("SELECT COALESCE(MAX(code), 0) + 1 FROM movies", [], |row| {
                    row.get(0)
                })?;
            tx.execute(
                "INSERT INTO movies (code, title, format, language, file_id, views, is_deleted, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, ?6)",
                rusqlite::params![
                    code,
                    movie.title,
                    movie.format,
                    movie.language,
                    movie.file_id,
                    to_unix(Utc::now())
                ],
            )?;
            tx.commit()?;
            Ok(code)
        })
    }

    /// Looks up an active movie by code.
    pub fn get_movie(&self, code: i64) -> Result<Option<Movie>, DbError> {
        self.with_conn(|conn| {
            let movie = conn
                .query_row(
                    &format!("SELECT {MOVIE_COLUMNS} FROM movies WHERE code = ?1 AND is_deleted = 0"),
                    [code],
                    movie_from_row,
                )
                .optional()?;
            Ok(movie)
        })
    }

    /// Case-insensitive substring search over active titles, by code.
    pub fn search_movies(&self, query: &str) -> Result<Vec<Movie>, DbError> {
        let needle = query.trim().to_lowercase();
        let movies = self.list_movies()?;
        Ok(movies
            .into_iter()
            .filter(|m| m.title.to_lowercase().contains(&needle))
            .collect())
    }

    /// Soft-deletes a movie.
    ///
    /// Returns `true` if an active movie was hidden; missing or already
    /// deleted codes are a no-op.
    pub fn delete_movie(&self, code: i64) -> Result<bool, DbError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE movies SET is_deleted = 1 WHERE code = ?1 AND is_deleted = 0",
                [code],
            )?;
            Ok(changed > 0)
        })
    }

    /// Adds one view, relative to the stored value. No-op for unknown codes.
    pub fn increment_views(&self, code: i64) -> Result<(), DbError> {
        self.with_conn(|conn| {
            conn.execute("UPDATE movies SET views = views + 1 WHERE code = ?1", [code])?;
            Ok(())
        })
    }

    /// Active movies ordered by code.
    pub fn list_movies(&self) -> Result<Vec<Movie>, DbError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MOVIE_COLUMNS} FROM movies WHERE is_deleted = 0 ORDER BY code"
            ))?;
            let rows = stmt.query_map([], movie_from_row)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
        })
    }

    pub fn stats(&self) -> Result<CatalogStats, DbError> {
        self.with_conn(|conn| {
            let users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
            let movies: i64 = conn.query_row(
                "SELECT COUNT(*) FROM movies WHERE is_deleted = 0",
                [],
                |row| row.get(0),
            )?;
            let total_views: i64 =
                conn.query_row("SELECT COALESCE(SUM(views), 0) FROM movies", [], |row| {
                    row.get(0)
                })?;
            Ok(CatalogStats {
                users: u64::try_from(users).unwrap_or_default(),
                movies: u64::try_from(movies).unwrap_or_default(),
                total_views,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    fn movie(title: &str) -> NewMovie {
        NewMovie {
            title: title.to_owned(),
            format: "mp4".to_owned(),
            language: "en".to_owned(),
            file_id: format!("file_{title}"),
        }
    }

    #[test]
    fn test_codes_start_at_one_and_increase() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.add_movie(&movie("Inception")).unwrap(), 1);
        assert_eq!(db.add_movie(&movie("Tenet")).unwrap(), 2);

        let got = db.get_movie(1).unwrap().unwrap();
        assert_eq!(got.title, "Inception");
        assert_eq!(got.views, 0);
        assert!(!got.is_deleted);
    }

    #[test]
    fn test_codes_not_reused_after_delete() {
        let db = Database::open_in_memory().unwrap();
        db.add_movie(&movie("A")).unwrap();
        let second = db.add_movie(&movie("B")).unwrap();
        assert!(db.delete_movie(second).unwrap());
        assert_eq!(db.add_movie(&movie("C")).unwrap(), 3);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let code = db.add_movie(&movie("A")).unwrap();
        assert!(db.delete_movie(code).unwrap());
        assert!(!db.delete_movie(code).unwrap());
        assert!(!db.delete_movie(999).unwrap());
        assert!(db.get_movie(code).unwrap().is_none());
    }

    #[test]
    fn test_search_case_insensitive_and_skips_deleted() {
        let db = Database::open_in_memory().unwrap();
        db.add_movie(&movie("The Matrix")).unwrap();
        let hidden = db.add_movie(&movie("Matrix Reloaded")).unwrap();
        db.add_movie(&movie("Интерстеллар")).unwrap();
        db.add_movie(&movie("Another matrix")).unwrap();
        db.delete_movie(hidden).unwrap();

        let found: Vec<i64> = db
            .search_movies("MATRIX")
            .unwrap()
            .iter()
            .map(|m| m.code)
            .collect();
        assert_eq!(found, vec![1, 4]);

        let cyrillic = db.search_movies("интер").unwrap();
        assert_eq!(cyrillic.len(), 1);
    }

    #[test]
    fn test_increment_views_unknown_code_is_noop() {
        let db = Database::open_in_memory().unwrap();
        db.increment_views(7).unwrap();
        assert_eq!(db.stats().unwrap().total_views, 0);
    }

    #[test]
    fn test_list_movies_excludes_deleted() {
        let db = Database::open_in_memory().unwrap();
        db.add_movie(&movie("A")).unwrap();
        db.add_movie(&movie("B")).unwrap();
        db.delete_movie(1).unwrap();
        let listed = db.list_movies().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].code, 2);
    }

    #[test]
    fn test_stats_counts_active_movies_and_all_views() {
        let db = Database::open_in_memory().unwrap();
        db.add_user(1, None, "One").unwrap();
        let first = db.add_movie(&movie("A")).unwrap();
        let second = db.add_movie(&movie("B")).unwrap();
        for _ in 0..3 {
            db.increment_views(first).unwrap();
        }
        for _ in 0..2 {
            db.increment_views(second).unwrap();
        }
        db.delete_movie(second).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.users, 1);
        assert_eq!(stats.movies, 1);
        assert_eq!(stats.total_views, 5);
    }

    #[test]
    fn test_concurrent_add_movie_yields_unique_codes() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let db = Arc::clone(&db);
                std::thread::spawn(move || {
                    (0..10)
                        .map(|i| db.add_movie(&movie(&format!("{t}-{i}"))).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let codes: Vec<i64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let unique: HashSet<i64> = codes.iter().copied().collect();
        assert_eq!(unique.len(), 80);
        assert_eq!(unique, (1..=80).collect());
    }

    #[test]
    fn test_concurrent_increment_views_counts_exactly() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let code = db.add_movie(&movie("Popular")).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let db = Arc::clone(&db);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        db.increment_views(code).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(db.get_movie(code).unwrap().unwrap().views, 100);
    }
}
