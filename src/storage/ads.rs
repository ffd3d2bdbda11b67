//! Scheduled advertisement queue.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::Serialize;

use super::{Database, DbError, OptionalExt, from_unix, to_unix};

/// A broadcast announcement with a number of sends left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledAd {
    pub id: i64,
    pub image_file_id: Option<String>,
    pub text: String,
    pub button_text: String,
    pub button_url: String,
    pub schedule_time: DateTime<Utc>,
    pub repeat_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAd {
    pub image_file_id: Option<String>,
    pub text: String,
    pub button_text: String,
    pub button_url: String,
    pub schedule_time: DateTime<Utc>,
    pub repeat_count: i64,
}

const AD_COLUMNS: &str =
    "id, image_file_id, text, button_text, button_url, schedule_time, repeat_count";

type AdRow = (i64, Option<String>, String, String, String, i64, i64);

fn ad_row(row: &Row<'_>) -> rusqlite::Result<AdRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn into_ad(row: AdRow) -> Result<ScheduledAd, DbError> {
    let (id, image_file_id, text, button_text, button_url, schedule_time, repeat_count) = row;
    Ok(ScheduledAd {
        id,
        image_file_id,
        text,
        button_text,
        button_url,
        schedule_time: from_unix(schedule_time)?,
        repeat_count,
    })
}

impl Database {
    pub fn schedule_ad(&self, ad: &NewAd) -> Result<i64, DbError> {
        if ad.repeat_count <= 0 {
            return Err(DbError::InvalidData(format!(
                "repeat count must be positive, got {}",
                ad.repeat_count
            )));
        }
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO ads (image_file_id, text, button_text, button_url, schedule_time, repeat_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    ad.image_file_id,
                    ad.text,
                    ad.button_text,
                    ad.button_url,
                    to_unix(ad.schedule_time),
                    ad.repeat_count
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_ad(&self, id: i64) -> Result<Option<ScheduledAd>, DbError> {
        let row = self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {AD_COLUMNS} FROM ads WHERE id = ?1"),
                    [id],
                    ad_row,
                )
                .optional()?;
            Ok(row)
        })?;
        row.map(into_ad).transpose()
    }

    /// Ads with repeats left, by schedule time.
    pub fn list_pending_ads(&self) -> Result<Vec<ScheduledAd>, DbError> {
        self.query_ads(
            &format!(
                "SELECT {AD_COLUMNS} FROM ads WHERE repeat_count > 0 ORDER BY schedule_time, id"
            ),
            [],
        )
    }

    /// Pending ads whose scheduled time is at or before `now`.
    pub fn due_ads(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledAd>, DbError> {
        self.query_ads(
            &format!(
                "SELECT {AD_COLUMNS} FROM ads
                 WHERE repeat_count > 0 AND schedule_time <= ?1
                 ORDER BY schedule_time, id"
            ),
            [to_unix(now)],
        )
    }

    /// Consumes one repeat. Returns the remaining count, or `None` if the
    /// ad is missing or already exhausted.
    pub fn decrement_ad_repeat(&self, id: i64) -> Result<Option<i64>, DbError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE ads SET repeat_count = repeat_count - 1 WHERE id = ?1 AND repeat_count > 0",
                [id],
            )?;
            let remaining = if changed == 0 {
                None
            } else {
                Some(tx.query_row("SELECT repeat_count FROM ads WHERE id = ?1", [id], |row| {
                    row.get::<_, i64>(0)
                })?)
            };
            tx.commit()?;
            Ok(remaining)
        })
    }

    /// Removes an ad outright. Returns `true` if it existed.
    pub fn delete_ad(&self, id: i64) -> Result<bool, DbError> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM ads WHERE id = ?1", [id])?;
            Ok(removed > 0)
        })
    }

    fn query_ads<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<ScheduledAd>, DbError> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params, ad_row)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
        })?;
        rows.into_iter().map(into_ad).collect()
    }
}
