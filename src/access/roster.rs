//! Admin membership and gate-channel management.

use thiserror::Error;
use tracing::info;

use crate::storage::{Database, DbError};

/// Errors raised by roster mutations.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Invalid channel handle: '{0}'")]
    InvalidChannel(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Outcome of an admin removal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminRemoval {
    Removed,
    NotAdmin,
    /// The main admin cannot be demoted; nothing changed.
    Protected,
}

/// Admin set plus the immutable main admin, and the gate-channel set.
#[derive(Debug, Clone)]
pub struct AccessRoster {
    db: Database,
    main_admin: i64,
}

impl AccessRoster {
    #[must_use]
    pub fn new(db: Database, main_admin: i64) -> Self {
        Self { db, main_admin }
    }

    #[must_use]
    pub const fn main_admin(&self) -> i64 {
        self.main_admin
    }

    pub fn is_admin(&self, user_id: i64) -> Result<bool, DbError> {
        if user_id == self.main_admin {
            return Ok(true);
        }
        self.db.is_admin_row(user_id)
    }

    /// Returns `true` if the user was not an admin before. `actor` is the
    /// admin making the change.
    pub fn add_admin(&self, actor: i64, user_id: i64) -> Result<bool, DbError> {
        let added = self.db.add_admin(user_id)?;
        if added {
            info!(target: "audit", "Admin {} added admin {}", actor, user_id);
        }
        Ok(added)
    }

    pub fn remove_admin(&self, actor: i64, user_id: i64) -> Result<AdminRemoval, DbError> {
        if user_id == self.main_admin {
            info!(target: "audit", "Admin {} was refused removal of main admin {}", actor, user_id);
            return Ok(AdminRemoval::Protected);
        }
        if self.db.remove_admin(user_id)? {
            info!(target: "audit", "Admin {} removed admin {}", actor, user_id);
            Ok(AdminRemoval::Removed)
        } else {
            Ok(AdminRemoval::NotAdmin)
        }
    }

    /// Effective admin set: persisted admins plus the main admin.
    pub fn list_admins(&self) -> Result<Vec<i64>, DbError> {
        let mut admins = self.db.get_admins()?;
        if !admins.contains(&self.main_admin) {
            admins.insert(0, self.main_admin);
        }
        Ok(admins)
    }

    /// Adds a gate channel. Returns the stored handle and whether it was new.
    pub fn add_channel(&self, actor: i64, handle: &str) -> Result<(String, bool), AccessError> {
        let handle = normalize_channel(handle)?;
        let added = self.db.add_channel(&handle)?;
        if added {
            info!(target: "audit", "Admin {} added gate channel @{}", actor, handle);
        }
        Ok((handle, added))
    }

    /// Removes a gate channel. Returns the handle and whether it existed.
    pub fn remove_channel(&self, actor: i64, handle: &str) -> Result<(String, bool), AccessError> {
        let handle = normalize_channel(handle)?;
        let removed = self.db.remove_channel(&handle)?;
        if removed {
            info!(target: "audit", "Admin {} removed gate channel @{}", actor, handle);
        }
        Ok((handle, removed))
    }

    pub fn list_channels(&self) -> Result<Vec<String>, DbError> {
        self.db.get_channels()
    }
}

/// Canonical storage form of a channel handle: lowercase, no leading `@`
/// or `t.me` link prefix, no surrounding whitespace. Telegram usernames
/// are case-insensitive.
pub fn normalize_channel(handle: &str) -> Result<String, AccessError> {
    let trimmed = handle.trim();
    let bare = ["https://t.me/", "http://t.me/", "t.me/"]
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))
        .unwrap_or(trimmed);
    let bare = bare.trim_start_matches('@').trim_end_matches('/');

    let valid = !bare.is_empty()
        && bare
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(bare.to_ascii_lowercase())
    } else {
        Err(AccessError::InvalidChannel(handle.to_owned()))
    }
}
