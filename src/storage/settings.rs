//! Key/value bot settings with fixed defaults.

use std::collections::BTreeMap;

use super::{Database, DbError, OptionalExt};

/// Whether numeric-code lookups require gate-channel membership.
pub const FORCE_SUBSCRIBE: &str = "force_subscribe";

/// Whether the main admin is notified about newly registered users.
pub const NOTIFY_NEW_USER: &str = "notification_new_user";

/// Values used when a key has never been set.
pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[(FORCE_SUBSCRIBE, "true"), (NOTIFY_NEW_USER, "true")];

/// Interprets a bool-as-string setting. Only explicit falsy spellings
/// disable a flag.
pub fn is_truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_lowercase().as_str(),
        "" | "false" | "0" | "no" | "off"
    )
}

/// Strict parse used when an operator sets a flag. `None` for anything
/// other than the recognised spellings.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Every built-in setting is a bool-as-string flag.
pub fn is_flag_key(key: &str) -> bool {
    default_for(key).is_some()
}

fn default_for(key: &str) -> Option<&'static str> {
    DEFAULT_SETTINGS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
}

impl Database {
    /// Returns the stored value, else the default for the key, else `None`.
    pub fn get_setting(&self, key: &str) -> Result<Option<String>, DbError> {
        let stored = self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = ?1")?;
            let value = stmt
                .query_row([key], |row| row.get::<_, String>(0))
                .optional()?;
            Ok(value)
        })?;
        Ok(stored.or_else(|| default_for(key).map(str::to_owned)))
    }

    /// Resolves a bool-as-string setting; unknown keys without a value are
    /// `false`.
    pub fn setting_flag(&self, key: &str) -> Result<bool, DbError> {
        Ok(self.get_setting(key)?.as_deref().is_some_and(is_truthy))
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), DbError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = ?2",
                rusqlite::params![key, value],
            )?;
            Ok(())
        })
    }

    /// Every known setting: defaults overlaid with stored values.
    pub fn all_settings(&self) -> Result<BTreeMap<String, String>, DbError> {
        let mut map: BTreeMap<String, String> = DEFAULT_SETTINGS
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (k, v) = row?;
                map.insert(k, v);
            }
            Ok(())
        })?;
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_when_unset() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get_setting(FORCE_SUBSCRIBE).unwrap().as_deref(), Some("true"));
        assert_eq!(db.get_setting(NOTIFY_NEW_USER).unwrap().as_deref(), Some("true"));
        assert_eq!(db.get_setting("unknown").unwrap(), None);
        assert!(db.setting_flag(FORCE_SUBSCRIBE).unwrap());
        assert!(!db.setting_flag("unknown").unwrap());
    }

    #[test]
    fn test_set_overrides_default() {
        let db = Database::open_in_memory().unwrap();
        db.set_setting(FORCE_SUBSCRIBE, "false").unwrap();
        assert_eq!(db.get_setting(FORCE_SUBSCRIBE).unwrap().as_deref(), Some("false"));
        assert!(!db.setting_flag(FORCE_SUBSCRIBE).unwrap());

        db.set_setting(FORCE_SUBSCRIBE, "yes").unwrap();
        assert!(db.setting_flag(FORCE_SUBSCRIBE).unwrap());
    }

    #[test]
    fn test_is_truthy() {
        for falsy in ["false", "FALSE", "0", "no", "off", "", "  "] {
            assert!(!is_truthy(falsy), "{falsy:?} should be falsy");
        }
        for truthy in ["true", "1", "yes", "on", "anything"] {
            assert!(is_truthy(truthy), "{truthy:?} should be truthy");
        }
    }

    #[test]
    fn test_all_settings_merges_defaults() {
        let db = Database::open_in_memory().unwrap();
        db.set_setting(NOTIFY_NEW_USER, "off").unwrap();
        db.set_setting("welcome", "hi").unwrap();
        let all = db.all_settings().unwrap();
        assert_eq!(all.get(FORCE_SUBSCRIBE).map(String::as_str), Some("true"));
        assert_eq!(all.get(NOTIFY_NEW_USER).map(String::as_str), Some("off"));
        assert_eq!(all.get("welcome").map(String::as_str), Some("hi"));
    }

    #[test]
    fn test_parse_flag_is_strict() {
        assert_eq!(parse_flag("ON"), Some(true));
        assert_eq!(parse_flag(" no "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
        assert!(is_flag_key(FORCE_SUBSCRIBE));
        assert!(!is_flag_key("welcome"));
    }
}
