//! Process settings and Telegram configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Telegram Bot API configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token issued by `@BotFather`.
    pub bot_token: String,

    /// Upper bound for a single Bot API call, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    10
}

impl TelegramConfig {
    /// Creates a new Telegram configuration.
    #[must_use]
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            request_timeout_secs: default_request_timeout(),
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// Expects `BOT_TOKEN` to be set; `REQUEST_TIMEOUT_SECS` is optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token =
            std::env::var("BOT_TOKEN").map_err(|_| ConfigError::MissingEnvVar("BOT_TOKEN"))?;
        if bot_token.trim().is_empty() {
            return Err(ConfigError::MissingEnvVar("BOT_TOKEN"));
        }

        Ok(Self {
            bot_token,
            request_timeout_secs: positive_env_or(
                "REQUEST_TIMEOUT_SECS",
                default_request_timeout,
            )?,
        })
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"<redacted>")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Bot-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// The operator who can never be demoted.
    pub main_admin: i64,

    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Minimum spacing between fan-out sends, in milliseconds.
    #[serde(default = "default_broadcast_delay")]
    pub broadcast_delay_ms: u64,

    /// How often due ads are dispatched, in seconds.
    #[serde(default = "default_ad_check_interval")]
    pub ad_check_interval_secs: u64,

    /// Idle conversations are forgotten after this many seconds.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Format tag used when an admin skips the details step.
    #[serde(default = "default_movie_format")]
    pub default_movie_format: String,

    /// Language tag used when an admin skips the details step.
    #[serde(default = "default_movie_language")]
    pub default_movie_language: String,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("movies.db")
}

fn default_broadcast_delay() -> u64 {
    50 // stays under ~30 messages per second
}

fn default_ad_check_interval() -> u64 {
    3600
}

fn default_session_ttl() -> u64 {
    600
}

fn default_movie_format() -> String {
    "MP4".to_owned()
}

fn default_movie_language() -> String {
    "Uzbek".to_owned()
}

impl BotConfig {
    /// Creates a configuration with defaults for everything but the main admin.
    #[must_use]
    pub fn new(main_admin: i64) -> Self {
        Self {
            main_admin,
            database_path: default_database_path(),
            broadcast_delay_ms: default_broadcast_delay(),
            ad_check_interval_secs: default_ad_check_interval(),
            session_ttl_secs: default_session_ttl(),
            default_movie_format: default_movie_format(),
            default_movie_language: default_movie_language(),
        }
    }

    /// Creates bot settings from environment variables with defaults.
    ///
    /// `MAIN_ADMIN` is required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let main_admin = std::env::var("MAIN_ADMIN")
            .map_err(|_| ConfigError::MissingEnvVar("MAIN_ADMIN"))?
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                name: "MAIN_ADMIN",
                reason: "must be a numeric user id",
            })?;

        Ok(Self {
            main_admin,
            database_path: std::env::var("DATABASE_PATH")
                .map_or_else(|_| default_database_path(), PathBuf::from),
            broadcast_delay_ms: env_or("BROADCAST_DELAY_MS", default_broadcast_delay)?,
            ad_check_interval_secs: positive_env_or(
                "AD_CHECK_INTERVAL_SECS",
                default_ad_check_interval,
            )?,
            session_ttl_secs: env_or("SESSION_TTL_SECS", default_session_ttl)?,
            default_movie_format: std::env::var("DEFAULT_MOVIE_FORMAT")
                .unwrap_or_else(|_| default_movie_format()),
            default_movie_language: std::env::var("DEFAULT_MOVIE_LANGUAGE")
                .unwrap_or_else(|_| default_movie_language()),
        })
    }

    #[must_use]
    pub const fn broadcast_delay(&self) -> Duration {
        Duration::from_millis(self.broadcast_delay_ms)
    }

    #[must_use]
    pub const fn ad_check_interval(&self) -> Duration {
        Duration::from_secs(self.ad_check_interval_secs)
    }

    #[must_use]
    pub const fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

/// Reads an optional numeric variable, rejecting values that do not parse.
fn env_or<T: FromStr>(name: &'static str, default: fn() -> T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => parse_number(name, &raw),
        Err(_) => Ok(default()),
    }
}

/// Like [`env_or`], but zero is rejected too.
fn positive_env_or(name: &'static str, default: fn() -> u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => parse_positive(name, &raw),
        Err(_) => Ok(default()),
    }
}

fn parse_number<T: FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        reason: "must be a non-negative integer",
    })
}

fn parse_positive(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match parse_number(name, raw)? {
        0 => Err(ConfigError::InvalidValue {
            name,
            reason: "must be positive",
        }),
        value => Ok(value),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue {
        name: &'static str,
        reason: &'static str,
    },
}
