//! Configuration module for the movie bot.
//!
//! Everything is read from the environment (optionally seeded from a
//! `.env` file by the binaries).

mod settings;

pub use settings::{BotConfig, ConfigError, TelegramConfig};
