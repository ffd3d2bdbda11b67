//! Command handling module.
//!
//! Parses `/commands`, routes inbound updates, and runs the admin flows.
//! Admin-only commands from anyone else are ignored without a reply.

mod admin;
mod flows;
mod handler;
mod types;

#[cfg(test)]
mod testkit;

pub use handler::{BotHandler, CHECK_SUBSCRIPTION, HandlerError, subscription_keyboard};
pub use types::{BotCommand, COMMANDS, CommandError, CommandResult, CommandSpec};
