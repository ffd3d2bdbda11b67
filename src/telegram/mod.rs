//! Telegram transport module.
//!
//! Defines the transport-neutral [`Messenger`] seam and its Bot API
//! implementation, plus the send pacing used by fan-out.

mod client;
mod messenger;
mod rate_limiter;

pub use client::{TelegramMessenger, incoming_callback, incoming_message};
pub use messenger::{
    Button, IncomingCallback, IncomingMessage, Keyboard, MembershipStatus, Messenger,
    TransportError, UserProfile,
};
pub use rate_limiter::RateLimiter;

#[cfg(test)]
pub(crate) mod fake;
