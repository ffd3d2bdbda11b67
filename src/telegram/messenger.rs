//! Transport-neutral messaging capability.
//!
//! Everything above the transport (gate, fan-out, handlers) talks to
//! [`Messenger`]; the Bot API adapter and the test double implement it.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a messaging transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Recipient blocked the bot or deactivated the account")]
    Blocked,

    #[error("Chat not found or not accessible to the bot")]
    ChatNotFound,

    #[error("Rate limited, retry after {0:?}")]
    RetryAfter(Duration),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),
}

impl TransportError {
    /// Whether the failure concerns a single recipient (count it and move
    /// on) rather than the payload itself (every send would fail).
    #[must_use]
    pub const fn is_recipient_failure(&self) -> bool {
        !matches!(self, Self::InvalidRequest(_))
    }
}

/// Profile of the person behind an inbound update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: i64,
    pub username: Option<String>,
    pub full_name: String,
}

/// An inbound private message, reduced to what the handlers need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub sender: UserProfile,
    pub text: Option<String>,
    /// Content reference of an attached video.
    pub video: Option<String>,
    /// Content reference of the largest size of an attached photo.
    pub photo: Option<String>,
}

/// An inline-button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCallback {
    pub id: String,
    pub sender: UserProfile,
    pub data: Option<String>,
}

/// A single inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Button {
    Url { label: String, url: String },
    Callback { label: String, data: String },
}

impl Button {
    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Url {
            label: label.into(),
            url: url.into(),
        }
    }

    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Callback {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// Rows of inline buttons.
pub type Keyboard = Vec<Vec<Button>>;

/// A user's standing in a channel, as far as the gate cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipStatus {
    Member,
    Left,
    Kicked,
}

impl MembershipStatus {
    #[must_use]
    pub const fn is_member(self) -> bool {
        matches!(self, Self::Member)
    }
}

/// Outbound messaging and membership queries.
///
/// Implementations must bound every call with a timeout and report expiry
/// as [`TransportError::Timeout`].
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError>;

    async fn send_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<(), TransportError>;

    async fn send_video(
        &self,
        chat_id: i64,
        file_id: &str,
        caption: &str,
    ) -> Result<(), TransportError>;

    async fn send_photo(
        &self,
        chat_id: i64,
        file_id: &str,
        caption: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), TransportError>;

    /// Looks up `user_id` in the channel with the given handle (no `@`).
    async fn membership_status(
        &self,
        channel: &str,
        user_id: i64,
    ) -> Result<MembershipStatus, TransportError>;

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), TransportError>;
}
