//! Recording [`Messenger`] used by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{Keyboard, MembershipStatus, Messenger, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text { chat_id: i64, text: String },
    Keyboard { chat_id: i64, text: String, keyboard: Keyboard },
    Video { chat_id: i64, file_id: String, caption: String },
    Photo { chat_id: i64, file_id: String, caption: String, keyboard: Option<Keyboard> },
    CallbackAnswer { callback_id: String, text: Option<String>, show_alert: bool },
}

impl Sent {
    pub fn chat_id(&self) -> Option<i64> {
        match self {
            Self::Text { chat_id, .. }
            | Self::Keyboard { chat_id, .. }
            | Self::Video { chat_id, .. }
            | Self::Photo { chat_id, .. } => Some(*chat_id),
            Self::CallbackAnswer { .. } => None,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Text { text, .. } | Self::Keyboard { text, .. } => text,
            Self::Video { caption, .. } | Self::Photo { caption, .. } => caption,
            Self::CallbackAnswer { text, .. } => text.as_deref().unwrap_or_default(),
        }
    }
}

#[derive(Default)]
pub struct FakeMessenger {
    sent: Mutex<Vec<Sent>>,
    members: Mutex<HashMap<(String, i64), MembershipStatus>>,
    broken_channels: Mutex<HashSet<String>>,
    blocked: Mutex<HashSet<i64>>,
    rate_limited_once: Mutex<HashSet<i64>>,
    reject_payload: Mutex<bool>,
    rejecting: Mutex<HashSet<i64>>,
    membership_queries: Mutex<Vec<String>>,
}

impl FakeMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_member(&self, channel: &str, user_id: i64, status: MembershipStatus) {
        self.members
            .lock()
            .unwrap()
            .insert((channel.to_owned(), user_id), status);
    }

    /// Membership queries against this channel fail as if the bot had no access.
    pub fn break_channel(&self, channel: &str) {
        self.broken_channels.lock().unwrap().insert(channel.to_owned());
    }

    pub fn block(&self, chat_id: i64) {
        self.blocked.lock().unwrap().insert(chat_id);
    }

    pub fn rate_limit_once(&self, chat_id: i64) {
        self.rate_limited_once.lock().unwrap().insert(chat_id);
    }

    pub fn reject_payloads(&self) {
        *self.reject_payload.lock().unwrap() = true;
    }

    /// Sends to `chat_id` fail as if the payload itself were invalid.
    pub fn reject_payload_to(&self, chat_id: i64) {
        self.rejecting.lock().unwrap().insert(chat_id);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: i64) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| s.chat_id() == Some(chat_id))
            .collect()
    }

    pub fn last_text_to(&self, chat_id: i64) -> Option<String> {
        self.sent_to(chat_id).last().map(|s| s.text().to_owned())
    }

    pub fn membership_queries(&self) -> Vec<String> {
        self.membership_queries.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    fn deliver(&self, chat_id: i64, item: Sent) -> Result<(), TransportError> {
        if *self.reject_payload.lock().unwrap() || self.rejecting.lock().unwrap().contains(&chat_id)
        {
            return Err(TransportError::InvalidRequest("rejected payload".into()));
        }
        if self.blocked.lock().unwrap().contains(&chat_id) {
            return Err(TransportError::Blocked);
        }
        if self.rate_limited_once.lock().unwrap().remove(&chat_id) {
            return Err(TransportError::RetryAfter(Duration::from_millis(1)));
        }
        self.sent.lock().unwrap().push(item);
        Ok(())
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        self.deliver(
            chat_id,
            Sent::Text {
                chat_id,
                text: text.to_owned(),
            },
        )
    }

    async fn send_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<(), TransportError> {
        self.deliver(
            chat_id,
            Sent::Keyboard {
                chat_id,
                text: text.to_owned(),
                keyboard: keyboard.clone(),
            },
        )
    }

    async fn send_video(
        &self,
        chat_id: i64,
        file_id: &str,
        caption: &str,
    ) -> Result<(), TransportError> {
        self.deliver(
            chat_id,
            Sent::Video {
                chat_id,
                file_id: file_id.to_owned(),
                caption: caption.to_owned(),
            },
        )
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        file_id: &str,
        caption: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), TransportError> {
        self.deliver(
            chat_id,
            Sent::Photo {
                chat_id,
                file_id: file_id.to_owned(),
                caption: caption.to_owned(),
                keyboard: keyboard.cloned(),
            },
        )
    }

    async fn membership_status(
        &self,
        channel: &str,
        user_id: i64,
    ) -> Result<MembershipStatus, TransportError> {
        self.membership_queries.lock().unwrap().push(channel.to_owned());
        if self.broken_channels.lock().unwrap().contains(channel) {
            return Err(TransportError::ChatNotFound);
        }
        Ok(self
            .members
            .lock()
            .unwrap()
            .get(&(channel.to_owned(), user_id))
            .copied()
            .unwrap_or(MembershipStatus::Left))
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(Sent::CallbackAnswer {
            callback_id: callback_id.to_owned(),
            text: text.map(str::to_owned),
            show_alert,
        });
        Ok(())
    }
}
