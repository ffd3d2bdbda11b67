//! Bot API implementation of [`Messenger`] on top of teloxide.

use std::future::IntoFuture;
use std::time::Duration;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQuery, ChatMemberKind, InlineKeyboardButton, InlineKeyboardMarkup, InputFile,
    Recipient, User,
};
use teloxide::{ApiError, RequestError};
use tracing::{debug, warn};

use super::messenger::{
    Button, IncomingCallback, IncomingMessage, Keyboard, MembershipStatus, Messenger,
    TransportError, UserProfile,
};
use crate::config::TelegramConfig;

/// Bot API client wrapper.
#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
    timeout: Duration,
}

impl TelegramMessenger {
    #[must_use]
    pub fn new(bot: Bot, timeout: Duration) -> Self {
        Self { bot, timeout }
    }

    /// Builds the client from configuration.
    #[must_use]
    pub fn from_config(config: &TelegramConfig) -> Self {
        Self::new(Bot::new(&config.bot_token), config.request_timeout())
    }

    /// The underlying bot, for the update dispatcher.
    #[must_use]
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    async fn bounded<T, F>(&self, request: F) -> Result<T, TransportError>
    where
        F: IntoFuture<Output = Result<T, RequestError>>,
    {
        match tokio::time::timeout(self.timeout, request.into_future()).await {
            Ok(result) => result.map_err(map_request_error),
            Err(_) => Err(TransportError::Timeout(self.timeout)),
        }
    }
}

impl std::fmt::Debug for TelegramMessenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramMessenger")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        self.bounded(self.bot.send_message(ChatId(chat_id), text))
            .await
            .map(|_| ())
    }

    async fn send_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<(), TransportError> {
        let markup = to_markup(keyboard)?;
        self.bounded(self.bot.send_message(ChatId(chat_id), text).reply_markup(markup))
            .await
            .map(|_| ())
    }

    async fn send_video(
        &self,
        chat_id: i64,
        file_id: &str,
        caption: &str,
    ) -> Result<(), TransportError> {
        let request = self
            .bot
            .send_video(ChatId(chat_id), InputFile::file_id(file_id))
            .caption(caption);
        self.bounded(request).await.map(|_| ())
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        file_id: &str,
        caption: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), TransportError> {
        let mut request = self
            .bot
            .send_photo(ChatId(chat_id), InputFile::file_id(file_id))
            .caption(caption);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(to_markup(keyboard)?);
        }
        self.bounded(request).await.map(|_| ())
    }

    async fn membership_status(
        &self,
        channel: &str,
        user_id: i64,
    ) -> Result<MembershipStatus, TransportError> {
        let user = u64::try_from(user_id)
            .map(UserId)
            .map_err(|_| TransportError::InvalidRequest(format!("invalid user id {user_id}")))?;
        let member = self
            .bounded(
                self.bot
                    .get_chat_member(Recipient::ChannelUsername(format!("@{channel}")), user),
            )
            .await?;

        let status = match member.kind {
            ChatMemberKind::Left => MembershipStatus::Left,
            ChatMemberKind::Banned(_) => MembershipStatus::Kicked,
            _ => MembershipStatus::Member,
        };
        debug!("Membership of {} in @{}: {:?}", user_id, channel, status);
        Ok(status)
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), TransportError> {
        let mut request = self
            .bot
            .answer_callback_query(callback_id)
            .show_alert(show_alert);
        if let Some(text) = text {
            request = request.text(text);
        }
        self.bounded(request).await.map(|_| ())
    }
}

fn to_markup(keyboard: &Keyboard) -> Result<InlineKeyboardMarkup, TransportError> {
    let rows = keyboard
        .iter()
        .map(|row| row.iter().map(to_button).collect::<Result<Vec<_>, _>>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(InlineKeyboardMarkup::new(rows))
}

fn to_button(button: &Button) -> Result<InlineKeyboardButton, TransportError> {
    match button {
        Button::Url { label, url } => {
            let parsed = url
                .parse()
                .map_err(|_| TransportError::InvalidRequest(format!("invalid button URL: {url}")))?;
            Ok(InlineKeyboardButton::url(label.clone(), parsed))
        }
        Button::Callback { label, data } => {
            Ok(InlineKeyboardButton::callback(label.clone(), data.clone()))
        }
    }
}

fn map_request_error(err: RequestError) -> TransportError {
    match err {
        RequestError::Api(api) => match api {
            ApiError::BotBlocked
            | ApiError::UserDeactivated
            | ApiError::CantInitiateConversation
            | ApiError::BotKicked => TransportError::Blocked,
            ApiError::ChatNotFound | ApiError::UserNotFound => TransportError::ChatNotFound,
            ApiError::WrongFileId
            | ApiError::WrongFileIdOrUrl
            | ApiError::ButtonUrlInvalid
            | ApiError::MessageTextIsEmpty
            | ApiError::MessageIsTooLong => TransportError::InvalidRequest(api.to_string()),
            other => TransportError::Api(other.to_string()),
        },
        RequestError::RetryAfter(wait) => TransportError::RetryAfter(wait),
        RequestError::Network(e) => TransportError::Network(e.to_string()),
        other => {
            warn!("Unclassified Bot API error: {}", other);
            TransportError::Api(other.to_string())
        }
    }
}

fn profile(user: &User) -> Option<UserProfile> {
    let id = i64::try_from(user.id.0).ok()?;
    Some(UserProfile {
        id,
        username: user.username.clone(),
        full_name: user.full_name(),
    })
}

/// Reduces an inbound Bot API message to an [`IncomingMessage`].
///
/// Returns `None` for messages without a sender (channel posts).
pub fn incoming_message(msg: &Message) -> Option<IncomingMessage> {
    let sender = profile(msg.from()?)?;
    Some(IncomingMessage {
        sender,
        text: msg.text().map(str::to_owned),
        video: msg.video().map(|video| video.file.id.clone()),
        photo: msg
            .photo()
            .and_then(<[_]>::last)
            .map(|photo| photo.file.id.clone()),
    })
}

/// Reduces an inline-button press to an [`IncomingCallback`].
pub fn incoming_callback(query: &CallbackQuery) -> Option<IncomingCallback> {
    Some(IncomingCallback {
        id: query.id.clone(),
        sender: profile(&query.from)?,
        data: query.data.clone(),
    })
}
