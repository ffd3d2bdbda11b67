//! Update routing.
//!
//! Every inbound message first registers its sender. Text is then tried as
//! a command, then as the next step of an active conversation, then as a
//! movie code; anything else gets a hint.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::types::{BotCommand, CommandError, CommandResult};
use crate::access::{AccessError, AccessRoster, SubscriptionGate};
use crate::broadcast::{BroadcastError, BroadcastSlot, FanOut, SchedulerMessage};
use crate::config::BotConfig;
use crate::conversation::SessionStore;
use crate::storage::{Database, DbError, Movie, NOTIFY_NEW_USER};
use crate::telegram::{
    Button, IncomingCallback, IncomingMessage, Keyboard, Messenger, RateLimiter, TransportError,
    UserProfile,
};

/// Callback data of the "check subscription" button.
pub const CHECK_SUBSCRIPTION: &str = "check_subscription";

const SEARCH_LIMIT: usize = 20;

/// Telegram caps a text message at 4096 characters.
const MAX_REPLY_CHARS: usize = 4000;

/// Errors that abort handling of a single update.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Broadcast(#[from] BroadcastError),

    #[error(transparent)]
    Access(#[from] AccessError),
}

/// Handles inbound messages and button presses.
pub struct BotHandler {
    pub(super) db: Database,
    pub(super) roster: AccessRoster,
    gate: SubscriptionGate,
    pub(super) messenger: Arc<dyn Messenger>,
    pub(super) sessions: SessionStore,
    pub(super) broadcasts: Arc<BroadcastSlot>,
    pub(super) fan_out: FanOut,
    pub(super) config: BotConfig,
    scheduler: Option<mpsc::Sender<SchedulerMessage>>,
}

impl BotHandler {
    /// Creates a handler; fan-out pacing and session expiry come from
    /// `config`.
    #[must_use]
    pub fn new(db: Database, messenger: Arc<dyn Messenger>, config: BotConfig) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.broadcast_delay()));
        let roster = AccessRoster::new(db.clone(), config.main_admin);
        let gate = SubscriptionGate::new(db.clone(), Arc::clone(&messenger));
        let fan_out = FanOut::new(Arc::clone(&messenger), limiter);
        let sessions = SessionStore::new(config.session_ttl());

        Self {
            db,
            roster,
            gate,
            messenger,
            sessions,
            broadcasts: Arc::new(BroadcastSlot::new()),
            fan_out,
            config,
            scheduler: None,
        }
    }

    /// Lets the handler wake the ad scheduler when an ad is due right away.
    #[must_use]
    pub fn with_scheduler(mut self, tx: mpsc::Sender<SchedulerMessage>) -> Self {
        self.scheduler = Some(tx);
        self
    }

    /// Fan-out shared with the ad scheduler, so both obey one pacing.
    #[must_use]
    pub fn fan_out(&self) -> FanOut {
        self.fan_out.clone()
    }

    #[must_use]
    pub const fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Routes one inbound message.
    pub async fn handle_message(&self, msg: IncomingMessage) -> Result<(), HandlerError> {
        let user_id = msg.sender.id;
        self.register(&msg.sender).await?;

        if let Some(text) = msg.text.as_deref() {
            match BotCommand::parse(text) {
                Ok(command) => return self.handle_command(user_id, command).await,
                Err(CommandError::NotACommand) => {}
                Err(e) => return self.reject_command(user_id, &e).await,
            }
        }

        let state = self.sessions.get(user_id).await;
        if !state.is_idle() {
            if self.roster.is_admin(user_id)? {
                return self.advance(user_id, state, &msg).await;
            }
            debug!("User {} is no longer an admin, dropping session", user_id);
            self.sessions.clear(user_id).await;
        }

        match msg.text.as_deref().map(str::trim).and_then(parse_code) {
            Some(code) => self.serve_code(user_id, code).await,
            None => {
                self.send(
                    user_id,
                    "🔢 Send a movie code (digits only) to get the movie.\n\
                     /search <title> finds codes by name.",
                )
                .await
            }
        }
    }

    /// Handles an inline-button press.
    pub async fn handle_callback(&self, callback: IncomingCallback) -> Result<(), HandlerError> {
        let user_id = callback.sender.id;
        self.register(&callback.sender).await?;

        if callback.data.as_deref() != Some(CHECK_SUBSCRIPTION) {
            debug!("Ignoring callback {:?} from {}", callback.data, user_id);
            self.messenger
                .answer_callback(&callback.id, None, false)
                .await?;
            return Ok(());
        }

        if self.gate.is_subscribed(user_id).await? {
            self.messenger
                .answer_callback(&callback.id, Some("✅ Subscription confirmed"), false)
                .await?;
            self.send(user_id, "✅ Thank you! Now send a movie code.")
                .await
        } else {
            self.messenger
                .answer_callback(
                    &callback.id,
                    Some("❌ You have not joined every channel yet."),
                    true,
                )
                .await?;
            Ok(())
        }
    }

    /// Stores the sender on first contact and tells the main admin.
    async fn register(&self, sender: &UserProfile) -> Result<(), HandlerError> {
        let created =
            self.db
                .add_user(sender.id, sender.username.as_deref(), &sender.full_name)?;
        if !created {
            return Ok(());
        }
        info!("New user registered: {}", sender.id);

        let main_admin = self.roster.main_admin();
        if sender.id == main_admin || !self.db.setting_flag(NOTIFY_NEW_USER)? {
            return Ok(());
        }

        let username = sender
            .username
            .as_deref()
            .map_or_else(|| "-".to_owned(), |u| format!("@{u}"));
        let notice = format!(
            "👤 New user\n\
             ID: {}\n\
             Username: {username}\n\
             Name: {}\n\
             Total users: {}",
            sender.id,
            sender.full_name,
            self.db.count_users()?
        );
        if let Err(e) = self.messenger.send_text(main_admin, &notice).await {
            warn!("Failed to notify main admin about user {}: {}", sender.id, e);
        }
        Ok(())
    }

    async fn handle_command(&self, user_id: i64, command: BotCommand) -> Result<(), HandlerError> {
        debug!("Handling command from {}: {}", user_id, command);

        if command.requires_admin() && !self.roster.is_admin(user_id)? {
            debug!("Ignoring /{} from non-admin {}", command.name(), user_id);
            return Ok(());
        }

        let name = command.name();
        let result = match command {
            BotCommand::Start => self.handle_start(user_id)?,
            BotCommand::Help => self.handle_help(user_id)?,
            BotCommand::Search(query) => self.handle_search(&query)?,
            BotCommand::Cancel => self.handle_cancel(user_id).await,
            admin_command => self.execute_admin(user_id, admin_command).await?,
        };
        info!(
            "Command /{} from {}: success={}",
            name, user_id, result.success
        );

        self.reply(user_id, result).await
    }

    async fn reject_command(&self, user_id: i64, error: &CommandError) -> Result<(), HandlerError> {
        if error.requires_admin() && !self.roster.is_admin(user_id)? {
            debug!("Ignoring malformed admin command from {}", user_id);
            return Ok(());
        }

        let text = match error {
            CommandError::Unknown(_) => format!("❓ {error}\nUse /help to see the commands."),
            _ => format!("⚠️ {error}"),
        };
        self.send(user_id, &text).await
    }

    fn handle_start(&self, user_id: i64) -> Result<CommandResult, HandlerError> {
        let mut text = "👋 Welcome!\n\n\
                        Send a movie code to get the movie.\n\
                        Use /search <title> if you do not know the code."
            .to_owned();
        if self.roster.is_admin(user_id)? {
            text.push_str("\n\n🛠 You are an admin: /admin opens the panel.");
        }
        Ok(CommandResult::success(text))
    }

    fn handle_help(&self, user_id: i64) -> Result<CommandResult, HandlerError> {
        let include_admin = self.roster.is_admin(user_id)?;
        let mut lines = vec!["Commands:".to_owned()];
        lines.extend(help_lines(include_admin));
        lines.push(String::new());
        lines.push("Send a movie code (digits only) to get the movie.".to_owned());
        Ok(CommandResult::success(lines.join("\n")))
    }

    fn handle_search(&self, query: &str) -> Result<CommandResult, HandlerError> {
        let found = self.db.search_movies(query)?;
        if found.is_empty() {
            return Ok(CommandResult::error(format!(
                "🔍 Nothing found for \"{}\".",
                truncate(query, 40)
            )));
        }

        let mut lines = vec![format!("🔍 Found {} movie(s):", found.len())];
        lines.extend(
            found
                .iter()
                .take(SEARCH_LIMIT)
                .map(|m| format!("{} - {}", m.code, truncate(&m.title, 50))),
        );
        if found.len() > SEARCH_LIMIT {
            lines.push(format!(
                "... and {} more, try a longer query.",
                found.len() - SEARCH_LIMIT
            ));
        }
        lines.push(String::new());
        lines.push("Send a code to get the movie.".to_owned());
        Ok(CommandResult::success(join_limited(&lines)))
    }

    async fn handle_cancel(&self, user_id: i64) -> CommandResult {
        if self.sessions.clear(user_id).await {
            CommandResult::success("❎ Cancelled.")
        } else {
            CommandResult::error("Nothing to cancel.")
        }
    }

    /// Sends the movie behind `code` if the user passes the gate.
    async fn serve_code(&self, user_id: i64, code: i64) -> Result<(), HandlerError> {
        if !self.gate.is_subscribed(user_id).await? {
            debug!("User {} asked for #{} without subscription", user_id, code);
            return self.send_subscription_prompt(user_id).await;
        }

        let Some(movie) = self.db.get_movie(code)? else {
            return self
                .send(user_id, &format!("❌ No movie found with code {code}."))
                .await;
        };

        self.messenger
            .send_video(user_id, &movie.file_id, &movie_caption(&movie))
            .await?;
        self.db.increment_views(code)?;
        debug!("Served movie #{} to {}", code, user_id);
        Ok(())
    }

    async fn send_subscription_prompt(&self, user_id: i64) -> Result<(), HandlerError> {
        let channels = self.roster.list_channels()?;
        self.messenger
            .send_keyboard(
                user_id,
                "📢 To get movies, join the channels below and then press \"Check subscription\".",
                &subscription_keyboard(&channels),
            )
            .await?;
        Ok(())
    }

    /// Sends the result text and wakes the scheduler if asked to.
    pub(super) async fn reply(&self, user_id: i64, result: CommandResult) -> Result<(), HandlerError> {
        self.send(user_id, &result.message).await?;
        if result.trigger_dispatch {
            self.trigger_dispatch();
        }
        Ok(())
    }

    pub(super) async fn send(&self, user_id: i64, text: &str) -> Result<(), HandlerError> {
        self.messenger.send_text(user_id, text).await?;
        Ok(())
    }

    fn trigger_dispatch(&self) {
        if let Some(tx) = &self.scheduler
            && let Err(e) = tx.try_send(SchedulerMessage::TriggerDispatch)
        {
            warn!("Could not wake the ad scheduler: {}", e);
        }
    }
}

impl std::fmt::Debug for BotHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotHandler")
            .field("main_admin", &self.roster.main_admin())
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

/// A movie code is a plain run of digits.
fn parse_code(text: &str) -> Option<i64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn movie_caption(movie: &Movie) -> String {
    format!(
        "🎬 {}\n\n\
         🔢 Code: {}\n\
         📀 Format: {}\n\
         🌐 Language: {}\n\
         👁 Views: {}",
        movie.title, movie.code, movie.format, movie.language, movie.views
    )
}

/// One URL button per gate channel, then the re-check button.
pub fn subscription_keyboard(channels: &[String]) -> Keyboard {
    let mut rows: Keyboard = channels
        .iter()
        .map(|channel| {
            vec![Button::url(
                format!("📢 @{channel}"),
                format!("https://t.me/{channel}"),
            )]
        })
        .collect();
    rows.push(vec![Button::callback(
        "✅ Check subscription",
        CHECK_SUBSCRIPTION,
    )]);
    rows
}

pub(super) fn help_lines(include_admin: bool) -> Vec<String> {
    BotCommand::all_commands(include_admin)
        .into_iter()
        .map(|(usage, description)| format!("  {usage} - {description}"))
        .collect()
}

/// Joins lines, cutting the list short to fit in one message.
pub(super) fn join_limited(lines: &[String]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if out.chars().count() + line.chars().count() + 1 > MAX_REPLY_CHARS {
            out.push_str(&format!("\n... {} more line(s)", lines.len() - i));
            break;
        }
        if i > 0 {
            out.push('\n');
        }
        out.push_str(line);
    }
    out
}

/// Truncates a string to a maximum length, adding ellipsis if needed.
pub(super) fn truncate(s: &str, max_len: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_len {
        s.to_owned()
    } else {
        format!("{}...", chars[..max_len].iter().collect::<String>())
    }
}
