//! Admin command execution.

use std::sync::Arc;

use tracing::{error, info, warn};

use super::handler::{BotHandler, HandlerError, help_lines, join_limited, truncate};
use super::types::{BotCommand, CommandResult};
use crate::access::{AccessError, AdminRemoval};
use crate::broadcast::{BroadcastError, Payload};
use crate::conversation::ConversationState;
use crate::storage::{CatalogStats, is_flag_key, parse_flag};

impl BotHandler {
    /// Runs a command already checked to come from an admin.
    pub(super) async fn execute_admin(
        &self,
        admin_id: i64,
        command: BotCommand,
    ) -> Result<CommandResult, HandlerError> {
        match command {
            BotCommand::Admin => self.handle_panel(),
            BotCommand::Stats => Ok(CommandResult::success(stats_text(&self.db.stats()?))),
            BotCommand::AddMovie => Ok(self.enter(admin_id, ConversationState::AwaitingVideo).await),
            BotCommand::DeleteMovie(code) => self.handle_delete_movie(admin_id, code),
            BotCommand::ListMovies => self.handle_list_movies(),
            BotCommand::Broadcast(Some(text)) => self.start_broadcast(admin_id, Payload::Text(text)),
            BotCommand::Broadcast(None) => {
                Ok(self.enter(admin_id, ConversationState::AwaitingBroadcast).await)
            }
            BotCommand::StopBroadcast => Ok(self.handle_stop_broadcast(admin_id)),
            BotCommand::MsgUser { user_id, text } => {
                Ok(self.handle_msg_user(admin_id, user_id, &text).await)
            }
            BotCommand::SetChannel(handle) => self.handle_set_channel(admin_id, &handle),
            BotCommand::RmChannel(handle) => self.handle_rm_channel(admin_id, &handle),
            BotCommand::Channels => self.handle_channels(),
            BotCommand::AddAdmin(user_id) => self.handle_add_admin(admin_id, user_id),
            BotCommand::RmAdmin(user_id) => self.handle_rm_admin(admin_id, user_id).await,
            BotCommand::Admins => self.handle_admins(),
            BotCommand::Set { key, value } => self.handle_set(admin_id, &key, &value),
            BotCommand::Settings => self.handle_settings(),
            BotCommand::AddAd => Ok(self.enter(admin_id, ConversationState::AwaitingAdImage).await),
            BotCommand::ListAds => self.handle_list_ads(),
            BotCommand::DeleteAd(id) => self.handle_delete_ad(admin_id, id),
            BotCommand::Start | BotCommand::Help | BotCommand::Search(_) | BotCommand::Cancel => {
                Ok(CommandResult::error("Not an admin command."))
            }
        }
    }

    fn handle_panel(&self) -> Result<CommandResult, HandlerError> {
        let mut lines = vec![
            "🛠 Admin panel".to_owned(),
            String::new(),
            stats_text(&self.db.stats()?),
        ];
        if self.broadcasts.is_active() {
            lines.push("📣 A broadcast is running (/stopbroadcast).".to_owned());
        }
        lines.push(String::new());
        lines.extend(help_lines(true));
        Ok(CommandResult::success(lines.join("\n")))
    }

    fn handle_delete_movie(&self, admin_id: i64, code: i64) -> Result<CommandResult, HandlerError> {
        if self.db.delete_movie(code)? {
            info!(target: "audit", "Admin {} deleted movie #{}", admin_id, code);
            Ok(CommandResult::success(format!("🗑 Movie {code} deleted.")))
        } else {
            Ok(CommandResult::error(format!("❌ No movie with code {code}.")))
        }
    }

    fn handle_list_movies(&self) -> Result<CommandResult, HandlerError> {
        let movies = self.db.list_movies()?;
        if movies.is_empty() {
            return Ok(CommandResult::success("🎬 The catalog is empty."));
        }

        let mut lines = vec![format!("🎬 Movies ({}):", movies.len())];
        lines.extend(movies.iter().map(|m| {
            format!(
                "{} - {} [{}, {}] 👁 {}",
                m.code,
                truncate(&m.title, 40),
                m.format,
                m.language,
                m.views
            )
        }));
        Ok(CommandResult::success(join_limited(&lines)))
    }

    /// Starts a background fan-out unless one is already running. The
    /// admin gets the tally when it finishes.
    pub(super) fn start_broadcast(
        &self,
        admin_id: i64,
        payload: Payload,
    ) -> Result<CommandResult, HandlerError> {
        let Some(cancel) = self.broadcasts.try_begin() else {
            return Ok(CommandResult::error(
                "📣 A broadcast is already running. /stopbroadcast stops it.",
            ));
        };

        let recipients = match self.db.all_user_ids() {
            Ok(ids) => ids,
            Err(e) => {
                self.broadcasts.finish();
                return Err(e.into());
            }
        };
        let total = recipients.len();
        info!(target: "audit", "Admin {} started a broadcast to {} user(s)", admin_id, total);

        let fan_out = self.fan_out.clone();
        let slot = Arc::clone(&self.broadcasts);
        let messenger = Arc::clone(&self.messenger);
        tokio::spawn(async move {
            let text = match fan_out.deliver(&recipients, &payload, &cancel).await {
                Ok(report) => format!("📣 Broadcast finished\n{}", report.summary()),
                Err(BroadcastError::Payload { error, report }) => {
                    error!("Broadcast aborted: {}", error);
                    format!("❌ Broadcast aborted: {error}\n{}", report.summary())
                }
                Err(e) => {
                    error!("Broadcast aborted: {}", e);
                    format!("❌ Broadcast aborted: {e}")
                }
            };
            slot.finish();
            if let Err(e) = messenger.send_text(admin_id, &text).await {
                warn!("Failed to send broadcast report to {}: {}", admin_id, e);
            }
        });

        Ok(CommandResult::success(format!(
            "📣 Broadcasting to {total} user(s)..."
        )))
    }

    fn handle_stop_broadcast(&self, admin_id: i64) -> CommandResult {
        if self.broadcasts.cancel() {
            info!(target: "audit", "Admin {} stopped the broadcast", admin_id);
            CommandResult::success("⏹ Stopping the broadcast...")
        } else {
            CommandResult::error("No broadcast is running.")
        }
    }

    async fn handle_msg_user(&self, admin_id: i64, user_id: i64, text: &str) -> CommandResult {
        match self.messenger.send_text(user_id, text).await {
            Ok(()) => {
                info!(target: "audit", "Admin {} messaged user {}", admin_id, user_id);
                CommandResult::success(format!("✅ Message delivered to {user_id}."))
            }
            Err(e) => {
                warn!("Direct message to {} failed: {}", user_id, e);
                CommandResult::error(format!("❌ Could not deliver to {user_id}: {e}"))
            }
        }
    }

    fn handle_set_channel(&self, admin_id: i64, handle: &str) -> Result<CommandResult, HandlerError> {
        match self.roster.add_channel(admin_id, handle) {
            Ok((channel, true)) => Ok(CommandResult::success(format!(
                "✅ @{channel} is now required.\nThe bot must be an admin there to check members."
            ))),
            Ok((channel, false)) => Ok(CommandResult::error(format!(
                "@{channel} is already required."
            ))),
            Err(AccessError::InvalidChannel(raw)) => Ok(CommandResult::error(format!(
                "⚠️ Invalid channel handle: {raw}"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn handle_rm_channel(&self, admin_id: i64, handle: &str) -> Result<CommandResult, HandlerError> {
        match self.roster.remove_channel(admin_id, handle) {
            Ok((channel, true)) => Ok(CommandResult::success(format!(
                "🗑 @{channel} is no longer required."
            ))),
            Ok((channel, false)) => Ok(CommandResult::error(format!(
                "@{channel} is not a required channel."
            ))),
            Err(AccessError::InvalidChannel(raw)) => Ok(CommandResult::error(format!(
                "⚠️ Invalid channel handle: {raw}"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn handle_channels(&self) -> Result<CommandResult, HandlerError> {
        let channels = self.roster.list_channels()?;
        if channels.is_empty() {
            return Ok(CommandResult::success(
                "📢 No required channels. Everyone can get movies.",
            ));
        }
        let mut lines = vec![format!("📢 Required channels ({}):", channels.len())];
        lines.extend(channels.iter().map(|c| format!("@{c}")));
        Ok(CommandResult::success(lines.join("\n")))
    }

    fn handle_add_admin(&self, admin_id: i64, user_id: i64) -> Result<CommandResult, HandlerError> {
        if self.roster.is_admin(user_id)? {
            return Ok(CommandResult::error(format!("{user_id} is already an admin.")));
        }
        self.roster.add_admin(admin_id, user_id)?;
        Ok(CommandResult::success(format!("✅ {user_id} is now an admin.")))
    }

    async fn handle_rm_admin(
        &self,
        admin_id: i64,
        user_id: i64,
    ) -> Result<CommandResult, HandlerError> {
        let result = match self.roster.remove_admin(admin_id, user_id)? {
            AdminRemoval::Removed => {
                self.sessions.clear(user_id).await;
                CommandResult::success(format!("🗑 {user_id} is no longer an admin."))
            }
            AdminRemoval::NotAdmin => CommandResult::error(format!("{user_id} is not an admin.")),
            AdminRemoval::Protected => CommandResult::error("⛔ The main admin cannot be removed."),
        };
        Ok(result)
    }

    fn handle_admins(&self) -> Result<CommandResult, HandlerError> {
        let main_admin = self.roster.main_admin();
        let mut lines = vec!["👮 Admins:".to_owned()];
        lines.extend(self.roster.list_admins()?.into_iter().map(|id| {
            if id == main_admin {
                format!("{id} (main)")
            } else {
                id.to_string()
            }
        }));
        Ok(CommandResult::success(lines.join("\n")))
    }

    fn handle_set(
        &self,
        admin_id: i64,
        key: &str,
        value: &str,
    ) -> Result<CommandResult, HandlerError> {
        if is_flag_key(key) && parse_flag(value).is_none() {
            return Ok(CommandResult::error(format!(
                "⚠️ {key} accepts true/false, on/off, yes/no or 1/0."
            )));
        }
        self.db.set_setting(key, value)?;
        info!(target: "audit", "Admin {} set {} = {}", admin_id, key, value);
        Ok(CommandResult::success(format!("✅ {key} = {value}")))
    }

    fn handle_settings(&self) -> Result<CommandResult, HandlerError> {
        let mut lines = vec!["⚙️ Settings:".to_owned()];
        lines.extend(
            self.db
                .all_settings()?
                .into_iter()
                .map(|(key, value)| format!("{key} = {value}")),
        );
        lines.push(String::new());
        lines.push("Change with /set <key> <value>".to_owned());
        Ok(CommandResult::success(lines.join("\n")))
    }

    fn handle_list_ads(&self) -> Result<CommandResult, HandlerError> {
        let ads = self.db.list_pending_ads()?;
        if ads.is_empty() {
            return Ok(CommandResult::success("📭 No pending ads."));
        }

        let mut lines = vec![format!("📢 Pending ads ({}):", ads.len())];
        lines.extend(ads.iter().map(|ad| {
            format!(
                "#{} {}{} UTC, {} left: {}",
                ad.id,
                if ad.image_file_id.is_some() { "🖼 " } else { "" },
                ad.schedule_time.format("%Y-%m-%d %H:%M"),
                ad.repeat_count,
                truncate(&ad.text, 30)
            )
        }));
        Ok(CommandResult::success(join_limited(&lines)))
    }

    fn handle_delete_ad(&self, admin_id: i64, id: i64) -> Result<CommandResult, HandlerError> {
        if self.db.delete_ad(id)? {
            info!(target: "audit", "Admin {} deleted ad #{}", admin_id, id);
            Ok(CommandResult::success(format!("🗑 Ad #{id} deleted.")))
        } else {
            Ok(CommandResult::error(format!("❌ No ad with id {id}.")))
        }
    }
}

fn stats_text(stats: &CatalogStats) -> String {
    format!(
        "👥 Users: {}\n🎬 Movies: {}\n👁 Total views: {}",
        stats.users, stats.movies, stats.total_views
    )
}
