//! Steps of the multi-step admin flows (movie upload, ad scheduling,
//! broadcast text).

use chrono::Utc;
use tracing::{debug, info};

use super::handler::{BotHandler, HandlerError};
use super::types::CommandResult;
use crate::broadcast::Payload;
use crate::conversation::{
    AdDraft, ConversationState, is_skip, parse_button, parse_schedule, split_pair,
};
use crate::storage::{NewAd, NewMovie};
use crate::telegram::IncomingMessage;

/// What a reply does to the conversation.
enum Step {
    Advance(ConversationState),
    /// Input rejected; stay and ask again.
    Retry(ConversationState),
    Done(CommandResult),
}

impl BotHandler {
    /// Moves the user into the first state of a flow.
    pub(super) async fn enter(&self, user_id: i64, state: ConversationState) -> CommandResult {
        let prompt = state.prompt();
        self.sessions.set(user_id, state).await;
        CommandResult::success(format!("{prompt}\n/cancel aborts."))
    }

    /// Feeds one message to the user's active flow.
    pub(super) async fn advance(
        &self,
        user_id: i64,
        state: ConversationState,
        msg: &IncomingMessage,
    ) -> Result<(), HandlerError> {
        use ConversationState::{
            AwaitingAdButton, AwaitingAdImage, AwaitingAdSchedule, AwaitingAdText,
            AwaitingBroadcast, AwaitingDetails, AwaitingTitle, AwaitingVideo, Idle,
        };

        let text = msg.text.as_deref().map(str::trim).filter(|t| !t.is_empty());

        let step = match state {
            Idle => return Ok(()),
            AwaitingVideo => match &msg.video {
                Some(file_id) => Step::Advance(AwaitingTitle {
                    file_id: file_id.clone(),
                }),
                None => Step::Retry(AwaitingVideo),
            },
            AwaitingTitle { file_id } => match text {
                Some(title) => Step::Advance(AwaitingDetails {
                    file_id,
                    title: title.to_owned(),
                }),
                None => Step::Retry(AwaitingTitle { file_id }),
            },
            AwaitingDetails { file_id, title } => {
                self.finish_movie(user_id, file_id, title, text)?
            }
            AwaitingAdImage => match (&msg.photo, text) {
                (Some(photo), _) => Step::Advance(AwaitingAdText {
                    image: Some(photo.clone()),
                }),
                (None, Some(t)) if is_skip(t) => Step::Advance(AwaitingAdText { image: None }),
                _ => Step::Retry(AwaitingAdImage),
            },
            AwaitingAdText { image } => match text {
                Some(t) => Step::Advance(AwaitingAdButton {
                    image,
                    text: t.to_owned(),
                }),
                None => Step::Retry(AwaitingAdText { image }),
            },
            AwaitingAdButton { image, text: body } => match text.and_then(parse_button) {
                Some((button_text, button_url)) => Step::Advance(AwaitingAdSchedule {
                    draft: AdDraft {
                        image,
                        text: body,
                        button_text,
                        button_url,
                    },
                }),
                None => Step::Retry(AwaitingAdButton { image, text: body }),
            },
            AwaitingAdSchedule { draft } => self.finish_ad(user_id, draft, text)?,
            AwaitingBroadcast => match text {
                Some(t) => Step::Done(self.start_broadcast(user_id, Payload::Text(t.to_owned()))?),
                None => Step::Retry(AwaitingBroadcast),
            },
        };

        self.apply(user_id, step).await
    }

    async fn apply(&self, user_id: i64, step: Step) -> Result<(), HandlerError> {
        match step {
            Step::Advance(next) => {
                let prompt = next.prompt();
                self.sessions.set(user_id, next).await;
                self.send(user_id, prompt).await
            }
            Step::Retry(current) => {
                debug!("Rejected input from {} in {:?}", user_id, current);
                let text = format!("⚠️ That does not look right.\n{}", current.prompt());
                self.sessions.set(user_id, current).await;
                self.send(user_id, &text).await
            }
            Step::Done(result) => {
                self.sessions.set(user_id, ConversationState::Idle).await;
                self.reply(user_id, result).await
            }
        }
    }

    fn finish_movie(
        &self,
        admin_id: i64,
        file_id: String,
        title: String,
        text: Option<&str>,
    ) -> Result<Step, HandlerError> {
        let details = match text {
            Some(t) if is_skip(t) => Some((
                self.config.default_movie_format.clone(),
                self.config.default_movie_language.clone(),
            )),
            Some(t) => split_pair(t),
            None => None,
        };
        let Some((format, language)) = details else {
            return Ok(Step::Retry(ConversationState::AwaitingDetails { file_id, title }));
        };

        let code = self.db.add_movie(&NewMovie {
            title: title.clone(),
            format,
            language,
            file_id,
        })?;
        info!(target: "audit", "Admin {} added movie #{} \"{}\"", admin_id, code, title);

        Ok(Step::Done(CommandResult::success(format!(
            "✅ Movie saved.\n🎬 {title}\n🔢 Code: {code}"
        ))))
    }

    fn finish_ad(
        &self,
        admin_id: i64,
        draft: AdDraft,
        text: Option<&str>,
    ) -> Result<Step, HandlerError> {
        let now = Utc::now();
        let Some((schedule_time, repeat_count)) = text.and_then(|t| parse_schedule(t, now)) else {
            return Ok(Step::Retry(ConversationState::AwaitingAdSchedule { draft }));
        };

        let id = self.db.schedule_ad(&NewAd {
            image_file_id: draft.image,
            text: draft.text,
            button_text: draft.button_text,
            button_url: draft.button_url,
            schedule_time,
            repeat_count,
        })?;
        info!(
            target: "audit",
            "Admin {} scheduled ad #{} at {} x{}", admin_id, id, schedule_time, repeat_count
        );

        let message = format!(
            "✅ Ad #{id} scheduled for {} UTC, {repeat_count} time(s).",
            schedule_time.format("%Y-%m-%d %H:%M")
        );
        Ok(Step::Done(if schedule_time <= now {
            CommandResult::success_with_dispatch(message)
        } else {
            CommandResult::success(message)
        }))
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::super::testkit::{ADMIN, fixture};
    use super::*;
    use crate::broadcast::SchedulerMessage;

    #[tokio::test]
    async fn test_add_movie_with_defaults() {
        let f = fixture();
        f.text(ADMIN, "/addmovie").await;
        assert!(f.fake.last_text_to(ADMIN).unwrap().contains("Send the movie video"));

        f.video(ADMIN, "vid-1").await;
        assert_eq!(
            f.handler.sessions.get(ADMIN).await,
            ConversationState::AwaitingTitle {
                file_id: "vid-1".into()
            }
        );
        f.text(ADMIN, "Interstellar").await;
        f.text(ADMIN, "-").await;

        assert!(f.fake.last_text_to(ADMIN).unwrap().contains("Code: 1"));
        let movie = f.db.get_movie(1).unwrap().unwrap();
        assert_eq!(movie.title, "Interstellar");
        assert_eq!(movie.file_id, "vid-1");
        assert_eq!(movie.format, "MP4");
        assert_eq!(movie.language, "Uzbek");
        assert!(f.handler.sessions.get(ADMIN).await.is_idle());
    }

    #[tokio::test]
    async fn test_add_movie_with_details() {
        let f = fixture();
        f.text(ADMIN, "/addmovie").await;
        f.video(ADMIN, "vid-2").await;
        f.text(ADMIN, "Dune").await;
        f.text(ADMIN, "MKV | English").await;

        let movie = f.db.get_movie(1).unwrap().unwrap();
        assert_eq!(movie.format, "MKV");
        assert_eq!(movie.language, "English");
    }

    #[tokio::test]
    async fn test_invalid_input_reprompts() {
        let f = fixture();
        f.text(ADMIN, "/addmovie").await;
        f.text(ADMIN, "not a video").await;

        assert!(f.fake.last_text_to(ADMIN).unwrap().contains("does not look right"));
        assert_eq!(
            f.handler.sessions.get(ADMIN).await,
            ConversationState::AwaitingVideo
        );

        f.video(ADMIN, "vid").await;
        f.text(ADMIN, "Title").await;
        f.text(ADMIN, "only format").await;
        assert!(matches!(
            f.handler.sessions.get(ADMIN).await,
            ConversationState::AwaitingDetails { .. }
        ));
        assert!(f.db.get_movie(1).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commands_take_precedence_mid_flow() {
        let f = fixture();
        f.text(ADMIN, "/addmovie").await;
        f.text(ADMIN, "/stats").await;
        assert!(f.fake.last_text_to(ADMIN).unwrap().contains("Users:"));
        assert_eq!(
            f.handler.sessions.get(ADMIN).await,
            ConversationState::AwaitingVideo
        );

        f.text(ADMIN, "/cancel").await;
        assert!(f.fake.last_text_to(ADMIN).unwrap().contains("Cancelled"));
        assert!(f.handler.sessions.get(ADMIN).await.is_idle());

        f.text(ADMIN, "/cancel").await;
        assert!(f.fake.last_text_to(ADMIN).unwrap().contains("Nothing to cancel"));
    }

    #[tokio::test]
    async fn test_demoted_admin_drops_to_idle() {
        let f = fixture();
        f.text(ADMIN, "/addadmin 7").await;
        f.text(7, "/addmovie").await;
        f.text(ADMIN, "/rmadmin 7").await;

        f.video(7, "vid").await;
        assert!(f.handler.sessions.get(7).await.is_idle());
        assert!(f.fake.last_text_to(7).unwrap().contains("Send a movie code"));
        assert!(f.db.list_movies().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_demoted_admin_session_checked_at_step() {
        let f = fixture();
        f.text(ADMIN, "/addadmin 7").await;
        f.text(7, "/addmovie").await;
        f.db.remove_admin(7).unwrap();

        f.video(7, "vid").await;
        assert!(f.handler.sessions.get(7).await.is_idle());
        assert!(f.db.list_movies().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_ad_flow_triggers_dispatch() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut f = fixture();
        f.handler = f.handler.with_scheduler(tx);

        f.text(ADMIN, "/addad").await;
        f.photo(ADMIN, "img-1").await;
        f.text(ADMIN, "Summer sale").await;
        f.text(ADMIN, "Shop | ftp://nope").await;
        assert!(matches!(
            f.handler.sessions.get(ADMIN).await,
            ConversationState::AwaitingAdButton { .. }
        ));
        f.text(ADMIN, "Shop | https://example.com").await;
        f.text(ADMIN, "now 2").await;

        assert!(f.fake.last_text_to(ADMIN).unwrap().contains("2 time(s)"));
        let ads = f.db.list_pending_ads().unwrap();
        assert_eq!(ads.len(), 1);
        assert_eq!(ads[0].image_file_id.as_deref(), Some("img-1"));
        assert_eq!(ads[0].text, "Summer sale");
        assert_eq!(ads[0].button_text, "Shop");
        assert_eq!(ads[0].button_url, "https://example.com");
        assert_eq!(ads[0].repeat_count, 2);
        assert!(matches!(rx.try_recv(), Ok(SchedulerMessage::TriggerDispatch)));
    }

    #[tokio::test]
    async fn test_future_text_only_ad() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut f = fixture();
        f.handler = f.handler.with_scheduler(tx);

        f.text(ADMIN, "/addad").await;
        f.text(ADMIN, "-").await;
        f.text(ADMIN, "Text only").await;
        f.text(ADMIN, "Open | https://example.com").await;
        f.text(ADMIN, "2099-01-01 10:00 0").await;
        assert!(f.db.list_pending_ads().unwrap().is_empty());

        f.text(ADMIN, "2099-01-01 10:00 1").await;
        let ads = f.db.list_pending_ads().unwrap();
        assert_eq!(ads.len(), 1);
        assert!(ads[0].image_file_id.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_via_conversation() {
        let f = fixture();
        f.text(10, "hi").await;

        f.text(ADMIN, "/broadcast").await;
        assert_eq!(
            f.handler.sessions.get(ADMIN).await,
            ConversationState::AwaitingBroadcast
        );
        f.text(ADMIN, "Weekend premiere").await;

        f.wait_for_text(ADMIN, "Broadcast finished").await;
        assert_eq!(f.fake.last_text_to(10).as_deref(), Some("Weekend premiere"));
        assert!(f.handler.sessions.get(ADMIN).await.is_idle());
    }
}
