//! Shared fixtures for handler tests.

use std::sync::Arc;
use std::time::Duration;

use super::BotHandler;
use crate::config::BotConfig;
use crate::storage::Database;
use crate::telegram::fake::FakeMessenger;
use crate::telegram::{IncomingCallback, IncomingMessage, UserProfile};

pub const ADMIN: i64 = 1;

pub struct Fixture {
    pub db: Database,
    pub fake: Arc<FakeMessenger>,
    pub handler: BotHandler,
}

pub fn fixture() -> Fixture {
    let db = Database::open_in_memory().unwrap();
    let fake = Arc::new(FakeMessenger::new());
    let mut config = BotConfig::new(ADMIN);
    config.broadcast_delay_ms = 0;
    let handler = BotHandler::new(db.clone(), fake.clone(), config);
    Fixture { db, fake, handler }
}

pub fn profile(id: i64) -> UserProfile {
    UserProfile {
        id,
        username: Some(format!("user{id}")),
        full_name: format!("User {id}"),
    }
}

impl Fixture {
    pub async fn text(&self, from: i64, text: &str) {
        self.message(IncomingMessage {
            sender: profile(from),
            text: Some(text.to_owned()),
            video: None,
            photo: None,
        })
        .await;
    }

    pub async fn video(&self, from: i64, file_id: &str) {
        self.message(IncomingMessage {
            sender: profile(from),
            text: None,
            video: Some(file_id.to_owned()),
            photo: None,
        })
        .await;
    }

    pub async fn photo(&self, from: i64, file_id: &str) {
        self.message(IncomingMessage {
            sender: profile(from),
            text: None,
            video: None,
            photo: Some(file_id.to_owned()),
        })
        .await;
    }

    pub async fn message(&self, msg: IncomingMessage) {
        self.handler.handle_message(msg).await.unwrap();
    }

    pub async fn callback(&self, from: i64, data: &str) {
        self.handler
            .handle_callback(IncomingCallback {
                id: format!("cb-{from}"),
                sender: profile(from),
                data: Some(data.to_owned()),
            })
            .await
            .unwrap();
    }

    /// Waits for a background task to send `chat_id` a text containing
    /// `needle`.
    pub async fn wait_for_text(&self, chat_id: i64, needle: &str) -> String {
        for _ in 0..200 {
            if let Some(found) = self
                .fake
                .sent_to(chat_id)
                .iter()
                .map(|s| s.text().to_owned())
                .find(|text| text.contains(needle))
            {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{chat_id} never received {needle:?}: {:?}", self.fake.sent_to(chat_id));
    }
}
