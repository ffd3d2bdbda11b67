//! Paced delivery of one payload to many recipients.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{debug, info};

use super::BroadcastError;
use crate::storage::ScheduledAd;
use crate::telegram::{Button, Keyboard, Messenger, RateLimiter, TransportError};

/// What gets sent to every recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Ad {
        image_file_id: Option<String>,
        text: String,
        button_text: String,
        button_url: String,
    },
}

impl From<&ScheduledAd> for Payload {
    fn from(ad: &ScheduledAd) -> Self {
        Self::Ad {
            image_file_id: ad.image_file_id.clone(),
            text: ad.text.clone(),
            button_text: ad.button_text.clone(),
            button_url: ad.button_url.clone(),
        }
    }
}

/// Success/failure tally of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
    /// The run stopped before reaching every recipient.
    pub cancelled: bool,
}

impl DeliveryReport {
    #[must_use]
    pub const fn attempted(&self) -> usize {
        self.sent + self.failed
    }

    /// One-line tally for the operator.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut line = format!("✅ Sent: {}\n❌ Failed: {}", self.sent, self.failed);
        if self.cancelled {
            line.push_str("\n⏹ Cancelled before completion");
        }
        line
    }
}

/// Shared stop signal for an in-flight fan-out.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sequential, rate-limited sender.
#[derive(Clone)]
pub struct FanOut {
    messenger: Arc<dyn Messenger>,
    limiter: Arc<RateLimiter>,
}

impl FanOut {
    #[must_use]
    pub fn new(messenger: Arc<dyn Messenger>, limiter: Arc<RateLimiter>) -> Self {
        Self { messenger, limiter }
    }

    /// Sends `payload` to each recipient in order.
    ///
    /// Per-recipient failures are counted and skipped; a payload failure
    /// aborts the run. Completed sends are never rolled back.
    pub async fn deliver(
        &self,
        recipients: &[i64],
        payload: &Payload,
        cancel: &CancelFlag,
    ) -> Result<DeliveryReport, BroadcastError> {
        let mut report = DeliveryReport::default();

        for &chat_id in recipients {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            self.limiter.wait_and_acquire().await;
            let mut outcome = self.send_once(chat_id, payload).await;

            if let Err(TransportError::RetryAfter(wait)) = outcome {
                self.limiter.back_off(wait).await;
                self.limiter.wait_and_acquire().await;
                outcome = self.send_once(chat_id, payload).await;
            }

            match outcome {
                Ok(()) => report.sent += 1,
                Err(e) if e.is_recipient_failure() => {
                    debug!("Delivery to {} failed: {}", chat_id, e);
                    report.failed += 1;
                }
                Err(error) => return Err(BroadcastError::Payload { error, report }),
            }
        }

        info!(
            "Fan-out finished: sent={}, failed={}, cancelled={}",
            report.sent, report.failed, report.cancelled
        );
        Ok(report)
    }

    async fn send_once(&self, chat_id: i64, payload: &Payload) -> Result<(), TransportError> {
        match payload {
            Payload::Text(text) => self.messenger.send_text(chat_id, text).await,
            Payload::Ad {
                image_file_id,
                text,
                button_text,
                button_url,
            } => {
                let keyboard: Keyboard = vec![vec![Button::url(button_text, button_url)]];
                match image_file_id {
                    Some(image) => {
                        self.messenger
                            .send_photo(chat_id, image, text, Some(&keyboard))
                            .await
                    }
                    None => self.messenger.send_keyboard(chat_id, text, &keyboard).await,
                }
            }
        }
    }
}

impl std::fmt::Debug for FanOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOut")
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}
