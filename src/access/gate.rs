//! Mandatory-subscription gate.
//!
//! A user passes when the gate is switched off, when no gate channels are
//! configured, or when every channel reports them as a member. A channel
//! whose membership query fails or times out is skipped (fail open per
//! channel).

use std::sync::Arc;

use tracing::{debug, warn};

use crate::storage::{Database, DbError, FORCE_SUBSCRIBE};
use crate::telegram::Messenger;

/// Read-only subscription predicate.
#[derive(Clone)]
pub struct SubscriptionGate {
    db: Database,
    messenger: Arc<dyn Messenger>,
}

impl SubscriptionGate {
    #[must_use]
    pub fn new(db: Database, messenger: Arc<dyn Messenger>) -> Self {
        Self { db, messenger }
    }

    /// Whether `user_id` may be served content.
    ///
    /// Storage errors propagate; transport errors never do.
    pub async fn is_subscribed(&self, user_id: i64) -> Result<bool, DbError> {
        if !self.db.setting_flag(FORCE_SUBSCRIBE)? {
            return Ok(true);
        }

        let channels = self.db.get_channels()?;
        for channel in &channels {
            match self.messenger.membership_status(channel, user_id).await {
                Ok(status) if status.is_member() => {}
                Ok(status) => {
                    debug!("User {} fails gate on @{} ({:?})", user_id, channel, status);
                    return Ok(false);
                }
                Err(e) => {
                    warn!(
                        "Membership check for user {} in @{} failed, skipping channel: {}",
                        user_id, channel, e
                    );
                }
            }
        }
        Ok(true)
    }
}

impl std::fmt::Debug for SubscriptionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionGate").finish_non_exhaustive()
    }
}
