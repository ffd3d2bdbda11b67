//! Broadcast delivery: operator broadcasts and scheduled ads.
//!
//! Both go through [`FanOut`], which paces sends and keeps a success and
//! failure tally instead of stopping at the first undeliverable user.

mod fanout;
mod scheduler;

use std::sync::Mutex;

use thiserror::Error;

use crate::storage::DbError;
use crate::telegram::TransportError;

pub use fanout::{CancelFlag, DeliveryReport, FanOut, Payload};
pub use scheduler::{AdDispatch, AdScheduler, SchedulerMessage};

/// Errors that end a fan-out early.
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error(transparent)]
    Db(#[from] DbError),

    /// The transport refused the payload itself; `report` tallies the
    /// sends completed before the abort.
    #[error("Payload rejected by the transport: {error}")]
    Payload {
        error: TransportError,
        report: DeliveryReport,
    },
}

/// At most one operator broadcast runs at a time; this tracks it.
#[derive(Debug, Default)]
pub struct BroadcastSlot {
    active: Mutex<Option<CancelFlag>>,
}

impl BroadcastSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the slot, returning the run's cancel flag, or `None` if a
    /// broadcast is already in flight.
    pub fn try_begin(&self) -> Option<CancelFlag> {
        let mut active = self.active.lock().ok()?;
        if active.is_some() {
            return None;
        }
        let flag = CancelFlag::new();
        *active = Some(flag.clone());
        Some(flag)
    }

    pub fn finish(&self) {
        if let Ok(mut active) = self.active.lock() {
            *active = None;
        }
    }

    /// Raises the cancel flag of the running broadcast, if any.
    pub fn cancel(&self) -> bool {
        self.active
            .lock()
            .ok()
            .and_then(|active| active.as_ref().map(CancelFlag::cancel))
            .is_some()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.lock().is_ok_and(|active| active.is_some())
    }
}
