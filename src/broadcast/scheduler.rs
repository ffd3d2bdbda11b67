//! Periodic dispatch of scheduled ads.
//!
//! Each tick selects the pending ads whose time has come, fans each one
//! out to every known user, then consumes one repeat. An ad that still
//! has repeats left goes out again on the next tick; an ad at zero is
//! never selected again.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use super::{BroadcastError, CancelFlag, DeliveryReport, FanOut, Payload};
use crate::storage::Database;
use crate::telegram::Messenger;

const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Messages that can be sent to the scheduler.
#[derive(Debug, Clone)]
pub enum SchedulerMessage {
    /// Dispatch due ads now instead of waiting for the next tick.
    TriggerDispatch,
    /// Stop the scheduler.
    Shutdown,
}

/// Result of dispatching one ad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdDispatch {
    pub ad_id: i64,
    pub report: DeliveryReport,
    /// Repeats left after this dispatch.
    pub remaining: Option<i64>,
}

/// Ad dispatch scheduler.
pub struct AdScheduler {
    db: Database,
    fan_out: FanOut,
    messenger: Arc<dyn Messenger>,
    main_admin: i64,
    check_interval: Duration,
    stop: CancelFlag,
}

impl AdScheduler {
    #[must_use]
    pub fn new(
        db: Database,
        fan_out: FanOut,
        messenger: Arc<dyn Messenger>,
        main_admin: i64,
    ) -> Self {
        Self {
            db,
            fan_out,
            messenger,
            main_admin,
            check_interval: Duration::from_secs(3600),
            stop: CancelFlag::new(),
        }
    }

    /// Sets the interval between dispatch ticks.
    #[must_use]
    pub const fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Flag that interrupts an in-flight dispatch when raised.
    #[must_use]
    pub fn stop_flag(&self) -> CancelFlag {
        self.stop.clone()
    }

    /// Runs the scheduler loop.
    pub async fn run(&self, mut rx: mpsc::Receiver<SchedulerMessage>) {
        info!(
            "Ad scheduler started (interval: {:?})",
            self.check_interval
        );

        let mut check_timer = interval(self.check_interval.max(MIN_CHECK_INTERVAL));

        loop {
            tokio::select! {
                _ = check_timer.tick() => {
                    self.tick().await;
                }
                msg = rx.recv() => {
                    match msg {
                        Some(SchedulerMessage::TriggerDispatch) => {
                            debug!("Received trigger dispatch message");
                            self.tick().await;
                        }
                        Some(SchedulerMessage::Shutdown) | None => {
                            info!("Ad scheduler shutting down");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn tick(&self) {
        match self.dispatch_due(Utc::now()).await {
            Ok(dispatched) if dispatched.is_empty() => debug!("No ads due"),
            Ok(dispatched) => info!("Dispatched {} ad(s)", dispatched.len()),
            Err(e) => error!("Ad dispatch failed: {}", e),
        }
    }

    /// Sends every pending ad scheduled at or before `now`.
    pub async fn dispatch_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AdDispatch>, BroadcastError> {
        let due = self.db.due_ads(now)?;
        if due.is_empty() {
            return Ok(Vec::new());
        }

        let recipients = self.db.all_user_ids()?;
        let mut dispatched = Vec::with_capacity(due.len());

        for ad in due {
            if self.stop.is_cancelled() {
                break;
            }

            let report = match self
                .fan_out
                .deliver(&recipients, &Payload::from(&ad), &self.stop)
                .await
            {
                Ok(report) => report,
                Err(BroadcastError::Payload { error: e, report }) => {
                    error!("Ad #{} cannot be delivered: {}", ad.id, e);
                    // Recipients never reached did not get the ad either.
                    DeliveryReport {
                        failed: recipients.len() - report.sent,
                        ..report
                    }
                }
                Err(e) => return Err(e),
            };

            // An interrupted run does not consume a repeat.
            let remaining = if report.cancelled {
                Some(ad.repeat_count)
            } else {
                self.db.decrement_ad_repeat(ad.id)?
            };

            info!(
                "Ad #{} dispatched: sent={}, failed={}, remaining={:?}",
                ad.id, report.sent, report.failed, remaining
            );
            self.notify_admin(ad.id, &report, remaining).await;

            dispatched.push(AdDispatch {
                ad_id: ad.id,
                report,
                remaining,
            });
        }

        Ok(dispatched)
    }

    async fn notify_admin(&self, ad_id: i64, report: &DeliveryReport, remaining: Option<i64>) {
        let text = format!(
            "📢 Ad #{ad_id} dispatched\n{}\n🔁 Repeats left: {}",
            report.summary(),
            remaining.unwrap_or_default()
        );
        if let Err(e) = self.messenger.send_text(self.main_admin, &text).await {
            warn!("Failed to report ad #{} to main admin: {}", ad_id, e);
        }
    }
}

impl std::fmt::Debug for AdScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdScheduler")
            .field("check_interval", &self.check_interval)
            .field("main_admin", &self.main_admin)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::storage::NewAd;
    use crate::telegram::RateLimiter;
    use crate::telegram::fake::{FakeMessenger, Sent};

    const ADMIN: i64 = 1;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn setup() -> (Database, Arc<FakeMessenger>, AdScheduler) {
        let db = Database::open_in_memory().unwrap();
        let fake = Arc::new(FakeMessenger::new());
        let fan_out = FanOut::new(fake.clone(), Arc::new(RateLimiter::new(Duration::ZERO)));
        let scheduler = AdScheduler::new(db.clone(), fan_out, fake.clone(), ADMIN);
        for id in [10, 20, 30] {
            db.add_user(id, None, "user").unwrap();
        }
        (db, fake, scheduler)
    }

    fn ad(at: DateTime<Utc>, repeat_count: i64) -> NewAd {
        NewAd {
            image_file_id: Some("img".into()),
            text: "Promo".into(),
            button_text: "Go".into(),
            button_url: "https://example.com".into(),
            schedule_time: at,
            repeat_count,
        }
    }

    #[tokio::test]
    async fn test_single_repeat_ad_sent_once_then_retired() {
        let (db, fake, scheduler) = setup();
        let id = db.schedule_ad(&ad(now(), 1)).unwrap();

        let dispatched = scheduler.dispatch_due(now()).await.unwrap();
        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].ad_id, id);
        assert_eq!(dispatched[0].report.sent, 3);
        assert_eq!(dispatched[0].remaining, Some(0));

        for user in [10, 20, 30] {
            assert!(matches!(fake.sent_to(user)[0], Sent::Photo { .. }));
        }
        assert!(db.list_pending_ads().unwrap().is_empty());

        fake.clear();
        assert!(scheduler.dispatch_due(now()).await.unwrap().is_empty());
        assert!(fake.sent().is_empty());
    }

    #[tokio::test]
    async fn test_future_ads_wait() {
        let (db, fake, scheduler) = setup();
        db.schedule_ad(&ad(now() + ChronoDuration::minutes(5), 1)).unwrap();

        assert!(scheduler.dispatch_due(now()).await.unwrap().is_empty());
        assert!(fake.sent().is_empty());
        assert_eq!(db.list_pending_ads().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repeats_count_down_per_dispatch() {
        let (db, _fake, scheduler) = setup();
        let id = db.schedule_ad(&ad(now(), 2)).unwrap();

        scheduler.dispatch_due(now()).await.unwrap();
        assert_eq!(db.get_ad(id).unwrap().unwrap().repeat_count, 1);
        scheduler.dispatch_due(now()).await.unwrap();
        assert_eq!(db.get_ad(id).unwrap().unwrap().repeat_count, 0);
        assert!(scheduler.dispatch_due(now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_admin_receives_tally() {
        let (db, fake, scheduler) = setup();
        fake.block(20);
        db.schedule_ad(&ad(now(), 1)).unwrap();

        scheduler.dispatch_due(now()).await.unwrap();
        let report = fake.last_text_to(ADMIN).unwrap();
        assert!(report.contains("Sent: 2"));
        assert!(report.contains("Failed: 1"));
    }

    #[tokio::test]
    async fn test_rejected_ad_reports_real_tally() {
        let (db, fake, scheduler) = setup();
        fake.reject_payload_to(20);
        let id = db.schedule_ad(&ad(now(), 2)).unwrap();

        let dispatched = scheduler.dispatch_due(now()).await.unwrap();
        assert_eq!(dispatched[0].report.sent, 1);
        assert_eq!(dispatched[0].report.failed, 2);
        assert_eq!(dispatched[0].remaining, Some(1));
        assert_eq!(db.get_ad(id).unwrap().unwrap().repeat_count, 1);

        let report = fake.last_text_to(ADMIN).unwrap();
        assert!(report.contains("Sent: 1"));
        assert!(report.contains("Failed: 2"));
    }

    #[tokio::test]
    async fn test_zero_interval_does_not_stop_the_loop() {
        let (_db, _fake, scheduler) = setup();
        let scheduler = scheduler.with_check_interval(Duration::ZERO);
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(async move { scheduler.run(rx).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(SchedulerMessage::Shutdown).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_stop_flag_keeps_repeat() {
        let (db, _fake, scheduler) = setup();
        let id = db.schedule_ad(&ad(now(), 1)).unwrap();
        scheduler.stop_flag().cancel();

        assert!(scheduler.dispatch_due(now()).await.unwrap().is_empty());
        assert_eq!(db.get_ad(id).unwrap().unwrap().repeat_count, 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (_db, _fake, scheduler) = setup();
        let (tx, rx) = mpsc::channel(4);
        tx.send(SchedulerMessage::Shutdown).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), scheduler.run(rx))
            .await
            .unwrap();
    }
}
