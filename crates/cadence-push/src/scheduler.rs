//! The adaptive daily push scheduler.
//!
//! Every tick walks all registrations and decides, in each registration's
//! local time, whether today's single notification is due. The target hour
//! is the user's learned best hour once enough engagement exists, otherwise
//! a probe hour that cycles day by day.
//!
//! Successful deliveries are marked in a [`SentLedger`] before they are
//! saved, so a failed save cannot cause a second delivery the same day.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cadence_config::config::{NotificationConfig, PushConfig};
use cadence_storage::RecordStore;

use crate::delivery::{PushData, PushDelivery, PushPayload};
use crate::engagement::{EngagementProfile, EngagementTracker};
use crate::error::DeliveryError;
use crate::local_time::{LocalSlot, local_days_between, resolve_timezone};
use crate::registration::{AdaptiveStrategy, PushRegistration, PushRegistry};
use crate::sent::SentLedger;

/// Used only if the probe list is empty, which config validation rejects.
const FALLBACK_PROBE_HOUR: u32 = 9;

/// Hour chosen for today's delivery and how it was chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub strategy: AdaptiveStrategy,
    pub hour: u32,
    pub date_key: String,
}

/// What a tick should do with one registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Today's notification already went out.
    AlreadySent { date_key: String },
    /// Not yet time.
    Wait(Target),
    Deliver(Target),
}

/// Hour to aim for on the local day of `now`.
pub fn target_hour(
    registration: &PushRegistration,
    profile: Option<&EngagementProfile>,
    tz: Tz,
    now: DateTime<Utc>,
    config: &PushConfig,
) -> (AdaptiveStrategy, u32) {
    if let Some(hour) = profile
        .filter(|p| p.total_events >= config.min_learned_events)
        .and_then(EngagementProfile::best_hour)
    {
        return (AdaptiveStrategy::Learned, hour);
    }

    let probes = &config.probe_hours;
    let hour = if probes.is_empty() {
        FALLBACK_PROBE_HOUR
    } else {
        let days = local_days_between(registration.created_at, now, tz);
        probes[(days % probes.len() as u64) as usize]
    };
    (AdaptiveStrategy::Exploration, hour)
}

/// Decides what to do with `registration` at `now`. Pure.
pub fn plan(
    registration: &PushRegistration,
    profile: Option<&EngagementProfile>,
    now: DateTime<Utc>,
    config: &PushConfig,
) -> Decision {
    let tz = resolve_timezone(
        registration.metadata.timezone.as_deref(),
        &config.default_timezone,
    );
    let slot = LocalSlot::at(now, tz);
    let date_key = slot.date_key();
    if registration.last_daily_sent_key.as_deref() == Some(date_key.as_str()) {
        return Decision::AlreadySent { date_key };
    }

    let (strategy, hour) = target_hour(registration, profile, tz, now, config);
    let target = Target {
        strategy,
        hour,
        date_key,
    };
    if slot.hour < hour || (slot.hour == hour && slot.minute < config.minute_offset) {
        Decision::Wait(target)
    } else {
        Decision::Deliver(target)
    }
}

/// Builds the notification for `target`.
pub fn build_payload(notification: &NotificationConfig, target: &Target) -> PushPayload {
    PushPayload {
        title: notification.title.clone(),
        body: notification.body.clone(),
        tag: notification.tag.clone(),
        data: PushData {
            url: notification.url.clone(),
            strategy: target.strategy,
            hour: target.hour,
            date_key: target.date_key.clone(),
        },
    }
}

/// Counters for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub evaluated: usize,
    pub delivered: usize,
    /// Already sent today or not yet due.
    pub skipped: usize,
    /// Transient failures, retried next tick.
    pub retry_pending: usize,
    /// Registrations deleted because their endpoint is gone.
    pub removed: usize,
    /// The tick did not run because another one was in progress.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub overlapped: bool,
}

/// Clears the running flag when a tick ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives daily deliveries for every registration.
pub struct PushScheduler<R, E, D> {
    registry: PushRegistry<R>,
    tracker: EngagementTracker<E>,
    delivery: D,
    config: PushConfig,
    sent: Arc<SentLedger>,
    running: AtomicBool,
}

impl<R, E, D> PushScheduler<R, E, D>
where
    R: RecordStore<PushRegistration> + 'static,
    E: RecordStore<EngagementProfile> + 'static,
    D: PushDelivery + 'static,
{
    pub fn new(
        registry: PushRegistry<R>,
        tracker: EngagementTracker<E>,
        delivery: D,
        config: PushConfig,
    ) -> Self {
        Self {
            registry,
            tracker,
            delivery,
            config,
            sent: Arc::new(SentLedger::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Uses `sent` instead of a fresh ledger.
    pub fn with_sent_ledger(mut self, sent: Arc<SentLedger>) -> Self {
        self.sent = sent;
        self
    }

    /// Deliveries made by this scheduler, whether or not they were saved.
    pub fn sent_ledger(&self) -> &Arc<SentLedger> {
        &self.sent
    }

    pub fn registry(&self) -> &PushRegistry<R> {
        &self.registry
    }

    pub fn tracker(&self) -> &EngagementTracker<E> {
        &self.tracker
    }

    /// Evaluates every registration once at `now`.
    ///
    /// Never fails: load errors skip the tick, per-registration errors are
    /// logged and counted.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickSummary {
        let mut summary = TickSummary::default();
        if self.running.swap(true, Ordering::AcqRel) {
            debug!("previous tick still running, skipping");
            summary.overlapped = true;
            return summary;
        }
        let _guard = RunningGuard(&self.running);

        let registrations = match self.registry.list() {
            Ok(registrations) => registrations,
            Err(e) => {
                warn!(error = %e, "failed to load push registrations, skipping tick");
                return summary;
            }
        };
        let profiles = match self.tracker.profiles() {
            Ok(profiles) => profiles,
            Err(e) => {
                warn!(error = %e, "failed to load engagement profiles, skipping tick");
                return summary;
            }
        };

        for registration in &registrations {
            summary.evaluated += 1;
            self.process(registration, &profiles, now, &mut summary)
                .await;
        }

        debug!(?summary, "push tick finished");
        summary
    }

    /// Saves a delivery the ledger holds but the registry has not accepted.
    fn persist_pending(&self, stored: &PushRegistration) {
        let Some(mark) = self.sent.get(&stored.id) else {
            return;
        };
        if mark.persisted {
            return;
        }
        match self.registry.record_delivery(
            &stored.id,
            &mark.date_key,
            mark.strategy,
            mark.hour,
            mark.at,
        ) {
            Ok(()) => {
                debug!(id = %stored.id, date_key = %mark.date_key, "saved pending delivery state");
                self.sent.mark_persisted(&stored.id, &mark.date_key);
            }
            Err(e) => {
                warn!(id = %stored.id, error = %e, "still unable to record delivery");
            }
        }
    }

    async fn process(
        &self,
        stored: &PushRegistration,
        profiles: &BTreeMap<String, EngagementProfile>,
        now: DateTime<Utc>,
        summary: &mut TickSummary,
    ) {
        self.persist_pending(stored);
        let registration = &self.sent.overlay(stored);
        let profile = registration
            .metadata
            .user_id
            .as_deref()
            .and_then(|user| profiles.get(user));

        let target = match plan(registration, profile, now, &self.config) {
            Decision::Deliver(target) => target,
            Decision::AlreadySent { .. } | Decision::Wait(_) => {
                summary.skipped += 1;
                return;
            }
        };

        let payload = build_payload(&self.config.notification, &target);
        match self
            .delivery
            .deliver(&registration.subscription, &payload)
            .await
        {
            Ok(()) => {
                summary.delivered += 1;
                info!(
                    id = %registration.id,
                    strategy = %target.strategy,
                    hour = target.hour,
                    date_key = %target.date_key,
                    "daily push delivered"
                );
                self.sent.mark(
                    &registration.id,
                    &target.date_key,
                    target.strategy,
                    target.hour,
                    now,
                );
                match self.registry.record_delivery(
                    &registration.id,
                    &target.date_key,
                    target.strategy,
                    target.hour,
                    now,
                ) {
                    Ok(()) => self.sent.mark_persisted(&registration.id, &target.date_key),
                    Err(e) => {
                        warn!(id = %registration.id, error = %e, "failed to record delivery, will retry");
                    }
                }
            }
            Err(DeliveryError::Gone { status }) => {
                match self.registry.remove_if_unchanged(stored) {
                    Ok(true) => {
                        self.sent.forget(&stored.id);
                        summary.removed += 1;
                        info!(id = %registration.id, status, "push endpoint gone, registration removed");
                    }
                    Ok(false) => {
                        debug!(id = %registration.id, "registration changed since read, keeping it");
                    }
                    Err(e) => {
                        warn!(id = %registration.id, error = %e, "failed to remove gone registration");
                    }
                }
            }
            Err(err @ DeliveryError::Transient(_)) => {
                summary.retry_pending += 1;
                warn!(id = %registration.id, error = %err, "push delivery failed, will retry");
            }
        }
    }

    /// Spawns the periodic loop. It stops when `cancel` fires.
    pub fn run(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let period = Duration::from_secs(self.config.tick_interval_secs.max(1));
        tokio::spawn(async move {
            info!(interval_secs = period.as_secs(), "push scheduler started");
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("push scheduler stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        let summary = self.tick(Utc::now()).await;
                        if summary.delivered > 0 || summary.removed > 0 {
                            info!(
                                delivered = summary.delivered,
                                removed = summary.removed,
                                retry_pending = summary.retry_pending,
                                "push tick"
                            );
                        }
                    }
                }
            }
        })
    }
}

impl<R, E, D> std::fmt::Debug for PushScheduler<R, E, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushScheduler")
            .field("config", &self.config)
            .field("sent", &self.sent.len())
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}
