//! Engagement tracking: per-user counts of interactions by local hour.

use std::collections::BTreeMap;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use cadence_storage::{Record, RecordStore, StagedStore, find_record, upsert_record};

use crate::error::{PushError, Result};
use crate::local_time::resolve_timezone;

/// Aggregated engagement for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementProfile {
    pub user_id: String,
    /// Local hour (0-23) to accumulated interaction count.
    #[serde(default)]
    pub hourly_scores: BTreeMap<u32, u64>,
    #[serde(default)]
    pub total_events: u64,
    /// Zone the most recent event was recorded in.
    pub timezone: String,
    pub first_event_at: DateTime<Utc>,
    pub last_event_at: DateTime<Utc>,
}

impl Record for EngagementProfile {
    const COLLECTION: &'static str = "engagement";

    fn record_id(&self) -> &str {
        &self.user_id
    }
}

impl EngagementProfile {
    fn new(user_id: &str, timezone: &str, at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            hourly_scores: BTreeMap::new(),
            total_events: 0,
            timezone: timezone.to_string(),
            first_event_at: at,
            last_event_at: at,
        }
    }

    /// Hour with the highest score. Ties go to the earliest hour.
    pub fn best_hour(&self) -> Option<u32> {
        let mut best: Option<(u32, u64)> = None;
        for (&hour, &score) in &self.hourly_scores {
            if score == 0 {
                continue;
            }
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((hour, score)),
            }
        }
        best.map(|(hour, _)| hour)
    }

    /// Halves every score and recomputes the total. Hours that reach zero
    /// are dropped.
    pub fn decay(&mut self) {
        for score in self.hourly_scores.values_mut() {
            *score /= 2;
        }
        self.hourly_scores.retain(|_, score| *score > 0);
        self.total_events = self.hourly_scores.values().sum();
    }
}

/// Records engagement events and serves profiles.
///
/// Profiles are persisted through a [`RecordStore`]. Events recorded while
/// the store is read-only are kept in process and written with the next
/// event the store accepts.
#[derive(Debug)]
pub struct EngagementTracker<S> {
    profiles: StagedStore<S, EngagementProfile>,
    default_timezone: String,
    max_total_events: u64,
}

impl<S: RecordStore<EngagementProfile>> EngagementTracker<S> {
    /// Creates a tracker with no decay cap and UTC as the fallback zone.
    pub fn new(store: S) -> Self {
        Self {
            profiles: StagedStore::new(store),
            default_timezone: "UTC".to_string(),
            max_total_events: 0,
        }
    }

    /// Halve scores whenever a profile's total exceeds `max`. `0` disables.
    pub fn with_max_total_events(mut self, max: u64) -> Self {
        self.max_total_events = max;
        self
    }

    /// Zone used for events whose zone is empty or unknown.
    pub fn with_default_timezone(mut self, tz: impl Into<String>) -> Self {
        self.default_timezone = tz.into();
        self
    }

    /// Adds one interaction at the local hour of `occurred_at` in `timezone`.
    ///
    /// Repeated calls accumulate; there is no deduplication.
    pub fn record_event(
        &self,
        user_id: &str,
        timezone: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<EngagementProfile> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(PushError::invalid("user_id", "must not be empty"));
        }
        let tz = resolve_timezone(Some(timezone), &self.default_timezone);
        let hour = occurred_at.with_timezone(&tz).hour();
        let max = self.max_total_events;

        let updated = self.profiles.mutate(|profiles| {
            let mut profile = find_record(profiles, user_id)
                .cloned()
                .unwrap_or_else(|| EngagementProfile::new(user_id, tz.name(), occurred_at));
            *profile.hourly_scores.entry(hour).or_insert(0) += 1;
            profile.total_events += 1;
            profile.timezone = tz.name().to_string();
            profile.first_event_at = profile.first_event_at.min(occurred_at);
            profile.last_event_at = profile.last_event_at.max(occurred_at);
            if max > 0 && profile.total_events > max {
                debug!(user_id, total = profile.total_events, "decaying engagement scores");
                profile.decay();
            }
            upsert_record(profiles, profile.clone());
            Ok(profile)
        })?;

        debug!(user_id, hour, "recorded engagement event");
        Ok(updated)
    }

    /// Returns `true` while recorded events are held in memory only.
    pub fn is_degraded(&self) -> bool {
        self.profiles.is_degraded()
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        self.profiles.store()
    }

    /// Profile for `user_id`, or `None` if no event was ever recorded.
    pub fn get_profile(&self, user_id: &str) -> Result<Option<EngagementProfile>> {
        let profiles = self.profiles.load()?;
        Ok(find_record(&profiles, user_id).cloned())
    }

    /// All profiles keyed by user id.
    pub fn profiles(&self) -> Result<BTreeMap<String, EngagementProfile>> {
        Ok(self
            .profiles
            .load()?
            .into_iter()
            .map(|p| (p.user_id.clone(), p))
            .collect())
    }
}
