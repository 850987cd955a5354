//! In-process record of daily deliveries.
//!
//! The scheduler marks every successful delivery here before persisting it,
//! so a registration whose delivery state could not be saved is still seen
//! as sent for the rest of its local day.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::registration::{AdaptiveStrategy, PushRegistration};

/// One successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMark {
    pub date_key: String,
    pub strategy: AdaptiveStrategy,
    pub hour: u32,
    pub at: DateTime<Utc>,
    /// The registry accepted the delivery state.
    pub persisted: bool,
}

/// Latest delivery per registration id.
///
/// Shared with [`PushScheduler`](crate::scheduler::PushScheduler) through an
/// `Arc`; nothing survives a restart.
#[derive(Debug, Default)]
pub struct SentLedger {
    marks: Mutex<HashMap<String, SentMark>>,
}

impl SentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SentMark>> {
        // Marks are plain values; a poisoned map is still consistent.
        self.marks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a delivery that is not yet persisted.
    pub fn mark(
        &self,
        id: &str,
        date_key: &str,
        strategy: AdaptiveStrategy,
        hour: u32,
        at: DateTime<Utc>,
    ) {
        self.lock().insert(
            id.to_string(),
            SentMark {
                date_key: date_key.to_string(),
                strategy,
                hour,
                at,
                persisted: false,
            },
        );
    }

    /// Flags the mark for `id` on `date_key` as persisted.
    pub fn mark_persisted(&self, id: &str, date_key: &str) {
        if let Some(mark) = self.lock().get_mut(id) {
            if mark.date_key == date_key {
                mark.persisted = true;
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<SentMark> {
        self.lock().get(id).cloned()
    }

    pub fn forget(&self, id: &str) {
        self.lock().remove(id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `registration` with this ledger's delivery state applied, when the
    /// ledger saw a later delivery than the stored record.
    pub fn overlay(&self, registration: &PushRegistration) -> PushRegistration {
        let mut effective = registration.clone();
        if let Some(mark) = self.get(&registration.id) {
            if registration.last_sent_at.is_none_or(|stored| stored < mark.at) {
                effective.last_daily_sent_key = Some(mark.date_key);
                effective.adaptive_strategy = Some(mark.strategy);
                effective.last_adaptive_hour = Some(mark.hour);
                effective.last_sent_at = Some(mark.at);
            }
        }
        effective
    }
}
