//! Push registrations and the registry that persists them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use cadence_core::idgen::stable_id;
use cadence_storage::{Record, RecordStore, StagedStore, find_record, upsert_record};

use crate::error::{PushError, Result};

/// Length of the hash part of a registration id.
const REGISTRATION_ID_LENGTH: usize = 12;

/// Which policy chose the hour of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptiveStrategy {
    /// Hour with the highest engagement score.
    Learned,
    /// Probe hour picked by days since registration.
    Exploration,
}

impl AdaptiveStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Learned => "learned",
            Self::Exploration => "exploration",
        }
    }
}

impl std::fmt::Display for AdaptiveStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque delivery descriptor handed to the push capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub keys: BTreeMap<String, String>,
}

impl PushSubscription {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            keys: BTreeMap::new(),
        }
    }
}

/// Client-supplied context for a registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Anything else the client sent along.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A registered push endpoint and its daily delivery state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRegistration {
    pub id: String,
    pub subscription: PushSubscription,
    #[serde(default)]
    pub metadata: RegistrationMetadata,
    pub created_at: DateTime<Utc>,
    /// Local date key of the last successful daily delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_daily_sent_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adaptive_strategy: Option<AdaptiveStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_adaptive_hour: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sent_at: Option<DateTime<Utc>>,
}

impl Record for PushRegistration {
    const COLLECTION: &'static str = "registrations";

    fn record_id(&self) -> &str {
        &self.id
    }
}

/// Registration id derived from the endpoint, so re-registering the same
/// endpoint always lands on the same record.
pub fn registration_id(endpoint: &str) -> String {
    stable_id("push", endpoint.trim(), REGISTRATION_ID_LENGTH)
}

/// Persistent set of push registrations.
///
/// Changes refused by a read-only store stay in process and are written
/// with the next change the store accepts.
#[derive(Debug)]
pub struct PushRegistry<S> {
    registrations: StagedStore<S, PushRegistration>,
}

impl<S: RecordStore<PushRegistration>> PushRegistry<S> {
    pub fn new(store: S) -> Self {
        Self {
            registrations: StagedStore::new(store),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        self.registrations.store()
    }

    /// Returns `true` while changes are held in memory only.
    pub fn is_degraded(&self) -> bool {
        self.registrations.is_degraded()
    }

    /// Registers `subscription`, replacing any registration for the same
    /// endpoint.
    ///
    /// A replaced registration keeps its `created_at` and delivery state.
    pub fn register(
        &self,
        subscription: PushSubscription,
        metadata: RegistrationMetadata,
        now: DateTime<Utc>,
    ) -> Result<PushRegistration> {
        let endpoint = subscription.endpoint.trim();
        if endpoint.is_empty() {
            return Err(PushError::invalid("endpoint", "must not be empty"));
        }
        let id = registration_id(endpoint);
        let subscription = PushSubscription {
            endpoint: endpoint.to_string(),
            ..subscription
        };

        let registration = self.registrations.mutate(|records| {
            let registration = match find_record(records, &id) {
                Some(existing) => PushRegistration {
                    subscription: subscription.clone(),
                    metadata: metadata.clone(),
                    ..existing.clone()
                },
                None => PushRegistration {
                    id: id.clone(),
                    subscription: subscription.clone(),
                    metadata: metadata.clone(),
                    created_at: now,
                    last_daily_sent_key: None,
                    adaptive_strategy: None,
                    last_adaptive_hour: None,
                    last_sent_at: None,
                },
            };
            if upsert_record(records, registration.clone()) {
                debug!(id = %id, "replaced existing registration");
            }
            Ok(registration)
        })?;

        info!(id = %id, "push endpoint registered");
        Ok(registration)
    }

    pub fn list(&self) -> Result<Vec<PushRegistration>> {
        Ok(self.registrations.load()?)
    }

    pub fn get(&self, id: &str) -> Result<Option<PushRegistration>> {
        Ok(find_record(&self.registrations.load()?, id).cloned())
    }

    /// Removes the registration. Returns `false` if it did not exist.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let removed = self.registrations.mutate(|records| {
            let before = records.len();
            records.retain(|r| r.id != id);
            Ok(records.len() != before)
        })?;
        Ok(removed)
    }

    /// Removes `seen` only if the stored registration still has the same
    /// subscription and creation time.
    ///
    /// A client that re-registered after `seen` was read keeps its new
    /// subscription.
    pub fn remove_if_unchanged(&self, seen: &PushRegistration) -> Result<bool> {
        let removed = self.registrations.mutate(|records| {
            let before = records.len();
            records.retain(|r| {
                !(r.id == seen.id
                    && r.subscription == seen.subscription
                    && r.created_at == seen.created_at)
            });
            Ok(records.len() != before)
        })?;
        Ok(removed)
    }

    /// Stores the outcome of a successful daily delivery.
    ///
    /// Does nothing if the registration disappeared in the meantime.
    pub fn record_delivery(
        &self,
        id: &str,
        date_key: &str,
        strategy: AdaptiveStrategy,
        hour: u32,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.registrations.mutate(|records| {
            if let Some(record) = records.iter_mut().find(|r| r.id == id) {
                record.last_daily_sent_key = Some(date_key.to_string());
                record.adaptive_strategy = Some(strategy);
                record.last_adaptive_hour = Some(hour);
                record.last_sent_at = Some(at);
            }
            Ok(())
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_storage::{JsonlStore, MemoryStore};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn metadata(user: &str, tz: &str) -> RegistrationMetadata {
        RegistrationMetadata {
            user_id: Some(user.into()),
            timezone: Some(tz.into()),
            ..RegistrationMetadata::default()
        }
    }

    #[test]
    fn id_is_derived_from_endpoint() {
        let a = registration_id("https://push.example/abc");
        assert_eq!(a, registration_id(" https://push.example/abc "));
        assert_ne!(a, registration_id("https://push.example/abd"));
        assert!(a.starts_with("push-"));
    }

    #[test]
    fn reregistration_keeps_created_at_and_delivery_state() {
        let registry = PushRegistry::new(MemoryStore::new());
        let first = registry
            .register(
                PushSubscription::new("https://push.example/1"),
                metadata("u1", "UTC"),
                utc("2025-03-01T10:00:00Z"),
            )
            .unwrap();
        registry
            .record_delivery(&first.id, "2025-03-01", AdaptiveStrategy::Exploration, 9, utc("2025-03-01T10:00:00Z"))
            .unwrap();

        let again = registry
            .register(
                PushSubscription::new("https://push.example/1"),
                metadata("u1", "Europe/Madrid"),
                utc("2025-03-05T10:00:00Z"),
            )
            .unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.created_at, first.created_at);
        assert_eq!(again.last_daily_sent_key.as_deref(), Some("2025-03-01"));
        assert_eq!(again.metadata.timezone.as_deref(), Some("Europe/Madrid"));
        assert_eq!(registry.list().unwrap().len(), 1);
    }

    #[test]
    fn metadata_extras_round_trip() {
        let dir = TempDir::new().unwrap();
        let registry = PushRegistry::new(JsonlStore::in_dir(dir.path()));
        let mut meta = metadata("u1", "UTC");
        meta.extra.insert("platform".into(), serde_json::json!("android"));
        let reg = registry
            .register(PushSubscription::new("https://push.example/x"), meta.clone(), Utc::now())
            .unwrap();

        let loaded = registry.get(&reg.id).unwrap().unwrap();
        assert_eq!(loaded.metadata, meta);
    }

    #[test]
    fn empty_endpoint_is_rejected() {
        let registry = PushRegistry::new(MemoryStore::new());
        let err = registry
            .register(PushSubscription::new("  "), RegistrationMetadata::default(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, PushError::Invalid { .. }));
    }

    #[test]
    fn remove_if_unchanged_spares_fresh_registration() {
        let registry = PushRegistry::new(MemoryStore::new());
        let old = registry
            .register(PushSubscription::new("https://push.example/1"), metadata("u1", "UTC"), Utc::now())
            .unwrap();
        let mut fresh = PushSubscription::new("https://push.example/1");
        fresh.keys.insert("auth".into(), "new-secret".into());
        registry
            .register(fresh, metadata("u1", "UTC"), Utc::now())
            .unwrap();

        assert!(!registry.remove_if_unchanged(&old).unwrap());
        assert!(registry.get(&old.id).unwrap().is_some());
        assert!(registry.remove(&old.id).unwrap());
        assert!(!registry.remove(&old.id).unwrap());
    }
}
