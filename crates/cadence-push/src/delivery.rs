//! The push delivery capability and its webhook implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::DeliveryError;
use crate::registration::{AdaptiveStrategy, PushSubscription};

/// Notification handed to a [`PushDelivery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    /// Lets the client replace an earlier notification with the same tag.
    pub tag: String,
    pub data: PushData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushData {
    /// Click-through target.
    pub url: String,
    pub strategy: AdaptiveStrategy,
    pub hour: u32,
    pub date_key: String,
}

/// Something that can deliver a notification to a subscription.
#[async_trait]
pub trait PushDelivery: Send + Sync {
    /// Delivers `payload`. Use [`DeliveryError::Gone`] for endpoints that
    /// will never accept deliveries again.
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<(), DeliveryError>;
}

#[async_trait]
impl<D: PushDelivery + ?Sized> PushDelivery for std::sync::Arc<D> {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<(), DeliveryError> {
        (**self).deliver(subscription, payload).await
    }
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    subscription: &'a PushSubscription,
    payload: &'a PushPayload,
}

/// Delivers by POSTing `{subscription, payload}` as JSON to the endpoint.
///
/// Requests run on the blocking pool so a slow endpoint never stalls the
/// runtime.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    agent: ureq::Agent,
}

impl WebhookDelivery {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

#[async_trait]
impl PushDelivery for WebhookDelivery {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<(), DeliveryError> {
        let body = serde_json::to_value(WebhookBody {
            subscription,
            payload,
        })
        .map_err(|e| DeliveryError::Transient(format!("failed to encode payload: {e}")))?;
        let agent = self.agent.clone();
        let endpoint = subscription.endpoint.clone();

        debug!(endpoint = %endpoint, "posting push payload");
        let result = tokio::task::spawn_blocking(move || {
            agent
                .post(endpoint.as_str())
                .send_json(&body)
                .map(|_| ())
        })
        .await
        .map_err(|e| DeliveryError::Transient(format!("delivery task failed: {e}")))?;

        match result {
            Ok(()) => Ok(()),
            Err(ureq::Error::StatusCode(status)) => Err(DeliveryError::from_status(status)),
            Err(e) => Err(DeliveryError::Transient(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_with_data_block() {
        let payload = PushPayload {
            title: "Daily check-in".into(),
            body: "Your tasks for today are waiting.".into(),
            tag: "daily-checkin".into(),
            data: PushData {
                url: "/".into(),
                strategy: AdaptiveStrategy::Exploration,
                hour: 9,
                date_key: "2025-03-01".into(),
            },
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["tag"], "daily-checkin");
        assert_eq!(value["data"]["url"], "/");
        assert_eq!(value["data"]["strategy"], "exploration");
        assert_eq!(value["data"]["hour"], 9);
    }

    #[test]
    fn status_classification() {
        assert!(DeliveryError::from_status(404).is_gone());
        assert!(DeliveryError::from_status(410).is_gone());
        assert!(!DeliveryError::from_status(500).is_gone());
        assert!(!DeliveryError::from_status(429).is_gone());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transient() {
        let delivery = WebhookDelivery::new(Duration::from_secs(2));
        // Port 9 on localhost is the discard port; nothing listens there in CI.
        let err = delivery
            .deliver(
                &PushSubscription::new("http://127.0.0.1:9/push"),
                &PushPayload {
                    title: "t".into(),
                    body: "b".into(),
                    tag: "x".into(),
                    data: PushData {
                        url: "/".into(),
                        strategy: AdaptiveStrategy::Learned,
                        hour: 10,
                        date_key: "2025-03-01".into(),
                    },
                },
            )
            .await
            .unwrap_err();
        assert!(!err.is_gone());
    }
}
