//! Engagement tracking and the adaptive daily push scheduler.
//!
//! - [`engagement`]: per-user hourly interaction counts.
//! - [`registration`]: push endpoints and their daily delivery state.
//! - [`delivery`]: the [`PushDelivery`] capability and a webhook implementation.
//! - [`scheduler`]: decides once per tick which registrations are due.
//! - [`sent`]: in-process record of deliveries made.

pub mod delivery;
pub mod engagement;
pub mod error;
pub mod local_time;
pub mod registration;
pub mod scheduler;
pub mod sent;

pub use delivery::{PushData, PushDelivery, PushPayload, WebhookDelivery};
pub use engagement::{EngagementProfile, EngagementTracker};
pub use error::{DeliveryError, PushError, Result};
pub use registration::{
    AdaptiveStrategy, PushRegistration, PushRegistry, PushSubscription, RegistrationMetadata,
    registration_id,
};
pub use scheduler::{Decision, PushScheduler, Target, TickSummary, plan};
pub use sent::{SentLedger, SentMark};
