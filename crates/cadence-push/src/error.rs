//! Error types for engagement tracking, registrations and delivery.

use cadence_storage::StorageError;

/// Errors from the engagement tracker and the push registry.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The backing record store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A caller-supplied value was rejected.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// The offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Convenience alias used throughout the push crate.
pub type Result<T> = std::result::Result<T, PushError>;

impl PushError {
    /// Creates a [`PushError::Invalid`].
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Outcome of a failed delivery attempt.
///
/// Neither variant escapes a scheduler tick: `Transient` leaves the
/// registration pending for the next tick, `Gone` removes it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Delivery failed for a reason that may clear up by itself.
    #[error("delivery failed: {0}")]
    Transient(String),

    /// The endpoint no longer exists (HTTP 404/410 or equivalent).
    #[error("endpoint gone (status {status})")]
    Gone {
        /// Status reported by the push service.
        status: u16,
    },
}

impl DeliveryError {
    /// Returns `true` if the registration should be removed.
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Gone { .. })
    }

    /// Classifies an HTTP status code returned by a push endpoint.
    pub fn from_status(status: u16) -> Self {
        match status {
            404 | 410 => Self::Gone { status },
            other => Self::Transient(format!("push service returned status {other}")),
        }
    }
}
