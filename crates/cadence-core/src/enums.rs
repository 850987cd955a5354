//! Enum types for the cadence system.
//!
//! Each enum is a closed set with:
//! - Serialize as its canonical snake_case string
//! - Deserialize/`FromStr` accepting the canonical string or a listed alias,
//!   and rejecting anything else with [`UnknownVariant`]
//! - `as_str()` and a `Display` impl

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A string that names no variant of the target enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}' (expected {})", .expected.join(", "))]
pub struct UnknownVariant {
    /// Name of the enum, e.g. `status`.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
    /// Canonical names of every variant.
    pub expected: &'static [&'static str],
}

// ---------------------------------------------------------------------------
// Macro: defines a closed enum with canonical names and optional aliases.
// ---------------------------------------------------------------------------
macro_rules! define_enum {
    (
        $(#[$meta:meta])*
        $name:ident, kind = $kind:literal, default = $default:ident,
        variants: [
            $( ($variant:ident, $str:literal $(, $alias:literal)* ) ),+ $(,)?
        ]
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $variant, )+
        }

        impl $name {
            /// Returns the canonical string representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $str, )+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $( $str $( | $alias )* => Ok(Self::$variant), )+
                    _ => Err(UnknownVariant {
                        kind: $kind,
                        value: s.to_owned(),
                        expected: &[$( $str ),+],
                    }),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

// ===========================================================================
// TaskStatus
// ===========================================================================

define_enum! {
    /// Workflow state of a task.
    ///
    /// The stored value on a [`Task`](crate::task::Task) is derived; callers
    /// only ever *request* a status, which the propagation engine validates
    /// against children and QA.
    TaskStatus, kind = "status", default = Todo,
    variants: [
        (Todo, "todo", "open", "pending"),
        (InProgress, "in_progress", "in-progress", "doing", "started"),
        (Blocked, "blocked"),
        (Done, "done", "complete", "completed", "closed"),
    ]
}

impl TaskStatus {
    /// Returns `true` once work has started or finished.
    pub fn is_started(&self) -> bool {
        matches!(self, Self::InProgress | Self::Done)
    }
}

// ===========================================================================
// ScheduleEventKind
// ===========================================================================

define_enum! {
    /// Kind of entry in a task's schedule log.
    ScheduleEventKind, kind = "schedule event", default = ScheduleUpdate,
    variants: [
        (ScheduleUpdate, "schedule_update"),
    ]
}
