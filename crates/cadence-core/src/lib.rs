//! Core task types and status propagation for the cadence system.
//!
//! Everything in this crate is pure: persistence lives in `cadence-storage`
//! and the push scheduler in `cadence-push`.

pub mod enums;
pub mod idgen;
pub mod jsonl;
pub mod payload;
pub mod propagation;
pub mod task;

pub use enums::{ScheduleEventKind, TaskStatus};
pub use payload::{AcceptanceUpdate, NewTask, QaUpdate, TaskUpdates};
pub use propagation::{GateViolation, RecomputeReport, recompute};
pub use task::{Task, TaskBuilder, TaskTree};
