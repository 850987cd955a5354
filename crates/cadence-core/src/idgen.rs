//! Hash-derived identifiers.
//!
//! An id is a prefix followed by the low base36 digits of a SHA-256 digest
//! over `|`-joined parts. The same parts always give the same id.

use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use sha2::{Digest, Sha256};

/// Shortest generated task suffix.
pub const TASK_ID_MIN_LENGTH: usize = 4;
/// Longest generated task suffix before falling back to [`stable_id`].
pub const TASK_ID_MAX_LENGTH: usize = 8;

const SCHEDULE_ENTRY_LENGTH: usize = 6;
const ITEM_LENGTH: usize = 6;

/// Last `length` base36 digits of the digest of `parts`, zero padded.
fn digest36(parts: &[&str], length: usize) -> String {
    let digest = Sha256::digest(parts.join("|").as_bytes());
    let digits = BigUint::from_bytes_be(&digest).to_str_radix(36);
    let tail = &digits[digits.len().saturating_sub(length)..];
    format!("{tail:0>length$}")
}

/// Candidate id for a new task; `nonce` varies it on collision.
pub fn task_id(
    prefix: &str,
    title: &str,
    description: &str,
    creator: &str,
    created_at: DateTime<Utc>,
    length: usize,
    nonce: u32,
) -> String {
    let nanos = created_at.timestamp_nanos_opt().unwrap_or_default().to_string();
    let nonce = nonce.to_string();
    let suffix = digest36(&[title, description, creator, &nanos, &nonce], length);
    format!("{prefix}-{suffix}")
}

/// Id of the `seq`-th schedule log entry of `task_id`.
pub fn schedule_entry_id(task_id: &str, actor: &str, at: DateTime<Utc>, seq: usize) -> String {
    let at = at.to_rfc3339();
    let seq = seq.to_string();
    format!(
        "sched-{}",
        digest36(&[task_id, actor, &at, &seq], SCHEDULE_ENTRY_LENGTH)
    )
}

/// Deterministic id for an arbitrary key such as a push endpoint URL.
pub fn stable_id(prefix: &str, key: &str, length: usize) -> String {
    format!("{prefix}-{}", digest36(&[key], length.clamp(3, 15)))
}

/// Id of a checklist item (`kind` `'c'`) or acceptance criterion (`'a'`).
///
/// The position is hashed too, so duplicate labels within a task still get
/// distinct ids.
pub fn item_id(task_id: &str, kind: char, label: &str, order: u32) -> String {
    let kind_str = kind.to_string();
    let order = order.to_string();
    format!(
        "{kind}{}",
        digest36(&[task_id, &kind_str, label, &order], ITEM_LENGTH)
    )
}
