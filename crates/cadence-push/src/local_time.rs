//! Local-time helpers for per-registration time zones.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use tracing::warn;

/// Parses an IANA zone name such as `America/Argentina/Buenos_Aires`.
pub fn parse_timezone(name: &str) -> Option<Tz> {
    name.trim().parse::<Tz>().ok()
}

/// Resolves `name`, falling back to `default` and then to UTC.
///
/// Unknown names are logged, never rejected.
pub fn resolve_timezone(name: Option<&str>, default: &str) -> Tz {
    if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
        match parse_timezone(name) {
            Some(tz) => return tz,
            None => warn!(timezone = name, "unknown time zone, using default"),
        }
    }
    parse_timezone(default).unwrap_or_else(|| {
        warn!(timezone = default, "unknown default time zone, using UTC");
        Tz::UTC
    })
}

/// A point in time as seen on a wall clock in some zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalSlot {
    pub date: NaiveDate,
    pub hour: u32,
    pub minute: u32,
}

impl LocalSlot {
    /// Converts `at` into `tz`.
    pub fn at(at: DateTime<Utc>, tz: Tz) -> Self {
        let local = at.with_timezone(&tz);
        Self {
            date: local.date_naive(),
            hour: local.hour(),
            minute: local.minute(),
        }
    }

    /// `YYYY-MM-DD` key identifying the local calendar day.
    pub fn date_key(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

/// Whole local calendar days from `since` to `now` in `tz`, clamped at zero.
pub fn local_days_between(since: DateTime<Utc>, now: DateTime<Utc>, tz: Tz) -> u64 {
    let start = since.with_timezone(&tz).date_naive();
    let end = now.with_timezone(&tz).date_naive();
    (end - start).num_days().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn resolves_known_and_unknown_zones() {
        assert_eq!(
            resolve_timezone(Some("America/Argentina/Buenos_Aires"), "UTC"),
            Tz::America__Argentina__Buenos_Aires
        );
        assert_eq!(resolve_timezone(Some("Mars/Olympus"), "Europe/Madrid"), Tz::Europe__Madrid);
        assert_eq!(resolve_timezone(None, "nowhere"), Tz::UTC);
    }

    #[test]
    fn slot_uses_local_wall_clock() {
        // 02:30 UTC is 23:30 the previous day in Buenos Aires (UTC-3).
        let slot = LocalSlot::at(utc("2025-03-10T02:30:00Z"), Tz::America__Argentina__Buenos_Aires);
        assert_eq!(slot.date_key(), "2025-03-09");
        assert_eq!(slot.hour, 23);
        assert_eq!(slot.minute, 30);
    }

    #[test]
    fn days_between_counts_local_midnights() {
        let tz = Tz::America__Argentina__Buenos_Aires;
        let created = utc("2025-03-10T02:30:00Z"); // 9th locally
        assert_eq!(local_days_between(created, utc("2025-03-10T03:00:00Z"), tz), 1);
        assert_eq!(local_days_between(created, utc("2025-03-09T12:00:00Z"), tz), 0);
        // Clock skew before creation clamps to zero.
        assert_eq!(local_days_between(created, utc("2025-03-01T00:00:00Z"), tz), 0);
    }
}
