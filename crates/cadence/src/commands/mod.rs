//! Command handlers, one module per top-level subcommand.

pub mod completion;
pub mod config_cmd;
pub mod engagement;
pub mod init;
pub mod push;
pub mod task;

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

/// Parses an RFC 3339 timestamp given on the command line.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("invalid timestamp '{value}' (expected RFC 3339)"))
}

/// Reads a JSON document from `path`, or from stdin when `path` is `-`.
pub fn read_json_payload<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read payload from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?
    };
    serde_json::from_str(&content).context("invalid JSON payload")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_offset_timestamps_to_utc() {
        let t = parse_timestamp("2025-03-10T09:00:00-03:00").unwrap();
        assert_eq!(t.to_rfc3339(), "2025-03-10T12:00:00+00:00");
        assert!(parse_timestamp("yesterday").is_err());
    }
}
