//! `cadence engagement` -- record and inspect engagement.

use anyhow::Result;
use chrono::Utc;

use crate::cli::{EngagementArgs, EngagementCommands};
use crate::commands::parse_timestamp;
use crate::context::RuntimeContext;
use crate::output::{output_json, output_table};

/// Execute a `cadence engagement` subcommand.
pub fn run(ctx: &RuntimeContext, args: &EngagementArgs) -> Result<()> {
    let ws = ctx.workspace()?;
    let tracker = ws.engagement_tracker()?;

    match &args.command {
        EngagementCommands::Record(a) => {
            let at = match a.at {
                Some(ref at) => parse_timestamp(at)?,
                None => Utc::now(),
            };
            let timezone = a
                .timezone
                .clone()
                .unwrap_or_else(|| ws.config.push.default_timezone.clone());
            let profile = tracker.record_event(&a.user_id, &timezone, at)?;
            if ctx.json {
                output_json(&profile);
            } else if !ctx.quiet {
                println!(
                    "Recorded event for {} ({} total, best hour {})",
                    profile.user_id,
                    profile.total_events,
                    profile
                        .best_hour()
                        .map(|h| format!("{h:02}:00"))
                        .unwrap_or_else(|| "-".into())
                );
            }
        }
        EngagementCommands::Show(a) => {
            let profile = tracker.get_profile(&a.user_id)?;
            if ctx.json {
                output_json(&profile);
                return Ok(());
            }
            let Some(profile) = profile else {
                println!("No engagement recorded for {}", a.user_id);
                return Ok(());
            };
            println!(
                "{}: {} events in {}, best hour {}",
                profile.user_id,
                profile.total_events,
                profile.timezone,
                profile
                    .best_hour()
                    .map(|h| format!("{h:02}:00"))
                    .unwrap_or_else(|| "-".into())
            );
            let rows: Vec<Vec<String>> = profile
                .hourly_scores
                .iter()
                .map(|(hour, score)| vec![format!("{hour:02}:00"), score.to_string()])
                .collect();
            output_table(&["HOUR", "EVENTS"], &rows);
        }
    }
    Ok(())
}
