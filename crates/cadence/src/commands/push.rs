//! `cadence push` -- registrations and the daily scheduler.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use cadence_push::{
    PushRegistration, PushScheduler, PushSubscription, RegistrationMetadata, WebhookDelivery,
};

use crate::cli::{PushArgs, PushCommands, PushRegisterArgs, PushTickArgs};
use crate::commands::parse_timestamp;
use crate::context::{RuntimeContext, Workspace};
use crate::output::{output_json, output_table, render_muted};

/// Execute a `cadence push` subcommand.
pub fn run(ctx: &RuntimeContext, args: &PushArgs) -> Result<()> {
    let ws = ctx.workspace()?;
    match &args.command {
        PushCommands::Register(a) => register(ctx, &ws, a),
        PushCommands::List => list(ctx, &ws),
        PushCommands::Remove(a) => {
            if !ws.push_registry()?.remove(&a.id)? {
                bail!("registration {} not found", a.id);
            }
            if ctx.json {
                output_json(&serde_json::json!({ "removed": a.id }));
            } else if !ctx.quiet {
                println!("Removed {}", a.id);
            }
            Ok(())
        }
        PushCommands::Tick(a) => tick(ctx, &ws, a),
        PushCommands::Run => run_loop(ctx, &ws),
    }
}

/// Parses `NAME=VALUE`.
fn parse_key(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => bail!("invalid key '{raw}' (expected NAME=VALUE)"),
    }
}

fn register(ctx: &RuntimeContext, ws: &Workspace, args: &PushRegisterArgs) -> Result<()> {
    let mut subscription = PushSubscription::new(args.endpoint.clone());
    for raw in &args.keys {
        let (name, value) = parse_key(raw)?;
        subscription.keys.insert(name, value);
    }
    let metadata = RegistrationMetadata {
        user_id: args.user.clone(),
        timezone: args.timezone.clone(),
        ..RegistrationMetadata::default()
    };

    let registration = ws
        .push_registry()?
        .register(subscription, metadata, Utc::now())?;
    if ctx.json {
        output_json(&registration);
    } else if !ctx.quiet {
        println!(
            "Registered {} -> {}",
            registration.id, registration.subscription.endpoint
        );
    }
    Ok(())
}

fn list(ctx: &RuntimeContext, ws: &Workspace) -> Result<()> {
    let registrations = ws.push_registry()?.list()?;
    if ctx.json {
        output_json(&registrations);
        return Ok(());
    }
    if registrations.is_empty() {
        if !ctx.quiet {
            println!("No push registrations.");
        }
        return Ok(());
    }
    let rows: Vec<Vec<String>> = registrations.iter().map(row).collect();
    output_table(
        &["ID", "ENDPOINT", "USER", "TIMEZONE", "LAST SENT", "STRATEGY"],
        &rows,
    );
    Ok(())
}

fn row(reg: &PushRegistration) -> Vec<String> {
    let dash = || render_muted("-");
    vec![
        reg.id.clone(),
        reg.subscription.endpoint.clone(),
        reg.metadata.user_id.clone().unwrap_or_else(dash),
        reg.metadata.timezone.clone().unwrap_or_else(dash),
        reg.last_daily_sent_key.clone().unwrap_or_else(dash),
        match (reg.adaptive_strategy, reg.last_adaptive_hour) {
            (Some(strategy), Some(hour)) => format!("{strategy} @ {hour:02}:00"),
            _ => dash(),
        },
    ]
}

type CliScheduler = PushScheduler<
    crate::context::DynStore<PushRegistration>,
    crate::context::DynStore<cadence_push::EngagementProfile>,
    WebhookDelivery,
>;

fn scheduler(ws: &Workspace) -> Result<CliScheduler> {
    let delivery = WebhookDelivery::new(Duration::from_secs(ws.config.push.webhook_timeout_secs));
    Ok(PushScheduler::new(
        ws.push_registry()?,
        ws.engagement_tracker()?,
        delivery,
        ws.config.push.clone(),
    ))
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

fn tick(ctx: &RuntimeContext, ws: &Workspace, args: &PushTickArgs) -> Result<()> {
    let now = match args.at {
        Some(ref at) => parse_timestamp(at)?,
        None => Utc::now(),
    };
    let scheduler = scheduler(ws)?;
    let summary = runtime()?.block_on(scheduler.tick(now));

    if ctx.json {
        output_json(&summary);
    } else if !ctx.quiet {
        println!(
            "Evaluated {}: {} delivered, {} skipped, {} pending retry, {} removed",
            summary.evaluated,
            summary.delivered,
            summary.skipped,
            summary.retry_pending,
            summary.removed
        );
    }
    Ok(())
}

fn run_loop(ctx: &RuntimeContext, ws: &Workspace) -> Result<()> {
    let scheduler = Arc::new(scheduler(ws)?);
    let interval = ws.config.push.tick_interval_secs;
    if !ctx.quiet && !ctx.json {
        println!("Push scheduler running every {interval}s. Press Ctrl-C to stop.");
    }

    runtime()?.block_on(async move {
        let cancel = CancellationToken::new();
        let handle = scheduler.run(cancel.clone());
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
        info!("interrupt received, stopping scheduler");
        cancel.cancel();
        handle.await.context("scheduler task failed")?;
        Ok::<(), anyhow::Error>(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_parse_name_value() {
        assert_eq!(
            parse_key("auth=abc=def").unwrap(),
            ("auth".to_string(), "abc=def".to_string())
        );
        assert!(parse_key("novalue").is_err());
        assert!(parse_key("=x").is_err());
    }
}
