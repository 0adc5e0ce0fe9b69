use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};

use crate::api::monday::MondayClient;
use crate::automations::{build_automations, RunMode, Runner};
use crate::backfill::{run_backfill, BackfillOptions};
use crate::config::{self, AppConfig};
use crate::reports::{build_report, ReportClient};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Serve { port: Option<u16> },
    Backfill {
        automation: String,
        execute: bool,
        cursor: Option<String>,
    },
    Report,
    Help,
}

/// Parse everything after the binary name.
///
/// Supported forms:
///   board-sync
///   board-sync serve [--port 8080]
///   board-sync backfill load-in [--execute] [--cursor page-3]
///   board-sync report
pub fn parse_args(args: &[String]) -> Result<Command> {
    let Some((command, rest)) = args.split_first() else {
        return Ok(Command::Serve { port: None });
    };

    match command.as_str() {
        "serve" => parse_serve(rest),
        "backfill" => parse_backfill(rest),
        "report" => {
            if let Some(extra) = rest.first() {
                bail!("Unexpected argument for report: {extra}");
            }
            Ok(Command::Report)
        }
        "help" | "-h" | "--help" => Ok(Command::Help),
        other => bail!("Unknown command: {other}\n\nRun `board-sync help` for usage."),
    }
}

fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    args.get(i)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing value for {flag} flag"))
}

fn parse_serve(args: &[String]) -> Result<Command> {
    let mut port = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-p" | "--port" => {
                i += 1;
                let raw = flag_value(args, i, "--port")?;
                port = Some(
                    raw.parse()
                        .with_context(|| format!("Invalid port: {raw}"))?,
                );
            }
            other => bail!("Unexpected argument for serve: {other}"),
        }
        i += 1;
    }
    Ok(Command::Serve { port })
}

fn parse_backfill(args: &[String]) -> Result<Command> {
    let mut automation = None;
    let mut execute = false;
    let mut cursor = None;
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--execute" => execute = true,
            "--cursor" => {
                i += 1;
                cursor = Some(flag_value(args, i, "--cursor")?.to_string());
            }
            flag if flag.starts_with('-') => bail!("Unknown flag for backfill: {flag}"),
            name => {
                if automation.is_some() {
                    bail!("backfill takes a single automation name");
                }
                automation = Some(name.to_string());
            }
        }
        i += 1;
    }

    let Some(automation) = automation else {
        bail!("Usage: board-sync backfill <automation> [--execute] [--cursor <cursor>]");
    };
    Ok(Command::Backfill {
        automation,
        execute,
        cursor,
    })
}

/// One budgeted pass from the command line; prints the JSON report.
pub async fn handle_backfill(
    config: &AppConfig,
    name: &str,
    execute: bool,
    cursor: Option<&str>,
) -> Result<()> {
    let automations = build_automations(config);
    let automation = automations
        .iter()
        .find(|a| a.name() == name)
        .with_context(|| format!("No automation named {name:?} in {}", config::config_path().display()))?;

    let client = MondayClient::new(
        config.monday.token()?.to_string(),
        config.monday.api_url.clone(),
        config.monday.api_version.clone(),
        config.monday.timeout(),
        config.retry.policy(),
    )
    .context("Failed to create board API client")?;
    let activity = config
        .activity
        .enabled
        .then(|| crate::activity::ActivityLog::new(config.activity.log_path()));
    let runner = Runner::new(Arc::new(client), activity);

    let mode = if execute {
        RunMode::Execute
    } else {
        RunMode::DryRun
    };
    let options = BackfillOptions::from_config(&config.backfill, mode);
    let report = run_backfill(&runner, automation.as_ref(), cursor, options).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn handle_report(config: &AppConfig) -> Result<()> {
    let client = ReportClient::new(&config.reports, config.monday.timeout(), config.retry.policy())
        .context("Failed to create report client")?;
    let report = build_report(&client, &config.reports).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub fn print_help() {
    println!("board-sync - keeps derived board columns in step via webhooks\n");
    println!("USAGE:");
    println!("  board-sync                         Start the webhook server");
    println!("  board-sync serve [--port <port>]   Start the webhook server");
    println!("  board-sync backfill <automation>   Run one budgeted pass over a board (dry run)");
    println!("  board-sync report                  Print the dependency health report");
    println!();
    println!("BACKFILL OPTIONS:");
    println!("  --execute          Write changes instead of listing them");
    println!("  --cursor <cursor>  Resume from a cursor returned by an earlier pass");
    println!();
    println!("CONFIG:");
    println!("  {} (override with BOARD_SYNC_CONFIG)", config::config_path().display());
    println!("  MONDAY_API_TOKEN overrides [monday].api_token");
}
