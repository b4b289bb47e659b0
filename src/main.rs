//! outlook-agent - Entry point for running one agent invocation
//!
//! Scheduling stays with the host (cron, systemd timers, a workflow engine):
//! each run performs exactly one `check` or one `send` batch.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use outlook_agent::services::OutboundFields;
use outlook_agent::{AgentSettings, OutlookAgent};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to settings.json; defaults to the platform config directory.
    #[arg(short, long, env = "OUTLOOK_AGENT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one scheduled check and print emitted messages as JSON lines.
    Check,
    /// Read one JSON object of message fields per stdin line and send each.
    Send,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging; stdout carries JSON output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("Agent error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let path = match cli.config {
        Some(path) => path,
        None => AgentSettings::default_path()?,
    };
    let settings = AgentSettings::load(&path)
        .with_context(|| format!("loading settings from {}", path.display()))?;
    let agent = OutlookAgent::configure(settings)?;

    match cli.command {
        Command::Check => check(agent).await,
        Command::Send => send(agent).await,
    }
}

async fn check(mut agent: OutlookAgent) -> Result<ExitCode> {
    let mut events = agent
        .take_events()
        .context("event stream already taken")?;
    let printer = tokio::spawn(async move {
        while let Some(message) = events.recv().await {
            match serde_json::to_string(&message) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::error!(error = %e, "Failed to encode message"),
            }
        }
    });

    let result = agent.check().await;
    drop(agent);
    printer.await.context("output task")?;

    let Some(report) = result? else {
        return Ok(ExitCode::SUCCESS);
    };
    for failure in &report.mark_read_failures {
        tracing::warn!(message_id = %failure.id, error = %failure.error, "Not marked as read");
    }
    Ok(if report.undelivered.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn send(agent: OutlookAgent) -> Result<ExitCode> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut batch = Vec::new();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: OutboundFields =
            serde_json::from_str(line).with_context(|| format!("parsing event: {}", line))?;
        batch.push(fields);
    }

    let outcomes = agent.receive(batch).await;
    let failed = outcomes.iter().filter(|o| o.is_err()).count();
    tracing::info!(sent = outcomes.len() - failed, failed, "Send batch complete");

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
