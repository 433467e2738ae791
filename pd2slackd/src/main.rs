//! pd2slack daemon
//!
//! Mirrors PagerDuty on-call schedules and teams into Slack user groups on
//! cron schedules and reports every run to an info channel.

#![forbid(unsafe_code)]

mod clients;
mod directory;
mod jobs;
mod matcher;
mod reconcile;
mod report;
mod roster;
mod scheduler;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result, bail};
use clap::Parser;
use clients::{ChatDirectory, IncidentRoster, PagerDutyClient, SlackClient};
use directory::{DirectoryCache, DirectoryRefresher};
use jobs::{ScheduleSyncJob, SyncContext, SyncJob, TeamSyncJob};
use pd2slack_common::config::{DEFAULT_CONFIG_PATH, into_result, parse_cron};
use pd2slack_common::{Config, EnvParser, Severity, SyncJobConfig, validate_config};
use scheduler::{JobRunner, RunStatus, Scheduler};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "pd2slackd")]
#[command(author, version, about = "pd2slack daemon - sync PagerDuty on-call to Slack user groups")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "PD2SLACK_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Apply changes to Slack (otherwise dry run)
    #[arg(short, long)]
    write: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Log in JSON format
    #[arg(long)]
    json_logs: bool,

    /// Validate the configuration, list the jobs and exit
    #[arg(long)]
    check: bool,

    /// Run every job once and exit
    #[arg(long, conflicts_with = "check")]
    once: bool,
}

fn init_logging(cli: &Cli, configured_level: &str) {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured_level))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;
    let mut env = EnvParser::new();
    env.apply(&mut config);
    if cli.write {
        config.global.write = true;
    }

    init_logging(&cli, &config.global.log_level);
    for err in env.take_errors() {
        warn!("Ignoring environment override: {}", err);
    }

    let findings = validate_config(&config);
    for finding in &findings {
        match finding.severity {
            Severity::Warning => warn!("config: {}", finding),
            Severity::Error => error!("config: {}", finding),
        }
    }

    if cli.check {
        print_jobs(&config);
        into_result(&findings)?;
        println!("Configuration OK");
        return Ok(());
    }
    into_result(&findings)?;

    info!("Starting pd2slack daemon...");
    if !config.global.write {
        warn!("Write mode is off: dry run, no Slack group will be changed");
    }

    let timeout = config.global.http_timeout();
    let chat: Arc<dyn ChatDirectory> = Arc::new(SlackClient::new(&config.slack, timeout));
    let incidents: Arc<dyn IncidentRoster> =
        Arc::new(PagerDutyClient::new(&config.pagerduty, timeout));
    let directory = Arc::new(DirectoryCache::new());

    let snapshot = {
        let directory = Arc::clone(&directory);
        let chat = Arc::clone(&chat);
        let channel = config.slack.info_channel_id.clone();
        tokio::task::spawn_blocking(move || directory.refresh(chat.as_ref(), &channel))
            .await
            .context("Directory refresh task failed")?
            .context("Initial Slack directory load failed")?
    };
    info!(
        "Loaded {} Slack users and {} user groups",
        snapshot.users.len(),
        snapshot.groups.len()
    );

    let ctx = SyncContext::new(incidents, Arc::clone(&chat), Arc::clone(&directory));
    let mut scheduler = Scheduler::new()
        .await
        .context("Failed to create job scheduler")?;
    for job in build_jobs(&config, &ctx)? {
        let runner = JobRunner::new(job, Arc::clone(&chat), Arc::clone(&directory));
        scheduler
            .add(runner)
            .await
            .context("Failed to schedule job")?;
    }

    if cli.once {
        let statuses = scheduler.run_all_now().await;
        let failed = statuses.iter().filter(|s| **s == RunStatus::Failed).count();
        if failed > 0 {
            bail!("{} of {} jobs failed", failed, statuses.len());
        }
        info!("All {} jobs finished", statuses.len());
        return Ok(());
    }

    let refresher = DirectoryRefresher::new(
        Arc::clone(&directory),
        Arc::clone(&chat),
        config.slack.info_channel_id.clone(),
        config.global.masterdata_refresh_interval(),
    )
    .start();

    scheduler
        .start()
        .await
        .context("Failed to start job scheduler")?;
    info!("Scheduler started with {} jobs", scheduler.runners().len());

    if config.global.run_at_start {
        info!("Running all jobs at start");
        scheduler.run_all_now().await;
    }

    shutdown_signal().await;

    refresher.abort();
    scheduler
        .shutdown()
        .await
        .context("Failed to stop job scheduler")?;
    info!("pd2slack daemon stopped");
    Ok(())
}

fn build_jobs(config: &Config, ctx: &SyncContext) -> Result<Vec<Box<dyn SyncJob>>> {
    let dryrun = !config.global.write;
    let mut jobs: Vec<Box<dyn SyncJob>> = Vec::new();
    for job in &config.jobs.schedule_sync {
        jobs.push(Box::new(ScheduleSyncJob::new(job, dryrun, ctx.clone())?));
    }
    for job in &config.jobs.team_sync {
        jobs.push(Box::new(TeamSyncJob::new(job, dryrun, ctx.clone())?));
    }
    Ok(jobs)
}

fn print_jobs(config: &Config) {
    let rows = config
        .jobs
        .schedule_sync
        .iter()
        .map(|j| ("schedule", j))
        .chain(config.jobs.team_sync.iter().map(|j| ("team", j)));

    for (kind, job) in rows {
        println!("{}", describe_job(kind, job));
    }
}

fn describe_job(kind: &str, job: &SyncJobConfig) -> String {
    let next = match parse_cron(&job.cron) {
        Ok(schedule) => schedule
            .upcoming(chrono::Utc)
            .next()
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string()),
        Err(e) => format!("invalid cron: {}", e),
    };
    format!(
        "{:<8} @{:<24} <- {:<30} cron '{}' next run {}",
        kind,
        job.slack_group_handle,
        job.pagerduty_object_ids.join(","),
        job.cron,
        next
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
