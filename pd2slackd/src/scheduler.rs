//! Cron-driven execution of sync jobs.
//!
//! Every job runs on the blocking pool. A job never overlaps with itself:
//! a trigger that fires while the previous run is still going is skipped.
//! Different jobs run independently of each other.

use crate::clients::ChatDirectory;
use crate::directory::DirectoryCache;
use crate::jobs::SyncJob;
use crate::report;
use std::sync::{Arc, Mutex, TryLockError};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{debug, error, info, warn};

/// How a triggered run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed,
    /// The previous run of the same job had not finished yet.
    Skipped,
}

/// One job plus what it needs to report its status.
#[derive(Clone)]
pub struct JobRunner {
    job: Arc<Mutex<Box<dyn SyncJob>>>,
    chat: Arc<dyn ChatDirectory>,
    directory: Arc<DirectoryCache>,
    name: String,
    cron_expression: String,
}

impl JobRunner {
    pub fn new(
        job: Box<dyn SyncJob>,
        chat: Arc<dyn ChatDirectory>,
        directory: Arc<DirectoryCache>,
    ) -> Self {
        Self {
            name: job.name(),
            cron_expression: job.cron_expression().to_string(),
            job: Arc::new(Mutex::new(job)),
            chat,
            directory,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cron_expression(&self) -> &str {
        &self.cron_expression
    }

    /// Run the job once and post its status. Errors are logged, never returned.
    pub fn run_and_report(&self) -> RunStatus {
        let mut job = match self.job.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                warn!("{}: previous run still in progress, skipping", self.name);
                return RunStatus::Skipped;
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let status = match job.run() {
            Ok(()) => {
                if let Some(err) = job.error() {
                    warn!("{}: finished with warning: {}", self.name, err);
                } else {
                    info!("{}: finished", self.name);
                }
                RunStatus::Succeeded
            }
            Err(e) => {
                error!("{}: {}", self.name, e);
                RunStatus::Failed
            }
        };

        if let Some(next) = job.next_run() {
            debug!("{}: next run at {}", self.name, next);
        }
        if let Err(e) = report::post_status(self.chat.as_ref(), &self.directory, &**job) {
            warn!("{}: posting status message failed: {}", self.name, e);
        }
        status
    }

    /// [`JobRunner::run_and_report`] on the blocking pool.
    pub async fn run_blocking(self) -> RunStatus {
        let name = self.name.clone();
        match tokio::task::spawn_blocking(move || self.run_and_report()).await {
            Ok(status) => status,
            Err(e) => {
                error!("{}: run aborted: {}", name, e);
                RunStatus::Failed
            }
        }
    }
}

/// Cron scheduler for all configured jobs (UTC).
pub struct Scheduler {
    inner: JobScheduler,
    runners: Vec<JobRunner>,
}

impl Scheduler {
    pub async fn new() -> Result<Self, JobSchedulerError> {
        Ok(Self {
            inner: JobScheduler::new().await?,
            runners: Vec::new(),
        })
    }

    pub async fn add(&mut self, runner: JobRunner) -> Result<(), JobSchedulerError> {
        let trigger = runner.clone();
        let job = Job::new_async(runner.cron_expression(), move |_uuid, _lock| {
            let runner = trigger.clone();
            Box::pin(async move {
                runner.run_blocking().await;
            })
        })?;
        self.inner.add(job).await?;
        info!("Scheduled {} ({})", runner.name(), runner.cron_expression());
        self.runners.push(runner);
        Ok(())
    }

    pub fn runners(&self) -> &[JobRunner] {
        &self.runners
    }

    /// Run every job once, concurrently, and wait for all of them.
    pub async fn run_all_now(&self) -> Vec<RunStatus> {
        let handles: Vec<_> = self
            .runners
            .iter()
            .cloned()
            .map(|runner| tokio::spawn(runner.run_blocking()))
            .collect();

        let mut statuses = Vec::with_capacity(handles.len());
        for handle in handles {
            statuses.push(handle.await.unwrap_or(RunStatus::Failed));
        }
        statuses
    }

    pub async fn start(&self) -> Result<(), JobSchedulerError> {
        self.inner.start().await
    }

    pub async fn shutdown(&mut self) -> Result<(), JobSchedulerError> {
        info!("Stopping scheduler");
        self.inner.shutdown().await
    }
}
