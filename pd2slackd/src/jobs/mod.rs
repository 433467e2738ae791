//! Sync jobs: one PagerDuty source mirrored into one Slack user group.
//!
//! A job runs resolve -> match -> reconcile strictly in that order and keeps
//! the outcome of its last run for the status message. Nothing survives
//! beyond the next run.

mod schedule_sync;
mod team_sync;

pub use schedule_sync::ScheduleSyncJob;
pub use team_sync::TeamSyncJob;

use crate::clients::{ChatDirectory, IncidentRoster};
use crate::directory::DirectoryCache;
use crate::matcher::IdentityMatcher;
use crate::reconcile::GroupReconciler;
use crate::roster::{RosterResolver, without_phone};
use chrono::{DateTime, Utc};
use pd2slack_common::config::{normalize_cron, parse_cron, parse_handover_window};
use pd2slack_common::{
    ChatIdentity, ConfigError, RosterEntry, SourceObject, SyncError, SyncJobConfig, SyncOptions,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// The two kinds of sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    ScheduleSync,
    TeamSync,
}

impl JobKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::ScheduleSync => "PD Schedule",
            Self::TeamSync => "PD Team",
        }
    }

    /// Slack emoji shown in status messages.
    pub fn icon(self) -> &'static str {
        match self {
            Self::ScheduleSync => ":calendar:",
            Self::TeamSync => ":threepeople:",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A runnable sync plus the read-only view used for status reporting.
pub trait SyncJob: Send {
    /// Run one sync. Aborting errors are recorded and returned.
    fn run(&mut self) -> Result<(), SyncError>;

    fn name(&self) -> String;

    fn kind(&self) -> JobKind;

    fn slack_handle(&self) -> &str;

    /// Normalized 6/7-field cron expression.
    fn cron_expression(&self) -> &str;

    /// Teams or schedules resolved during the last run.
    fn source_objects(&self) -> &[SourceObject];

    /// Job-specific status text (Slack mrkdwn).
    fn info_body(&self) -> String;

    fn dryrun(&self) -> bool;

    fn next_run(&self) -> Option<DateTime<Utc>>;

    /// Last recorded error, including non-fatal ones.
    fn error(&self) -> Option<&SyncError>;
}

/// What the last run produced.
#[derive(Debug, Clone, Default)]
pub struct JobOutcome {
    pub roster: Vec<RosterEntry>,
    pub matched: Vec<ChatIdentity>,
    pub sources: Vec<SourceObject>,
    pub error: Option<SyncError>,
    /// Group size after reconciliation, when it got that far.
    pub member_count: Option<usize>,
}

/// Collaborators shared by every job.
#[derive(Clone)]
pub struct SyncContext {
    pub roster: Arc<RosterResolver>,
    pub matcher: Arc<IdentityMatcher>,
    pub reconciler: Arc<GroupReconciler>,
}

impl SyncContext {
    pub fn new(
        incidents: Arc<dyn IncidentRoster>,
        chat: Arc<dyn ChatDirectory>,
        directory: Arc<DirectoryCache>,
    ) -> Self {
        Self {
            roster: Arc::new(RosterResolver::new(incidents)),
            matcher: Arc::new(IdentityMatcher::new(Arc::clone(&directory))),
            reconciler: Arc::new(GroupReconciler::new(chat, directory)),
        }
    }
}

/// Per-job settings derived from its configuration.
#[derive(Debug, Clone)]
pub(crate) struct JobSettings {
    pub handle: String,
    pub object_ids: Vec<String>,
    pub options: SyncOptions,
    pub dryrun: bool,
    pub cron_expression: String,
    schedule: cron::Schedule,
}

impl JobSettings {
    pub fn from_config(config: &SyncJobConfig, dryrun: bool) -> Result<Self, ConfigError> {
        let schedule = parse_cron(&config.cron).map_err(|e| {
            ConfigError::Invalid(vec![format!(
                "job: invalid cron schedule '{}': {}",
                config.cron, e
            )])
        })?;
        Ok(Self {
            handle: config.slack_group_handle.clone(),
            object_ids: config.pagerduty_object_ids.clone(),
            options: config.sync_options.clone(),
            dryrun,
            cron_expression: normalize_cron(&config.cron),
            schedule,
        })
    }

    pub fn ids(&self) -> String {
        self.object_ids.join(",")
    }

    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        self.schedule.upcoming(Utc).next()
    }

    /// Handover offset; unparsable values degrade to zero and are recorded.
    /// The first recorded error of a run is kept.
    pub fn window(&self, value: Option<&str>, outcome: &mut JobOutcome) -> Duration {
        match parse_handover_window(value) {
            Ok(duration) => duration,
            Err(reason) => {
                let err = SyncError::InvalidWindow {
                    handle: self.handle.clone(),
                    value: value.unwrap_or_default().to_string(),
                    reason,
                };
                warn!("job: {}", err);
                outcome.error.get_or_insert(err);
                Duration::ZERO
            }
        }
    }

    /// Log roster entries without a phone contact method, if asked to.
    pub fn warn_without_phone(&self, roster: &[RosterEntry]) {
        if !self.options.inform_user_if_contact_phone_missing {
            return;
        }
        for entry in without_phone(roster) {
            warn!("User without phone: {} {}", entry.name, entry.html_url);
        }
    }
}

/// Slack link to a PagerDuty object.
pub(crate) fn link(url: &str, text: &str) -> String {
    if url.is_empty() {
        text.to_string()
    } else {
        format!("<{}|{}>", url, text)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::testing::{FakeChat, FakeRoster};

    pub fn job_config(handle: &str, ids: &[&str]) -> SyncJobConfig {
        SyncJobConfig {
            cron: "*/15 * * * *".to_string(),
            slack_group_handle: handle.to_string(),
            pagerduty_object_ids: ids.iter().map(|i| i.to_string()).collect(),
            sync_options: SyncOptions::default(),
        }
    }

    pub fn context(roster: FakeRoster, chat: FakeChat) -> (SyncContext, Arc<FakeRoster>, Arc<FakeChat>) {
        let roster = Arc::new(roster);
        let chat = Arc::new(chat);
        let directory = Arc::new(DirectoryCache::new());
        directory
            .refresh(chat.as_ref(), "")
            .expect("fake directory refresh");
        let ctx = SyncContext::new(roster.clone(), chat.clone(), directory);
        (ctx, roster, chat)
    }
}
