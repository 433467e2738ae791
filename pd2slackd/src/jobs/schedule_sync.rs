use super::{JobKind, JobOutcome, JobSettings, SyncContext, SyncJob, link};
use chrono::{DateTime, Utc};
use pd2slack_common::{ConfigError, SourceObject, SyncError, SyncJobConfig};
use tracing::{debug, info};

/// Mirror who is on call for one or more schedules into a Slack group.
pub struct ScheduleSyncJob {
    settings: JobSettings,
    ctx: SyncContext,
    outcome: JobOutcome,
}

impl ScheduleSyncJob {
    pub fn new(config: &SyncJobConfig, dryrun: bool, ctx: SyncContext) -> Result<Self, ConfigError> {
        Ok(Self {
            settings: JobSettings::from_config(config, dryrun)?,
            ctx,
            outcome: JobOutcome::default(),
        })
    }

    #[cfg(test)]
    pub fn outcome(&self) -> &JobOutcome {
        &self.outcome
    }

    fn sync(&mut self) -> Result<(), SyncError> {
        let options = &self.settings.options;
        let until = self
            .settings
            .window(options.handover_time_frame_forward.as_deref(), &mut self.outcome);
        let since = self
            .settings
            .window(options.handover_time_frame_backward.as_deref(), &mut self.outcome);

        let resolved = self.ctx.roster.resolve_on_call(
            &self.settings.object_ids,
            since,
            until,
            self.settings.options.sync_style,
        )?;
        self.outcome.roster = resolved.entries;
        self.outcome.sources = resolved.sources;
        self.settings.warn_without_phone(&self.outcome.roster);

        self.outcome.matched = self.ctx.matcher.match_to_chat(&self.outcome.roster)?;

        let reconciled = self
            .ctx
            .reconciler
            .reconcile(&self.settings.handle, &self.outcome.matched, self.settings.dryrun)
            .map_err(|e| e.context("adding on-duty members to slack group failed"))?;
        if reconciled.no_change {
            debug!("job: group '{}' already up to date", self.settings.handle);
        }
        self.outcome.member_count = Some(reconciled.member_count);
        Ok(())
    }
}

impl SyncJob for ScheduleSyncJob {
    fn run(&mut self) -> Result<(), SyncError> {
        info!("{}", self.name());
        self.outcome = JobOutcome::default();
        let result = self.sync();
        if let Err(e) = &result {
            self.outcome.error = Some(e.clone());
        }
        result
    }

    fn name(&self) -> String {
        format!(
            "job: sync pagerduty schedule(s) '{}' to slack group: '{}'",
            self.settings.ids(),
            self.settings.handle
        )
    }

    fn kind(&self) -> JobKind {
        JobKind::ScheduleSync
    }

    fn slack_handle(&self) -> &str {
        &self.settings.handle
    }

    fn cron_expression(&self) -> &str {
        &self.settings.cron_expression
    }

    fn source_objects(&self) -> &[SourceObject] {
        &self.outcome.sources
    }

    fn info_body(&self) -> String {
        let people: Vec<String> = self
            .outcome
            .roster
            .iter()
            .map(|e| link(&e.html_url, &e.name))
            .collect();
        format!("*Who is on shift:*\n - {}", people.join(",\n - "))
    }

    fn dryrun(&self) -> bool {
        self.settings.dryrun
    }

    fn next_run(&self) -> Option<DateTime<Utc>> {
        self.settings.next_run()
    }

    fn error(&self) -> Option<&SyncError> {
        self.outcome.error.as_ref()
    }
}
