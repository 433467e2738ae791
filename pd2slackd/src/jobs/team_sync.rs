use super::{JobKind, JobOutcome, JobSettings, SyncContext, SyncJob};
use chrono::{DateTime, Utc};
use pd2slack_common::{ConfigError, SourceObject, SyncError, SyncJobConfig};
use tracing::info;

/// Mirror the members of one or more teams into a Slack group.
pub struct TeamSyncJob {
    settings: JobSettings,
    ctx: SyncContext,
    outcome: JobOutcome,
}

impl TeamSyncJob {
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
        let resolve_failed = || {
            format!(
                "job: sync of pd members for teams '{}' failed",
                self.settings.ids()
            )
        };

        let resolved = self
            .ctx
            .roster
            .resolve_team_members(&self.settings.object_ids)
            .map_err(|e| e.context(resolve_failed()))?;
        self.settings.warn_without_phone(&resolved.entries);

        let matched = self
            .ctx
            .matcher
            .match_to_chat(&resolved.entries)
            .map_err(|e| e.context(resolve_failed()))?;

        self.outcome.roster = resolved.entries;
        self.outcome.sources = resolved.sources;
        self.outcome.matched = matched;

        let handle = &self.settings.handle;
        let update_failed = |e: SyncError| e.context(format!("job: updating slack group '{}' failed", handle));

        if self.outcome.matched.is_empty() && self.settings.options.disable_group_if_none_on_shift {
            if self.settings.dryrun {
                info!("job: nobody matched, dry run: not disabling group '{}'", handle);
            } else {
                let remaining = self.ctx.reconciler.disable(handle).map_err(update_failed)?;
                self.outcome.member_count = Some(remaining);
            }
            return Ok(());
        }

        let reconciled = self
            .ctx
            .reconciler
            .reconcile(handle, &self.outcome.matched, self.settings.dryrun)
            .map_err(update_failed)?;
        if !reconciled.removed.is_empty() {
            info!("job: {} member(s) left group '{}'", reconciled.removed.len(), handle);
        }
        self.outcome.member_count = Some(reconciled.member_count);
        Ok(())
    }
}

impl SyncJob for TeamSyncJob {
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
            "job: sync pagerduty team(s) '{}' to slack group: '{}'",
            self.settings.ids(),
            self.settings.handle
        )
    }

    fn kind(&self) -> JobKind {
        JobKind::TeamSync
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
        format!(
            "*Member Count:*\n `{}` are in this Slack group",
            self.outcome.member_count.unwrap_or(0)
        )
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
