//! Resolve who is on call (or who is in a team) from PagerDuty.

use crate::clients::IncidentRoster;
use chrono::{DateTime, Utc};
use pd2slack_common::{RosterEntry, SourceObject, SyncError, SyncStyle, TimeWindow, UserReference};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A resolved roster and the PagerDuty objects it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedRoster {
    pub entries: Vec<RosterEntry>,
    pub sources: Vec<SourceObject>,
}

pub struct RosterResolver {
    client: Arc<dyn IncidentRoster>,
}

impl RosterResolver {
    pub fn new(client: Arc<dyn IncidentRoster>) -> Self {
        Self { client }
    }

    /// Every member of the given teams.
    ///
    /// All-or-nothing: if any team ID cannot be resolved, no roster and no
    /// sources are returned.
    pub fn resolve_team_members(&self, team_ids: &[String]) -> Result<ResolvedRoster, SyncError> {
        let target = team_ids.join(",");
        let members = self
            .client
            .list_team_members(team_ids)
            .map_err(|e| SyncError::external("list team members", target.as_str(), e))?;

        let mut seen = HashSet::new();
        let entries: Vec<RosterEntry> = members
            .into_iter()
            .filter(|m| seen.insert(m.id.clone()))
            .collect();

        let sources = team_ids
            .iter()
            .map(|id| {
                self.client
                    .get_team(id)
                    .map_err(|e| SyncError::external("get team", id.as_str(), e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Resolved {} members for teams '{}'", entries.len(), target);
        Ok(ResolvedRoster { entries, sources })
    }

    /// Who is on call in `[now - since, now + until]`.
    pub fn resolve_on_call(
        &self,
        schedule_ids: &[String],
        since: Duration,
        until: Duration,
        style: SyncStyle,
    ) -> Result<ResolvedRoster, SyncError> {
        self.resolve_on_call_at(Utc::now(), schedule_ids, since, until, style)
    }

    pub fn resolve_on_call_at(
        &self,
        now: DateTime<Utc>,
        schedule_ids: &[String],
        since: Duration,
        until: Duration,
        style: SyncStyle,
    ) -> Result<ResolvedRoster, SyncError> {
        let window = TimeWindow::around(now, since, until);
        debug!(
            "Resolving on-call for '{}' ({}) between {} and {}",
            schedule_ids.join(","),
            style,
            window.since_param(),
            window.until_param()
        );
        match style {
            SyncStyle::FinalLayer => self.final_layer(schedule_ids, &window),
            SyncStyle::OverridesOnlyIfThere | SyncStyle::AllActiveLayers => {
                self.layers(schedule_ids, &window, style)
            }
        }
    }

    fn final_layer(
        &self,
        schedule_ids: &[String],
        window: &TimeWindow,
    ) -> Result<ResolvedRoster, SyncError> {
        let target = schedule_ids.join(",");
        let on_call = self
            .client
            .list_on_call_now(schedule_ids, window)
            .map_err(|e| SyncError::external("list on-calls", target.as_str(), e))?;

        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for user in &on_call {
            self.push_unique(user, &mut seen, &mut entries);
        }

        let mut sources = Vec::with_capacity(schedule_ids.len());
        for id in schedule_ids {
            let detail = self
                .client
                .get_schedule(id, window)
                .map_err(|e| SyncError::external("get schedule", id.as_str(), e))?;
            sources.push(detail.object);
        }

        Ok(ResolvedRoster { entries, sources })
    }

    fn layers(
        &self,
        schedule_ids: &[String],
        window: &TimeWindow,
        style: SyncStyle,
    ) -> Result<ResolvedRoster, SyncError> {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        let mut sources = Vec::with_capacity(schedule_ids.len());

        for id in schedule_ids {
            let detail = self
                .client
                .get_schedule(id, window)
                .map_err(|e| SyncError::external("get schedule", id.as_str(), e))?;
            let overrides = self
                .client
                .list_overrides(id, window)
                .map_err(|e| SyncError::external("list overrides", id.as_str(), e))?;

            for user in &overrides {
                self.push_unique(user, &mut seen, &mut entries);
            }

            if overrides.is_empty() || style == SyncStyle::AllActiveLayers {
                for user in detail.layers.iter().flat_map(|layer| &layer.entries) {
                    self.push_unique(user, &mut seen, &mut entries);
                }
            } else {
                debug!(
                    "Schedule {} has {} overrides, skipping its layers",
                    id,
                    overrides.len()
                );
            }

            sources.push(detail.object);
        }

        Ok(ResolvedRoster { entries, sources })
    }

    /// Add the enriched user unless its ID was already seen.
    fn push_unique(
        &self,
        user: &UserReference,
        seen: &mut HashSet<String>,
        entries: &mut Vec<RosterEntry>,
    ) {
        if seen.insert(user.id.clone()) {
            entries.push(self.enrich(user));
        }
    }

    fn enrich(&self, user: &UserReference) -> RosterEntry {
        match self.client.get_user(&user.id, true) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(
                    "Lookup of user {} ({}) failed, using summary: {}",
                    user.id, user.summary, e
                );
                RosterEntry::from_reference(user)
            }
        }
    }
}

/// Entries without any phone contact method.
pub fn without_phone(entries: &[RosterEntry]) -> Vec<RosterEntry> {
    entries.iter().filter(|e| !e.has_phone).cloned().collect()
}
