//! Bring a Slack user group in line with a set of matched users.

use crate::clients::ChatDirectory;
use crate::directory::DirectoryCache;
use pd2slack_common::{ChatGroup, ChatIdentity, SyncError};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Result of one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Target and current membership were already identical.
    pub no_change: bool,
    /// Members present before the update and absent after it.
    pub removed: Vec<String>,
    /// Group size after the run (unchanged size in dry run).
    pub member_count: usize,
}

pub struct GroupReconciler {
    chat: Arc<dyn ChatDirectory>,
    directory: Arc<DirectoryCache>,
}

impl GroupReconciler {
    pub fn new(chat: Arc<dyn ChatDirectory>, directory: Arc<DirectoryCache>) -> Self {
        Self { chat, directory }
    }

    fn find_group(&self, handle: &str) -> Result<ChatGroup, SyncError> {
        self.directory
            .snapshot()
            .find_group(handle)
            .cloned()
            .ok_or_else(|| SyncError::GroupNotFound {
                handle: handle.to_string(),
            })
    }

    /// Replace the members of the group `handle` with `targets`.
    ///
    /// Never empties a group; use [`GroupReconciler::disable`] for that.
    /// In dry run nothing is written.
    pub fn reconcile(
        &self,
        handle: &str,
        targets: &[ChatIdentity],
        dryrun: bool,
    ) -> Result<ReconcileOutcome, SyncError> {
        let group = self.find_group(handle)?;
        if targets.is_empty() {
            return Err(SyncError::EmptyTarget {
                handle: handle.to_string(),
            });
        }

        let mut seen = HashSet::new();
        let target_ids: Vec<String> = targets
            .iter()
            .filter(|t| seen.insert(t.id.as_str()))
            .map(|t| t.id.clone())
            .collect();

        let current: HashSet<&str> = group.members.iter().map(String::as_str).collect();
        let no_change = seen == current;
        info!(
            "slack: target group {}[{}]: {} current, {} target member(s)",
            group.handle,
            group.id,
            current.len(),
            target_ids.len()
        );

        if no_change || dryrun {
            if dryrun && !no_change {
                info!("slack: dry run, not updating group '{}'", handle);
            }
            return Ok(ReconcileOutcome {
                no_change,
                removed: Vec::new(),
                member_count: group.members.len(),
            });
        }

        let mut updated = self
            .chat
            .replace_group_members(&group.id, &target_ids)
            .map_err(|e| SyncError::external("replace group members", handle, e))?;
        self.directory.replace_group(updated.clone());
        info!("slack: updated group '{}' successfully", handle);

        let after: HashSet<&str> = updated.members.iter().map(String::as_str).collect();
        let removed: Vec<String> = group
            .members
            .iter()
            .filter(|m| !after.contains(m.as_str()))
            .cloned()
            .collect();
        if !removed.is_empty() {
            info!("slack: removed from '{}': {}", handle, removed.join(", "));
        }
        let member_count = updated.members.len();

        if updated.is_disabled() {
            // The membership write above stays in place if this fails.
            let enabled = self
                .chat
                .enable_group(&group.id)
                .map_err(|e| SyncError::external("enable group", handle, e))?;
            updated.date_delete = enabled.date_delete;
            self.directory.replace_group(updated);
            info!("slack: enabled group '{}'", handle);
        }

        Ok(ReconcileOutcome {
            no_change: false,
            removed,
            member_count,
        })
    }

    /// Disable the group `handle`; its members stay as they are.
    ///
    /// Returns the number of members the disabled group still holds.
    pub fn disable(&self, handle: &str) -> Result<usize, SyncError> {
        let mut group = self.find_group(handle)?;
        let disabled = self
            .chat
            .disable_group(&group.id)
            .map_err(|e| SyncError::external("disable group", handle, e))?;
        group.date_delete = disabled.date_delete;
        info!("slack: disabled group {}[{}]", group.handle, group.id);
        let member_count = group.members.len();
        self.directory.replace_group(group);
        Ok(member_count)
    }
}
