//! Map PagerDuty users to Slack users by email.

use crate::directory::{DirectoryCache, eq_ignore_case};
use pd2slack_common::{ChatIdentity, RosterEntry, SyncError};
use std::sync::Arc;
use tracing::{debug, info};

pub struct IdentityMatcher {
    directory: Arc<DirectoryCache>,
}

impl IdentityMatcher {
    pub fn new(directory: Arc<DirectoryCache>) -> Self {
        Self { directory }
    }

    /// Every active Slack user whose email matches a roster entry.
    ///
    /// An entry may match several Slack users, all of them are kept.
    /// Entries without an email are skipped.
    pub fn match_to_chat(&self, roster: &[RosterEntry]) -> Result<Vec<ChatIdentity>, SyncError> {
        if roster.is_empty() {
            return Err(SyncError::EmptyRoster);
        }

        let snapshot = self.directory.snapshot();
        let mut matched = Vec::new();
        for entry in roster {
            if entry.email.is_empty() {
                info!("PagerDuty user {} ({}) has no email, skipping", entry.name, entry.id);
                continue;
            }
            let before = matched.len();
            matched.extend(
                snapshot
                    .users
                    .iter()
                    .filter(|u| !u.deleted && eq_ignore_case(&u.email, &entry.email))
                    .cloned(),
            );
            if matched.len() == before {
                debug!("No Slack user for {} <{}>", entry.name, entry.email);
            }
        }
        Ok(matched)
    }
}
