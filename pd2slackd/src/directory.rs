//! Slack directory snapshot ("masterdata") and its periodic refresh.
//!
//! The snapshot is immutable; a refresh builds a new one and swaps the
//! `Arc` under a single lock so readers never see users from one refresh
//! next to groups from another.

use crate::clients::ChatDirectory;
use chrono::{DateTime, Utc};
use pd2slack_common::{ChatChannel, ChatGroup, ChatIdentity, SyncError};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Users, groups and the info channel as of one refresh.
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    pub users: Vec<ChatIdentity>,
    pub groups: Vec<ChatGroup>,
    pub info_channel: Option<ChatChannel>,
    /// `None` until the first successful refresh.
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl DirectorySnapshot {
    /// Group whose handle matches case-insensitively.
    pub fn find_group(&self, handle: &str) -> Option<&ChatGroup> {
        self.groups.iter().find(|g| eq_ignore_case(&g.handle, handle))
    }
}

/// Unicode-aware case-insensitive equality without allocating.
pub(crate) fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

/// Shared, swappable directory snapshot.
#[derive(Debug, Default)]
pub struct DirectoryCache {
    current: RwLock<Arc<DirectorySnapshot>>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: DirectorySnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The current snapshot; stays valid even if a refresh swaps it out.
    pub fn snapshot(&self) -> Arc<DirectorySnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn publish(&self, snapshot: DirectorySnapshot) -> Arc<DirectorySnapshot> {
        let snapshot = Arc::new(snapshot);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::clone(&snapshot);
        snapshot
    }

    /// Reload users, groups and the info channel, then swap the snapshot.
    ///
    /// On failure the previous snapshot stays in place.
    pub fn refresh(
        &self,
        chat: &dyn ChatDirectory,
        info_channel_id: &str,
    ) -> Result<Arc<DirectorySnapshot>, SyncError> {
        let users = chat
            .list_all_users()
            .map_err(|e| SyncError::external("list slack users", "directory", e))?;
        let groups = chat
            .list_all_user_groups(true)
            .map_err(|e| SyncError::external("list slack user groups", "directory", e))?;
        let info_channel = if info_channel_id.is_empty() {
            None
        } else {
            Some(
                chat.get_channel_info(info_channel_id)
                    .map_err(|e| SyncError::external("get channel info", info_channel_id, e))?,
            )
        };

        debug!(
            "Directory loaded: {} users, {} groups",
            users.len(),
            groups.len()
        );
        Ok(self.publish(DirectorySnapshot {
            users,
            groups,
            info_channel,
            refreshed_at: Some(Utc::now()),
        }))
    }

    /// Publish a snapshot in which the group with the same ID is replaced.
    pub fn replace_group(&self, group: ChatGroup) {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut next = DirectorySnapshot::clone(&guard);
        match next.groups.iter_mut().find(|g| g.id == group.id) {
            Some(existing) => *existing = group,
            None => next.groups.push(group),
        }
        *guard = Arc::new(next);
    }
}

/// Background task reloading the directory on a fixed interval.
pub struct DirectoryRefresher {
    cache: Arc<DirectoryCache>,
    chat: Arc<dyn ChatDirectory>,
    info_channel_id: String,
    interval: Duration,
}

impl DirectoryRefresher {
    pub fn new(
        cache: Arc<DirectoryCache>,
        chat: Arc<dyn ChatDirectory>,
        info_channel_id: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            cache,
            chat,
            info_channel_id: info_channel_id.into(),
            interval,
        }
    }

    /// Start refreshing. The first refresh happens one interval from now;
    /// the initial load is the caller's job.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            info!("Directory refresher started (interval: {:?})", self.interval);

            loop {
                ticker.tick().await;

                let cache = Arc::clone(&self.cache);
                let chat = Arc::clone(&self.chat);
                let channel = self.info_channel_id.clone();
                let result =
                    tokio::task::spawn_blocking(move || cache.refresh(chat.as_ref(), &channel))
                        .await;

                match result {
                    Ok(Ok(snapshot)) => info!(
                        "Directory refreshed ({} users, {} groups)",
                        snapshot.users.len(),
                        snapshot.groups.len()
                    ),
                    Ok(Err(e)) => warn!(
                        "Directory refresh failed, keeping snapshot from {:?}: {}",
                        self.cache.snapshot().refreshed_at,
                        e
                    ),
                    Err(e) => warn!("Directory refresh task aborted: {}", e),
                }
            }
        })
    }
}
