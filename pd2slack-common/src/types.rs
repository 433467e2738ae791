//! Common types used across pd2slack components.

use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An on-call identity as resolved from PagerDuty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// PagerDuty user ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Login email; empty when PagerDuty did not deliver one.
    #[serde(default)]
    pub email: String,
    /// Whether at least one phone contact method is configured.
    #[serde(default)]
    pub has_phone: bool,
    /// Whether at least one email contact method is configured.
    #[serde(default)]
    pub has_email: bool,
    /// Deep link to the user in the PagerDuty web UI.
    #[serde(default)]
    pub html_url: String,
}

impl RosterEntry {
    /// Minimal entry built from a summary reference when the full user
    /// record could not be fetched.
    pub fn from_reference(reference: &UserReference) -> Self {
        Self {
            id: reference.id.clone(),
            name: reference.summary.clone(),
            email: String::new(),
            has_phone: false,
            has_email: false,
            html_url: reference.html_url.clone(),
        }
    }
}

/// Summary form of a PagerDuty user (on-call entries, overrides, layers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserReference {
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub html_url: String,
}

/// Team or schedule metadata a roster was derived from (reporting only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceObject {
    pub id: String,
    pub summary: String,
    #[serde(default)]
    pub html_url: String,
}

/// One rendered rotation tier of a schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleLayer {
    pub name: String,
    /// Users rendered into the requested window, in PagerDuty order.
    #[serde(default)]
    pub entries: Vec<UserReference>,
}

/// Schedule metadata plus the layers rendered for a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDetail {
    pub object: SourceObject,
    #[serde(default)]
    pub layers: Vec<ScheduleLayer>,
}

/// Which part of a schedule decides who is on call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncStyle {
    /// The final, already-merged layer as reported by PagerDuty.
    #[default]
    FinalLayer,
    /// Overrides replace the regular layers of a schedule when present.
    OverridesOnlyIfThere,
    /// Overrides and every active layer.
    AllActiveLayers,
}

impl std::fmt::Display for SyncStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FinalLayer => write!(f, "FinalLayer"),
            Self::OverridesOnlyIfThere => write!(f, "OverridesOnlyIfThere"),
            Self::AllActiveLayers => write!(f, "AllActiveLayers"),
        }
    }
}

/// Absolute UTC interval sent to PagerDuty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl TimeWindow {
    /// `[now - since, now + until]`, clamped to the representable range.
    pub fn around(now: DateTime<Utc>, since: Duration, until: Duration) -> Self {
        let since = ChronoDuration::from_std(since)
            .ok()
            .and_then(|back| now.checked_sub_signed(back))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let until = ChronoDuration::from_std(until)
            .ok()
            .and_then(|forward| now.checked_add_signed(forward))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { since, until }
    }

    pub fn since_param(&self) -> String {
        self.since.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    pub fn until_param(&self) -> String {
        self.until.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// A Slack user from the directory snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatIdentity {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub deleted: bool,
}

/// A Slack user group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatGroup {
    pub id: String,
    pub handle: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
    /// Unix timestamp of the soft delete; 0 while the group is enabled.
    #[serde(default)]
    pub date_delete: i64,
}

impl ChatGroup {
    pub fn is_disabled(&self) -> bool {
        self.date_delete != 0
    }
}

/// A Slack channel (used for the info channel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatChannel {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Message payload for `chat.postMessage`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Fallback text for notifications.
    pub text: String,
    /// Block Kit blocks.
    #[serde(default)]
    pub blocks: Vec<serde_json::Value>,
}
