//! Capabilities consumed from PagerDuty and Slack.
//!
//! Both traits are blocking: every call is a synchronous network round trip
//! bounded only by the transport timeout. The daemon runs them on the tokio
//! blocking pool.

pub mod pagerduty;
pub mod slack;

pub use pagerduty::PagerDutyClient;
pub use slack::SlackClient;

use pd2slack_common::{
    ChatChannel, ChatGroup, ChatIdentity, ChatMessage, ClientError, RosterEntry, ScheduleDetail,
    SourceObject, TimeWindow, UserReference,
};

/// Read access to on-call data.
pub trait IncidentRoster: Send + Sync {
    /// Users belonging to any of the given teams, contact methods included.
    fn list_team_members(&self, team_ids: &[String]) -> Result<Vec<RosterEntry>, ClientError>;

    fn get_team(&self, team_id: &str) -> Result<SourceObject, ClientError>;

    /// Final-layer on-call entries for the schedules within the window.
    fn list_on_call_now(
        &self,
        schedule_ids: &[String],
        window: &TimeWindow,
    ) -> Result<Vec<UserReference>, ClientError>;

    /// Schedule metadata with the layers rendered for the window.
    fn get_schedule(
        &self,
        schedule_id: &str,
        window: &TimeWindow,
    ) -> Result<ScheduleDetail, ClientError>;

    /// Users assigned by overrides within the window.
    fn list_overrides(
        &self,
        schedule_id: &str,
        window: &TimeWindow,
    ) -> Result<Vec<UserReference>, ClientError>;

    fn get_user(
        &self,
        user_id: &str,
        include_contact_methods: bool,
    ) -> Result<RosterEntry, ClientError>;
}

/// Read/write access to the chat platform directory.
pub trait ChatDirectory: Send + Sync {
    fn list_all_users(&self) -> Result<Vec<ChatIdentity>, ClientError>;

    fn list_all_user_groups(&self, include_members: bool) -> Result<Vec<ChatGroup>, ClientError>;

    fn get_channel_info(&self, channel_id: &str) -> Result<ChatChannel, ClientError>;

    /// Replace the complete member list of a group.
    fn replace_group_members(
        &self,
        group_id: &str,
        member_ids: &[String],
    ) -> Result<ChatGroup, ClientError>;

    fn enable_group(&self, group_id: &str) -> Result<ChatGroup, ClientError>;

    fn disable_group(&self, group_id: &str) -> Result<ChatGroup, ClientError>;

    fn post_message(&self, channel_id: &str, message: &ChatMessage) -> Result<(), ClientError>;
}
