//! In-memory fakes of the PagerDuty and Slack capabilities for unit tests.

use crate::clients::{ChatDirectory, IncidentRoster};
use pd2slack_common::{
    ChatChannel, ChatGroup, ChatIdentity, ChatMessage, ClientError, RosterEntry, ScheduleDetail,
    ScheduleLayer, SourceObject, TimeWindow, UserReference,
};
use std::collections::HashMap;
use std::sync::Mutex;

pub fn identity(id: &str, email: &str) -> ChatIdentity {
    ChatIdentity {
        id: id.to_string(),
        email: email.to_string(),
        display_name: id.to_lowercase(),
        deleted: false,
    }
}

pub fn group(id: &str, handle: &str, members: &[&str]) -> ChatGroup {
    ChatGroup {
        id: id.to_string(),
        handle: handle.to_string(),
        name: handle.to_string(),
        members: members.iter().map(|m| m.to_string()).collect(),
        date_delete: 0,
    }
}

pub fn entry(id: &str, name: &str, email: &str) -> RosterEntry {
    RosterEntry {
        id: id.to_string(),
        name: name.to_string(),
        email: email.to_string(),
        has_phone: true,
        has_email: !email.is_empty(),
        html_url: format!("https://example.pagerduty.com/users/{}", id),
    }
}

pub fn reference(id: &str, summary: &str) -> UserReference {
    UserReference {
        id: id.to_string(),
        summary: summary.to_string(),
        html_url: format!("https://example.pagerduty.com/users/{}", id),
    }
}

pub fn schedule(id: &str, layers: &[&[&str]]) -> ScheduleDetail {
    ScheduleDetail {
        object: SourceObject {
            id: id.to_string(),
            summary: format!("Schedule {}", id),
            html_url: format!("https://example.pagerduty.com/schedules/{}", id),
        },
        layers: layers
            .iter()
            .enumerate()
            .map(|(idx, users)| ScheduleLayer {
                name: format!("Layer {}", idx + 1),
                entries: users.iter().map(|u| reference(u, u)).collect(),
            })
            .collect(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Recorded call log shared by both fakes.
#[derive(Debug, Default)]
struct CallLog {
    calls: Mutex<Vec<(String, String)>>,
    failures: Mutex<HashMap<String, ClientError>>,
}

impl CallLog {
    fn record(&self, method: &str, detail: impl Into<String>) -> Result<(), ClientError> {
        lock(&self.calls).push((method.to_string(), detail.into()));
        match lock(&self.failures).get(method) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn count(&self, method: &str) -> usize {
        lock(&self.calls).iter().filter(|(m, _)| m == method).count()
    }

    fn details(&self, method: &str) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, d)| d.clone())
            .collect()
    }
}

/// Fake Slack workspace.
#[derive(Debug, Default)]
pub struct FakeChat {
    users: Mutex<Vec<ChatIdentity>>,
    groups: Mutex<Vec<ChatGroup>>,
    channels: Mutex<Vec<ChatChannel>>,
    posted: Mutex<Vec<(String, ChatMessage)>>,
    log: CallLog,
}

impl FakeChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, user: ChatIdentity) -> Self {
        lock(&self.users).push(user);
        self
    }

    pub fn with_group(self, group: ChatGroup) -> Self {
        lock(&self.groups).push(group);
        self
    }

    pub fn with_channel(self, id: &str, name: &str) -> Self {
        lock(&self.channels).push(ChatChannel {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// Make every subsequent call of `method` fail.
    pub fn fail_on(&self, method: &str, err: ClientError) {
        lock(&self.log.failures).insert(method.to_string(), err);
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.log.count(method)
    }

    /// Argument summaries of every call of `method`.
    pub fn calls(&self, method: &str) -> Vec<String> {
        self.log.details(method)
    }

    /// Total number of write calls (membership, enable, disable).
    pub fn write_count(&self) -> usize {
        ["replace_group_members", "enable_group", "disable_group"]
            .iter()
            .map(|m| self.log.count(m))
            .sum()
    }

    pub fn group(&self, id: &str) -> Option<ChatGroup> {
        lock(&self.groups).iter().find(|g| g.id == id).cloned()
    }

    /// Mark a group as soft-deleted on the fake server side.
    pub fn set_disabled(&self, id: &str) {
        if let Some(g) = lock(&self.groups).iter_mut().find(|g| g.id == id) {
            g.date_delete = 1_700_000_000;
        }
    }

    pub fn posted(&self) -> Vec<(String, ChatMessage)> {
        lock(&self.posted).clone()
    }

    fn update_group(
        &self,
        id: &str,
        method: &str,
        change: impl FnOnce(&mut ChatGroup),
    ) -> Result<ChatGroup, ClientError> {
        let mut groups = lock(&self.groups);
        let group = groups
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| ClientError::Api {
                method: method.to_string(),
                error: "no_such_subteam".to_string(),
            })?;
        change(group);
        Ok(group.clone())
    }
}

impl ChatDirectory for FakeChat {
    fn list_all_users(&self) -> Result<Vec<ChatIdentity>, ClientError> {
        self.log.record("list_all_users", "")?;
        Ok(lock(&self.users).clone())
    }

    fn list_all_user_groups(&self, include_members: bool) -> Result<Vec<ChatGroup>, ClientError> {
        self.log.record("list_all_user_groups", include_members.to_string())?;
        let mut groups = lock(&self.groups).clone();
        if !include_members {
            groups.iter_mut().for_each(|g| g.members.clear());
        }
        Ok(groups)
    }

    fn get_channel_info(&self, channel_id: &str) -> Result<ChatChannel, ClientError> {
        self.log.record("get_channel_info", channel_id)?;
        lock(&self.channels)
            .iter()
            .find(|c| c.id == channel_id)
            .cloned()
            .ok_or_else(|| ClientError::Api {
                method: "conversations.info".to_string(),
                error: "channel_not_found".to_string(),
            })
    }

    fn replace_group_members(
        &self,
        group_id: &str,
        member_ids: &[String],
    ) -> Result<ChatGroup, ClientError> {
        self.log
            .record("replace_group_members", format!("{}:{}", group_id, member_ids.join(",")))?;
        self.update_group(group_id, "usergroups.users.update", |g| {
            g.members = member_ids.to_vec();
        })
    }

    fn enable_group(&self, group_id: &str) -> Result<ChatGroup, ClientError> {
        self.log.record("enable_group", group_id)?;
        self.update_group(group_id, "usergroups.enable", |g| g.date_delete = 0)
    }

    fn disable_group(&self, group_id: &str) -> Result<ChatGroup, ClientError> {
        self.log.record("disable_group", group_id)?;
        self.update_group(group_id, "usergroups.disable", |g| {
            g.date_delete = 1_700_000_000;
        })
    }

    fn post_message(&self, channel_id: &str, message: &ChatMessage) -> Result<(), ClientError> {
        self.log.record("post_message", channel_id)?;
        lock(&self.posted).push((channel_id.to_string(), message.clone()));
        Ok(())
    }
}

/// Fake PagerDuty account.
#[derive(Debug, Default)]
pub struct FakeRoster {
    team_members: Vec<RosterEntry>,
    teams: HashMap<String, SourceObject>,
    on_call: Vec<UserReference>,
    schedules: HashMap<String, ScheduleDetail>,
    overrides: HashMap<String, Vec<UserReference>>,
    users: HashMap<String, RosterEntry>,
    windows: Mutex<Vec<TimeWindow>>,
    log: CallLog,
}

impl FakeRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_team(mut self, id: &str, members: Vec<RosterEntry>) -> Self {
        self.teams.insert(
            id.to_string(),
            SourceObject {
                id: id.to_string(),
                summary: format!("Team {}", id),
                html_url: format!("https://example.pagerduty.com/teams/{}", id),
            },
        );
        self.team_members.extend(members);
        self
    }

    pub fn with_on_call(mut self, users: &[UserReference]) -> Self {
        self.on_call.extend_from_slice(users);
        self
    }

    pub fn with_schedule(mut self, detail: ScheduleDetail) -> Self {
        self.schedules.insert(detail.object.id.clone(), detail);
        self
    }

    pub fn with_overrides(mut self, schedule_id: &str, users: &[UserReference]) -> Self {
        self.overrides.insert(schedule_id.to_string(), users.to_vec());
        self
    }

    /// Register the full record returned by `get_user`.
    pub fn with_user(mut self, user: RosterEntry) -> Self {
        self.users.insert(user.id.clone(), user);
        self
    }

    pub fn fail_on(&self, method: &str, err: ClientError) {
        lock(&self.log.failures).insert(method.to_string(), err);
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.log.count(method)
    }

    pub fn windows(&self) -> Vec<TimeWindow> {
        lock(&self.windows).clone()
    }
}

impl IncidentRoster for FakeRoster {
    fn list_team_members(&self, team_ids: &[String]) -> Result<Vec<RosterEntry>, ClientError> {
        self.log.record("list_team_members", team_ids.join(","))?;
        Ok(self.team_members.clone())
    }

    fn get_team(&self, team_id: &str) -> Result<SourceObject, ClientError> {
        self.log.record("get_team", team_id)?;
        self.teams.get(team_id).cloned().ok_or_else(|| ClientError::NotFound {
            kind: "team",
            id: team_id.to_string(),
        })
    }

    fn list_on_call_now(
        &self,
        schedule_ids: &[String],
        window: &TimeWindow,
    ) -> Result<Vec<UserReference>, ClientError> {
        self.log.record("list_on_call_now", schedule_ids.join(","))?;
        lock(&self.windows).push(*window);
        Ok(self.on_call.clone())
    }

    fn get_schedule(
        &self,
        schedule_id: &str,
        window: &TimeWindow,
    ) -> Result<ScheduleDetail, ClientError> {
        self.log.record("get_schedule", schedule_id)?;
        lock(&self.windows).push(*window);
        self.schedules
            .get(schedule_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound {
                kind: "schedule",
                id: schedule_id.to_string(),
            })
    }

    fn list_overrides(
        &self,
        schedule_id: &str,
        _window: &TimeWindow,
    ) -> Result<Vec<UserReference>, ClientError> {
        self.log.record("list_overrides", schedule_id)?;
        Ok(self.overrides.get(schedule_id).cloned().unwrap_or_default())
    }

    fn get_user(
        &self,
        user_id: &str,
        _include_contact_methods: bool,
    ) -> Result<RosterEntry, ClientError> {
        self.log.record("get_user", user_id)?;
        self.users.get(user_id).cloned().ok_or_else(|| ClientError::NotFound {
            kind: "user",
            id: user_id.to_string(),
        })
    }
}
