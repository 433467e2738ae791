//! PagerDuty REST API v2 client.

use super::IncidentRoster;
use pd2slack_common::config::PagerdutyConfig;
use pd2slack_common::{
    ClientError, RosterEntry, ScheduleDetail, ScheduleLayer, SourceObject, TimeWindow,
    UserReference,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use ureq::Agent;

const ACCEPT: &str = "application/vnd.pagerduty+json;version=2";
const PAGE_LIMIT: usize = 100;

pub struct PagerDutyClient {
    agent: Agent,
    base_url: String,
    token: String,
}

impl PagerDutyClient {
    pub fn new(config: &PagerdutyConfig, timeout: Duration) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.auth_token.clone(),
        }
    }

    fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        operation: &str,
        not_found: Option<(&'static str, &str)>,
    ) -> Result<T, ClientError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut request = self
            .agent
            .get(&url)
            .header("Authorization", format!("Token token={}", self.token))
            .header("Accept", ACCEPT);
        for (key, value) in query {
            request = request.query(*key, value);
        }

        debug!("pagerduty: GET {}", path);
        let mut response = request.call().map_err(|e| ClientError::Transport {
            operation: operation.to_string(),
            message: e.to_string(),
        })?;

        let code = response.status().as_u16();
        if code == 404 {
            if let Some((kind, id)) = not_found {
                return Err(ClientError::NotFound {
                    kind,
                    id: id.to_string(),
                });
            }
        }
        if !(200..300).contains(&code) {
            return Err(ClientError::Status {
                operation: operation.to_string(),
                code,
            });
        }

        response
            .body_mut()
            .read_json::<T>()
            .map_err(|e| ClientError::Decode {
                operation: operation.to_string(),
                message: e.to_string(),
            })
    }
}

impl IncidentRoster for PagerDutyClient {
    fn list_team_members(&self, team_ids: &[String]) -> Result<Vec<RosterEntry>, ClientError> {
        let mut members = Vec::new();
        let mut offset = 0;
        loop {
            let mut query: Vec<(&str, String)> = team_ids
                .iter()
                .map(|id| ("team_ids[]", id.clone()))
                .collect();
            query.push(("include[]", "contact_methods".to_string()));
            query.push(("limit", PAGE_LIMIT.to_string()));
            query.push(("offset", offset.to_string()));

            let page: UsersPage = self.get("users", &query, "list users", None)?;
            let fetched = page.users.len();
            members.extend(page.users.into_iter().map(RosterEntry::from));
            if !page.more || fetched == 0 {
                break;
            }
            offset += fetched;
        }
        Ok(members)
    }

    fn get_team(&self, team_id: &str) -> Result<SourceObject, ClientError> {
        let response: TeamResponse = self.get(
            &format!("teams/{}", team_id),
            &[],
            "get team",
            Some(("team", team_id)),
        )?;
        Ok(response.team.into())
    }

    fn list_on_call_now(
        &self,
        schedule_ids: &[String],
        window: &TimeWindow,
    ) -> Result<Vec<UserReference>, ClientError> {
        let mut users = Vec::new();
        let mut offset = 0;
        loop {
            let mut query: Vec<(&str, String)> = schedule_ids
                .iter()
                .map(|id| ("schedule_ids[]", id.clone()))
                .collect();
            query.push(("since", window.since_param()));
            query.push(("until", window.until_param()));
            query.push(("limit", PAGE_LIMIT.to_string()));
            query.push(("offset", offset.to_string()));

            let page: OnCallsPage = self.get("oncalls", &query, "list on-calls", None)?;
            let fetched = page.oncalls.len();
            users.extend(
                page.oncalls
                    .into_iter()
                    .filter_map(|oncall| oncall.user)
                    .map(UserReference::from),
            );
            if !page.more || fetched == 0 {
                break;
            }
            offset += fetched;
        }
        Ok(users)
    }

    fn get_schedule(
        &self,
        schedule_id: &str,
        window: &TimeWindow,
    ) -> Result<ScheduleDetail, ClientError> {
        let query = [
            ("time_zone", "UTC".to_string()),
            ("since", window.since_param()),
            ("until", window.until_param()),
        ];
        let response: ScheduleResponse = self.get(
            &format!("schedules/{}", schedule_id),
            &query,
            "get schedule",
            Some(("schedule", schedule_id)),
        )?;
        Ok(response.schedule.into())
    }

    fn list_overrides(
        &self,
        schedule_id: &str,
        window: &TimeWindow,
    ) -> Result<Vec<UserReference>, ClientError> {
        let query = [
            ("since", window.since_param()),
            ("until", window.until_param()),
        ];
        let response: OverridesResponse = self.get(
            &format!("schedules/{}/overrides", schedule_id),
            &query,
            "list overrides",
            Some(("schedule", schedule_id)),
        )?;
        Ok(response
            .overrides
            .into_iter()
            .filter_map(|o| o.user)
            .map(UserReference::from)
            .collect())
    }

    fn get_user(
        &self,
        user_id: &str,
        include_contact_methods: bool,
    ) -> Result<RosterEntry, ClientError> {
        let mut query = Vec::new();
        if include_contact_methods {
            query.push(("include[]", "contact_methods".to_string()));
        }
        let response: UserResponse = self.get(
            &format!("users/{}", user_id),
            &query,
            "get user",
            Some(("user", user_id)),
        )?;
        Ok(response.user.into())
    }
}

#[derive(Debug, Deserialize)]
struct ApiReference {
    id: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    html_url: String,
}

impl ApiReference {
    fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.summary.clone()
        } else {
            self.name.clone()
        }
    }
}

impl From<ApiReference> for UserReference {
    fn from(r: ApiReference) -> Self {
        Self {
            summary: r.display_name(),
            id: r.id,
            html_url: r.html_url,
        }
    }
}

impl From<ApiReference> for SourceObject {
    fn from(r: ApiReference) -> Self {
        Self {
            summary: r.display_name(),
            id: r.id,
            html_url: r.html_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiContactMethod {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    contact_methods: Vec<ApiContactMethod>,
}

impl From<ApiUser> for RosterEntry {
    fn from(u: ApiUser) -> Self {
        // Full objects carry "phone_contact_method", references add a "_reference" suffix.
        let has_kind = |prefix: &str| u.contact_methods.iter().any(|c| c.kind.starts_with(prefix));
        let has_phone = has_kind("phone_contact_method");
        let has_email = has_kind("email_contact_method");
        Self {
            name: if u.name.is_empty() { u.summary } else { u.name },
            id: u.id,
            email: u.email,
            has_phone,
            has_email,
            html_url: u.html_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UsersPage {
    #[serde(default)]
    users: Vec<ApiUser>,
    #[serde(default)]
    more: bool,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    user: ApiUser,
}

#[derive(Debug, Deserialize)]
struct TeamResponse {
    team: ApiReference,
}

#[derive(Debug, Deserialize)]
struct ApiOnCall {
    user: Option<ApiReference>,
}

#[derive(Debug, Deserialize)]
struct OnCallsPage {
    #[serde(default)]
    oncalls: Vec<ApiOnCall>,
    #[serde(default)]
    more: bool,
}

#[derive(Debug, Deserialize)]
struct ApiRenderedEntry {
    user: Option<ApiReference>,
}

#[derive(Debug, Deserialize)]
struct ApiLayer {
    #[serde(default)]
    name: String,
    #[serde(default)]
    rendered_schedule_entries: Vec<ApiRenderedEntry>,
}

#[derive(Debug, Deserialize)]
struct ApiSchedule {
    #[serde(flatten)]
    reference: ApiReference,
    #[serde(default)]
    schedule_layers: Vec<ApiLayer>,
}

impl From<ApiSchedule> for ScheduleDetail {
    fn from(s: ApiSchedule) -> Self {
        Self {
            object: s.reference.into(),
            layers: s
                .schedule_layers
                .into_iter()
                .map(|layer| ScheduleLayer {
                    name: layer.name,
                    entries: layer
                        .rendered_schedule_entries
                        .into_iter()
                        .filter_map(|e| e.user)
                        .map(UserReference::from)
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScheduleResponse {
    schedule: ApiSchedule,
}

#[derive(Debug, Deserialize)]
struct ApiOverride {
    user: Option<ApiReference>,
}

#[derive(Debug, Deserialize)]
struct OverridesResponse {
    #[serde(default)]
    overrides: Vec<ApiOverride>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_with_contact_method_objects() {
        let json = r#"{
            "user": {
                "id": "PXPGF42",
                "name": "Earline Greenholt",
                "email": "earline@example.com",
                "html_url": "https://subdomain.pagerduty.com/users/PXPGF42",
                "contact_methods": [
                    {"id": "PTDVERC", "type": "email_contact_method", "address": "earline@example.com"},
                    {"id": "PVMGSMI", "type": "phone_contact_method", "address": "5555555555"}
                ]
            }
        }"#;
        let response: UserResponse = serde_json::from_str(json).unwrap();
        let entry = RosterEntry::from(response.user);
        assert_eq!(entry.id, "PXPGF42");
        assert_eq!(entry.name, "Earline Greenholt");
        assert_eq!(entry.email, "earline@example.com");
        assert!(entry.has_phone);
        assert!(entry.has_email);
    }

    #[test]
    fn test_user_with_contact_method_references() {
        let json = r#"{
            "users": [{
                "id": "P1",
                "summary": "Ray Stantz",
                "contact_methods": [{"id": "C1", "type": "push_notification_contact_method_reference"}]
            }],
            "more": true
        }"#;
        let page: UsersPage = serde_json::from_str(json).unwrap();
        assert!(page.more);
        let entry = RosterEntry::from(page.users.into_iter().next().unwrap());
        assert_eq!(entry.name, "Ray Stantz");
        assert!(entry.email.is_empty());
        assert!(!entry.has_phone);
        assert!(!entry.has_email);
    }

    #[test]
    fn test_schedule_layers_decode() {
        let json = r#"{
            "schedule": {
                "id": "PI7DH85",
                "summary": "Daily Engineering Rotation",
                "name": "Daily Engineering Rotation",
                "html_url": "https://subdomain.pagerduty.com/schedules/PI7DH85",
                "schedule_layers": [
                    {
                        "name": "Layer 1",
                        "rendered_schedule_entries": [
                            {"start": "2024-03-01T00:00:00Z", "end": "2024-03-02T00:00:00Z",
                             "user": {"id": "PUSER1", "summary": "Egon", "html_url": "u1"}},
                            {"start": "2024-03-02T00:00:00Z", "end": "2024-03-03T00:00:00Z", "user": null}
                        ]
                    },
                    {"name": "Layer 2"}
                ]
            }
        }"#;
        let response: ScheduleResponse = serde_json::from_str(json).unwrap();
        let detail = ScheduleDetail::from(response.schedule);
        assert_eq!(detail.object.id, "PI7DH85");
        assert_eq!(detail.object.summary, "Daily Engineering Rotation");
        assert_eq!(detail.layers.len(), 2);
        assert_eq!(detail.layers[0].entries, vec![UserReference {
            id: "PUSER1".to_string(),
            summary: "Egon".to_string(),
            html_url: "u1".to_string(),
        }]);
        assert!(detail.layers[1].entries.is_empty());
    }

    #[test]
    fn test_oncalls_and_overrides_decode() {
        let oncalls: OnCallsPage = serde_json::from_str(
            r#"{"oncalls": [{"user": {"id": "P1", "summary": "A"}}, {"escalation_level": 2}], "more": false}"#,
        )
        .unwrap();
        assert_eq!(oncalls.oncalls.len(), 2);
        assert!(oncalls.oncalls[1].user.is_none());

        let overrides: OverridesResponse = serde_json::from_str(
            r#"{"overrides": [{"id": "O1", "start": "x", "end": "y", "user": {"id": "P9", "summary": "Z"}}]}"#,
        )
        .unwrap();
        assert_eq!(overrides.overrides[0].user.as_ref().unwrap().id, "P9");
    }

    #[test]
    fn test_team_prefers_name_over_summary() {
        let response: TeamResponse = serde_json::from_str(
            r#"{"team": {"id": "PT1", "name": "SRE", "summary": "SRE team", "html_url": "t"}}"#,
        )
        .unwrap();
        let object = SourceObject::from(response.team);
        assert_eq!(object.summary, "SRE");
        assert_eq!(object.html_url, "t");
    }
}
