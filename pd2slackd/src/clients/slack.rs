//! Slack Web API client.
//!
//! Reads and `chat.postMessage` use the bot token. Usergroup writes need a
//! user token with `usergroups:write`. Rate-limited calls are retried a few
//! times, honouring `Retry-After`.

use super::ChatDirectory;
use pd2slack_common::config::SlackConfig;
use pd2slack_common::{ChatChannel, ChatGroup, ChatIdentity, ChatMessage, ClientError};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use ureq::Agent;
use ureq::http::Response;

const MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;
const MAX_RETRY_AFTER_SECS: u64 = 60;
const USERS_PAGE_LIMIT: &str = "200";

#[derive(Debug, Clone, Copy)]
enum Token {
    Bot,
    User,
}

pub struct SlackClient {
    agent: Agent,
    base_url: String,
    bot_token: String,
    user_token: String,
}

impl SlackClient {
    pub fn new(config: &SlackConfig, timeout: Duration) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            user_token: config.user_token.clone(),
        }
    }

    fn bearer(&self, token: Token) -> String {
        match token {
            Token::Bot => format!("Bearer {}", self.bot_token),
            Token::User => format!("Bearer {}", self.user_token),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    fn get<T: DeserializeOwned>(
        &self,
        method: &str,
        token: Token,
        query: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        self.with_retry(method, || {
            let mut request = self
                .agent
                .get(&self.url(method))
                .header("Authorization", self.bearer(token));
            for (key, value) in query {
                request = request.query(*key, *value);
            }
            request.call()
        })
    }

    fn post_form<T: DeserializeOwned>(
        &self,
        method: &str,
        token: Token,
        form: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        self.with_retry(method, || {
            self.agent
                .post(&self.url(method))
                .header("Authorization", self.bearer(token))
                .send_form(form.iter().copied())
        })
    }

    fn post_json<T: DeserializeOwned>(
        &self,
        method: &str,
        token: Token,
        body: &serde_json::Value,
    ) -> Result<T, ClientError> {
        self.with_retry(method, || {
            self.agent
                .post(&self.url(method))
                .header("Authorization", self.bearer(token))
                .send_json(body)
        })
    }

    fn with_retry<T, F>(&self, method: &str, send: F) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        F: Fn() -> Result<Response<ureq::Body>, ureq::Error>,
    {
        for attempt in 1..=MAX_ATTEMPTS {
            debug!("slack: {} (attempt {})", method, attempt);
            let mut response = send().map_err(|e| ClientError::Transport {
                operation: method.to_string(),
                message: e.to_string(),
            })?;

            let code = response.status().as_u16();
            if code == 429 {
                let wait = retry_after(response.headers().get("retry-after").and_then(|v| v.to_str().ok()));
                if attempt == MAX_ATTEMPTS {
                    break;
                }
                warn!("slack: {} rate limited, retrying in {:?}", method, wait);
                std::thread::sleep(wait);
                continue;
            }
            if !(200..300).contains(&code) {
                return Err(ClientError::Status {
                    operation: method.to_string(),
                    code,
                });
            }

            let value: serde_json::Value =
                response
                    .body_mut()
                    .read_json()
                    .map_err(|e| ClientError::Decode {
                        operation: method.to_string(),
                        message: e.to_string(),
                    })?;
            return decode_envelope(method, value);
        }
        Err(ClientError::RateLimited {
            method: method.to_string(),
        })
    }
}

/// Wait derived from a `Retry-After` header value, capped.
fn retry_after(header: Option<&str>) -> Duration {
    let secs = header
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
    Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS))
}

/// Slack answers HTTP 200 with `ok: false` on API errors.
fn decode_envelope<T: DeserializeOwned>(method: &str, value: serde_json::Value) -> Result<T, ClientError> {
    let ok = value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false);
    if !ok {
        let error = value
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown_error")
            .to_string();
        return Err(ClientError::Api {
            method: method.to_string(),
            error,
        });
    }
    serde_json::from_value(value).map_err(|e| ClientError::Decode {
        operation: method.to_string(),
        message: e.to_string(),
    })
}

impl ChatDirectory for SlackClient {
    fn list_all_users(&self) -> Result<Vec<ChatIdentity>, ClientError> {
        let mut users = Vec::new();
        let mut cursor = String::new();
        loop {
            let mut query = vec![("limit", USERS_PAGE_LIMIT)];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.as_str()));
            }
            let page: UsersListResponse = self.get("users.list", Token::Bot, &query)?;
            users.extend(page.members.into_iter().map(ChatIdentity::from));

            match page.response_metadata.next_cursor {
                next if next.is_empty() => break,
                next => cursor = next,
            }
        }
        Ok(users)
    }

    fn list_all_user_groups(&self, include_members: bool) -> Result<Vec<ChatGroup>, ClientError> {
        let include_users = if include_members { "true" } else { "false" };
        let response: UserGroupsResponse = self.get(
            "usergroups.list",
            Token::Bot,
            &[("include_users", include_users), ("include_disabled", "true")],
        )?;
        Ok(response.usergroups.into_iter().map(ChatGroup::from).collect())
    }

    fn get_channel_info(&self, channel_id: &str) -> Result<ChatChannel, ClientError> {
        let response: ChannelResponse =
            self.get("conversations.info", Token::Bot, &[("channel", channel_id)])?;
        Ok(ChatChannel {
            id: response.channel.id,
            name: response.channel.name,
        })
    }

    fn replace_group_members(
        &self,
        group_id: &str,
        member_ids: &[String],
    ) -> Result<ChatGroup, ClientError> {
        let users = member_ids.join(",");
        let response: UserGroupResponse = self.post_form(
            "usergroups.users.update",
            Token::User,
            &[("usergroup", group_id), ("users", users.as_str())],
        )?;
        Ok(response.usergroup.into())
    }

    fn enable_group(&self, group_id: &str) -> Result<ChatGroup, ClientError> {
        let response: UserGroupResponse =
            self.post_form("usergroups.enable", Token::User, &[("usergroup", group_id)])?;
        Ok(response.usergroup.into())
    }

    fn disable_group(&self, group_id: &str) -> Result<ChatGroup, ClientError> {
        let response: UserGroupResponse =
            self.post_form("usergroups.disable", Token::User, &[("usergroup", group_id)])?;
        Ok(response.usergroup.into())
    }

    fn post_message(&self, channel_id: &str, message: &ChatMessage) -> Result<(), ClientError> {
        let body = serde_json::json!({
            "channel": channel_id,
            "text": message.text,
            "blocks": message.blocks,
        });
        let _: serde_json::Value = self.post_json("chat.postMessage", Token::Bot, &body)?;
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ApiProfile {
    #[serde(default)]
    email: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    real_name: String,
}

#[derive(Debug, Deserialize)]
struct ApiMember {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    profile: ApiProfile,
}

impl From<ApiMember> for ChatIdentity {
    fn from(m: ApiMember) -> Self {
        let display_name = [m.profile.display_name, m.profile.real_name, m.name]
            .into_iter()
            .find(|n| !n.is_empty())
            .unwrap_or_default();
        Self {
            id: m.id,
            email: m.profile.email,
            display_name,
            deleted: m.deleted,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct UsersListResponse {
    #[serde(default)]
    members: Vec<ApiMember>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

#[derive(Debug, Deserialize)]
struct ApiUserGroup {
    id: String,
    #[serde(default)]
    handle: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    users: Vec<String>,
    #[serde(default)]
    date_delete: i64,
}

impl From<ApiUserGroup> for ChatGroup {
    fn from(g: ApiUserGroup) -> Self {
        Self {
            id: g.id,
            handle: g.handle,
            name: g.name,
            members: g.users,
            date_delete: g.date_delete,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserGroupsResponse {
    #[serde(default)]
    usergroups: Vec<ApiUserGroup>,
}

#[derive(Debug, Deserialize)]
struct UserGroupResponse {
    usergroup: ApiUserGroup,
}

#[derive(Debug, Deserialize)]
struct ApiChannel {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    channel: ApiChannel,
}
