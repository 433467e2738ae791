//! Configuration for pd2slack.
//!
//! The configuration is a TOML file with four tables (`global`, `slack`,
//! `pagerduty`, `jobs`). Secrets and a few global switches can be overridden
//! from the environment (see [`EnvParser`]); CLI flags override both.

pub mod env;

pub use env::{EnvError, EnvParser};

use crate::errors::ConfigError;
use crate::types::SyncStyle;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Default config file name, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "pd2slack.toml";

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub pagerduty: PagerdutyConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Apply changes to Slack; false means dry run.
    #[serde(default)]
    pub write: bool,
    /// Run every job once right after startup.
    #[serde(default = "default_true")]
    pub run_at_start: bool,
    /// Transport timeout for every HTTP call.
    #[serde(default = "default_http_timeout")]
    pub http_timeout: String,
    /// How often the Slack users/groups snapshot is reloaded.
    #[serde(default = "default_refresh_interval")]
    pub masterdata_refresh_interval: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            write: false,
            run_at_start: true,
            http_timeout: default_http_timeout(),
            masterdata_refresh_interval: default_refresh_interval(),
        }
    }
}

impl GlobalConfig {
    pub fn http_timeout(&self) -> Duration {
        humantime::parse_duration(self.http_timeout.trim()).unwrap_or(DEFAULT_HTTP_TIMEOUT)
    }

    pub fn masterdata_refresh_interval(&self) -> Duration {
        humantime::parse_duration(self.masterdata_refresh_interval.trim())
            .unwrap_or(DEFAULT_REFRESH_INTERVAL)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Bot token used for reads and status messages.
    #[serde(default)]
    pub bot_token: String,
    /// User token used for user-group writes.
    #[serde(default)]
    pub user_token: String,
    /// Channel receiving the status message of every run.
    #[serde(default)]
    pub info_channel_id: String,
    #[serde(default = "default_slack_api")]
    pub api_base_url: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            user_token: String::new(),
            info_channel_id: String::new(),
            api_base_url: default_slack_api(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagerdutyConfig {
    #[serde(default)]
    pub auth_token: String,
    #[serde(default = "default_pagerduty_api")]
    pub api_base_url: String,
}

impl Default for PagerdutyConfig {
    fn default() -> Self {
        Self {
            auth_token: String::new(),
            api_base_url: default_pagerduty_api(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Sync who is on call for one or more schedules.
    #[serde(default)]
    pub schedule_sync: Vec<SyncJobConfig>,
    /// Sync every member of one or more teams.
    #[serde(default)]
    pub team_sync: Vec<SyncJobConfig>,
}

impl JobsConfig {
    pub fn is_empty(&self) -> bool {
        self.schedule_sync.is_empty() && self.team_sync.is_empty()
    }
}

/// One PagerDuty -> Slack group sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJobConfig {
    /// Cron expression; 5-field standard syntax or 6/7 fields with seconds.
    pub cron: String,
    pub slack_group_handle: String,
    /// Schedule IDs or team IDs, depending on the job list.
    #[serde(default)]
    pub pagerduty_object_ids: Vec<String>,
    #[serde(default)]
    pub sync_options: SyncOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncOptions {
    /// How far ahead of now the on-call window reaches ("1h", "30m").
    #[serde(default)]
    pub handover_time_frame_forward: Option<String>,
    /// How far before now the on-call window reaches.
    #[serde(default)]
    pub handover_time_frame_backward: Option<String>,
    #[serde(default)]
    pub sync_style: SyncStyle,
    /// Disable the group instead of leaving it stale when nobody matched.
    #[serde(default)]
    pub disable_group_if_none_on_shift: bool,
    /// Log a warning for every roster entry without a phone contact method.
    #[serde(default)]
    pub inform_user_if_contact_phone_missing: bool,
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_timeout() -> String {
    "30s".to_string()
}

fn default_refresh_interval() -> String {
    "1h".to_string()
}

fn default_slack_api() -> String {
    "https://slack.com/api".to_string()
}

fn default_pagerduty_api() -> String {
    "https://api.pagerduty.com".to_string()
}

impl Config {
    /// Read and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let path = expand_home(path);
        if !path.exists() {
            return Err(ConfigError::NotFound { path });
        }
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
        debug!(
            "Loaded configuration from {:?} ({} schedule jobs, {} team jobs)",
            path,
            config.jobs.schedule_sync.len(),
            config.jobs.team_sync.len()
        );
        Ok(config)
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.to_str().and_then(|p| p.strip_prefix("~/")) {
        Some(stripped) => dirs::home_dir()
            .map(|home| home.join(stripped))
            .unwrap_or_else(|| path.to_path_buf()),
        None => path.to_path_buf(),
    }
}

/// Parse a handover window offset.
///
/// An absent or blank value is zero; so is a bare `0`. Offsets that would
/// move the window outside the representable date range are rejected.
pub fn parse_handover_window(value: Option<&str>) -> Result<Duration, String> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(Duration::ZERO);
    };
    if raw == "0" {
        return Ok(Duration::ZERO);
    }
    let duration = humantime::parse_duration(raw).map_err(|e| e.to_string())?;
    let now = Utc::now();
    let representable = chrono::Duration::from_std(duration)
        .ok()
        .filter(|offset| now.checked_add_signed(*offset).is_some())
        .filter(|offset| now.checked_sub_signed(*offset).is_some())
        .is_some();
    if !representable {
        return Err(format!("duration '{}' is out of range", raw));
    }
    Ok(duration)
}

/// Accept standard 5-field cron syntax by prepending a seconds field.
pub fn normalize_cron(expr: &str) -> String {
    let expr = expr.trim();
    if expr.split_whitespace().count() == 5 {
        format!("0 {}", expr)
    } else {
        expr.to_string()
    }
}

/// Parse a cron expression (5, 6 or 7 fields).
pub fn parse_cron(expr: &str) -> Result<cron::Schedule, String> {
    cron::Schedule::from_str(&normalize_cron(expr)).map_err(|e| e.to_string())
}

/// Severity of a configuration finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A single configuration finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub severity: Severity,
    pub field: String,
    pub message: String,
}

impl ConfigWarning {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a configuration for problems.
pub fn validate_config(config: &Config) -> Vec<ConfigWarning> {
    let mut findings = Vec::new();

    if config.slack.bot_token.trim().is_empty() {
        findings.push(ConfigWarning::error("slack.bot_token", "must be set"));
    }
    if config.slack.user_token.trim().is_empty() {
        if config.global.write {
            findings.push(ConfigWarning::error(
                "slack.user_token",
                "must be set when write is enabled",
            ));
        } else {
            findings.push(ConfigWarning::warning(
                "slack.user_token",
                "not set; group updates will fail once write is enabled",
            ));
        }
    }
    if config.slack.info_channel_id.trim().is_empty() {
        findings.push(ConfigWarning::error("slack.info_channel_id", "must be set"));
    }
    if config.pagerduty.auth_token.trim().is_empty() {
        findings.push(ConfigWarning::error("pagerduty.auth_token", "must be set"));
    }

    if humantime::parse_duration(config.global.http_timeout.trim()).is_err() {
        findings.push(ConfigWarning::error(
            "global.http_timeout",
            format!("invalid duration '{}'", config.global.http_timeout),
        ));
    }
    if humantime::parse_duration(config.global.masterdata_refresh_interval.trim()).is_err() {
        findings.push(ConfigWarning::error(
            "global.masterdata_refresh_interval",
            format!(
                "invalid duration '{}'",
                config.global.masterdata_refresh_interval
            ),
        ));
    }
    if !matches!(
        config.global.log_level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        findings.push(ConfigWarning::warning(
            "global.log_level",
            format!("unknown level '{}', using info", config.global.log_level),
        ));
    }

    if config.jobs.is_empty() {
        findings.push(ConfigWarning::warning("jobs", "no jobs configured"));
    }
    for (idx, job) in config.jobs.schedule_sync.iter().enumerate() {
        validate_job(&format!("jobs.schedule_sync[{}]", idx), job, &mut findings);
    }
    for (idx, job) in config.jobs.team_sync.iter().enumerate() {
        validate_job(&format!("jobs.team_sync[{}]", idx), job, &mut findings);
    }

    findings
}

fn validate_job(prefix: &str, job: &SyncJobConfig, findings: &mut Vec<ConfigWarning>) {
    if let Err(e) = parse_cron(&job.cron) {
        findings.push(ConfigWarning::error(
            format!("{}.cron", prefix),
            format!("invalid cron schedule '{}': {}", job.cron, e),
        ));
    }
    if job.slack_group_handle.trim().is_empty() {
        findings.push(ConfigWarning::error(
            format!("{}.slack_group_handle", prefix),
            "must be set",
        ));
    }
    if job.pagerduty_object_ids.is_empty() {
        findings.push(ConfigWarning::error(
            format!("{}.pagerduty_object_ids", prefix),
            "at least one ID is required",
        ));
    }
    let windows = [
        (
            "handover_time_frame_forward",
            &job.sync_options.handover_time_frame_forward,
        ),
        (
            "handover_time_frame_backward",
            &job.sync_options.handover_time_frame_backward,
        ),
    ];
    for (name, value) in windows {
        if let Err(e) = parse_handover_window(value.as_deref()) {
            findings.push(ConfigWarning::warning(
                format!("{}.sync_options.{}", prefix, name),
                format!("{}; 0 will be used", e),
            ));
        }
    }
}

/// Collect the error-level findings, if any.
pub fn into_result(findings: &[ConfigWarning]) -> Result<(), ConfigError> {
    let errors: Vec<String> = findings
        .iter()
        .filter(|f| f.severity == Severity::Error)
        .map(ToString::to_string)
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(errors))
    }
}
