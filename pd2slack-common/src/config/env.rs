//! Environment variable overrides with type safety.
//!
//! Values are read through a lookup function so the parser can be driven by
//! the process environment in production and by a plain map in tests.

use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

use super::Config;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// Invalid value for a variable.
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Invalid duration format.
    #[error("Invalid duration for {var}: {value}")]
    InvalidDuration { var: String, value: String },

    /// Invalid log level.
    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Type-safe environment variable parser.
///
/// Collects errors during parsing so all issues can be reported at once.
pub struct EnvParser {
    prefix: &'static str,
    lookup: Lookup,
    errors: Vec<EnvError>,
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvParser {
    /// Create a parser over the process environment with the PD2SLACK_ prefix.
    pub fn new() -> Self {
        Self {
            prefix: "PD2SLACK_",
            lookup: Box::new(|name| env::var(name).ok()),
            errors: Vec::new(),
        }
    }

    /// Create a parser over a fixed set of variables.
    pub fn from_map(vars: HashMap<String, String>) -> Self {
        Self {
            prefix: "PD2SLACK_",
            lookup: Box::new(move |name| vars.get(name).cloned()),
            errors: Vec::new(),
        }
    }

    /// Get all accumulated errors.
    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    /// Check if any errors occurred.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Take ownership of errors.
    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn raw(&self, name: &str) -> Option<(String, String)> {
        let var_name = self.var_name(name);
        (self.lookup)(&var_name).map(|value| (var_name, value))
    }

    /// Get a non-empty string value, if set.
    pub fn get_string(&mut self, name: &str) -> Option<String> {
        self.raw(name)
            .map(|(_, value)| value)
            .filter(|value| !value.trim().is_empty())
    }

    /// Get a boolean value, if set.
    ///
    /// Accepts: 1, true, yes, on (for true)
    ///          0, false, no, off, "" (for false)
    pub fn get_bool(&mut self, name: &str) -> Option<bool> {
        let (var_name, value) = self.raw(name)?;
        match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" | "" => Some(false),
            _ => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: "boolean (true/false/1/0/yes/no)".to_string(),
                    value,
                });
                None
            }
        }
    }

    /// Get a duration value ("30s", "1h 30m"), if set and valid.
    pub fn get_duration(&mut self, name: &str) -> Option<Duration> {
        let (var_name, value) = self.raw(name)?;
        match humantime::parse_duration(value.trim()) {
            Ok(duration) => Some(duration),
            Err(_) => {
                self.errors.push(EnvError::InvalidDuration {
                    var: var_name,
                    value,
                });
                None
            }
        }
    }

    /// Get a log level, if set and one of trace/debug/info/warn/error.
    pub fn get_log_level(&mut self, name: &str) -> Option<String> {
        let (var_name, value) = self.raw(name)?;
        let level = value.trim().to_lowercase();
        match level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Some(level),
            _ => {
                self.errors.push(EnvError::InvalidLogLevel {
                    var: var_name,
                    value,
                });
                None
            }
        }
    }

    /// Apply every supported override to `config`.
    pub fn apply(&mut self, config: &mut Config) {
        if let Some(write) = self.get_bool("WRITE") {
            config.global.write = write;
        }
        if let Some(level) = self.get_log_level("LOG_LEVEL") {
            config.global.log_level = level;
        }
        if let Some(timeout) = self.get_duration("HTTP_TIMEOUT") {
            config.global.http_timeout = humantime::format_duration(timeout).to_string();
        }
        if let Some(token) = self.get_string("SLACK_BOT_TOKEN") {
            config.slack.bot_token = token;
        }
        if let Some(token) = self.get_string("SLACK_USER_TOKEN") {
            config.slack.user_token = token;
        }
        if let Some(token) = self.get_string("PAGERDUTY_TOKEN") {
            config.pagerduty.auth_token = token;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser(vars: &[(&str, &str)]) -> EnvParser {
        EnvParser::from_map(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_get_bool_values() {
        let mut p = parser(&[("PD2SLACK_WRITE", "yes"), ("PD2SLACK_OTHER", "off")]);
        assert_eq!(p.get_bool("WRITE"), Some(true));
        assert_eq!(p.get_bool("OTHER"), Some(false));
        assert_eq!(p.get_bool("MISSING"), None);
        assert!(!p.has_errors());
    }

    #[test]
    fn test_get_bool_invalid_collects_error() {
        let mut p = parser(&[("PD2SLACK_WRITE", "maybe")]);
        assert_eq!(p.get_bool("WRITE"), None);
        assert!(p.has_errors());
        let errors = p.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("PD2SLACK_WRITE"));
        assert!(!p.has_errors());
    }

    #[test]
    fn test_get_duration() {
        let mut p = parser(&[("PD2SLACK_HTTP_TIMEOUT", "45s"), ("PD2SLACK_BAD", "soon")]);
        assert_eq!(p.get_duration("HTTP_TIMEOUT"), Some(Duration::from_secs(45)));
        assert_eq!(p.get_duration("BAD"), None);
        assert!(matches!(p.errors()[0], EnvError::InvalidDuration { .. }));
    }

    #[test]
    fn test_get_log_level_normalizes_case() {
        let mut p = parser(&[("PD2SLACK_LOG_LEVEL", "DEBUG")]);
        assert_eq!(p.get_log_level("LOG_LEVEL"), Some("debug".to_string()));
        let mut p = parser(&[("PD2SLACK_LOG_LEVEL", "loud")]);
        assert_eq!(p.get_log_level("LOG_LEVEL"), None);
        assert!(p.has_errors());
    }

    #[test]
    fn test_get_string_ignores_blank() {
        let mut p = parser(&[("PD2SLACK_SLACK_BOT_TOKEN", "  ")]);
        assert_eq!(p.get_string("SLACK_BOT_TOKEN"), None);
    }

    #[test]
    fn test_apply_overrides_config() {
        let mut config = Config::default();
        let mut p = parser(&[
            ("PD2SLACK_WRITE", "true"),
            ("PD2SLACK_LOG_LEVEL", "warn"),
            ("PD2SLACK_HTTP_TIMEOUT", "10s"),
            ("PD2SLACK_SLACK_BOT_TOKEN", "xoxb-env"),
            ("PD2SLACK_SLACK_USER_TOKEN", "xoxp-env"),
            ("PD2SLACK_PAGERDUTY_TOKEN", "pd-env"),
        ]);
        p.apply(&mut config);
        assert!(!p.has_errors());
        assert!(config.global.write);
        assert_eq!(config.global.log_level, "warn");
        assert_eq!(config.global.http_timeout, "10s");
        assert_eq!(config.slack.bot_token, "xoxb-env");
        assert_eq!(config.slack.user_token, "xoxp-env");
        assert_eq!(config.pagerduty.auth_token, "pd-env");
    }
}
