//! Error taxonomy for pd2slack.
//!
//! | Type          | Raised by                         | Effect on a sync run            |
//! |---------------|-----------------------------------|---------------------------------|
//! | `ClientError` | PagerDuty / Slack HTTP clients    | wrapped into `SyncError`        |
//! | `SyncError`   | resolver, matcher, reconciler, jobs | aborts the run, except `InvalidWindow` |
//! | `ConfigError` | configuration loading             | aborts startup                  |
//!
//! `ClientError` and `SyncError` are `Clone` so a job can keep the last error
//! for its status report while also returning it to the scheduler.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single call against PagerDuty or Slack.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The addressed object does not exist (HTTP 404).
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// Unexpected HTTP status.
    #[error("{operation} returned HTTP {code}")]
    Status { operation: String, code: u16 },

    /// Slack answered with `ok: false`.
    #[error("{method} returned ok=false: {error}")]
    Api { method: String, error: String },

    /// Still rate limited after the allowed number of attempts.
    #[error("{method} is rate limited")]
    RateLimited { method: String },

    /// Connection, TLS or timeout failure.
    #[error("{operation} failed: {message}")]
    Transport { operation: String, message: String },

    /// Response body did not match the expected shape.
    #[error("failed to decode {operation} response: {message}")]
    Decode { operation: String, message: String },
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors of a reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Nothing to match: the resolved roster was empty.
    #[error("empty PagerDuty user list; check shift schedule")]
    EmptyRoster,

    /// No user group with this handle in the directory snapshot.
    #[error("slack: finding group handle '{handle}' failed; check config")]
    GroupNotFound { handle: String },

    /// Replacing the members with an empty set was requested.
    #[error("slack: refusing to empty group '{handle}'; disable it instead")]
    EmptyTarget { handle: String },

    /// An external call failed.
    #[error("{operation} for '{target}' failed: {source}")]
    External {
        operation: &'static str,
        target: String,
        #[source]
        source: ClientError,
    },

    /// A handover window could not be parsed; zero was used instead.
    #[error("invalid duration '{value}' for sync of '{handle}', using 0: {reason}")]
    InvalidWindow {
        handle: String,
        value: String,
        reason: String,
    },

    /// Job-level context around an underlying failure.
    #[error("{message}: {source}")]
    Job {
        message: String,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    pub fn external(operation: &'static str, target: impl Into<String>, source: ClientError) -> Self {
        Self::External {
            operation,
            target: target.into(),
            source,
        }
    }

    /// Wrap with a job-specific message.
    pub fn context(self, message: impl Into<String>) -> Self {
        Self::Job {
            message: message.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping job-level context.
    pub fn root(&self) -> &SyncError {
        match self {
            Self::Job { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the run continued despite this error.
    pub fn is_degradation(&self) -> bool {
        matches!(self.root(), Self::InvalidWindow { .. })
    }
}

/// Errors while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read configuration {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}
