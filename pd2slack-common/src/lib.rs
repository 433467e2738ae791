//! Shared types, errors and configuration for pd2slack.

pub mod config;
pub mod errors;
pub mod types;

pub use config::{Config, ConfigWarning, EnvParser, Severity, SyncJobConfig, SyncOptions, validate_config};
pub use errors::{ClientError, ConfigError, SyncError};
pub use types::{
    ChatChannel, ChatGroup, ChatIdentity, ChatMessage, RosterEntry, ScheduleDetail, ScheduleLayer,
    SourceObject, SyncStyle, TimeWindow, UserReference,
};
