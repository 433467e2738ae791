//! Status message posted to the info channel after every run.

use crate::clients::ChatDirectory;
use crate::directory::DirectoryCache;
use crate::jobs::{SyncJob, link};
use pd2slack_common::{ChatMessage, ClientError, SyncError};
use serde_json::{Value, json};
use tracing::debug;

fn mrkdwn(text: impl Into<String>) -> Value {
    json!({ "type": "mrkdwn", "text": text.into() })
}

fn section(text: impl Into<String>) -> Value {
    json!({ "type": "section", "text": mrkdwn(text) })
}

/// Block Kit message describing the last run of `job`.
pub fn status_message(job: &dyn SyncJob) -> ChatMessage {
    let kind = job.kind();
    let mut header = format!(
        "{} {} > Slack Handle: `{}`",
        kind.icon(),
        kind.label(),
        job.slack_handle()
    );
    if job.dryrun() {
        header.push_str(" - !!! DRY RUN !!! No update done !!!");
    }

    let mut blocks = vec![section(header.clone())];
    if let Some(err) = job.error() {
        blocks.push(section(format!(":stop-sign: *Error:* {}", err)));
    }

    let sources: Vec<String> = job
        .source_objects()
        .iter()
        .map(|s| link(&s.html_url, &s.summary))
        .collect();
    let next_run = job
        .next_run()
        .map(|t| t.to_rfc2822())
        .unwrap_or_else(|| "never".to_string());
    blocks.push(json!({
        "type": "section",
        "fields": [
            mrkdwn(format!("*PD Source*\n{}", sources.join("\n"))),
            mrkdwn(job.info_body()),
            mrkdwn(format!(":alarm_clock: *Next run:* {}", next_run)),
        ],
    }));
    blocks.push(json!({ "type": "divider" }));

    ChatMessage {
        text: header,
        blocks,
    }
}

/// Post the status of `job` to the info channel of the current snapshot.
pub fn post_status(
    chat: &dyn ChatDirectory,
    directory: &DirectoryCache,
    job: &dyn SyncJob,
) -> Result<(), SyncError> {
    let snapshot = directory.snapshot();
    let channel = snapshot.info_channel.as_ref().ok_or_else(|| {
        SyncError::external(
            "post status message",
            job.slack_handle(),
            ClientError::NotFound {
                kind: "info channel",
                id: String::new(),
            },
        )
    })?;

    debug!("Posting status of '{}' to #{}", job.slack_handle(), channel.name);
    chat.post_message(&channel.id, &status_message(job))
        .map_err(|e| SyncError::external("post status message", channel.id.as_str(), e))
}
