//! Notification events, rendered messages and delivery results.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::format::{format_duration, format_file_size};
use crate::domain::{BackupRun, ChannelKind, RunStatus};

/// Terminal outcome of a run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Failure,
}

/// Everything a channel needs to describe one finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub job_name: String,
    pub database_kind: String,
    pub outcome: RunOutcome,
    pub size_bytes: Option<u64>,
    pub duration: Duration,
    pub artifact_name: Option<String>,
    pub artifact_link: Option<String>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl NotificationEvent {
    /// Build an event from a terminal run.
    ///
    /// A run that is still `running` is reported as a failure completing now.
    pub fn from_run(run: &BackupRun, artifact_link: Option<String>) -> Self {
        let completed_at = run.completed_at.unwrap_or_else(Utc::now);
        let outcome = match run.status {
            RunStatus::Success => RunOutcome::Success,
            RunStatus::Failed | RunStatus::Running => RunOutcome::Failure,
        };
        Self {
            job_name: run.job_name.clone(),
            database_kind: run.database_kind.clone(),
            outcome,
            size_bytes: run.artifact_size,
            duration: (completed_at - run.started_at).to_std().unwrap_or_default(),
            artifact_name: run.artifact_name.clone(),
            artifact_link,
            error_message: run.error_message.clone(),
            started_at: run.started_at,
            completed_at,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Success
    }
}

/// Message severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Success,
    Error,
    Info,
    Warning,
}

/// One labelled detail line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageField {
    pub name: String,
    pub value: String,
}

impl MessageField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A channel-specific rendering of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    pub title: String,
    pub text: String,
    /// Ordered detail lines.
    pub fields: Vec<MessageField>,
    pub timestamp: DateTime<Utc>,
    pub job_name: String,
}

/// Field labels and markup a renderer applies on top of the shared layout.
#[derive(Debug, Clone, Copy)]
pub struct MessageStyle {
    pub success_prefix: &'static str,
    pub failure_prefix: &'static str,
    /// Wraps the job name in the body text, e.g. `*` or `**`.
    pub emphasis: &'static str,
    pub database_label: &'static str,
    pub file_name_label: &'static str,
    pub file_size_label: &'static str,
    pub duration_label: &'static str,
    pub link_label: &'static str,
    pub error_label: &'static str,
    pub link: fn(&str) -> String,
}

fn plain_link(url: &str) -> String {
    url.to_string()
}

impl MessageStyle {
    /// Unadorned labels.
    pub const PLAIN: Self = Self {
        success_prefix: "",
        failure_prefix: "",
        emphasis: "",
        database_label: "Database Type",
        file_name_label: "File Name",
        file_size_label: "File Size",
        duration_label: "Duration",
        link_label: "Link",
        error_label: "Error",
        link: plain_link,
    };
}

impl Default for MessageStyle {
    fn default() -> Self {
        Self::PLAIN
    }
}

impl Message {
    /// Render an event with the given style.
    pub fn for_event(event: &NotificationEvent, style: &MessageStyle) -> Self {
        let name = &event.job_name;
        let em = style.emphasis;
        let mut fields = vec![MessageField::new(
            style.database_label,
            event.database_kind.clone(),
        )];

        let (kind, title, text) = match event.outcome {
            RunOutcome::Success => {
                if let Some(file_name) = &event.artifact_name {
                    fields.push(MessageField::new(style.file_name_label, file_name.clone()));
                }
                fields.push(MessageField::new(
                    style.file_size_label,
                    format_file_size(event.size_bytes.unwrap_or(0)),
                ));
                fields.push(MessageField::new(
                    style.duration_label,
                    format_duration(event.duration),
                ));
                if let Some(link) = event.artifact_link.as_deref().filter(|l| !l.is_empty()) {
                    fields.push(MessageField::new(style.link_label, (style.link)(link)));
                }
                (
                    MessageKind::Success,
                    format!("{}Backup Completed: {name}", style.success_prefix),
                    format!("Database backup completed successfully for {em}{name}{em}"),
                )
            }
            RunOutcome::Failure => {
                fields.push(MessageField::new(
                    style.duration_label,
                    format_duration(event.duration),
                ));
                fields.push(MessageField::new(
                    style.error_label,
                    event.error_message.clone().unwrap_or_default(),
                ));
                (
                    MessageKind::Error,
                    format!("{}Backup Failed: {name}", style.failure_prefix),
                    format!("Database backup failed for {em}{name}{em}"),
                )
            }
        };

        Self {
            kind,
            title,
            text,
            fields,
            timestamp: event.completed_at,
            job_name: event.job_name.clone(),
        }
    }

    /// Synthetic info message for channel tests.
    pub fn test(channel_name: &str, kind: ChannelKind) -> Self {
        Self {
            kind: MessageKind::Info,
            title: "Test Notification".to_string(),
            text: format!(
                "This is a test notification from the Database Backup Service via {kind}"
            ),
            fields: Vec::new(),
            timestamp: Utc::now(),
            job_name: channel_name.to_string(),
        }
    }
}

/// Outcome of delivering to one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub channel_name: String,
    pub channel_kind: ChannelKind,
    pub success: bool,
    pub error: Option<String>,
    pub sent_at: DateTime<Utc>,
}

impl DeliveryResult {
    pub fn delivered(channel_name: impl Into<String>, channel_kind: ChannelKind) -> Self {
        Self {
            channel_name: channel_name.into(),
            channel_kind,
            success: true,
            error: None,
            sent_at: Utc::now(),
        }
    }

    pub fn failed(
        channel_name: impl Into<String>,
        channel_kind: ChannelKind,
        error: impl Into<String>,
    ) -> Self {
        Self {
            channel_name: channel_name.into(),
            channel_kind,
            success: false,
            error: Some(error.into()),
            sent_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ArtifactInfo;

    fn success_event() -> NotificationEvent {
        let mut run = BackupRun::start("nightly", "mysql");
        run.complete_success(ArtifactInfo {
            name: "nightly_20240101.sql".to_string(),
            id: "D1".to_string(),
            size: 2048,
        })
        .unwrap();
        NotificationEvent::from_run(&run, Some("https://x/D1".to_string()))
    }

    #[test]
    fn test_event_from_successful_run() {
        let event = success_event();
        assert!(event.is_success());
        assert_eq!(event.size_bytes, Some(2048));
        assert_eq!(event.artifact_name.as_deref(), Some("nightly_20240101.sql"));
    }

    #[test]
    fn test_plain_success_message_fields_are_ordered() {
        let message = Message::for_event(&success_event(), &MessageStyle::PLAIN);
        assert_eq!(message.kind, MessageKind::Success);
        assert_eq!(message.title, "Backup Completed: nightly");

        let names: Vec<_> = message.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            ["Database Type", "File Name", "File Size", "Duration", "Link"]
        );
        assert_eq!(message.fields[2].value, "2.0 KB");
        assert_eq!(message.fields[4].value, "https://x/D1");
    }

    #[test]
    fn test_failure_message_carries_error() {
        let mut run = BackupRun::start("nightly", "mysql");
        run.fail("connection refused").unwrap();
        let event = NotificationEvent::from_run(&run, None);
        assert_eq!(event.outcome, RunOutcome::Failure);

        let message = Message::for_event(&event, &MessageStyle::PLAIN);
        assert_eq!(message.kind, MessageKind::Error);
        assert_eq!(message.title, "Backup Failed: nightly");
        let error = message.fields.iter().find(|f| f.name == "Error").unwrap();
        assert_eq!(error.value, "connection refused");
    }

    #[test]
    fn test_test_message_is_info() {
        let message = Message::test("ops", ChannelKind::Slack);
        assert_eq!(message.kind, MessageKind::Info);
        assert!(message.text.ends_with("via slack"));
    }
}
