//! Database row models.
//!
//! Timestamps are stored as RFC 3339 strings and channel settings as JSON text.
//! Conversion to and from domain types happens here so that repositories only
//! deal with rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::{
    BackupMode, BackupRun, ChannelConfig, ChannelKind, JobConfig, OAuthToken, RunStatus,
};
use crate::{Error, Result};

fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Other(format!("invalid {field} timestamp '{value}': {e}")))
}

/// Backup job row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BackupConfigDbModel {
    pub name: String,
    pub cron_expression: String,
    /// full, schema_only
    pub backup_mode: String,
    pub database_connection_ref: String,
    pub enabled: bool,
    /// ISO 8601 timestamp when the row was created
    pub created_at: String,
    /// ISO 8601 timestamp when the row was last updated
    pub updated_at: String,
}

impl BackupConfigDbModel {
    pub fn from_domain(job: &JobConfig) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            name: job.name.clone(),
            cron_expression: job.cron_expression.clone(),
            backup_mode: job.backup_mode.as_str().to_string(),
            database_connection_ref: job.database_connection_ref.clone(),
            enabled: job.enabled,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn into_domain(self) -> Result<JobConfig> {
        let backup_mode = BackupMode::parse(&self.backup_mode).ok_or_else(|| {
            Error::Other(format!(
                "job {} has unknown backup mode '{}'",
                self.name, self.backup_mode
            ))
        })?;
        Ok(JobConfig {
            name: self.name,
            cron_expression: self.cron_expression,
            backup_mode,
            database_connection_ref: self.database_connection_ref,
            enabled: self.enabled,
        })
    }
}

/// Backup history row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BackupHistoryDbModel {
    pub id: String,
    pub job_name: String,
    pub database_kind: String,
    /// running, success, failed
    pub status: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub artifact_name: Option<String>,
    pub artifact_id: Option<String>,
    pub artifact_size: Option<i64>,
    pub error_message: Option<String>,
}

impl BackupHistoryDbModel {
    pub fn from_domain(run: &BackupRun) -> Self {
        Self {
            id: run.id.clone(),
            job_name: run.job_name.clone(),
            database_kind: run.database_kind.clone(),
            status: run.status.as_str().to_string(),
            started_at: run.started_at.to_rfc3339(),
            completed_at: run.completed_at.map(|t| t.to_rfc3339()),
            artifact_name: run.artifact_name.clone(),
            artifact_id: run.artifact_id.clone(),
            artifact_size: run.artifact_size.map(|s| s as i64),
            error_message: run.error_message.clone(),
        }
    }

    pub fn into_domain(self) -> Result<BackupRun> {
        let status = RunStatus::parse(&self.status).ok_or_else(|| {
            Error::Other(format!("run {} has unknown status '{}'", self.id, self.status))
        })?;
        let started_at = parse_timestamp("started_at", &self.started_at)?;
        let completed_at = self
            .completed_at
            .as_deref()
            .map(|t| parse_timestamp("completed_at", t))
            .transpose()?;
        Ok(BackupRun {
            id: self.id,
            job_name: self.job_name,
            database_kind: self.database_kind,
            status,
            started_at,
            completed_at,
            artifact_name: self.artifact_name,
            artifact_id: self.artifact_id,
            artifact_size: self.artifact_size.map(|s| s.max(0) as u64),
            error_message: self.error_message,
        })
    }
}

/// Notification channel row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationConfigDbModel {
    pub name: String,
    /// discord, slack, chatwork, webhook
    pub channel_kind: String,
    /// JSON object
    pub settings: String,
    pub enabled: bool,
    pub notify_on_success: bool,
    pub notify_on_error: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl NotificationConfigDbModel {
    pub fn from_domain(channel: &ChannelConfig) -> Result<Self> {
        let now = Utc::now().to_rfc3339();
        Ok(Self {
            name: channel.name.clone(),
            channel_kind: channel.kind.as_str().to_string(),
            settings: serde_json::to_string(&channel.settings)?,
            enabled: channel.enabled,
            notify_on_success: channel.notify_on_success,
            notify_on_error: channel.notify_on_error,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn into_domain(self) -> Result<ChannelConfig> {
        let kind = ChannelKind::parse(&self.channel_kind).ok_or_else(|| {
            Error::Other(format!(
                "channel {} has unknown kind '{}'",
                self.name, self.channel_kind
            ))
        })?;
        Ok(ChannelConfig {
            name: self.name,
            kind,
            settings: serde_json::from_str(&self.settings)?,
            enabled: self.enabled,
            notify_on_success: self.notify_on_success,
            notify_on_error: self.notify_on_error,
        })
    }
}

/// OAuth token row.
#[derive(Debug, Clone, FromRow)]
pub struct OAuthTokenDbModel {
    pub client_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl OAuthTokenDbModel {
    pub fn from_domain(token: &OAuthToken) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            client_id: token.client_id.clone(),
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            token_type: token.token_type.clone(),
            expires_at: token.expires_at.map(|t| t.to_rfc3339()),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn into_domain(self) -> Result<OAuthToken> {
        let expires_at = self
            .expires_at
            .as_deref()
            .map(|t| parse_timestamp("expires_at", t))
            .transpose()?;
        Ok(OAuthToken {
            client_id: self.client_id,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ArtifactInfo;

    #[test]
    fn test_history_row_preserves_terminal_fields() {
        let mut run = BackupRun::start("nightly", "mysql");
        run.complete_success(ArtifactInfo {
            name: "n.sql".to_string(),
            id: "D1".to_string(),
            size: 2048,
        })
        .unwrap();

        let row = BackupHistoryDbModel::from_domain(&run);
        assert_eq!(row.status, "success");
        assert_eq!(row.artifact_size, Some(2048));

        let back = row.into_domain().unwrap();
        assert_eq!(back.status, RunStatus::Success);
        assert_eq!(back.artifact_id.as_deref(), Some("D1"));
        assert!(back.completed_at.is_some());
    }

    #[test]
    fn test_unknown_kind_is_error() {
        let mut row = NotificationConfigDbModel::from_domain(&ChannelConfig::new(
            "ops",
            ChannelKind::Slack,
            Default::default(),
        ))
        .unwrap();
        row.channel_kind = "pager".to_string();
        assert!(row.into_domain().is_err());
    }

    #[test]
    fn test_bad_timestamp_is_error() {
        let mut row = BackupHistoryDbModel::from_domain(&BackupRun::start("j", "mysql"));
        row.started_at = "yesterday".to_string();
        assert!(row.into_domain().is_err());
    }

    #[test]
    fn test_token_row_without_expiry() {
        let token = OAuthToken {
            client_id: "client".to_string(),
            access_token: String::new(),
            refresh_token: "1//refresh".to_string(),
            token_type: "Bearer".to_string(),
            expires_at: None,
        };
        let row = OAuthTokenDbModel::from_domain(&token);
        assert!(row.expires_at.is_none());
        assert_eq!(row.into_domain().unwrap(), token);
    }
}
