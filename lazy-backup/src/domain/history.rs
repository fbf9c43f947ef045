//! Backup run history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Run status values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Artifact details recorded on a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub name: String,
    pub id: String,
    pub size: u64,
}

/// One execution of a job.
///
/// Created as `running`; moves to exactly one terminal state and is never reopened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRun {
    pub id: String,
    pub job_name: String,
    pub database_kind: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub artifact_name: Option<String>,
    pub artifact_id: Option<String>,
    pub artifact_size: Option<u64>,
    pub error_message: Option<String>,
}

impl BackupRun {
    /// Start a new run at the current time.
    pub fn start(job_name: impl Into<String>, database_kind: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_name: job_name.into(),
            database_kind: database_kind.into(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            artifact_name: None,
            artifact_id: None,
            artifact_size: None,
            error_message: None,
        }
    }

    fn ensure_running(&self, to: RunStatus) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }

    /// Transition to `success`.
    pub fn complete_success(&mut self, artifact: ArtifactInfo) -> Result<()> {
        self.ensure_running(RunStatus::Success)?;
        self.status = RunStatus::Success;
        self.completed_at = Some(Utc::now());
        self.artifact_name = Some(artifact.name);
        self.artifact_id = Some(artifact.id);
        self.artifact_size = Some(artifact.size);
        self.error_message = None;
        Ok(())
    }

    /// Transition to `failed`.
    pub fn fail(&mut self, error_message: impl Into<String>) -> Result<()> {
        self.ensure_running(RunStatus::Failed)?;
        self.status = RunStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error_message = Some(error_message.into());
        Ok(())
    }

    /// Wall-clock duration once terminal.
    pub fn duration(&self) -> Option<std::time::Duration> {
        self.completed_at
            .and_then(|end| (end - self.started_at).to_std().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_transition() {
        let mut run = BackupRun::start("nightly", "mysql");
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.completed_at.is_none());

        run.complete_success(ArtifactInfo {
            name: "nightly.sql".to_string(),
            id: "D1".to_string(),
            size: 2048,
        })
        .unwrap();

        assert_eq!(run.status, RunStatus::Success);
        assert!(run.completed_at.is_some());
        assert_eq!(run.artifact_size, Some(2048));
        assert!(run.duration().is_some());
    }

    #[test]
    fn test_terminal_run_cannot_reopen() {
        let mut run = BackupRun::start("nightly", "mysql");
        run.fail("connection refused").unwrap();

        let err = run.fail("again").unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));

        let err = run
            .complete_success(ArtifactInfo {
                name: "x".to_string(),
                id: "y".to_string(),
                size: 1,
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error_message.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(RunStatus::parse("failed"), Some(RunStatus::Failed));
        assert_eq!(RunStatus::Success.as_str(), "success");
        assert!(!RunStatus::Running.is_terminal());
    }
}
