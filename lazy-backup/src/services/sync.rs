//! Declarative job and channel sets loaded from a JSON file.
//!
//! ```json
//! {
//!   "jobs": [
//!     { "name": "nightly", "cron_expression": "0 0 2 * * *",
//!       "backup_mode": "full", "database_connection_ref": "mysql://u:p@db:3306/app" }
//!   ],
//!   "channels": [
//!     { "name": "ops", "kind": "slack",
//!       "settings": { "webhook_url": "https://hooks.slack.com/services/T/B/X" },
//!       "notify_on_success": false }
//!   ]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{ChannelConfig, JobConfig};
use crate::{Error, Result};

/// The complete set of jobs and channels; applying it replaces the stored ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

/// What a sync changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub jobs_removed: usize,
    pub jobs_added: usize,
    pub channels_removed: usize,
    pub channels_added: usize,
}

impl SyncConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::config(format!("failed to read sync file {}: {e}", path.display()))
        })?;
        Self::parse(&raw)
            .map_err(|e| Error::config(format!("invalid sync file {}: {e}", path.display())))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Reject duplicate names before anything is touched.
    pub fn check_unique_names(&self) -> Result<()> {
        fn first_duplicate<'a>(mut names: impl Iterator<Item = &'a str>) -> Option<&'a str> {
            let mut seen = std::collections::HashSet::new();
            names.find(|name| !seen.insert(*name))
        }

        if let Some(name) = first_duplicate(self.jobs.iter().map(|j| j.name.as_str())) {
            return Err(Error::validation(format!("job '{name}' is listed twice")));
        }
        if let Some(name) = first_duplicate(self.channels.iter().map(|c| c.name.as_str())) {
            return Err(Error::validation(format!("channel '{name}' is listed twice")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BackupMode, ChannelKind};

    #[test]
    fn test_parse_with_defaults() {
        let config = SyncConfig::parse(
            r#"{
                "jobs": [{ "name": "nightly", "cron_expression": "0 0 2 * * 1-5",
                           "backup_mode": "schema_only",
                           "database_connection_ref": "mysql://u:p@db:3306/app" }],
                "channels": [{ "name": "ops", "kind": "slack",
                               "settings": { "webhook_url": "https://hooks.slack.com/x" },
                               "notify_on_success": false }]
            }"#,
        )
        .unwrap();

        assert_eq!(config.jobs[0].backup_mode, BackupMode::SchemaOnly);
        assert!(config.jobs[0].enabled);
        assert_eq!(config.channels[0].kind, ChannelKind::Slack);
        assert!(config.channels[0].enabled);
        assert!(!config.channels[0].notify_on_success);
        assert!(config.channels[0].notify_on_error);
    }

    #[test]
    fn test_missing_sections_are_empty() {
        assert_eq!(SyncConfig::parse("{}").unwrap(), SyncConfig::default());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let job = JobConfig::new("nightly", "@daily", BackupMode::Full, "mysql://h/db");
        let config = SyncConfig {
            jobs: vec![job.clone(), job],
            channels: Vec::new(),
        };
        assert!(matches!(
            config.check_unique_names(),
            Err(Error::Validation(msg)) if msg.contains("nightly")
        ));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SyncConfig::load(&dir.path().join("sync.json")).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
