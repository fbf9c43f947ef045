//! Job and channel management.
//!
//! `BackupManager` keeps the store and the live schedule in step: every job
//! change is validated, persisted, then applied to the scheduler.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use super::sync::{SyncConfig, SyncReport};
use crate::auth::{OAuthService, TokenInfo};
use crate::database::ConfigStore;
use crate::domain::{BackupRun, ChannelConfig, JobConfig};
use crate::notification::{DeliveryResult, NotificationDispatcher};
use crate::scheduler::{ScheduledJob, Scheduler, validate_cron_expression};
use crate::storage::{Storage, StoredFile};
use crate::{Error, Result};

pub struct BackupManager {
    store: Arc<dyn ConfigStore>,
    scheduler: Arc<Scheduler>,
    dispatcher: Arc<NotificationDispatcher>,
    storage: Arc<dyn Storage>,
    /// Present when artifacts go to Google Drive.
    oauth: Option<Arc<OAuthService>>,
}

impl BackupManager {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        scheduler: Arc<Scheduler>,
        dispatcher: Arc<NotificationDispatcher>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            store,
            scheduler,
            dispatcher,
            storage,
            oauth: None,
        }
    }

    pub fn with_oauth(mut self, oauth: Option<Arc<OAuthService>>) -> Self {
        self.oauth = oauth;
        self
    }

    /// Validate, persist and (if enabled) schedule a new job.
    pub async fn add_job(&self, job: JobConfig) -> Result<()> {
        job.validate()?;
        validate_cron_expression(&job.cron_expression)?;
        self.store.create_job(&job).await?;
        if job.enabled {
            self.scheduler.add_or_replace_job(&job)?;
        }
        info!(job = %job.name, enabled = job.enabled, "Job added");
        Ok(())
    }

    /// Change a job's schedule and/or enabled flag.
    pub async fn update_job(
        &self,
        name: &str,
        cron_expression: Option<String>,
        enabled: bool,
    ) -> Result<JobConfig> {
        let mut job = self.store.get_job(name).await?;
        if let Some(cron) = cron_expression {
            validate_cron_expression(&cron)?;
            job.cron_expression = cron;
        }
        job.enabled = enabled;
        self.store.update_job(&job).await?;

        if job.enabled {
            self.scheduler.add_or_replace_job(&job)?;
        } else {
            self.scheduler.remove_job(&job.name);
        }
        info!(job = %job.name, cron = %job.cron_expression, enabled, "Job updated");
        Ok(job)
    }

    pub async fn delete_job(&self, name: &str) -> Result<()> {
        self.scheduler.remove_job(name);
        self.store.delete_job(name).await?;
        info!(job = %name, "Job deleted");
        Ok(())
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobConfig>> {
        self.store.list_jobs().await
    }

    /// Jobs currently registered with the scheduler, with their fire times.
    pub fn scheduled_jobs(&self) -> Vec<ScheduledJob> {
        self.scheduler.list_scheduled()
    }

    /// Preview an expression in the scheduler's time zone.
    pub fn next_run_times(&self, expression: &str, count: usize) -> Result<Vec<DateTime<Utc>>> {
        self.scheduler.next_run_times(expression, count)
    }

    /// Replace every stored job and channel with `config`.
    ///
    /// The whole set is validated first; nothing changes if any entry is invalid.
    pub async fn sync_from_config(&self, config: &SyncConfig) -> Result<SyncReport> {
        config.check_unique_names()?;
        for job in &config.jobs {
            job.validate()?;
            self.scheduler.next_run_times(&job.cron_expression, 1)?;
        }
        for channel in &config.channels {
            self.dispatcher.validate_channel(channel)?;
        }

        let mut report = SyncReport::default();
        for job in self.store.list_jobs().await? {
            self.scheduler.remove_job(&job.name);
            self.store.delete_job(&job.name).await?;
            report.jobs_removed += 1;
        }
        for job in &config.jobs {
            self.store.create_job(job).await?;
            if job.enabled {
                self.scheduler.add_or_replace_job(job)?;
            }
            report.jobs_added += 1;
        }

        for channel in self.store.list_channels().await? {
            self.store.delete_channel(&channel.name).await?;
            report.channels_removed += 1;
        }
        for channel in &config.channels {
            self.store.save_channel(channel).await?;
            report.channels_added += 1;
        }

        info!(
            jobs = report.jobs_added,
            channels = report.channels_added,
            "Configuration synced"
        );
        Ok(report)
    }

    /// Start a run immediately; completion is observable through history.
    pub async fn backup_now(&self, name: &str) -> Result<()> {
        self.scheduler.trigger_now(name).await
    }

    /// Run history, newest first.
    pub async fn history(&self, limit: u32, offset: u32) -> Result<Vec<BackupRun>> {
        self.store.list_history(limit, offset).await
    }

    /// Validate settings for the channel's kind, then save (insert or replace).
    pub async fn add_channel(&self, channel: ChannelConfig) -> Result<()> {
        self.dispatcher.validate_channel(&channel)?;
        self.store.save_channel(&channel).await?;
        info!(channel = %channel.name, kind = %channel.kind, "Notification channel saved");
        Ok(())
    }

    pub async fn delete_channel(&self, name: &str) -> Result<()> {
        self.store.delete_channel(name).await?;
        info!(channel = %name, "Notification channel deleted");
        Ok(())
    }

    pub async fn list_channels(&self) -> Result<Vec<ChannelConfig>> {
        self.store.list_channels().await
    }

    pub async fn test_channel(&self, name: &str) -> Result<DeliveryResult> {
        self.dispatcher.test_channel(name).await
    }

    /// Uploaded artifacts, newest first.
    pub async fn list_backup_files(
        &self,
        folder_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<StoredFile>> {
        self.storage.list_files(folder_id, limit).await
    }

    pub async fn delete_backup_file(&self, id: &str) -> Result<()> {
        self.storage.delete_file(id).await?;
        info!(id, "Backup file deleted");
        Ok(())
    }

    fn oauth(&self) -> Result<&OAuthService> {
        self.oauth
            .as_deref()
            .ok_or_else(|| Error::config("Google Drive storage is not configured"))
    }

    /// Consent page URL for authorizing Drive access.
    pub fn auth_url(&self, state: &str) -> Result<String> {
        self.oauth()?.auth_url(state)
    }

    pub async fn exchange_auth_code(&self, code: &str) -> Result<TokenInfo> {
        self.oauth()?.exchange_code(code).await
    }

    pub async fn token_info(&self) -> Result<TokenInfo> {
        self.oauth()?.token_info().await
    }

    pub async fn validate_token(&self) -> Result<()> {
        self.oauth()?.validate_token().await
    }
}
